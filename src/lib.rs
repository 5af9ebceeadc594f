//! Self-hosted clipboard and file sharing server.
//!
//! Clients `PUT`/`POST` content under an identifier and `GET` it back,
//! optionally as a one-shot stream. Entries are bounded in count, size and
//! lifetime; a janitor expires them and keeps the global counters honest.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod routing;
pub mod store;

// Background work
pub mod janitor;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::ServerConfig;
pub use error::{ClipError, StartupError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
