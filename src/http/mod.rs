//! HTTP layer.
//!
//! # Data Flow
//! ```text
//! axum catch-all route
//!     → server.rs (dispatch: route table, rate limit, auth)
//!     → handlers.rs (root, static, info, verify, get, put)
//!     → request.rs (X-* headers / query options)
//!     → response.rs (put output, sniffed entry bodies)
//!     → url.rs (retrieval URLs)
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;
pub mod url;

pub use server::{AppState, HttpServer};
