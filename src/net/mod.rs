//! Network layer.
//!
//! # Data Flow
//! ```text
//! listener.http  → listener.rs (TcpListener) → axum::serve
//! listener.https → tls.rs (PEM check, RustlsConfig) → axum_server::bind_rustls
//! ```

pub mod listener;
pub mod tls;
