//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-visitor token bucket)
//!     → auth.rs (HMAC or password check against key.rs material)
//!     → Pass to the clipboard store
//!
//! Writes:
//!     → limiter.rs (global count, global size, per-upload size,
//!                   per-visitor put count)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - Limit checks never block; they resolve to allow/deny immediately
//! - Constant-time comparison for every secret

pub mod auth;
pub mod key;
pub mod limiter;
pub mod rate_limit;

pub use auth::{AuthError, AuthGuard, Credentials};
pub use key::Key;
pub use limiter::{LimitReached, ResourceLimiter};
pub use rate_limit::VisitorRegistry;
