//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Check storage dir → Bind listeners
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! Startup is ordered and fails fast. Listeners bind last, so traffic only
//! arrives once the store and janitor exist.

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
