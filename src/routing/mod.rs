//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (ordered route table)
//!     → matcher.rs (method + path conditions)
//!     → Return: matched Route (handler + middleware flags) or NoRoute
//! ```
//!
//! The table is built once at startup and is immutable afterwards. The
//! first matching route wins.

pub mod matcher;
pub mod router;

pub use router::{Handler, Route, Router};
