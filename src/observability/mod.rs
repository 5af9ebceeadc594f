//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! request dispatch / janitor sweeps
//!     → logging.rs (tracing subscriber, env filter)
//!     → metrics.rs (counters and gauges, optional Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;
