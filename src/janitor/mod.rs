//! Background reconciliation.
//!
//! # Data Flow
//! ```text
//! interval tick ─┐
//! SweepTrigger ──┼─→ sweep.rs → limiter.set(count, size) → log + metrics
//! shutdown ──────┘ (exit)
//! ```

pub mod sweep;
pub mod trigger;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::observability::metrics;
use crate::security::rate_limit::VisitorRegistry;
use crate::store::ClipboardStore;

pub use sweep::{sweep, SweepReport};
pub use trigger::SweepTrigger;

pub struct Janitor {
    store: Arc<ClipboardStore>,
    visitors: Arc<VisitorRegistry>,
    interval: Duration,
    visitor_idle: Duration,
    trigger: SweepTrigger,
}

impl Janitor {
    pub fn new(
        store: Arc<ClipboardStore>,
        visitors: Arc<VisitorRegistry>,
        interval: Duration,
        visitor_idle: Duration,
        trigger: SweepTrigger,
    ) -> Self {
        Self {
            store,
            visitors,
            interval,
            visitor_idle,
            trigger,
        }
    }

    /// Sweep on every tick and on request until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            dir = %self.store.dir().display(),
            "Janitor starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep_once().await,
                _ = self.trigger.requested() => self.sweep_once().await,
                _ = shutdown.recv() => {
                    tracing::info!("Janitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    pub async fn sweep_once(&self) {
        match sweep(&self.store, &self.visitors, self.visitor_idle).await {
            Ok(report) => {
                tracing::debug!(
                    entries = report.entries,
                    entries_limit = self.store.count_limiter().limit(),
                    bytes = report.bytes,
                    bytes_limit = self.store.size_limiter().limit(),
                    expired = report.expired,
                    failed = report.failed,
                    visitors = report.visitors,
                    visitors_pruned = report.visitors_pruned,
                    "Sweep complete"
                );
                metrics::record_sweep(report.entries, report.bytes, report.visitors, report.expired);
            }
            Err(e) => {
                tracing::warn!(
                    dir = %self.store.dir().display(),
                    error = %e,
                    "Sweep aborted, counters left unchanged"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StorageConfig, StreamBackend, VisitorConfig};
    use crate::lifecycle::Shutdown;

    #[tokio::test]
    async fn test_trigger_runs_sweep_and_shutdown_stops_loop() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            dir: dir.path().to_path_buf(),
            stream_backend: StreamBackend::Memory,
            ..StorageConfig::default()
        };
        let trigger = SweepTrigger::new();
        let store = Arc::new(ClipboardStore::new(&config, trigger.clone()));
        let visitors = Arc::new(VisitorRegistry::new(&VisitorConfig::default()));
        store.count_limiter().set(9);

        let shutdown = Shutdown::new();
        let janitor = Janitor::new(
            store.clone(),
            visitors,
            Duration::from_secs(3600),
            Duration::from_secs(180),
            trigger.clone(),
        );
        let task = tokio::spawn(janitor.run(shutdown.subscribe()));

        // the first interval tick fires immediately; a requested sweep follows
        trigger.request();
        for _ in 0..50 {
            if store.count_limiter().value() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.count_limiter().value(), 0);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
