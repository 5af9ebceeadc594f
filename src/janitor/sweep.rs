//! One reconciliation pass over visitors and the storage directory.

use std::io;
use std::time::{Duration, SystemTime};

use crate::security::rate_limit::VisitorRegistry;
use crate::store::entry::{is_expired, EntryPaths};
use crate::store::ClipboardStore;

/// Outcome of a completed sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Surviving entries.
    pub entries: u64,
    /// Bytes held by surviving entries.
    pub bytes: u64,
    pub expired: u64,
    /// Expired entries that could not be removed. They are retried next time.
    pub failed: u64,
    pub visitors_pruned: usize,
    pub visitors: usize,
}

/// Prune idle visitors, expire entries and reset the global counters to
/// what is actually on disk.
///
/// A directory read failure returns the error before either counter is
/// touched.
pub async fn sweep(
    store: &ClipboardStore,
    visitors: &VisitorRegistry,
    visitor_idle: Duration,
) -> io::Result<SweepReport> {
    let mut report = SweepReport {
        visitors_pruned: visitors.prune(visitor_idle),
        ..SweepReport::default()
    };

    let now = SystemTime::now();
    let mut dir = tokio::fs::read_dir(store.dir()).await?;
    while let Some(dir_entry) = dir.next_entry().await? {
        let name = dir_entry.file_name();
        let Some(paths) = name
            .to_str()
            .and_then(|name| EntryPaths::from_dir_entry(store.dir(), name))
        else {
            continue;
        };

        let stat = match dir_entry.metadata().await {
            Ok(stat) if stat.is_dir() => continue,
            Ok(stat) => stat,
            // removed under our feet
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };

        let metadata = match store.read_metadata(&paths.meta).await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::debug!(id = %paths.id, error = %e, "Unreadable metadata, using file age");
                None
            }
        };

        if is_expired(metadata.as_ref(), stat.modified().ok(), store.max_ttl(), now) {
            match store.expire(&paths).await {
                Ok(()) => {
                    tracing::debug!(id = %paths.id, "Entry expired");
                    report.expired += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(id = %paths.id, error = %e, "Failed to remove expired entry");
                    report.failed += 1;
                }
            }
        }

        report.entries += 1;
        report.bytes += stat.len();
    }

    store.count_limiter().set(report.entries);
    store.size_limiter().set(report.bytes);
    report.visitors = visitors.len();
    Ok(report)
}
