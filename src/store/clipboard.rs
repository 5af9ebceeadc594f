//! Entry lifecycle: existence and mode checks, TTL resolution, streaming
//! handoff and size-enforced content copy.
//!
//! # Write ordering
//! ```text
//! admission (count / visitor put limit, read-only check)
//!     → resolve mode + ttl
//!     → delete previous content and metadata
//!     → write metadata
//!     → create handoff (streams only)
//!     → copy body through per-upload and aggregate size caps
//! ```
//! Metadata always lands before the first content byte, so an entry never
//! exists with unknown mode or expiry.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::body::Body;
use tokio::io::AsyncWriteExt;

use crate::config::StorageConfig;
use crate::error::ClipError;
use crate::janitor::trigger::{SweepOnDrop, SweepTrigger};
use crate::security::limiter::ResourceLimiter;
use crate::store::copy::{copy_body, LimitWriter};
use crate::store::entry::{is_expired, unix_secs, EntryPaths, Metadata, Mode};
use crate::store::handoff::{EntryReader, EntryWriter, PendingWriter, StreamHandoff, StreamTicket};
use crate::store::ttl::{expires_at, resolve_ttl};

/// Client-controlled parameters of a write.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub mode: Option<String>,
    pub ttl: Option<Duration>,
    pub stream: bool,
}

/// An opened entry ready to be sent to a reader.
pub struct EntryRead {
    pub paths: EntryPaths,
    pub reader: EntryReader,
    /// Known for regular files; streams have no length.
    pub len: Option<u64>,
    /// Set for streamed entries, which the reader removes once done.
    pub stream: Option<StreamTicket>,
}

enum Destination {
    File,
    Stream(PendingWriter),
}

/// Undoes an admitted write that did not complete: gives back the
/// reserved count slot and removes whatever the write left on disk,
/// metadata included. Runs on drop unless disarmed.
struct Rollback {
    store: Arc<ClipboardStore>,
    paths: EntryPaths,
    reserved_slot: bool,
    armed: bool,
}

impl Rollback {
    async fn run(mut self) {
        self.armed = false;
        if self.reserved_slot {
            self.store.count.sub(1);
        }
        self.store.discard(&self.paths).await;
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Rollback {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if self.reserved_slot {
            self.store.count.sub(1);
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = self.store.clone();
        let paths = self.paths.clone();
        handle.spawn(async move {
            tracing::debug!(id = %paths.id, "Write abandoned");
            store.discard(&paths).await;
        });
    }
}

/// A write that passed admission and has its metadata on disk. The body is
/// copied by [`PreparedWrite::commit`]; a sweep is requested once the write
/// is finished or dropped.
pub struct PreparedWrite {
    metadata: Metadata,
    ttl: Duration,
    destination: Destination,
    rollback: Rollback,
    _sweep: SweepOnDrop,
}

impl PreparedWrite {
    pub fn id(&self) -> &str {
        &self.rollback.paths.id
    }

    pub fn expires(&self) -> i64 {
        self.metadata.expires
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.destination, Destination::Stream(_))
    }

    /// Copy `body` into the entry. For streams this first waits for a
    /// reader to attach.
    pub async fn commit(self, body: Body) -> Result<u64, ClipError> {
        let PreparedWrite {
            destination,
            rollback,
            _sweep,
            ..
        } = self;

        let writer: EntryWriter = match destination {
            Destination::File => match create_private(&rollback.paths.content).await {
                Ok(file) => Box::new(file),
                Err(e) => {
                    rollback.run().await;
                    return Err(e.into());
                }
            },
            Destination::Stream(pending) => match pending.attach().await {
                Ok(writer) => writer,
                // removed or replaced before a reader came; the path and
                // its slot belong to whoever took over
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    rollback.disarm();
                    return Err(ClipError::StreamCancelled);
                }
                Err(e) => {
                    rollback.run().await;
                    return Err(e.into());
                }
            },
        };

        let store = &rollback.store;
        let limiters = vec![
            Arc::new(ResourceLimiter::new(store.file_size_limit)),
            store.size.clone(),
        ];
        match copy_body(body, LimitWriter::new(writer, limiters)).await {
            Ok(copied) => {
                tracing::debug!(id = %rollback.paths.id, bytes = copied, "Entry written");
                rollback.disarm();
                Ok(copied)
            }
            Err(e) => {
                rollback.run().await;
                Err(e.into())
            }
        }
    }
}

/// Directory-backed clipboard.
pub struct ClipboardStore {
    dir: PathBuf,
    count: Arc<ResourceLimiter>,
    size: Arc<ResourceLimiter>,
    file_size_limit: u64,
    max_ttl: Duration,
    modes_allowed: Vec<Mode>,
    default_mode: Mode,
    handoff: StreamHandoff,
    sweep: SweepTrigger,
}

impl ClipboardStore {
    pub fn new(config: &StorageConfig, sweep: SweepTrigger) -> Self {
        Self {
            dir: config.dir.clone(),
            count: Arc::new(ResourceLimiter::new(config.count_limit)),
            size: Arc::new(ResourceLimiter::new(config.size_limit)),
            file_size_limit: config.file_size_limit,
            max_ttl: config.file_expire_after(),
            modes_allowed: config.modes_allowed.clone(),
            default_mode: config.default_mode(),
            handoff: StreamHandoff::new(config.stream_backend),
            sweep,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn count_limiter(&self) -> &ResourceLimiter {
        &self.count
    }

    pub fn size_limiter(&self) -> &ResourceLimiter {
        &self.size
    }

    /// Default lifetime used when an entry has no readable metadata.
    pub fn max_ttl(&self) -> Duration {
        self.max_ttl
    }

    /// Open an entry for reading. Expired entries read as not found even
    /// before the janitor removes them.
    pub async fn open(&self, id: &str) -> Result<EntryRead, ClipError> {
        let paths = EntryPaths::resolve(&self.dir, id)?;
        let stat = match tokio::fs::symlink_metadata(&paths.content).await {
            Ok(stat) => stat,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(ClipError::NotFound),
            Err(e) => return Err(e.into()),
        };

        let stream = self.handoff.is_stream(&paths.content, &stat.file_type());
        if !stream && !stat.is_file() {
            return Err(ClipError::NotFound);
        }

        let metadata = self.read_metadata(&paths.meta).await.ok().flatten();
        if is_expired(
            metadata.as_ref(),
            stat.modified().ok(),
            self.max_ttl,
            SystemTime::now(),
        ) {
            return Err(ClipError::NotFound);
        }

        if stream {
            let (reader, ticket) = self
                .handoff
                .open_reader(&paths.content)
                .await?
                .ok_or(ClipError::NotFound)?;
            return Ok(EntryRead {
                paths,
                reader,
                len: None,
                stream: Some(ticket),
            });
        }

        let file = match tokio::fs::File::open(&paths.content).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(ClipError::NotFound),
            Err(e) => return Err(e.into()),
        };
        Ok(EntryRead {
            paths,
            reader: Box::new(file),
            len: Some(stat.len()),
            stream: None,
        })
    }

    /// Remove a streamed entry once its single reader is done with it.
    /// Does nothing if the entry has been replaced in the meantime.
    pub async fn finish_stream(&self, paths: &EntryPaths, ticket: StreamTicket) {
        if !self.handoff.finish(&paths.content, ticket) {
            tracing::debug!(id = %paths.id, "Stream entry already gone");
            return;
        }
        if let Err(e) = remove_files(paths).await {
            tracing::warn!(id = %paths.id, error = %e, "Failed to remove entry");
            return;
        }
        tracing::debug!(id = %paths.id, "Stream finished, entry removed");
    }

    /// Cancel every stream that is still pending and remove its entry.
    /// Waiting uploaders fail instead of holding their connection open.
    pub async fn cancel_streams(&self) {
        for path in self.handoff.paths() {
            let Some(paths) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|id| EntryPaths::resolve(&self.dir, id).ok())
            else {
                self.handoff.release(&path);
                continue;
            };
            self.discard(&paths).await;
            tracing::debug!(id = %paths.id, "Pending stream cancelled");
        }
    }

    /// Admit a write to `id` and persist its metadata.
    ///
    /// New entries take a slot from the global count limiter. Overwrites
    /// take one from the visitor's put limiter instead and are refused for
    /// read-only entries.
    pub async fn prepare_write(
        self: &Arc<Self>,
        id: &str,
        visitor_puts: &ResourceLimiter,
        options: WriteOptions,
    ) -> Result<PreparedWrite, ClipError> {
        let sweep = self.sweep.on_drop();
        let paths = EntryPaths::resolve(&self.dir, id)?;

        let existing = match tokio::fs::symlink_metadata(&paths.content).await {
            Ok(stat) => {
                // unreadable metadata leaves the entry writable
                let metadata = self.read_metadata(&paths.meta).await.unwrap_or(None);
                let expired = is_expired(
                    metadata.as_ref(),
                    stat.modified().ok(),
                    self.max_ttl,
                    SystemTime::now(),
                );
                (!expired).then_some(metadata)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let reserved_slot = match existing {
            None => {
                self.count
                    .add(1)
                    .map_err(|_| ClipError::LimitReached("count"))?;
                true
            }
            Some(metadata) => {
                visitor_puts
                    .add(1)
                    .map_err(|_| ClipError::LimitReached("visitor"))?;
                if metadata.map(|m| m.mode) == Some(Mode::ReadOnly) {
                    return Err(ClipError::ReadOnly);
                }
                false
            }
        };

        let result = self.admit(paths, options, reserved_slot, sweep).await;
        if result.is_err() && reserved_slot {
            self.count.sub(1);
        }
        result
    }

    async fn admit(
        self: &Arc<Self>,
        paths: EntryPaths,
        options: WriteOptions,
        reserved_slot: bool,
        sweep: SweepOnDrop,
    ) -> Result<PreparedWrite, ClipError> {
        let mode = self.resolve_mode(options.mode.as_deref())?;
        let ttl = resolve_ttl(options.ttl, self.max_ttl);
        let metadata = Metadata {
            mode,
            expires: expires_at(ttl, unix_secs(SystemTime::now())),
        };

        // overwrite is delete-then-recreate so a FIFO never turns into a
        // regular file or the other way round
        self.discard(&paths).await;
        self.write_metadata(&paths.meta, &metadata).await?;

        let destination = if options.stream {
            match self.handoff.create(&paths.content).await {
                Ok(pending) => Destination::Stream(pending),
                Err(e) => {
                    self.discard(&paths).await;
                    return Err(e.into());
                }
            }
        } else {
            Destination::File
        };

        Ok(PreparedWrite {
            metadata,
            ttl,
            destination,
            rollback: Rollback {
                store: self.clone(),
                paths,
                reserved_slot,
                armed: true,
            },
            _sweep: sweep,
        })
    }

    fn resolve_mode(&self, requested: Option<&str>) -> Result<Mode, ClipError> {
        let mode = match requested {
            Some(raw) => raw.parse::<Mode>()?,
            None => self.default_mode,
        };
        if self.modes_allowed.contains(&mode) {
            Ok(mode)
        } else {
            Err(ClipError::BadRequest("mode not allowed"))
        }
    }

    pub(crate) async fn read_metadata(&self, path: &Path) -> Result<Option<Metadata>, ClipError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_metadata(&self, path: &Path, metadata: &Metadata) -> Result<(), ClipError> {
        let mut json = serde_json::to_vec(metadata)?;
        json.push(b'\n');
        let mut file = create_private(path).await?;
        file.write_all(&json).await?;
        file.flush().await?;
        Ok(())
    }

    /// Delete content and metadata and cancel any pending handoff.
    /// Missing files are not an error.
    pub(crate) async fn expire(&self, paths: &EntryPaths) -> io::Result<()> {
        self.handoff.release(&paths.content);
        remove_files(paths).await
    }

    async fn discard(&self, paths: &EntryPaths) {
        if let Err(e) = self.expire(paths).await {
            tracing::warn!(id = %paths.id, error = %e, "Failed to remove entry");
        }
    }

}

async fn create_private(path: &Path) -> io::Result<tokio::fs::File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    options.open(path).await
}

async fn remove_files(paths: &EntryPaths) -> io::Result<()> {
    remove_if_exists(&paths.content).await?;
    remove_if_exists(&paths.meta).await
}

async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
