//! Blocking single-writer/single-reader handoff for streamed entries.
//!
//! A streamed entry has no stored content. The uploader blocks until one
//! reader attaches and then writes straight into it. Two backends exist:
//!
//! - `Fifo`: a named pipe at the entry path. The writer polls a
//!   non-blocking open until a reader shows up, so it can be cancelled;
//!   the kernel provides the broken-pipe signal when the reader goes away.
//! - `Memory`: an in-process duplex pipe registered under the entry path,
//!   with a zero-length placeholder file so existence checks, overwrites and
//!   sweeps still see the entry.
//!
//! Every handoff is registered under its path with a [`StreamTicket`].
//! Releasing the registration cancels a writer that is still waiting, and
//! a reader that finishes only removes the entry if its ticket is still
//! the one registered.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::sync::oneshot;

use crate::config::StreamBackend;

/// Capacity of the in-process pipe buffer.
const PIPE_BUFFER: usize = 64 * 1024;

/// How often a FIFO writer checks for a reader.
const FIFO_ATTACH_POLL: Duration = Duration::from_millis(50);

pub type EntryReader = Box<dyn AsyncRead + Send + Unpin>;
pub type EntryWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Identifies one registration at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTicket(u64);

enum PendingState {
    Waiting {
        pipe: DuplexStream,
        attached: oneshot::Sender<()>,
    },
    Fifo {
        // dropped on release, which wakes the polling writer
        _cancel: oneshot::Sender<()>,
        claimed: bool,
    },
    Draining,
}

struct Registration {
    ticket: StreamTicket,
    state: PendingState,
}

/// Writer side of a freshly created handoff, not yet connected to a reader.
pub enum PendingWriter {
    Fifo {
        path: PathBuf,
        cancelled: oneshot::Receiver<()>,
    },
    Memory {
        pipe: DuplexStream,
        attached: oneshot::Receiver<()>,
    },
}

impl PendingWriter {
    /// Wait for a reader, then return the writable end. Fails with
    /// `BrokenPipe` if the handoff is released first.
    pub async fn attach(self) -> io::Result<EntryWriter> {
        match self {
            PendingWriter::Fifo { path, cancelled } => open_fifo_writer(&path, cancelled).await,
            PendingWriter::Memory { pipe, attached } => {
                attached.await.map_err(|_| removed_before_attach())?;
                Ok(Box::new(pipe))
            }
        }
    }
}

fn removed_before_attach() -> io::Error {
    io::Error::new(
        io::ErrorKind::BrokenPipe,
        "stream removed before a reader attached",
    )
}

pub struct StreamHandoff {
    backend: StreamBackend,
    pending: DashMap<PathBuf, Registration>,
    next_ticket: AtomicU64,
}

impl StreamHandoff {
    pub fn new(backend: StreamBackend) -> Self {
        Self {
            backend,
            pending: DashMap::new(),
            next_ticket: AtomicU64::new(1),
        }
    }

    pub fn backend(&self) -> StreamBackend {
        self.backend
    }

    /// Create the handoff object at `path`. The path must not exist.
    pub async fn create(&self, path: &Path) -> io::Result<PendingWriter> {
        let ticket = StreamTicket(self.next_ticket.fetch_add(1, Ordering::Relaxed));
        match self.backend {
            StreamBackend::Fifo => {
                make_fifo(path)?;
                let (tx, rx) = oneshot::channel();
                self.pending.insert(
                    path.to_path_buf(),
                    Registration {
                        ticket,
                        state: PendingState::Fifo {
                            _cancel: tx,
                            claimed: false,
                        },
                    },
                );
                Ok(PendingWriter::Fifo {
                    path: path.to_path_buf(),
                    cancelled: rx,
                })
            }
            StreamBackend::Memory => {
                tokio::fs::File::create(path).await?;
                let (writer, reader) = tokio::io::duplex(PIPE_BUFFER);
                let (tx, rx) = oneshot::channel();
                self.pending.insert(
                    path.to_path_buf(),
                    Registration {
                        ticket,
                        state: PendingState::Waiting {
                            pipe: reader,
                            attached: tx,
                        },
                    },
                );
                Ok(PendingWriter::Memory {
                    pipe: writer,
                    attached: rx,
                })
            }
        }
    }

    /// Whether the file at `path` is the handoff object of a streamed entry.
    pub fn is_stream(&self, path: &Path, file_type: &std::fs::FileType) -> bool {
        is_fifo(file_type) || self.pending.contains_key(path)
    }

    /// Attach as the reader. `None` means another reader got there first,
    /// or nothing in this process will ever write to the path.
    pub async fn open_reader(&self, path: &Path) -> io::Result<Option<(EntryReader, StreamTicket)>> {
        let ticket = {
            let Some(mut registration) = self.pending.get_mut(path) else {
                return Ok(None);
            };
            let ticket = registration.ticket;
            match &mut registration.state {
                PendingState::Fifo { claimed, .. } => {
                    if *claimed {
                        return Ok(None);
                    }
                    *claimed = true;
                    ticket
                }
                state => {
                    return Ok(match std::mem::replace(state, PendingState::Draining) {
                        PendingState::Waiting { pipe, attached } => {
                            // a dropped writer shows up as EOF on the pipe
                            let _ = attached.send(());
                            Some((Box::new(pipe) as EntryReader, ticket))
                        }
                        _ => None,
                    });
                }
            }
        };

        // open(2) on a FIFO blocks until the writer side is opened
        match tokio::fs::File::open(path).await {
            Ok(file) => Ok(Some((Box::new(file), ticket))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Drop the registration behind `ticket`. False if the path has since
    /// been released or handed to a newer stream.
    pub fn finish(&self, path: &Path, ticket: StreamTicket) -> bool {
        self.pending
            .remove_if(path, |_, registration| registration.ticket == ticket)
            .is_some()
    }

    /// Forget any handoff registered at `path`. A writer still waiting for
    /// a reader fails with a broken pipe, and a reader blocked opening the
    /// FIFO sees end of stream.
    pub fn release(&self, path: &Path) {
        if let Some((_, registration)) = self.pending.remove(path) {
            if matches!(registration.state, PendingState::Fifo { .. }) {
                wake_fifo_reader(path);
            }
        }
    }

    /// Paths of every registered handoff.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.pending.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[cfg(unix)]
async fn open_fifo_writer(
    path: &Path,
    mut cancelled: oneshot::Receiver<()>,
) -> io::Result<EntryWriter> {
    use nix::errno::Errno;
    use tokio::net::unix::pipe;
    use tokio::sync::oneshot::error::TryRecvError;

    loop {
        match pipe::OpenOptions::new().open_sender(path) {
            Ok(sender) => return Ok(Box::new(sender)),
            // the path may already belong to a replacement entry
            Err(_) if matches!(cancelled.try_recv(), Err(TryRecvError::Closed)) => {
                return Err(removed_before_attach())
            }
            // no reader yet
            Err(e) if e.raw_os_error() == Some(Errno::ENXIO as i32) => {}
            Err(e) => return Err(e),
        }
        tokio::select! {
            _ = &mut cancelled => return Err(removed_before_attach()),
            _ = tokio::time::sleep(FIFO_ATTACH_POLL) => {}
        }
    }
}

#[cfg(not(unix))]
async fn open_fifo_writer(
    _path: &Path,
    _cancelled: oneshot::Receiver<()>,
) -> io::Result<EntryWriter> {
    Err(fifo_unsupported())
}

#[cfg(unix)]
fn wake_fifo_reader(path: &Path) {
    use std::os::unix::fs::OpenOptionsExt;

    use nix::fcntl::OFlag;

    // succeeds only if a reader is blocked in open(2); closing right away
    // hands it an empty stream
    let _ = std::fs::OpenOptions::new()
        .write(true)
        .custom_flags(OFlag::O_NONBLOCK.bits())
        .open(path);
}

#[cfg(not(unix))]
fn wake_fifo_reader(_path: &Path) {}

#[cfg(unix)]
fn make_fifo(path: &Path) -> io::Result<()> {
    use nix::sys::stat::Mode;

    nix::unistd::mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn make_fifo(_path: &Path) -> io::Result<()> {
    Err(fifo_unsupported())
}

#[cfg(not(unix))]
fn fifo_unsupported() -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        "named pipes are not available on this platform",
    )
}

#[cfg(unix)]
fn is_fifo(file_type: &std::fs::FileType) -> bool {
    use std::os::unix::fs::FileTypeExt;

    file_type.is_fifo()
}

#[cfg(not(unix))]
fn is_fifo(_file_type: &std::fs::FileType) -> bool {
    false
}
