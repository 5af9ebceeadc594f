//! Entry storage.
//!
//! # Layout
//! ```text
//! <dir>/<id>        content (regular file, FIFO, or stream placeholder)
//! <dir>/<id>:meta   {"mode":"rw","expires":1700000000}
//! ```
//!
//! - entry.rs: identifiers, modes, metadata and path resolution
//! - ttl.rs: lifetime parsing and clamping
//! - handoff.rs: blocking single-reader handoff for streamed entries
//! - copy.rs: size-capped body copy
//! - clipboard.rs: the store itself

pub mod clipboard;
pub mod copy;
pub mod entry;
pub mod handoff;
pub mod ttl;

pub use clipboard::{ClipboardStore, EntryRead, PreparedWrite, WriteOptions};
pub use entry::{EntryPaths, Metadata, Mode};
