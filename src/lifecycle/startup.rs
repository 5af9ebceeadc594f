//! Startup checks.
//!
//! Every failure here is fatal: the server refuses to serve rather than
//! accept uploads it cannot store.

use std::path::Path;

use crate::error::StartupError;

/// Create the storage directory if needed and make sure it is writable.
pub fn prepare_storage_dir(dir: &Path) -> Result<(), StartupError> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        tracing::error!(dir = %dir.display(), error = %e, "Cannot create storage directory");
        return Err(StartupError::StorageNotWritable(dir.to_path_buf()));
    }
    if !is_writable(dir) {
        return Err(StartupError::StorageNotWritable(dir.to_path_buf()));
    }
    tracing::info!(dir = %dir.display(), "Storage directory ready");
    Ok(())
}

#[cfg(unix)]
fn is_writable(dir: &Path) -> bool {
    use nix::unistd::{access, AccessFlags};

    access(dir, AccessFlags::W_OK | AccessFlags::X_OK).is_ok()
}

#[cfg(not(unix))]
fn is_writable(dir: &Path) -> bool {
    std::fs::metadata(dir)
        .map(|m| m.is_dir() && !m.permissions().readonly())
        .unwrap_or(false)
}
