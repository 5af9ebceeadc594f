//! TCP listener binding.

use tokio::net::TcpListener;

use crate::error::StartupError;

/// Bind a plain TCP listener, reporting the address on failure.
pub async fn bind(addr: &str) -> Result<TcpListener, StartupError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    if let Ok(local) = listener.local_addr() {
        tracing::info!(address = %local, "Listening for connections");
    }
    Ok(listener)
}
