//! TLS configuration and certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

use crate::error::StartupError;

/// Check that `cert_path` holds at least one certificate and `key_path` a
/// private key, both PEM encoded.
pub fn validate_pem(cert_path: &Path, key_path: &Path) -> Result<(), StartupError> {
    let mut certs = open(cert_path)?;
    let found = rustls_pemfile::certs(&mut certs)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StartupError::Tls(format!("{}: {}", cert_path.display(), e)))?;
    if found.is_empty() {
        return Err(StartupError::Tls(format!(
            "{}: no certificate found",
            cert_path.display()
        )));
    }

    let mut key = open(key_path)?;
    match rustls_pemfile::private_key(&mut key) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(StartupError::Tls(format!(
            "{}: no private key found",
            key_path.display()
        ))),
        Err(e) => Err(StartupError::Tls(format!("{}: {}", key_path.display(), e))),
    }
}

fn open(path: &Path) -> Result<BufReader<File>, StartupError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| StartupError::Tls(format!("{}: {}", path.display(), e)))
}

/// Load TLS configuration from certificate and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, StartupError> {
    validate_pem(cert_path, key_path)?;
    RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(|e| StartupError::Tls(e.to_string()))
}
