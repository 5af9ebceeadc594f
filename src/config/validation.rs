//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - At least one listener, TLS material for HTTPS
//! - Parseable shared key and non-empty mode list
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::security::key::Key;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listen address missing, set listener.http or listener.https")]
    ListenAddrMissing,

    #[error("invalid listen address {0:?}")]
    InvalidListenAddr(String),

    #[error("listener.https requires listener.tls with cert_path and key_path")]
    TlsMissing,

    #[error("auth.key is not a valid <salt>:<key> pair")]
    InvalidKey,

    #[error("storage.modes_allowed must not be empty")]
    NoModesAllowed,

    #[error("janitor.interval_secs must be greater than zero")]
    ZeroJanitorInterval,

    #[error("visitors.requests_per_second must be positive")]
    InvalidRate,
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.http.is_none() && config.listener.https.is_none() {
        errors.push(ValidationError::ListenAddrMissing);
    }
    for addr in [&config.listener.http, &config.listener.https]
        .into_iter()
        .flatten()
    {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidListenAddr(addr.clone()));
        }
    }
    if config.listener.https.is_some() && config.listener.tls.is_none() {
        errors.push(ValidationError::TlsMissing);
    }

    if let Some(key) = &config.auth.key {
        if key.parse::<Key>().is_err() {
            errors.push(ValidationError::InvalidKey);
        }
    }

    if config.storage.modes_allowed.is_empty() {
        errors.push(ValidationError::NoModesAllowed);
    }
    if config.janitor.interval_secs == 0 {
        errors.push(ValidationError::ZeroJanitorInterval);
    }
    let rate = config.visitors.requests_per_second;
    if rate.is_nan() || rate <= 0.0 {
        errors.push(ValidationError::InvalidRate);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(validate_config(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ServerConfig::default();
        config.listener.http = None;
        config.auth.key = Some("garbage".into());
        config.storage.modes_allowed.clear();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::ListenAddrMissing,
                ValidationError::InvalidKey,
                ValidationError::NoModesAllowed,
            ]
        );
    }

    #[test]
    fn test_https_requires_tls() {
        let mut config = ServerConfig::default();
        config.listener.https = Some("0.0.0.0:2587".into());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::TlsMissing]);
    }

    #[test]
    fn test_bad_listen_addr() {
        let mut config = ServerConfig::default();
        config.listener.http = Some("not-an-addr".into());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::InvalidListenAddr("not-an-addr".into())]);
    }
}
