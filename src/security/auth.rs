//! Request authorization against the shared secret.
//!
//! Two credential shapes are accepted, both carried in the `Authorization`
//! header or, base64-encoded, in the `a` query parameter:
//!
//! ```text
//! HMAC <unix timestamp> <ttl secs> <base64 hmac-sha256("<ts>:<ttl>:<METHOD>:<path>")>
//! Basic <base64 "user:password">
//! ```
//!
//! The signature binds method and path, and its age is bounded by the ttl it
//! carries (or the configured default when the ttl is zero).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::Mac;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::security::key::{derive_key, signed_payload, Key};

/// Why a request was not authorized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("authorization missing")]
    Missing,

    #[error("cannot decode query auth override")]
    QueryEncoding,

    #[error("unrecognized authorization scheme")]
    UnknownScheme,

    #[error("malformed hmac authorization")]
    MalformedHmac,

    #[error("hmac signature invalid")]
    InvalidSignature,

    #[error("hmac request age exceeds {0:?}")]
    Expired(Duration),

    #[error("malformed basic authorization")]
    MalformedBasic,

    #[error("password invalid")]
    InvalidPassword,
}

/// Authorization inputs extracted from a request.
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub header: Option<&'a str>,
    pub query: Option<&'a str>,
}

/// Validates credentials against the configured key. No key means every
/// request is authorized.
#[derive(Debug, Clone)]
pub struct AuthGuard {
    key: Option<Key>,
    default_max_age: Duration,
}

impl AuthGuard {
    pub fn new(key: Option<Key>, default_max_age: Duration) -> Self {
        Self {
            key,
            default_max_age,
        }
    }

    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn is_protected(&self) -> bool {
        self.key.is_some()
    }

    pub fn authorize(&self, credentials: Credentials<'_>) -> Result<(), AuthError> {
        self.authorize_at(credentials, unix_now())
    }

    pub(crate) fn authorize_at(&self, credentials: Credentials<'_>, now: i64) -> Result<(), AuthError> {
        let Some(key) = &self.key else {
            return Ok(());
        };

        let decoded;
        let value = match credentials.query {
            Some(encoded) => {
                let bytes = STANDARD.decode(encoded).map_err(|_| AuthError::QueryEncoding)?;
                decoded = String::from_utf8(bytes).map_err(|_| AuthError::QueryEncoding)?;
                decoded.as_str()
            }
            None => credentials.header.ok_or(AuthError::Missing)?,
        };

        if let Some(rest) = value.strip_prefix("HMAC ") {
            self.authorize_hmac(key, rest, credentials, now)
        } else if let Some(rest) = value.strip_prefix("Basic ") {
            authorize_basic(key, rest)
        } else {
            Err(AuthError::UnknownScheme)
        }
    }

    fn authorize_hmac(
        &self,
        key: &Key,
        value: &str,
        credentials: Credentials<'_>,
        now: i64,
    ) -> Result<(), AuthError> {
        let mut fields = value.splitn(3, ' ');
        let (Some(timestamp), Some(ttl), Some(signature)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(AuthError::MalformedHmac);
        };
        if !is_digits(timestamp) || !is_digits(ttl) || signature.is_empty() {
            return Err(AuthError::MalformedHmac);
        }
        let timestamp: i64 = timestamp.parse().map_err(|_| AuthError::MalformedHmac)?;
        let ttl_secs: u64 = ttl.parse().map_err(|_| AuthError::MalformedHmac)?;
        let signature = STANDARD.decode(signature).map_err(|_| AuthError::MalformedHmac)?;

        let mut mac = key.mac();
        mac.update(signed_payload(timestamp, ttl_secs, credentials.method, credentials.path).as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::InvalidSignature)?;

        let max_age = if ttl_secs > 0 {
            Duration::from_secs(ttl_secs)
        } else {
            self.default_max_age
        };
        if !max_age.is_zero() {
            let age = now.saturating_sub(timestamp);
            if age > 0 && age as u64 > max_age.as_secs() {
                return Err(AuthError::Expired(max_age));
            }
        }
        Ok(())
    }
}

fn authorize_basic(key: &Key, value: &str) -> Result<(), AuthError> {
    let value = value.trim();
    if value.is_empty() || value.contains(char::is_whitespace) {
        return Err(AuthError::MalformedBasic);
    }
    let decoded = STANDARD.decode(value).map_err(|_| AuthError::MalformedBasic)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AuthError::MalformedBasic)?;
    // username is ignored
    let (_, password) = decoded.split_once(':').ok_or(AuthError::MalformedBasic)?;

    let derived = derive_key(password.as_bytes(), &key.salt);
    if bool::from(derived.bytes[..].ct_eq(&key.bytes[..])) {
        Ok(())
    } else {
        Err(AuthError::InvalidPassword)
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
