//! Shared-secret key material.
//!
//! The server never stores the password. It keeps a random salt and the
//! PBKDF2-HMAC-SHA256 key derived from it; clients either derive the same
//! key and sign requests with it, or send the password over Basic auth.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

pub type HmacSha256 = Hmac<Sha256>;

/// PBKDF2 iteration count.
pub const KEY_DERIVATION_ITERATIONS: u32 = 10_000;

/// Derived key length in bytes.
pub const KEY_LEN: usize = 32;

/// Salt length for freshly generated keys.
pub const SALT_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("key must be <base64 salt>:<base64 key>")]
pub struct InvalidKey;

/// Salt plus the key derived from the shared password.
#[derive(Clone, PartialEq, Eq)]
pub struct Key {
    pub salt: Vec<u8>,
    pub bytes: [u8; KEY_LEN],
}

impl Key {
    /// Derive a key for `password` with a fresh random salt.
    pub fn generate(password: &[u8]) -> Self {
        let mut salt = vec![0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        derive_key(password, &salt)
    }

    /// `<base64 salt>:<base64 key>`, the form accepted by `auth.key`.
    pub fn encode(&self) -> String {
        format!("{}:{}", STANDARD.encode(&self.salt), STANDARD.encode(&self.bytes))
    }

    /// HMAC-SHA256 keyed by this key.
    pub fn mac(&self) -> HmacSha256 {
        // HMAC zero-pads keys shorter than the block size, so the padded
        // block keys the same MAC as the raw bytes
        let mut block = hmac::digest::Key::<HmacSha256>::default();
        block[..KEY_LEN].copy_from_slice(&self.bytes);
        HmacSha256::new(&block)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("salt", &STANDARD.encode(&self.salt))
            .field("bytes", &"<redacted>")
            .finish()
    }
}

impl FromStr for Key {
    type Err = InvalidKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (salt, bytes) = s.trim().split_once(':').ok_or(InvalidKey)?;
        let salt = STANDARD.decode(salt).map_err(|_| InvalidKey)?;
        let bytes = STANDARD.decode(bytes).map_err(|_| InvalidKey)?;
        if salt.is_empty() {
            return Err(InvalidKey);
        }
        let bytes = <[u8; KEY_LEN]>::try_from(bytes.as_slice()).map_err(|_| InvalidKey)?;
        Ok(Self { salt, bytes })
    }
}

/// PBKDF2-HMAC-SHA256 with the server's iteration count and key length.
pub fn derive_key(password: &[u8], salt: &[u8]) -> Key {
    let mut bytes = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, KEY_DERIVATION_ITERATIONS, &mut bytes);
    Key {
        salt: salt.to_vec(),
        bytes,
    }
}

/// The string covered by a request signature.
pub fn signed_payload(timestamp: i64, ttl_secs: u64, method: &str, path: &str) -> String {
    format!("{}:{}:{}:{}", timestamp, ttl_secs, method, path)
}

/// Build an `HMAC <timestamp> <ttl> <signature>` Authorization value.
pub fn sign_request(key: &Key, method: &str, path: &str, ttl: Duration, timestamp: i64) -> String {
    let ttl_secs = ttl.as_secs();
    let mut mac = key.mac();
    mac.update(signed_payload(timestamp, ttl_secs, method, path).as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());
    format!("HMAC {} {} {}", timestamp, ttl_secs, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_deterministic() {
        let a = derive_key(b"hunter2", b"saltsalt");
        let b = derive_key(b"hunter2", b"saltsalt");
        assert_eq!(a, b);
        assert_eq!(a.bytes.len(), KEY_LEN);
        assert_ne!(a, derive_key(b"hunter3", b"saltsalt"));
        assert_ne!(a, derive_key(b"hunter2", b"pepper"));
    }

    #[test]
    fn test_encode_parse() {
        let key = Key::generate(b"secret");
        assert_eq!(key.salt.len(), SALT_LEN);
        let parsed: Key = key.encode().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!("nocolon".parse::<Key>(), Err(InvalidKey));
        assert_eq!("!!:??".parse::<Key>(), Err(InvalidKey));
        // key too short
        assert_eq!("c2FsdA==:a2V5".parse::<Key>(), Err(InvalidKey));
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = derive_key(b"pw", b"salt");
        let printed = format!("{:?}", key);
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains(&STANDARD.encode(&key.bytes)));
    }

    #[test]
    fn test_mac_matches_raw_key() {
        let key = derive_key(b"pw", b"salt");
        let mut padded = key.mac();
        padded.update(b"payload");
        let mut raw = HmacSha256::new_from_slice(&key.bytes).unwrap();
        raw.update(b"payload");
        assert_eq!(padded.finalize().into_bytes(), raw.finalize().into_bytes());
    }

    #[test]
    fn test_sign_request_format() {
        let key = derive_key(b"pw", b"salt");
        let value = sign_request(&key, "GET", "/abc", Duration::from_secs(30), 1_700_000_000);
        let parts: Vec<_> = value.split(' ').collect();
        assert_eq!(parts[0], "HMAC");
        assert_eq!(parts[1], "1700000000");
        assert_eq!(parts[2], "30");
        assert_eq!(STANDARD.decode(parts[3]).unwrap().len(), 32);
    }
}
