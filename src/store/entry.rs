//! Entry identifiers, modes and metadata side-files.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ClipError;

/// Suffix of the metadata file stored next to each entry.
pub const META_SUFFIX: &str = ":meta";

/// Names that would shadow server routes.
pub const RESERVED_IDS: &[&str] = &[
    "help",
    "version",
    "info",
    "verify",
    "static",
    "robots.txt",
    "favicon.ico",
];

const MIN_ID_LEN: usize = 2;
const MAX_ID_LEN: usize = 101;
const RANDOM_ID_LEN: usize = 10;
const RANDOM_ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// True if `id` has the shape `[a-zA-Z0-9][-_.a-zA-Z0-9]{1,100}`.
pub fn is_valid_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    if bytes.len() < MIN_ID_LEN || bytes.len() > MAX_ID_LEN {
        return false;
    }
    bytes[0].is_ascii_alphanumeric()
        && bytes[1..]
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

pub fn is_reserved(id: &str) -> bool {
    RESERVED_IDS.iter().any(|r| r.eq_ignore_ascii_case(id))
}

/// Random lowercase identifier for anonymous uploads.
pub fn random_id() -> String {
    let mut rng = rand::thread_rng();
    (0..RANDOM_ID_LEN)
        .map(|_| RANDOM_ID_CHARSET[rng.gen_range(0..RANDOM_ID_CHARSET.len())] as char)
        .collect()
}

/// Whether an entry may be overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "rw")]
    ReadWrite,
    #[serde(rename = "ro")]
    ReadOnly,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::ReadWrite => "rw",
            Mode::ReadOnly => "ro",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ClipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rw" => Ok(Mode::ReadWrite),
            "ro" => Ok(Mode::ReadOnly),
            _ => Err(ClipError::BadRequest("unknown mode")),
        }
    }
}

/// Contents of a `<id>:meta` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub mode: Mode,
    /// Absolute expiry in unix seconds, 0 = never.
    pub expires: i64,
}

impl Metadata {
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires > 0 && now > self.expires
    }
}

/// Content and metadata locations of a validated identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPaths {
    pub id: String,
    pub content: PathBuf,
    pub meta: PathBuf,
}

impl EntryPaths {
    /// Resolve `id` inside `dir`. Rejects malformed and reserved identifiers
    /// before anything touches the filesystem.
    pub fn resolve(dir: &Path, id: &str) -> Result<Self, ClipError> {
        if !is_valid_id(id) || is_reserved(id) {
            return Err(ClipError::InvalidId(id.to_string()));
        }
        Ok(Self::in_dir(dir, id))
    }

    fn in_dir(dir: &Path, name: &str) -> Self {
        Self {
            id: name.to_string(),
            content: dir.join(name),
            meta: dir.join(format!("{}{}", name, META_SUFFIX)),
        }
    }

    /// Paths for a directory entry found during a sweep. Metadata files
    /// yield `None`.
    pub fn from_dir_entry(dir: &Path, name: &str) -> Option<Self> {
        if name.ends_with(META_SUFFIX) {
            return None;
        }
        Some(Self::in_dir(dir, name))
    }
}

/// Decide expiry from metadata, or from the file age when metadata is
/// missing or unreadable.
pub fn is_expired(
    metadata: Option<&Metadata>,
    modified: Option<SystemTime>,
    max_age: Duration,
    now: SystemTime,
) -> bool {
    if let Some(metadata) = metadata {
        return metadata.is_expired_at(unix_secs(now));
    }
    if max_age.is_zero() {
        return false;
    }
    match modified {
        Some(modified) => now.duration_since(modified).unwrap_or_default() > max_age,
        None => false,
    }
}

pub fn unix_secs(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        let longest = "a".repeat(101);
        let too_long = "a".repeat(102);
        for id in ["ab", "abc123", "A-b_c.d", "0x", longest.as_str()] {
            assert!(is_valid_id(id), "{}", id);
        }
        for id in ["", "a", "-ab", ".ab", "a/b", "a b", "ab:meta", "../etc", too_long.as_str()] {
            assert!(!is_valid_id(id), "{}", id);
        }
    }

    #[test]
    fn test_reserved_ids() {
        assert!(is_reserved("info"));
        assert!(is_reserved("INFO"));
        assert!(is_reserved("favicon.ico"));
        assert!(!is_reserved("information"));

        let dir = Path::new("/clips");
        assert!(matches!(
            EntryPaths::resolve(dir, "verify"),
            Err(ClipError::InvalidId(_))
        ));
        let paths = EntryPaths::resolve(dir, "abc123").unwrap();
        assert_eq!(paths.content, Path::new("/clips/abc123"));
        assert_eq!(paths.meta, Path::new("/clips/abc123:meta"));
    }

    #[test]
    fn test_random_id_is_valid() {
        for _ in 0..100 {
            let id = random_id();
            assert_eq!(id.len(), RANDOM_ID_LEN);
            assert!(is_valid_id(&id));
            assert!(!is_reserved(&id));
        }
    }

    #[test]
    fn test_metadata_json() {
        let meta = Metadata {
            mode: Mode::ReadOnly,
            expires: 1234,
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(json, r#"{"mode":"ro","expires":1234}"#);
        let parsed: Metadata = serde_json::from_str(r#"{"mode":"rw","expires":0}"#).unwrap();
        assert_eq!(parsed.mode, Mode::ReadWrite);
        assert_eq!(parsed.expires, 0);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("rw".parse::<Mode>().unwrap(), Mode::ReadWrite);
        assert_eq!("ro".parse::<Mode>().unwrap(), Mode::ReadOnly);
        assert!("rx".parse::<Mode>().is_err());
    }

    #[test]
    fn test_expiry_rules() {
        let now = UNIX_EPOCH + Duration::from_secs(10_000);
        let week = Duration::from_secs(7 * 86400);

        let never = Metadata { mode: Mode::ReadWrite, expires: 0 };
        assert!(!is_expired(Some(&never), Some(UNIX_EPOCH), week, now));

        let past = Metadata { mode: Mode::ReadWrite, expires: 9_999 };
        assert!(is_expired(Some(&past), None, Duration::ZERO, now));

        let future = Metadata { mode: Mode::ReadWrite, expires: 10_001 };
        assert!(!is_expired(Some(&future), None, Duration::ZERO, now));

        // without metadata, fall back to modification time
        let old = now - Duration::from_secs(100);
        assert!(is_expired(None, Some(old), Duration::from_secs(50), now));
        assert!(!is_expired(None, Some(old), Duration::from_secs(500), now));
        assert!(!is_expired(None, Some(old), Duration::ZERO, now));
    }
}
