//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::entry::Mode;

/// Default port used when no listener is configured explicitly.
pub const DEFAULT_PORT: u16 = 2586;

/// Root configuration for the clipboard server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind addresses, TLS, external address).
    pub listener: ListenerConfig,

    /// Shared-secret settings. Absent key means an open server.
    pub auth: AuthConfig,

    /// Storage directory and capacity ceilings.
    pub storage: StorageConfig,

    /// Per-client rate and put-count limits.
    pub visitors: VisitorConfig,

    /// Background sweep settings.
    pub janitor: JanitorConfig,

    /// Web root and static assets.
    pub web: WebConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Plain HTTP bind address (e.g., "0.0.0.0:2586").
    pub http: Option<String>,

    /// HTTPS bind address. Requires `tls`.
    pub https: Option<String>,

    /// Externally reachable base address used in retrieval URLs.
    pub server_addr: Option<String>,

    /// Certificate and key for the HTTPS listener.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            http: Some(format!("0.0.0.0:{}", DEFAULT_PORT)),
            https: None,
            server_addr: None,
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,
}

/// Shared-secret configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Derived key in `<base64 salt>:<base64 key>` form.
    pub key: Option<String>,

    /// Replay window for signed requests that carry a zero TTL.
    pub max_request_age_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            key: None,
            max_request_age_secs: 60,
        }
    }
}

/// Which blocking handoff primitive backs streamed entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamBackend {
    /// Named pipe in the storage directory.
    Fifo,
    /// In-process pipe plus placeholder file.
    Memory,
}

impl Default for StreamBackend {
    fn default() -> Self {
        if cfg!(unix) {
            StreamBackend::Fifo
        } else {
            StreamBackend::Memory
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding entries and their metadata files.
    pub dir: PathBuf,

    /// Aggregate size cap across all entries in bytes (0 = unlimited).
    pub size_limit: u64,

    /// Maximum number of entries (0 = unlimited).
    pub count_limit: u64,

    /// Per-upload size cap in bytes (0 = unlimited).
    pub file_size_limit: u64,

    /// Default and maximum entry lifetime in seconds (0 = never expire).
    pub file_expire_after_secs: u64,

    /// Modes a client may request. The first one is the default.
    pub modes_allowed: Vec<Mode>,

    /// Handoff primitive for streamed entries.
    pub stream_backend: StreamBackend,
}

impl StorageConfig {
    pub fn file_expire_after(&self) -> Duration {
        Duration::from_secs(self.file_expire_after_secs)
    }

    pub fn default_mode(&self) -> Mode {
        self.modes_allowed.first().copied().unwrap_or(Mode::ReadWrite)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/var/cache/clipshare"),
            size_limit: 100 * 1024 * 1024,
            count_limit: 100,
            file_size_limit: 10 * 1024 * 1024,
            file_expire_after_secs: 7 * 24 * 60 * 60,
            modes_allowed: vec![Mode::ReadWrite, Mode::ReadOnly],
            stream_backend: StreamBackend::default(),
        }
    }
}

/// Per-visitor limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VisitorConfig {
    /// Token bucket refill rate.
    pub requests_per_second: f64,

    /// Token bucket capacity.
    pub burst: u32,

    /// Overwrites of existing entries allowed per visitor (0 = unlimited).
    pub put_limit: u64,

    /// Idle time after which a visitor is forgotten.
    pub expunge_after_secs: u64,
}

impl VisitorConfig {
    pub fn expunge_after(&self) -> Duration {
        Duration::from_secs(self.expunge_after_secs)
    }
}

impl Default for VisitorConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 2.0,
            burst: 5,
            put_limit: 10,
            expunge_after_secs: 180,
        }
    }
}

/// Janitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JanitorConfig {
    /// Sweep interval in seconds.
    pub interval_secs: u64,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

/// Web root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebConfig {
    /// Serve the usage page to browsers and the static asset route.
    pub enabled: bool,

    /// Directory served under `/static/`.
    pub static_dir: Option<PathBuf>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            static_dir: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

impl ServerConfig {
    /// External base URL, with a scheme, used in retrieval URLs and `/info`.
    pub fn server_addr(&self) -> String {
        let https = self.listener.https.is_some();
        let raw = match &self.listener.server_addr {
            Some(addr) => addr.clone(),
            None => {
                let listen = self
                    .listener
                    .https
                    .as_ref()
                    .or(self.listener.http.as_ref())
                    .cloned()
                    .unwrap_or_else(|| format!(":{}", DEFAULT_PORT));
                let port = listen.rsplit(':').next().unwrap_or_default();
                format!("localhost:{}", port)
            }
        };
        let raw = raw.trim_end_matches('/');
        if raw.contains("://") {
            raw.to_string()
        } else if https {
            format!("https://{}", raw)
        } else {
            format!("http://{}", raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.http.as_deref(), Some("0.0.0.0:2586"));
        assert!(config.auth.key.is_none());
        assert_eq!(config.storage.modes_allowed, vec![Mode::ReadWrite, Mode::ReadOnly]);
        assert_eq!(config.visitors.burst, 5);
        assert_eq!(config.janitor.interval_secs, 30);
    }

    #[test]
    fn test_parse_sections() {
        let config: ServerConfig = toml::from_str(
            r#"
            [listener]
            http = "127.0.0.1:9000"
            server_addr = "clip.example.com:9000"

            [storage]
            dir = "/tmp/clips"
            count_limit = 3
            modes_allowed = ["ro"]
            stream_backend = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.count_limit, 3);
        assert_eq!(config.storage.default_mode(), Mode::ReadOnly);
        assert_eq!(config.storage.stream_backend, StreamBackend::Memory);
        assert_eq!(config.server_addr(), "http://clip.example.com:9000");
    }

    #[test]
    fn test_server_addr_from_listener() {
        let mut config = ServerConfig::default();
        assert_eq!(config.server_addr(), "http://localhost:2586");

        config.listener.https = Some("0.0.0.0:8443".into());
        assert_eq!(config.server_addr(), "https://localhost:8443");

        config.listener.server_addr = Some("http://10.0.0.1:1234/".into());
        assert_eq!(config.server_addr(), "http://10.0.0.1:1234");
    }
}
