//! Retrieval URLs handed back to uploaders.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::http::request::QUERY_AUTH;
use crate::security::auth::unix_now;
use crate::security::key::{sign_request, Key};

/// Builds `<server_addr>/<id>`, signed for a credential-less reader when
/// the server is protected.
#[derive(Debug, Clone)]
pub struct ClipUrlBuilder {
    server_addr: String,
    key: Option<Key>,
}

impl ClipUrlBuilder {
    pub fn new(server_addr: impl Into<String>, key: Option<Key>) -> Self {
        Self {
            server_addr: server_addr.into().trim_end_matches('/').to_string(),
            key,
        }
    }

    pub fn server_addr(&self) -> &str {
        &self.server_addr
    }

    /// URL for `id`. A signature is valid for `ttl`.
    pub fn build(&self, id: &str, ttl: Duration) -> String {
        self.build_at(id, ttl, unix_now())
    }

    fn build_at(&self, id: &str, ttl: Duration, now: i64) -> String {
        let url = format!("{}/{}", self.server_addr, id);
        let Some(key) = &self.key else {
            return url;
        };
        let auth = sign_request(key, "GET", &format!("/{}", id), ttl, now);
        let encoded: String =
            url::form_urlencoded::byte_serialize(STANDARD.encode(auth).as_bytes()).collect();
        format!("{}?{}={}", url, QUERY_AUTH, encoded)
    }
}
