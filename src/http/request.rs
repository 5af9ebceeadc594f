//! Request option extraction and request IDs.
//!
//! Every option can come from a header or, for clients that cannot set
//! headers, from a short query parameter:
//!
//! | option  | header            | query    |
//! |---------|-------------------|----------|
//! | stream  | `X-Stream: yes`   | `s=1`    |
//! | format  | `X-Format: json`  | `f=json` |
//! | mode    | `X-Mode: ro`      | `m=ro`   |
//! | ttl     | `X-TTL: 2h`       | `t=2h`   |
//! | auth    | `Authorization`   | `a=<base64 Authorization value>` |
//!
//! The mode header wins over its query parameter; for the ttl the query
//! parameter wins.

use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::error::ClipError;
use crate::store::ttl::parse_duration;
use crate::store::WriteOptions;

pub const HEADER_STREAM: &str = "x-stream";
pub const HEADER_FORMAT: &str = "x-format";
pub const HEADER_MODE: &str = "x-mode";
pub const HEADER_TTL: &str = "x-ttl";
pub const HEADER_URL: &str = "x-url";
pub const HEADER_EXPIRES: &str = "x-expires";
pub const HEADER_REQUEST_ID: &str = "x-request-id";

pub const QUERY_AUTH: &str = "a";
const QUERY_STREAM: &str = "s";
const QUERY_FORMAT: &str = "f";
const QUERY_MODE: &str = "m";
const QUERY_TTL: &str = "t";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Client options of a single request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub stream: bool,
    pub format: OutputFormat,
    pub mode: Option<String>,
    pub ttl: Option<Duration>,
}

impl RequestOptions {
    pub fn parse(headers: &HeaderMap, query: Option<&str>) -> Result<Self, ClipError> {
        let mut options = RequestOptions::default();
        let mut query_mode = None;
        let mut query_ttl = None;

        for (name, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            match name.as_ref() {
                QUERY_STREAM if value == "1" => options.stream = true,
                QUERY_FORMAT if value == "json" => options.format = OutputFormat::Json,
                QUERY_MODE if !value.is_empty() => query_mode = Some(value.into_owned()),
                QUERY_TTL if !value.is_empty() => query_ttl = Some(value.into_owned()),
                _ => {}
            }
        }

        if header(headers, HEADER_STREAM) == Some("yes") {
            options.stream = true;
        }
        if header(headers, HEADER_FORMAT) == Some("json") {
            options.format = OutputFormat::Json;
        }

        options.mode = header(headers, HEADER_MODE)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .or(query_mode);

        let ttl = query_ttl.or_else(|| {
            header(headers, HEADER_TTL)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        });
        options.ttl = ttl.as_deref().map(parse_duration).transpose()?;

        Ok(options)
    }

    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            mode: self.mode.clone(),
            ttl: self.ttl,
            stream: self.stream,
        }
    }
}

/// Base64-encoded Authorization value passed as `a=`. Present but empty
/// still counts, so it can never silently fall back to the header.
pub fn query_auth(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(name, _)| name == QUERY_AUTH)
        .map(|(_, value)| value.into_owned())
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// UUID v4 request IDs for `SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

pub fn request_id_header() -> HeaderName {
    HeaderName::from_static(HEADER_REQUEST_ID)
}
