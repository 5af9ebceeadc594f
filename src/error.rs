//! Error taxonomy.
//!
//! Per-request failures are [`ClipError`] values. Each carries an explicit
//! [`ErrorKind`] discriminant and maps to exactly one status code; the
//! dispatcher logs the cause and only the canonical reason phrase is sent
//! back to the client.

use std::path::PathBuf;

use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::config::validation::ValidationError;
use crate::security::auth::AuthError;

/// Coarse classification of a request failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input or a forbidden operation. Never worth retrying.
    Client,
    /// Credentials missing or rejected.
    Unauthorized,
    /// A rate, count or size cap was hit. The client may retry later.
    Capacity,
    /// Entry or route does not exist.
    NotFound,
    /// The peer went away mid-transfer.
    Transport,
    /// Local filesystem or encoding fault.
    Io,
}

/// Error returned by request handlers.
#[derive(Debug, Error)]
pub enum ClipError {
    #[error("invalid entry identifier: {0}")]
    InvalidId(String),

    #[error("bad request: {0}")]
    BadRequest(&'static str),

    #[error("no matching route")]
    NoRoute { get: bool },

    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    #[error("entry not found")]
    NotFound,

    #[error("entry is read-only")]
    ReadOnly,

    #[error("request rate limit exceeded")]
    RateLimited,

    #[error("{0} limit reached")]
    LimitReached(&'static str),

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("client disconnected during stream")]
    PartialContent,

    #[error("stream removed before a reader attached")]
    StreamCancelled,

    #[error("upload interrupted: {0}")]
    Upload(#[source] axum::Error),

    #[error("malformed metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ClipError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClipError::InvalidId(_)
            | ClipError::BadRequest(_)
            | ClipError::ReadOnly
            | ClipError::Upload(_) => ErrorKind::Client,
            ClipError::NoRoute { get: true } | ClipError::NotFound | ClipError::StreamCancelled => {
                ErrorKind::NotFound
            }
            ClipError::NoRoute { get: false } => ErrorKind::Client,
            ClipError::Unauthorized(_) => ErrorKind::Unauthorized,
            ClipError::RateLimited | ClipError::LimitReached(_) | ClipError::PayloadTooLarge => {
                ErrorKind::Capacity
            }
            ClipError::PartialContent => ErrorKind::Transport,
            ClipError::Metadata(_) | ClipError::Io(_) => ErrorKind::Io,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ClipError::InvalidId(_)
            | ClipError::BadRequest(_)
            | ClipError::NoRoute { get: false }
            | ClipError::Upload(_) => StatusCode::BAD_REQUEST,
            ClipError::NoRoute { get: true } | ClipError::NotFound | ClipError::StreamCancelled => {
                StatusCode::NOT_FOUND
            }
            ClipError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ClipError::ReadOnly => StatusCode::METHOD_NOT_ALLOWED,
            ClipError::RateLimited | ClipError::LimitReached(_) => StatusCode::TOO_MANY_REQUESTS,
            ClipError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ClipError::PartialContent => StatusCode::PARTIAL_CONTENT,
            ClipError::Metadata(_) | ClipError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for the rejection metric.
    pub fn reason(&self) -> &'static str {
        match self {
            ClipError::RateLimited => "rate",
            ClipError::LimitReached(which) => which,
            ClipError::PayloadTooLarge => "size",
            ClipError::Unauthorized(_) => "auth",
            _ => "other",
        }
    }
}

impl IntoResponse for ClipError {
    fn into_response(self) -> Response {
        let status = self.status();
        let phrase = status.canonical_reason().unwrap_or("Unknown");
        let mut response = Response::new(Body::from(phrase));
        *response.status_mut() = status;
        response
    }
}

/// Fatal errors that prevent the server from serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {}", join_errors(.0))]
    Config(Vec<ValidationError>),

    #[error("storage directory {0:?} is not writable")]
    StorageNotWritable(PathBuf),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS material unusable: {0}")]
    Tls(String),

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ClipError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ClipError::StreamCancelled.status(), StatusCode::NOT_FOUND);
        assert_eq!(ClipError::NoRoute { get: true }.status(), StatusCode::NOT_FOUND);
        assert_eq!(ClipError::NoRoute { get: false }.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ClipError::ReadOnly.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(ClipError::LimitReached("count").status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ClipError::PayloadTooLarge.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(ClipError::PartialContent.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            ClipError::Unauthorized(AuthError::Missing).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_kinds() {
        assert_eq!(ClipError::RateLimited.kind(), ErrorKind::Capacity);
        assert_eq!(ClipError::PartialContent.kind(), ErrorKind::Transport);
        assert_eq!(ClipError::StreamCancelled.kind(), ErrorKind::NotFound);
        let io = ClipError::from(std::io::Error::other("disk on fire"));
        assert_eq!(io.kind(), ErrorKind::Io);
        assert_eq!(io.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_response_hides_detail() {
        let response = ClipError::from(std::io::Error::other("secret path /x")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Internal Server Error");
    }
}
