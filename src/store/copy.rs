//! Size-capped copy of an upload body into an entry.

use std::io;
use std::sync::Arc;

use axum::body::Body;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::ClipError;
use crate::security::limiter::ResourceLimiter;

#[derive(Debug, Error)]
pub enum CopyError {
    #[error("size limit reached")]
    LimitReached,

    #[error("reading request body: {0}")]
    Body(#[source] axum::Error),

    #[error("writing entry: {0}")]
    Write(#[source] io::Error),
}

impl From<CopyError> for ClipError {
    fn from(err: CopyError) -> Self {
        match err {
            CopyError::LimitReached => ClipError::PayloadTooLarge,
            CopyError::Body(e) => ClipError::Upload(e),
            // the reader of a streamed entry went away
            CopyError::Write(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                ClipError::PartialContent
            }
            CopyError::Write(e) => ClipError::Io(e),
        }
    }
}

/// Writer that charges every chunk against a chain of limiters, in order,
/// before letting it through.
pub struct LimitWriter<W> {
    inner: W,
    limiters: Vec<Arc<ResourceLimiter>>,
}

impl<W: AsyncWrite + Unpin> LimitWriter<W> {
    pub fn new(inner: W, limiters: Vec<Arc<ResourceLimiter>>) -> Self {
        Self { inner, limiters }
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), CopyError> {
        let n = chunk.len() as u64;
        for (i, limiter) in self.limiters.iter().enumerate() {
            if limiter.add(n).is_err() {
                for earlier in &self.limiters[..i] {
                    earlier.sub(n);
                }
                return Err(CopyError::LimitReached);
            }
        }
        self.inner.write_all(chunk).await.map_err(CopyError::Write)
    }

    pub async fn finish(mut self) -> Result<(), CopyError> {
        self.inner.flush().await.map_err(CopyError::Write)?;
        self.inner.shutdown().await.map_err(CopyError::Write)
    }
}

/// Stream `body` into `writer`. Returns the number of bytes copied.
pub async fn copy_body<W: AsyncWrite + Unpin>(
    body: Body,
    mut writer: LimitWriter<W>,
) -> Result<u64, CopyError> {
    let mut stream = body.into_data_stream();
    let mut copied = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(CopyError::Body)?;
        writer.write_chunk(&chunk).await?;
        copied += chunk.len() as u64;
    }
    writer.finish().await?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u64) -> Arc<ResourceLimiter> {
        Arc::new(ResourceLimiter::new(max))
    }

    #[tokio::test]
    async fn test_copy_within_limits() {
        let file_limit = limiter(100);
        let total = limiter(1000);
        let mut out = Vec::new();
        let writer = LimitWriter::new(&mut out, vec![file_limit.clone(), total.clone()]);

        let copied = copy_body(Body::from("hello world"), writer).await.unwrap();
        assert_eq!(copied, 11);
        assert_eq!(out, b"hello world");
        assert_eq!(total.value(), 11);
    }

    #[tokio::test]
    async fn test_per_file_cap() {
        let file_limit = limiter(4);
        let total = limiter(1000);
        let mut out = Vec::new();
        let writer = LimitWriter::new(&mut out, vec![file_limit, total.clone()]);

        let err = copy_body(Body::from("too long"), writer).await.unwrap_err();
        assert!(matches!(err, CopyError::LimitReached));
        assert_eq!(total.value(), 0);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_cap_rolls_back_earlier_limiters() {
        let file_limit = limiter(100);
        let total = limiter(5);
        total.add(3).unwrap();
        let mut out = Vec::new();
        let writer = LimitWriter::new(&mut out, vec![file_limit.clone(), total.clone()]);

        let err = copy_body(Body::from("abc"), writer).await.unwrap_err();
        assert!(matches!(err, CopyError::LimitReached));
        assert_eq!(file_limit.value(), 0);
        assert_eq!(total.value(), 3);
    }

    #[test]
    fn test_error_mapping() {
        let broken = CopyError::Write(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(matches!(ClipError::from(broken), ClipError::PartialContent));
        assert!(matches!(
            ClipError::from(CopyError::LimitReached),
            ClipError::PayloadTooLarge
        ));
        let other = CopyError::Write(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(ClipError::from(other), ClipError::Io(_)));
    }
}
