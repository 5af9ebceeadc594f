//! Response construction: upload results, info document and entry bodies.
//!
//! Entry bodies are never served with a type guessed from their content
//! beyond text vs binary, so stored markup cannot render in a browser.

use std::io;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::stream;
use serde::Serialize;
use tokio::io::AsyncReadExt;

use crate::error::ClipError;
use crate::http::request::{OutputFormat, HEADER_EXPIRES, HEADER_URL};
use crate::store::handoff::{EntryReader, StreamTicket};
use crate::store::{ClipboardStore, EntryPaths, EntryRead};

const READ_CHUNK: usize = 64 * 1024;

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// `text/plain` for UTF-8 (a character cut off at the end of the sample
/// still counts), `application/octet-stream` for everything else.
pub fn sniff_content_type(sample: &[u8]) -> &'static str {
    match std::str::from_utf8(sample) {
        Ok(_) => TEXT_PLAIN,
        Err(e) if e.error_len().is_none() => TEXT_PLAIN,
        Err(_) => OCTET_STREAM,
    }
}

/// Result of a successful write.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PutOutput {
    pub url: String,
    /// Unix seconds, 0 = never.
    pub expires: i64,
}

impl PutOutput {
    pub fn render(&self, format: OutputFormat) -> Result<String, ClipError> {
        match format {
            OutputFormat::Text => Ok(format!("{}\n", self.url)),
            OutputFormat::Json => {
                let mut json = serde_json::to_string(self)?;
                json.push('\n');
                Ok(json)
            }
        }
    }

    /// Status line and headers of an upload response. The body is supplied
    /// by the caller.
    pub fn response(&self, body: Body) -> Response {
        let mut response = Response::new(body);
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM));
        if let Ok(url) = HeaderValue::from_str(&self.url) {
            headers.insert(HEADER_URL, url);
        }
        headers.insert(HEADER_EXPIRES, HeaderValue::from(self.expires));
        response
    }
}

/// Body of `GET /info`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub server_addr: String,
    /// Base64 salt, empty when the server is unprotected.
    pub salt: String,
}

impl IntoResponse for InfoResponse {
    fn into_response(self) -> Response {
        match serde_json::to_string(&self) {
            Ok(json) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                json + "\n",
            )
                .into_response(),
            Err(e) => ClipError::from(e).into_response(),
        }
    }
}

/// Removes a streamed entry once its reader is done with it, whether the
/// body reached EOF or the client went away first.
struct StreamDrain {
    store: Arc<ClipboardStore>,
    paths: EntryPaths,
    ticket: StreamTicket,
    done: bool,
}

impl StreamDrain {
    async fn finish(mut self) {
        self.done = true;
        self.store.finish_stream(&self.paths, self.ticket).await;
    }
}

impl Drop for StreamDrain {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = self.store.clone();
        let paths = self.paths.clone();
        let ticket = self.ticket;
        handle.spawn(async move {
            tracing::debug!(id = %paths.id, "Stream reader left early");
            store.finish_stream(&paths, ticket).await;
        });
    }
}

struct BodyState {
    reader: EntryReader,
    first: Option<Bytes>,
    drain: Option<StreamDrain>,
}

/// Stream an opened entry. Waits for the first chunk to pick the content
/// type, so for a streamed entry this returns once the uploader has sent
/// something.
pub async fn entry_response(
    entry: EntryRead,
    store: Arc<ClipboardStore>,
) -> Result<Response, ClipError> {
    let EntryRead {
        paths,
        mut reader,
        len,
        stream: ticket,
    } = entry;
    let drain = ticket.map(|ticket| StreamDrain {
        store,
        paths,
        ticket,
        done: false,
    });

    let mut first = vec![0u8; READ_CHUNK];
    let n = reader.read(&mut first).await?;
    first.truncate(n);
    let content_type = sniff_content_type(&first);

    let state = BodyState {
        reader,
        first: (n > 0).then(|| Bytes::from(first)),
        drain,
    };
    let chunks = stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        if let Some(first) = state.first.take() {
            return Some((Ok::<_, io::Error>(first), Some(state)));
        }
        let mut buf = vec![0u8; READ_CHUNK];
        match state.reader.read(&mut buf).await {
            Ok(0) => {
                if let Some(drain) = state.drain.take() {
                    drain.finish().await;
                }
                None
            }
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), Some(state)))
            }
            Err(e) => Some((Err(e), None)),
        }
    });

    let mut response = Response::new(Body::from_stream(chunks));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Some(len) = len {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::{StorageConfig, StreamBackend};
    use crate::janitor::SweepTrigger;
    use crate::security::limiter::ResourceLimiter;
    use crate::store::WriteOptions;

    #[tokio::test]
    async fn test_abandoned_stream_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            dir: dir.path().to_path_buf(),
            stream_backend: StreamBackend::Memory,
            ..StorageConfig::default()
        };
        let store = Arc::new(ClipboardStore::new(&config, SweepTrigger::new()));
        let options = WriteOptions {
            stream: true,
            ..WriteOptions::default()
        };
        let prepared = store
            .prepare_write("half", &ResourceLimiter::new(0), options)
            .await
            .unwrap();
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, io::Error>>(1);
        let body = Body::from_stream(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        }));
        let upload = tokio::spawn(prepared.commit(body));

        tx.send(Ok(Bytes::from_static(b"first chunk"))).await.unwrap();
        let entry = store.open("half").await.unwrap();
        let response = entry_response(entry, store.clone()).await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], TEXT_PLAIN);
        // the reader hangs up before the upload is complete
        drop(response);

        let meta = dir.path().join("half:meta");
        for _ in 0..100 {
            if !meta.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!meta.exists());
        assert!(!dir.path().join("half").exists());

        // the uploader notices once it writes again
        let _ = tx.send(Ok(Bytes::from_static(b"more"))).await;
        drop(tx);
        let result = tokio::time::timeout(std::time::Duration::from_secs(3), upload)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(ClipError::PartialContent)));
    }

    #[test]
    fn test_sniff_html_is_text() {
        assert_eq!(sniff_content_type(b"<script>alert('hi')</script>"), TEXT_PLAIN);
        assert_eq!(sniff_content_type(b""), TEXT_PLAIN);
    }

    #[test]
    fn test_sniff_binary() {
        assert_eq!(sniff_content_type(&[0xff, 0xfe, 0x00, 0x80, 0x81]), OCTET_STREAM);
    }

    #[test]
    fn test_sniff_truncated_multibyte() {
        let text = "caf\u{e9}".as_bytes();
        assert_eq!(sniff_content_type(&text[..text.len() - 1]), TEXT_PLAIN);
    }

    #[test]
    fn test_put_output_formats() {
        let output = PutOutput {
            url: "http://localhost:2586/abc123".into(),
            expires: 0,
        };
        assert_eq!(output.render(OutputFormat::Text).unwrap(), "http://localhost:2586/abc123\n");
        assert_eq!(
            output.render(OutputFormat::Json).unwrap(),
            "{\"url\":\"http://localhost:2586/abc123\",\"expires\":0}\n"
        );

        let response = output.response(Body::empty());
        assert_eq!(response.headers()[HEADER_URL], "http://localhost:2586/abc123");
        assert_eq!(response.headers()[HEADER_EXPIRES], "0");
        assert_eq!(response.headers()[header::CONTENT_TYPE], OCTET_STREAM);
    }

    #[test]
    fn test_info_field_names() {
        let info = InfoResponse {
            server_addr: "https://clip.example.com".into(),
            salt: String::new(),
        };
        assert_eq!(
            serde_json::to_string(&info).unwrap(),
            "{\"serverAddr\":\"https://clip.example.com\",\"salt\":\"\"}"
        );
    }
}
