//! Route handlers. Each one runs after the route's rate-limit and auth
//! checks have passed.

use std::net::IpAddr;
use std::path::PathBuf;

use axum::body::Body;
use axum::http::uri::Authority;
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures_util::stream;
use tokio::sync::oneshot;
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::error::ClipError;
use crate::http::request::RequestOptions;
use crate::http::response::{entry_response, InfoResponse, PutOutput, TEXT_PLAIN};
use crate::http::server::AppState;
use crate::store::entry::random_id;

/// Web root settings.
#[derive(Debug, Clone, Default)]
pub struct WebSettings {
    pub enabled: bool,
    pub static_dir: Option<PathBuf>,
    /// Port of the HTTPS listener, if any. Browsers on plain HTTP are
    /// redirected there.
    pub https_port: Option<u16>,
}

const USAGE: &str = "\
clipshare: temporary file and clipboard sharing

Upload:
  curl -T file.txt {addr}/myfile          # store under an id
  curl -T file.txt {addr}/                # store under a random id
  echo hi | curl -T- {addr}/greeting
Options (header or query):
  X-TTL: 2h          t=2h      lifetime (s, m, h, d, w)
  X-Mode: ro         m=ro      read-only, cannot be overwritten
  X-Stream: yes      s=1       stream to one reader, nothing is stored
  X-Format: json     f=json    JSON output
Download:
  curl {addr}/myfile
";

pub fn usage(server_addr: &str) -> String {
    USAGE.replace("{addr}", server_addr)
}

pub async fn root(state: &AppState, request: &Parts) -> Result<Response, ClipError> {
    let curl = request
        .headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ua| ua.starts_with("curl/"));

    if !curl {
        if !state.web.enabled {
            return Err(ClipError::BadRequest("web root disabled"));
        }
        if let Some(location) = https_redirect(state, request) {
            return Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response());
        }
    }

    Ok((
        [(header::CONTENT_TYPE, TEXT_PLAIN)],
        usage(state.urls.server_addr()),
    )
        .into_response())
}

fn https_redirect(state: &AppState, request: &Parts) -> Option<HeaderValue> {
    if state.secure {
        return None;
    }
    let port = state.web.https_port?;
    let authority = request
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())?
        .parse::<Authority>()
        .ok()?;
    let host = authority.host();
    let location = if port == 443 {
        format!("https://{}{}", host, request.uri.path())
    } else {
        format!("https://{}:{}{}", host, port, request.uri.path())
    };
    HeaderValue::from_str(&location).ok()
}

pub async fn static_file(state: &AppState, request: Request<Body>) -> Result<Response, ClipError> {
    if !state.web.enabled {
        return Err(ClipError::BadRequest("web root disabled"));
    }
    let dir = state.web.static_dir.as_ref().ok_or(ClipError::NotFound)?;

    let (mut parts, body) = request.into_parts();
    let inner = parts
        .uri
        .path()
        .strip_prefix("/static")
        .unwrap_or_default()
        .to_string();
    parts.uri = inner
        .parse::<Uri>()
        .map_err(|_| ClipError::BadRequest("invalid static path"))?;

    let response = match ServeDir::new(dir)
        .oneshot(Request::from_parts(parts, body))
        .await
    {
        Ok(response) => response,
        Err(infallible) => match infallible {},
    };
    Ok(response.map(Body::new))
}

pub async fn info(state: &AppState) -> Result<Response, ClipError> {
    let salt = state
        .auth
        .key()
        .map(|key| STANDARD.encode(&key.salt))
        .unwrap_or_default();
    Ok(InfoResponse {
        server_addr: state.urls.server_addr().to_string(),
        salt,
    }
    .into_response())
}

pub async fn verify() -> Result<Response, ClipError> {
    Ok(StatusCode::OK.into_response())
}

pub async fn get(state: &AppState, id: &str) -> Result<Response, ClipError> {
    let entry = state.store.open(id).await?;
    entry_response(entry, state.store.clone()).await
}

pub async fn put_random(
    state: &AppState,
    client: IpAddr,
    request: Request<Body>,
) -> Result<Response, ClipError> {
    put(state, client, &random_id(), request).await
}

/// Store the request body under `id`.
///
/// A regular upload answers once the body is on disk. A streamed upload
/// answers straight away: the URL goes out first and the response stays
/// open until a reader has drained the body.
pub async fn put(
    state: &AppState,
    client: IpAddr,
    id: &str,
    request: Request<Body>,
) -> Result<Response, ClipError> {
    let options = RequestOptions::parse(request.headers(), request.uri().query())?;
    let puts = state.visitors.put_limiter(client);
    let prepared = state
        .store
        .prepare_write(id, &puts, options.write_options())
        .await?;

    let output = PutOutput {
        url: state.urls.build(prepared.id(), prepared.ttl()),
        expires: prepared.expires(),
    };
    let text = output.render(options.format)?;
    let body = request.into_body();

    if !prepared.is_stream() {
        let bytes = prepared.commit(body).await?;
        tracing::info!(%client, id = %id, bytes, "Entry stored");
        return Ok(output.response(Body::from(text)));
    }

    let (done_tx, done_rx) = oneshot::channel::<()>();
    let id = id.to_string();
    tokio::spawn(async move {
        match prepared.commit(body).await {
            Ok(bytes) => tracing::info!(%client, id = %id, bytes, "Stream delivered"),
            Err(ClipError::PartialContent) => {
                tracing::info!(%client, id = %id, "Reader went away mid-stream")
            }
            Err(ClipError::StreamCancelled) => {
                tracing::info!(%client, id = %id, "Stream removed before a reader attached")
            }
            Err(e) => tracing::warn!(%client, id = %id, error = %e, "Stream upload failed"),
        }
        let _ = done_tx.send(());
    });

    // first chunk: the URL; then hold the response open until the copy ends
    let chunks = stream::unfold(Some((text, done_rx)), |state| async move {
        let (text, done_rx) = state?;
        if !text.is_empty() {
            return Some((Ok::<_, std::io::Error>(text), Some((String::new(), done_rx))));
        }
        let _ = done_rx.await;
        None
    });
    Ok(output.response(Body::from_stream(chunks)))
}
