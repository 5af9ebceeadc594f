//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the store, visitor registry, auth guard and janitor from config
//! - Wire up middleware (tracing, request ID, nosniff)
//! - Dispatch every request through the route table
//! - Serve plain HTTP and HTTPS until shutdown

use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request},
    response::{IntoResponse, Response},
    routing::any,
    Router as AxumRouter,
};
use axum_server::Handle;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::config::validation::ValidationError;
use crate::config::ServerConfig;
use crate::error::{ClipError, ErrorKind, StartupError};
use crate::http::handlers::{self, WebSettings};
use crate::http::request::{query_auth, request_id_header, MakeRequestUuid};
use crate::http::url::ClipUrlBuilder;
use crate::janitor::{Janitor, SweepTrigger};
use crate::lifecycle::Shutdown;
use crate::net::{listener, tls};
use crate::observability::metrics;
use crate::routing::{Handler, Router};
use crate::security::auth::{AuthGuard, Credentials};
use crate::security::key::Key;
use crate::security::rate_limit::VisitorRegistry;
use crate::store::ClipboardStore;

/// How long in-flight requests may take to finish after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state injected into the dispatcher.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<Router>,
    pub store: Arc<ClipboardStore>,
    pub visitors: Arc<VisitorRegistry>,
    pub auth: Arc<AuthGuard>,
    pub urls: Arc<ClipUrlBuilder>,
    pub web: Arc<WebSettings>,
    /// Whether this listener terminates TLS.
    pub secure: bool,
}

/// The clipboard server.
pub struct HttpServer {
    config: ServerConfig,
    state: AppState,
    janitor: Janitor,
}

impl HttpServer {
    /// Build every subsystem. Expects a validated config.
    pub fn new(config: ServerConfig) -> Result<Self, StartupError> {
        let key = config
            .auth
            .key
            .as_deref()
            .map(str::parse::<Key>)
            .transpose()
            .map_err(|_| StartupError::Config(vec![ValidationError::InvalidKey]))?;

        let trigger = SweepTrigger::new();
        let store = Arc::new(ClipboardStore::new(&config.storage, trigger.clone()));
        let visitors = Arc::new(VisitorRegistry::new(&config.visitors));
        let auth = Arc::new(AuthGuard::new(
            key.clone(),
            Duration::from_secs(config.auth.max_request_age_secs),
        ));
        let urls = Arc::new(ClipUrlBuilder::new(config.server_addr(), key));
        let web = Arc::new(WebSettings {
            enabled: config.web.enabled,
            static_dir: config.web.static_dir.clone(),
            https_port: config
                .listener
                .https
                .as_deref()
                .and_then(|addr| addr.parse::<SocketAddr>().ok())
                .map(|addr| addr.port()),
        });

        let janitor = Janitor::new(
            store.clone(),
            visitors.clone(),
            Duration::from_secs(config.janitor.interval_secs),
            config.visitors.expunge_after(),
            trigger,
        );

        let state = AppState {
            router: Arc::new(Router::new()),
            store,
            visitors,
            auth,
            urls,
            web,
            secure: false,
        };

        Ok(Self {
            config,
            state,
            janitor,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Axum app for one listener.
    pub fn app(&self, secure: bool) -> AxumRouter {
        build_app(&self.state, secure)
    }

    /// Bind the configured listeners and serve until `shutdown` fires.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), StartupError> {
        let http = match self.config.listener.http.as_deref() {
            Some(addr) => Some(listener::bind(addr).await?),
            None => None,
        };
        self.serve(http, shutdown).await
    }

    /// Serve on an already bound HTTP listener (plus HTTPS when configured).
    pub async fn serve(
        self,
        http: Option<TcpListener>,
        shutdown: Shutdown,
    ) -> Result<(), StartupError> {
        let HttpServer {
            config,
            state,
            janitor,
        } = self;

        let https = match (&config.listener.https, &config.listener.tls) {
            (Some(addr), Some(tls_config)) => {
                let addr: SocketAddr = addr.parse().map_err(|_| {
                    StartupError::Config(vec![ValidationError::InvalidListenAddr(addr.clone())])
                })?;
                let rustls =
                    tls::load_tls_config(&tls_config.cert_path, &tls_config.key_path).await?;
                Some((addr, rustls))
            }
            (Some(_), None) => return Err(StartupError::Config(vec![ValidationError::TlsMissing])),
            _ => None,
        };
        if http.is_none() && https.is_none() {
            return Err(StartupError::Config(vec![ValidationError::ListenAddrMissing]));
        }

        tracing::info!(
            server_addr = %state.urls.server_addr(),
            dir = %state.store.dir().display(),
            protected = state.auth.is_protected(),
            "Clipboard server starting"
        );

        let janitor = tokio::spawn(janitor.run(shutdown.subscribe()));

        // a pending stream holds its uploader's connection open
        let store = state.store.clone();
        let stopping = shutdown.wait();
        tokio::spawn(async move {
            stopping.await;
            store.cancel_streams().await;
        });

        let http_task = http.map(|listener| {
            let app = build_app(&state, false);
            let graceful = shutdown.wait();
            let stopping = shutdown.wait();
            async move {
                let serve = axum::serve(
                    listener,
                    app.into_make_service_with_connect_info::<SocketAddr>(),
                )
                .with_graceful_shutdown(graceful)
                .into_future();
                let deadline = async move {
                    stopping.await;
                    tokio::time::sleep(DRAIN_TIMEOUT).await;
                };
                tokio::select! {
                    result = serve => result,
                    _ = deadline => {
                        tracing::warn!("Connections still open after drain timeout, closing");
                        Ok(())
                    }
                }
            }
        });

        let https_task = https.map(|(addr, rustls)| {
            let app = build_app(&state, true);
            let handle = Handle::new();
            let drain = handle.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                shutdown.wait().await;
                drain.graceful_shutdown(Some(DRAIN_TIMEOUT));
            });
            tracing::info!(address = %addr, "Listening for TLS connections");
            async move {
                axum_server::bind_rustls(addr, rustls)
                    .handle(handle)
                    .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                    .await
                    .map_err(|source| StartupError::Bind {
                        addr: addr.to_string(),
                        source,
                    })
            }
        });

        let result = tokio::try_join!(
            async {
                match http_task {
                    Some(task) => task.await.map_err(StartupError::Serve),
                    None => Ok(()),
                }
            },
            async {
                match https_task {
                    Some(task) => task.await,
                    None => Ok(()),
                }
            },
        );

        // a failed listener takes the rest of the server down with it
        shutdown.trigger();
        let _ = janitor.await;
        tracing::info!("HTTP server stopped");
        result.map(|_| ())
    }
}

/// A catch-all route into [`dispatch`] behind the common middleware.
fn build_app(state: &AppState, secure: bool) -> AxumRouter {
    let state = AppState {
        secure,
        ..state.clone()
    };
    AxumRouter::new()
        .route("/", any(dispatch))
        .route("/{*path}", any(dispatch))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id_header(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id_header()))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                )),
        )
}

/// Single entry point for every request: route, rate-limit, authorize,
/// handle, then log and count the outcome.
async fn dispatch(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client = addr.ip();

    let response = match handle(&state, client, request).await {
        Ok(response) => response,
        Err(e) => {
            log_failure(&e, client, method.as_str(), &path);
            if matches!(e.kind(), ErrorKind::Capacity | ErrorKind::Unauthorized) {
                metrics::record_rejection(e.reason());
            }
            e.into_response()
        }
    };
    metrics::record_request(method.as_str(), response.status().as_u16());
    response
}

async fn handle(
    state: &AppState,
    client: IpAddr,
    request: Request<Body>,
) -> Result<Response, ClipError> {
    let route = state
        .router
        .match_request(request.method(), request.uri().path())?;

    if route.limit && !state.visitors.allow(client) {
        return Err(ClipError::RateLimited);
    }

    if route.auth {
        let query = query_auth(request.uri().query());
        let credentials = Credentials {
            method: request.method().as_str(),
            path: request.uri().path(),
            header: request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok()),
            query: query.as_deref(),
        };
        state.auth.authorize(credentials)?;
    }

    tracing::debug!(
        %client,
        method = %request.method(),
        path = %request.uri().path(),
        "Handling request"
    );

    match route.handler {
        Handler::Root => {
            // only the head is needed, and a body is not Sync
            let (parts, _) = request.into_parts();
            handlers::root(state, &parts).await
        }
        Handler::PutRandom => handlers::put_random(state, client, request).await,
        Handler::Static => handlers::static_file(state, request).await,
        Handler::Info => handlers::info(state).await,
        Handler::Verify => handlers::verify().await,
        Handler::Get => {
            let id = entry_id(&request);
            handlers::get(state, &id).await
        }
        Handler::Put => {
            let id = entry_id(&request);
            handlers::put(state, client, &id, request).await
        }
    }
}

fn entry_id(request: &Request<Body>) -> String {
    request.uri().path().trim_start_matches('/').to_string()
}

fn log_failure(err: &ClipError, client: IpAddr, method: &str, path: &str) {
    let status = err.status().as_u16();
    match err.kind() {
        ErrorKind::Io => {
            tracing::error!(%client, method, path, status, error = %err, "Request failed")
        }
        ErrorKind::Transport => {
            tracing::info!(%client, method, path, status, error = %err, "Client went away")
        }
        ErrorKind::NotFound => {
            tracing::debug!(%client, method, path, status, error = %err, "Request failed")
        }
        ErrorKind::Client | ErrorKind::Unauthorized | ErrorKind::Capacity => {
            tracing::warn!(%client, method, path, status, error = %err, "Request rejected")
        }
    }
}
