//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use clipshare::config::StreamBackend;
use clipshare::lifecycle::Shutdown;
use clipshare::{HttpServer, ServerConfig};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A server on an ephemeral localhost port with its own storage directory.
pub struct TestServer {
    pub addr: SocketAddr,
    pub dir: TempDir,
    shutdown: Shutdown,
    task: JoinHandle<Result<(), clipshare::StartupError>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn entry_path(&self, id: &str) -> std::path::PathBuf {
        self.dir.path().join(id)
    }

    /// Trigger shutdown; true when the server task ended within five seconds.
    pub async fn stop(self) -> bool {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .is_ok()
    }
}

/// Start a server. Rate limits are relaxed unless `tweak` tightens them.
pub async fn start_server(tweak: impl FnOnce(&mut ServerConfig)) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = ServerConfig::default();
    config.listener.http = Some(addr.to_string());
    config.listener.server_addr = Some(format!("http://{}", addr));
    config.storage.dir = dir.path().to_path_buf();
    config.storage.stream_backend = StreamBackend::Memory;
    config.visitors.requests_per_second = 1000.0;
    config.visitors.burst = 1000;
    tweak(&mut config);

    let server = HttpServer::new(config).unwrap();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(server.serve(Some(listener), shutdown.clone()));

    TestServer {
        addr,
        dir,
        shutdown,
        task,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Poll `check` until it holds or a second has passed.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
