//! End-to-end behavior of uploads and downloads.

use std::time::Duration;

use reqwest::StatusCode;

mod common;

#[tokio::test]
async fn test_put_then_get() {
    let server = common::start_server(|_| {}).await;
    let client = common::client();

    let response = client
        .put(server.url("/abc123"))
        .body("hello")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["x-url"],
        format!("http://{}/abc123", server.addr).as_str()
    );
    assert!(response.headers()["x-expires"].to_str().unwrap().parse::<i64>().unwrap() > 0);
    assert_eq!(
        response.text().await.unwrap(),
        format!("http://{}/abc123\n", server.addr)
    );

    let response = client.get(server.url("/abc123")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/plain; charset=utf-8");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.text().await.unwrap(), "hello");

    server.stop().await;
}

#[tokio::test]
async fn test_never_expiring_server() {
    let server = common::start_server(|c| c.storage.file_expire_after_secs = 0).await;
    let client = common::client();

    let response = client
        .put(server.url("/abc123"))
        .body("hello")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-expires"], "0");

    let body = client
        .get(server.url("/abc123"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "hello");

    server.stop().await;
}

#[tokio::test]
async fn test_binary_roundtrip() {
    let server = common::start_server(|_| {}).await;
    let client = common::client();
    let payload: Vec<u8> = (0..=255u8).cycle().take(200_000).collect();

    client
        .post(server.url("/blob.bin"))
        .body(payload.clone())
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap();

    let response = client.get(server.url("/blob.bin")).send().await.unwrap();
    assert_eq!(response.headers()["content-type"], "application/octet-stream");
    assert_eq!(response.headers()["content-length"], "200000");
    assert_eq!(response.bytes().await.unwrap().as_ref(), payload.as_slice());

    server.stop().await;
}

#[tokio::test]
async fn test_random_id_and_json_output() {
    let server = common::start_server(|_| {}).await;
    let client = common::client();

    let response = client
        .post(server.url("/?f=json"))
        .body("anonymous")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = response.json().await.unwrap();
    let url = json["url"].as_str().unwrap().to_string();
    assert!(json["expires"].as_i64().unwrap() > 0);

    let id = url.rsplit('/').next().unwrap();
    assert_eq!(id.len(), 10);
    let body = client.get(&url).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "anonymous");

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_and_reserved() {
    let server = common::start_server(|_| {}).await;
    let client = common::client();

    let status = client.get(server.url("/missing")).send().await.unwrap().status();
    assert_eq!(status, StatusCode::NOT_FOUND);

    let response = client.put(server.url("/info")).body("x").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text().await.unwrap(), "Bad Request");

    let status = client.delete(server.url("/abc123")).send().await.unwrap().status();
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for reserved in ["/help", "/version", "/robots.txt", "/favicon.ico", "/HELP"] {
        let status = client.get(server.url(reserved)).send().await.unwrap().status();
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", reserved);
    }

    server.stop().await;
}

#[tokio::test]
async fn test_read_only_entry() {
    let server = common::start_server(|_| {}).await;
    let client = common::client();

    let status = client
        .put(server.url("/locked"))
        .header("X-Mode", "ro")
        .body("original")
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, StatusCode::OK);

    let status = client
        .put(server.url("/locked"))
        .body("changed")
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let body = client.get(server.url("/locked")).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "original");

    server.stop().await;
}

#[tokio::test]
async fn test_invalid_mode_and_ttl() {
    let server = common::start_server(|_| {}).await;
    let client = common::client();

    let status = client
        .put(server.url("/abc123?m=xx"))
        .body("x")
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let status = client
        .put(server.url("/abc123"))
        .header("X-TTL", "soon")
        .body("x")
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, StatusCode::BAD_REQUEST);

    server.stop().await;
}

#[tokio::test]
async fn test_expired_entry_is_gone() {
    let server = common::start_server(|c| c.janitor.interval_secs = 1).await;
    let client = common::client();

    let response = client
        .put(server.url("/shortlived"))
        .header("X-TTL", "1")
        .body("soon gone")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = client.get(server.url("/shortlived")).send().await.unwrap().status();
    assert_eq!(status, StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(2100)).await;
    let status = client.get(server.url("/shortlived")).send().await.unwrap().status();
    assert_eq!(status, StatusCode::NOT_FOUND);

    let content = server.entry_path("shortlived");
    let meta = server.dir.path().join("shortlived:meta");
    let removed = common::eventually(|| !content.exists() && !meta.exists()).await;
    assert!(removed);

    server.stop().await;
}

#[tokio::test]
async fn test_info() {
    let server = common::start_server(|_| {}).await;
    let client = common::client();

    let json: serde_json::Value = client
        .get(server.url("/info"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["serverAddr"], format!("http://{}", server.addr).as_str());
    assert_eq!(json["salt"], "");

    server.stop().await;
}

#[tokio::test]
async fn test_root_usage() {
    let server = common::start_server(|c| c.web.enabled = false).await;
    let client = common::client();

    let response = client
        .get(server.url("/"))
        .header("User-Agent", "curl/8.0.1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.text().await.unwrap().contains("curl -T"));

    let status = client
        .get(server.url("/"))
        .header("User-Agent", "Mozilla/5.0")
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, StatusCode::BAD_REQUEST);

    server.stop().await;
}
