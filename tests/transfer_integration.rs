//! Integration tests for the streaming transfer executor.

use std::sync::{Arc, Mutex};

use vidgrab_core::download::{DownloadError, HttpTransfer, Transfer};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_transfer_sends_referer_and_returns_body() {
    let server = MockServer::start().await;
    let content = vec![7u8; 64 * 1024];
    Mock::given(method("GET"))
        .and(path("/media/a.mp4"))
        .and(header("referer", "https://videos.example.com/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let transfer = HttpTransfer::new(Some("https://videos.example.com/".to_string())).unwrap();
    let samples = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&samples);
    let report = move |downloaded: u64, total: u64| sink.lock().unwrap().push((downloaded, total));

    let bytes = transfer
        .transfer(&format!("{}/media/a.mp4", server.uri()), &report)
        .await
        .unwrap();

    assert_eq!(bytes, content);
    let samples = samples.lock().unwrap();
    assert!(!samples.is_empty());
    assert!(
        samples.windows(2).all(|pair| pair[0].0 <= pair[1].0),
        "progress must not go backwards: {samples:?}"
    );
    assert_eq!(samples.last(), Some(&(content.len() as u64, content.len() as u64)));
}

#[tokio::test]
async fn test_transfer_not_found_is_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/missing.mp4"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let transfer = HttpTransfer::new(None).unwrap();
    let error = transfer
        .transfer(&format!("{}/media/missing.mp4", server.uri()), &|_, _| {})
        .await
        .unwrap_err();

    assert!(
        matches!(error, DownloadError::HttpStatus { status: 404, .. }),
        "got: {error}"
    );
}

#[tokio::test]
async fn test_transfer_forbidden_without_referer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/a.mp4"))
        .and(header("referer", "https://videos.example.com/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/a.mp4"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let transfer = HttpTransfer::new(None).unwrap();
    let error = transfer
        .transfer(&format!("{}/media/a.mp4", server.uri()), &|_, _| {})
        .await
        .unwrap_err();
    assert!(matches!(error, DownloadError::HttpStatus { status: 403, .. }));
}

#[tokio::test]
async fn test_transfer_empty_body_reports_completion() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/empty.mp4"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let transfer = HttpTransfer::new(None).unwrap();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    let bytes = transfer
        .transfer(
            &format!("{}/media/empty.mp4", server.uri()),
            &move |downloaded: u64, total: u64| sink.lock().unwrap().push((downloaded, total)),
        )
        .await
        .unwrap();

    assert!(bytes.is_empty());
    assert_eq!(*calls.lock().unwrap(), vec![(0, 0)]);
}
