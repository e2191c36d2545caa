use std::net::SocketAddr;

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use photo_loader::config::LoaderConfig;
use photo_loader::engine::session::TransferSession;
use photo_loader::error::TransferError;
use photo_loader::source::http_source::HttpTransport;
use photo_loader::source::traits::{DownloadRequest, Transport};

const TEST_SIZE: usize = 256 * 1024;

fn body() -> Vec<u8> {
    (0..TEST_SIZE).map(|i| (i % 256) as u8).collect()
}

async fn serve_file() -> impl IntoResponse {
    let body = body();
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (header::CONTENT_LENGTH, body.len().to_string()),
        ],
        body,
    )
}

async fn start_server() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let app = Router::new()
        .route("/file", get(serve_file))
        .route("/gone", get(|| async { (StatusCode::NOT_FOUND, "no such photo") }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, handle)
}

fn transport() -> HttpTransport {
    HttpTransport::from_config(&LoaderConfig::default()).unwrap()
}

#[tokio::test]
async fn test_http_transport_envelope() {
    let (addr, _handle) = start_server().await;
    let request = DownloadRequest::get(&format!("http://{}/file", addr)).unwrap();

    let opened = transport().open(&request).await.unwrap();
    assert_eq!(opened.envelope.status, 200);
    assert_eq!(opened.envelope.expected_length, Some(TEST_SIZE as u64));
    assert_eq!(opened.envelope.header("Content-Type"), Some("image/jpeg"));
}

#[tokio::test]
async fn test_http_session_reads_full_body() {
    let (addr, _handle) = start_server().await;
    let request = DownloadRequest::get(&format!("http://{}/file", addr)).unwrap();

    let mut progress = Vec::new();
    let outcome = TransferSession::new(std::sync::Arc::new(transport()))
        .run(&request, &CancellationToken::new(), |f| progress.push(f))
        .await;

    assert!(outcome.is_ok_200());
    assert_eq!(outcome.body.to_vec(), body());
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*progress.last().unwrap(), 1.0);
}

#[tokio::test]
async fn test_http_error_status_is_not_transport_error() {
    let (addr, _handle) = start_server().await;
    let request = DownloadRequest::get(&format!("http://{}/gone", addr)).unwrap();

    let outcome = TransferSession::new(std::sync::Arc::new(transport()))
        .run(&request, &CancellationToken::new(), |_| {})
        .await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.response.as_ref().unwrap().status, 404);
    assert_eq!(&outcome.body[..], b"no such photo");
    assert!(!outcome.is_ok_200());
}

#[tokio::test]
async fn test_http_connection_refused() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let request = DownloadRequest::get(&format!("http://{}/file", addr)).unwrap();
    let outcome = TransferSession::new(std::sync::Arc::new(transport()))
        .run(&request, &CancellationToken::new(), |_| {})
        .await;

    assert!(outcome.body.is_empty());
    assert!(outcome.response.is_none());
    assert!(matches!(outcome.error, Some(TransferError::Connect(_))));
}

#[test]
fn test_invalid_url() {
    assert!(matches!(
        DownloadRequest::get("not a url"),
        Err(TransferError::InvalidUrl(_))
    ));
}
