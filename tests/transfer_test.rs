//! Uploads and file downloads over real connections.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use http_kit::config::ByteSize;
use http_kit::http::{stream_file, FileTransfer, StreamOptions};
use http_kit::HttpError;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

mod common;

#[derive(Clone)]
struct DownloadState {
    path: PathBuf,
    transfers: mpsc::UnboundedSender<FileTransfer>,
}

async fn download(State(state): State<DownloadState>, request: Request<Body>) -> Response {
    let (parts, _body) = request.into_parts();
    match stream_file(&parts, &state.path, &StreamOptions::default()).await {
        Ok((response, transfer)) => {
            let _ = state.transfers.send(transfer);
            response
        }
        Err(e) => e.into_response(),
    }
}

/// Serve `path` at `/download` and hand out the transfer of every response.
async fn serve_download(path: PathBuf) -> (SocketAddr, mpsc::UnboundedReceiver<FileTransfer>) {
    let (transfers, rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .route("/download", get(download))
        .with_state(DownloadState { path, transfers });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, rx)
}

async fn next_outcome(
    transfers: &mut mpsc::UnboundedReceiver<FileTransfer>,
) -> Result<(), HttpError> {
    let transfer = transfers.recv().await.expect("no transfer recorded");
    tokio::time::timeout(Duration::from_secs(10), transfer)
        .await
        .expect("transfer never settled")
}

#[tokio::test]
async fn test_upload_stores_files_and_fields() {
    let server = common::start_server(|_| {}).await;

    let form = Form::new()
        .text("title", "Quarterly")
        .part(
            "docs",
            Part::bytes(b"first".to_vec())
                .file_name("one.txt")
                .mime_str("text/plain")
                .unwrap(),
        )
        .part("docs", Part::bytes(vec![0u8; 2048]).file_name("two.bin"));

    let res = common::client()
        .post(server.url("/uploads"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 201);
    let uploads: Value = res.json().await.unwrap();
    assert_eq!(uploads["fields"]["title"], "Quarterly");

    let docs = uploads["files"]["docs"].as_array().unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["mime_type"], "text/plain");
    assert_eq!(docs[0]["size"], 5);
    assert_eq!(docs[1]["size"], 2048);

    let first_path = docs[0]["path"].as_str().unwrap();
    assert!(first_path.starts_with(server.upload_dir().to_str().unwrap()));
    assert_eq!(std::fs::read(first_path).unwrap(), b"first");
    assert_eq!(server.stored_uploads(), 2);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected_and_cleaned_up() {
    let server = common::start_server(|config| {
        config.uploads.max_file_size = Some(ByteSize(16));
    })
    .await;

    let form = Form::new().part("blob", Part::bytes(vec![b'x'; 1024]).file_name("big.bin"));
    let res = common::client()
        .post(server.url("/uploads"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 413);
    assert_eq!(res.headers()["x-error-code"], "HTTP_FILE-LIMIT_FILE_SIZE");
    assert_eq!(res.text().await.unwrap(), "Upload limit exceeded.");
    assert_eq!(server.stored_uploads(), 0);
}

#[tokio::test]
async fn test_malformed_multipart_body() {
    let server = common::start_server(|_| {}).await;

    let res = common::client()
        .post(server.url("/uploads"))
        .header("content-type", "multipart/form-data")
        .body("not really multipart")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 400);
    assert_eq!(res.headers()["x-error-code"], "HTTP_FILE-EBOUNDARY");
}

#[tokio::test]
async fn test_file_download_with_headers_and_ranges() {
    let server = common::start_server(|config| {
        config
            .files
            .headers
            .insert("cache-control".to_string(), "public, max-age=300".to_string());
    })
    .await;
    server.write_public("assets/app.js", b"console.log('hi');");
    let client = common::client();

    let full = client.get(server.url("/files/assets/app.js")).send().await.unwrap();
    assert_eq!(full.status(), 200);
    assert_eq!(full.headers()["cache-control"], "public, max-age=300");
    assert_eq!(full.text().await.unwrap(), "console.log('hi');");

    let partial = client
        .get(server.url("/files/assets/app.js"))
        .header("range", "bytes=0-6")
        .send()
        .await
        .unwrap();
    assert_eq!(partial.status(), 206);
    assert_eq!(partial.text().await.unwrap(), "console");
}

#[tokio::test]
async fn test_missing_files_and_directories() {
    let server = common::start_server(|_| {}).await;
    server.write_public("nested/file.txt", b"x");
    let client = common::client();

    let missing = client.get(server.url("/files/nope.txt")).send().await.unwrap();
    assert_eq!(missing.status(), 404);
    assert_eq!(missing.headers()["x-error-code"], "HTTP_FILE-ENOENT");
    assert_eq!(missing.text().await.unwrap(), "This file cannot be found.");

    let directory = client.get(server.url("/files/nested")).send().await.unwrap();
    assert_eq!(directory.status(), 404);
    assert_eq!(directory.headers()["x-error-code"], "HTTP_FILE-EISDIR");
}

#[tokio::test]
async fn test_encoded_traversal_is_refused() {
    let server = common::start_server(|_| {}).await;

    let res = common::client()
        .get(server.url("/files/..%2F..%2Fetc%2Fpasswd"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn test_completed_download_settles_ok() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.csv");
    std::fs::write(&path, "id,total\n1,42\n2,17\n").unwrap();
    let (addr, mut transfers) = serve_download(path).await;

    let res = common::client()
        .get(format!("http://{addr}/download"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "id,total\n1,42\n2,17\n");

    assert!(next_outcome(&mut transfers).await.is_ok());
}

#[tokio::test]
async fn test_range_download_settles_ok() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.js");
    std::fs::write(&path, "console.log('hi');").unwrap();
    let (addr, mut transfers) = serve_download(path).await;

    let res = common::client()
        .get(format!("http://{addr}/download"))
        .header("range", "bytes=0-6")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 206);
    assert_eq!(res.text().await.unwrap(), "console");

    assert!(next_outcome(&mut transfers).await.is_ok());
}

#[tokio::test]
async fn test_client_disconnect_mid_body_is_aborted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("large.bin");
    std::fs::write(&path, vec![7u8; 32 * 1024 * 1024]).unwrap();
    let (addr, mut transfers) = serve_download(path).await;

    let client = common::client();
    let mut res = client
        .get(format!("http://{addr}/download"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let first = res.chunk().await.unwrap().expect("no body received");
    assert!(!first.is_empty());
    drop(res);
    drop(client);

    let err = next_outcome(&mut transfers).await.unwrap_err();
    assert!(err.is_aborted());
}
