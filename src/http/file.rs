//! File responses.
//!
//! # Responsibilities
//! - Reject directories and missing files before any byte is sent
//! - Delegate content type, ranges and conditional requests to `tower_http::services::ServeFile`
//! - Apply configured extra headers
//! - Report how the transfer ended: completed, aborted by the client, or failed
//!
//! # Design Decisions
//! - The body end and the body drop race to settle one one-shot channel; the
//!   first write wins and later writes are ignored
//! - The body ends when its last expected byte is handed out; hyper stops
//!   polling once `Content-Length` bytes are written and never sees `None`
//! - A body dropped before its end means the connection went away

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use axum::{
    body::{Body, HttpBody},
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
    response::Response,
};
use bytes::Bytes;
use http_body::{Frame, SizeHint};
use tokio::sync::oneshot;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::error::{error_code, io_error_code, HttpError};

const UNEXPECTED_BODY: &str = "An unexpected error has occurred.";

/// Options for [`stream_file`].
#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    /// Headers added to the response before the body starts.
    pub headers: HeaderMap,
}

impl StreamOptions {
    /// Build from configured name/value pairs. Invalid pairs are skipped.
    pub fn from_map(headers: &BTreeMap<String, String>) -> Self {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => {
                    map.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "Skipping invalid file header"),
            }
        }
        Self { headers: map }
    }
}

/// Resolves once the body of a streamed file has settled.
///
/// `Ok(())` when every byte was handed to the connection, an aborted
/// [`HttpError`] (`HTTP_FILE-ECONNABORTED`) when the body was dropped early,
/// or a 500 when reading the file failed.
#[derive(Debug)]
pub struct FileTransfer {
    rx: oneshot::Receiver<Result<(), HttpError>>,
}

impl Future for FileTransfer {
    type Output = Result<(), HttpError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(HttpError::aborted())),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// One-shot completion signal shared by every listener of a transfer.
#[derive(Debug, Clone)]
pub struct Settlement {
    tx: Arc<Mutex<Option<oneshot::Sender<Result<(), HttpError>>>>>,
}

impl Settlement {
    pub fn channel() -> (Self, FileTransfer) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            FileTransfer { rx },
        )
    }

    /// Record the outcome. Returns false if another listener settled first.
    pub fn settle(&self, result: Result<(), HttpError>) -> bool {
        let sender = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(tx) => {
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }
}

/// Stream `path` as the response to `request`.
pub async fn stream_file(
    request: &Parts,
    path: &Path,
    options: &StreamOptions,
) -> Result<(Response, FileTransfer), HttpError> {
    let metadata = tokio::fs::metadata(path).await.map_err(metadata_error)?;
    if metadata.is_dir() {
        return Err(HttpError::not_found("EISDIR", "EISDIR, read"));
    }

    let mut forwarded = Request::builder()
        .method(request.method.clone())
        .uri(request.uri.clone())
        .body(Body::empty())
        .map_err(|e| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, UNEXPECTED_BODY, e.to_string()))?;
    *forwarded.headers_mut() = request.headers.clone();

    let response = ServeFile::new(path)
        .oneshot(forwarded)
        .await
        .unwrap_or_else(|never| match never {});

    if response.status().is_server_error() {
        return Err(HttpError::new(
            response.status(),
            UNEXPECTED_BODY,
            format!("failed to open {}", path.display()),
        )
        .with_code(error_code("FILE", "EIO")));
    }

    let (mut parts, body) = response.into_parts();
    for (name, value) in &options.headers {
        parts.headers.insert(name.clone(), value.clone());
    }

    let (settlement, transfer) = Settlement::channel();

    // Nothing to stream: the connection may never poll the body.
    if request.method == Method::HEAD || !parts.status.is_success() || metadata.len() == 0 {
        settlement.settle(Ok(()));
        return Ok((Response::from_parts(parts, Body::new(body)), transfer));
    }

    let inner = Body::new(body);
    let remaining = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .or_else(|| inner.size_hint().exact());
    let tracked = TrackedBody {
        inner,
        remaining,
        settlement,
    };
    Ok((Response::from_parts(parts, Body::new(tracked)), transfer))
}

/// Body wrapper that settles on its last byte, end-of-stream, read error, or drop.
struct TrackedBody {
    inner: Body,
    /// Bytes still owed to the client, when the length is known.
    remaining: Option<u64>,
    settlement: Settlement,
}

impl HttpBody for TrackedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                let sent = frame.data_ref().map_or(0, |data| data.len() as u64);
                if let Some(remaining) = this.remaining.as_mut() {
                    *remaining = remaining.saturating_sub(sent);
                    if *remaining == 0 {
                        this.settlement.settle(Ok(()));
                    }
                }
            }
            Poll::Ready(Some(Err(e))) => {
                this.settlement.settle(Err(read_error(e)));
            }
            Poll::Ready(None) => {
                this.settlement.settle(Ok(()));
            }
            Poll::Pending => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for TrackedBody {
    fn drop(&mut self) {
        self.settlement.settle(Err(HttpError::aborted()));
    }
}

fn metadata_error(err: io::Error) -> HttpError {
    if err.kind() == io::ErrorKind::NotFound {
        HttpError::not_found("ENOENT", err.to_string()).with_source(err)
    } else {
        HttpError::io(StatusCode::INTERNAL_SERVER_ERROR, UNEXPECTED_BODY, "FILE", err)
    }
}

fn read_error(err: &axum::Error) -> HttpError {
    let code = std::error::Error::source(err)
        .and_then(|source| source.downcast_ref::<io::Error>())
        .map(io_error_code)
        .unwrap_or("EIO");
    HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, UNEXPECTED_BODY, err.to_string())
        .with_code(error_code("FILE", code))
}
