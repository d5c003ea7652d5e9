//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the Axum router for the origin, session, upload and file endpoints
//! - Wire up middleware (request id, tracing, timeout, origin resolution)
//! - Swap reloaded configuration into the live snapshot
//! - Serve until the shutdown signal fires
//!
//! # Design Decisions
//! - Handlers read the config snapshot per request; the timeout layer is fixed at startup
//! - File transfer outcomes are logged off the request path

use std::net::SocketAddr;
use std::path::{Component, Path as FsPath, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::config::KitConfig;
use crate::cookies::{Cookie, CookieJar, CookieOptions};
use crate::error::{error_code, HttpError};
use crate::http::content::is_multipart_request;
use crate::http::file::{stream_file, FileTransfer, StreamOptions};
use crate::http::request::{origin_middleware, SharedConfig};
use crate::http::response::{JsonResponder, JsonResponse};
use crate::http::upload::{collect_uploads, multipart_from_request, UploadOptions};
use crate::security::ResolvedOrigin;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: SharedConfig,
}

/// HTTP server exposing the toolkit over a listener.
pub struct HttpServer {
    router: Router,
    config: SharedConfig,
}

impl HttpServer {
    pub fn new(config: KitConfig) -> Self {
        let config: SharedConfig = Arc::new(ArcSwap::from_pointee(config));
        let router = build_router(config.clone());
        Self { router, config }
    }

    /// Live configuration snapshot shared with the handlers.
    pub fn config(&self) -> SharedConfig {
        self.config.clone()
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Configs received on `config_updates` replace the live snapshot. The
    /// server drains in-flight requests once `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<KitConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let live = self.config.clone();
        let reloader = tokio::spawn(async move {
            while let Some(update) = config_updates.recv().await {
                if update.listener != live.load().listener {
                    tracing::warn!("Listener changes take effect after a restart");
                }
                live.store(Arc::new(update));
                tracing::info!("Configuration reloaded");
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the router with all middleware layers.
pub fn build_router(config: SharedConfig) -> Router {
    let request_secs = config.load().timeouts.request_secs;
    let state = AppState {
        config: config.clone(),
    };

    Router::new()
        .route("/origin", get(origin_handler))
        .route("/session", get(session_handler).delete(end_session_handler))
        .route(
            "/uploads",
            post(upload_handler).layer(DefaultBodyLimit::disable()),
        )
        .route("/files/{*path}", get(file_handler))
        .with_state(state)
        .layer(middleware::from_fn_with_state(config, origin_middleware))
        .layer(timeout_layer(Duration::from_secs(request_secs)))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Requests whose handler outlives `timeout` are answered with 408.
fn timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

async fn origin_handler(Extension(origin): Extension<ResolvedOrigin>) -> Result<JsonResponse, HttpError> {
    JsonResponder::default().respond(&origin)
}

#[derive(Debug, Serialize)]
struct SessionBody {
    session: String,
    issued: bool,
}

/// Reads the signed session cookie, issuing a fresh one when it is missing or tampered with.
async fn session_handler(
    State(state): State<AppState>,
    Extension(origin): Extension<ResolvedOrigin>,
    headers: HeaderMap,
) -> Result<JsonResponse, HttpError> {
    let config = state.config.load_full();
    let cookies = &config.cookies;
    if cookies.secret.is_empty() {
        return Err(session_unavailable());
    }

    let jar = CookieJar::from_headers(&headers);
    match jar.get_signed(&cookies.session_name, &cookies.secret) {
        Ok(Some(session)) => {
            return JsonResponder::default().respond(&SessionBody {
                session,
                issued: false,
            });
        }
        Ok(None) => {}
        Err(e) => tracing::debug!(cookie = %cookies.session_name, code = e.code(), "Discarding session cookie"),
    }

    let session = Uuid::new_v4().simple().to_string();
    let mut options = CookieOptions::from(cookies);
    options.secure |= origin.is_secure();
    let set_cookie = Cookie::new(cookies.session_name.as_str(), session.as_str())?
        .signed(&cookies.secret)?
        .to_header_value(&options)?;

    JsonResponder::default()
        .header(header::SET_COOKIE, set_cookie)
        .respond(&SessionBody { session, issued: true })
}

async fn end_session_handler(State(state): State<AppState>) -> Result<Response, HttpError> {
    let config = state.config.load_full();
    let removal = Cookie::removal(&config.cookies.session_name, &CookieOptions::from(&config.cookies))?;
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, removal)]).into_response())
}

fn session_unavailable() -> HttpError {
    HttpError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Sessions are not available.",
        "no cookie secret configured",
    )
    .with_code(error_code("COOKIE", "ENOSECRET"))
}

async fn upload_handler(State(state): State<AppState>, request: Request<Body>) -> Result<JsonResponse, HttpError> {
    if !is_multipart_request(request.headers()) {
        return Err(HttpError::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Expected a multipart body.",
            "request is not multipart",
        )
        .with_code(error_code("FILE", "ENOTMULTIPART")));
    }

    let options = UploadOptions::from(&state.config.load().uploads);
    let multipart = multipart_from_request(request).await?;
    let uploads = collect_uploads(multipart, &options).await?;

    tracing::info!(files = uploads.paths().count(), fields = uploads.fields.len(), "Upload collected");
    JsonResponder::new(StatusCode::CREATED).respond(&uploads)
}

async fn file_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
    request: Request<Body>,
) -> Result<Response, HttpError> {
    let (target, options) = {
        let config = state.config.load();
        let target = resolve_file_path(&config.files.root, &path)?;
        (target, StreamOptions::from_map(&config.files.headers))
    };

    let (parts, _) = request.into_parts();
    let (response, transfer) = stream_file(&parts, &target, &options).await?;
    tokio::spawn(log_transfer(target, transfer));
    Ok(response)
}

async fn log_transfer(path: PathBuf, transfer: FileTransfer) {
    match transfer.await {
        Ok(()) => tracing::debug!(path = ?path, "File sent"),
        Err(e) if e.is_aborted() => tracing::info!(path = ?path, "File transfer aborted by client"),
        Err(e) => tracing::error!(path = ?path, error = %e, "File transfer failed"),
    }
}

/// Join `requested` under `root`, refusing anything but plain path segments.
fn resolve_file_path(root: &FsPath, requested: &str) -> Result<PathBuf, HttpError> {
    let mut target = root.to_path_buf();
    for segment in requested.split('/') {
        if !is_safe_segment(segment) {
            tracing::warn!(path = %requested, "Rejected file path");
            return Err(HttpError::not_found("ENOENT", "rejected path"));
        }
        target.push(segment);
    }
    Ok(target)
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment.len() <= 255
        && !segment.contains(['\\', '\0'])
        && matches!(
            FsPath::new(segment).components().collect::<Vec<_>>().as_slice(),
            [Component::Normal(_)]
        )
}
