//! Request origin resolution.
//!
//! # Responsibilities
//! - Capture peer address, headers and transport security per request
//! - Resolve the client-facing protocol and hostname before any handler runs
//! - Reject suspicious hosts with 400
//!
//! # Design Decisions
//! - Resolution reads the current config snapshot, so reloads apply to the next request
//! - A missing peer address matches only a wildcard trust entry

use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::KitConfig;
use crate::security::{resolve_origin, RequestOrigin};

/// Live configuration shared with request handlers.
pub type SharedConfig = Arc<ArcSwap<KitConfig>>;

/// Peer IP recorded by `into_make_service_with_connect_info`, if any.
pub fn peer_ip(req: &Request<Body>) -> Option<String> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// Resolves a [`ResolvedOrigin`](crate::security::ResolvedOrigin) into the request extensions.
pub async fn origin_middleware(
    State(config): State<SharedConfig>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let resolved = {
        let config = config.load();
        let origin = RequestOrigin::new(
            peer_ip(&req).unwrap_or_default(),
            req.headers().clone(),
            config.listener.encrypted,
        );
        resolve_origin(&origin, &config.trust)
    };

    match resolved {
        Ok(resolved) => {
            req.extensions_mut().insert(resolved);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}
