//! Connection limit middleware for media stream connections
//!
//! This module provides middleware to enforce connection limits:
//! - Global maximum media stream connections
//! - Per-IP connection limits
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use callbridge_gateway::middleware::connection_limit_middleware;
//!
//! let app = Router::new()
//!     .route("/media-stream", get(media_stream_handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         connection_limit_middleware,
//!     ));
//! ```

use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::state::{AppState, ConnectionLimitError};

/// Client address of an admitted media stream; the handler releases the
/// slot with it when the call ends.
#[derive(Clone, Copy, Debug)]
pub struct ClientIp(pub IpAddr);

fn is_websocket_upgrade(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// Enforce the global and per-IP media stream limits.
///
/// Plain HTTP requests pass through untouched. An admitted upgrade carries a
/// [`ClientIp`] extension; a refused one gets 503 (global) or 429 (per IP).
pub async fn connection_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if !is_websocket_upgrade(&request) {
        return next.run(request).await;
    }

    let client_ip = addr.ip();
    let refused = match state.try_acquire_connection(client_ip) {
        Ok(()) => {
            request.extensions_mut().insert(ClientIp(client_ip));
            return next.run(request).await;
        }
        Err(reason) => reason,
    };

    let (status, message) = match refused {
        ConnectionLimitError::GlobalLimitReached => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Call capacity reached, try again later",
        ),
        ConnectionLimitError::PerIpLimitReached => (
            StatusCode::TOO_MANY_REQUESTS,
            "Too many media streams from this address",
        ),
    };
    tracing::warn!(
        ip = %client_ip,
        active = state.ws_connection_count(),
        reason = ?refused,
        "Media stream refused"
    );
    (status, Json(json!({"error": message}))).into_response()
}
