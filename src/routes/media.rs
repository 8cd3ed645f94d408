//! Media stream WebSocket routes
//!
//! `/media-stream` is opened by the telephony platform after the incoming
//! call TwiML connects the call. Connection limits are applied in main.rs
//! with [`crate::middleware::connection_limit_middleware`].

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::media_stream_handler;
use crate::state::AppState;

pub fn create_media_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/media-stream", get(media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
