use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::admin;
use crate::state::AppState;
use std::sync::Arc;

/// Create the admin router
///
/// Note: Authentication middleware should be applied in main.rs after state is available
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/calls", get(admin::list_calls))
        .route("/admin/stats", get(admin::call_stats))
        .route("/admin/transfers/{call_sid}", get(admin::get_transfer))
        .layer(TraceLayer::new_for_http())
}

/// Public liveness routes
pub fn create_health_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(crate::handlers::api::health_check))
        .route("/health", get(crate::handlers::api::health_check))
}
