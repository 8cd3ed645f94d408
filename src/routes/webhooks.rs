//! Telephony webhook routes
//!
//! These are called by the telephony platform and are not behind the admin
//! authentication middleware.

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::twilio;
use crate::state::AppState;

pub fn create_webhook_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/incoming-call",
            get(twilio::incoming_call).post(twilio::incoming_call),
        )
        .route("/twiml/transfer", post(twilio::transfer_twiml))
        .route("/twilio/number-status", post(twilio::number_status))
        .route("/twilio/dial-action", post(twilio::dial_action))
        .layer(TraceLayer::new_for_http())
}
