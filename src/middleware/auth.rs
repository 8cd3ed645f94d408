use crate::errors::auth_error::AuthError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Authenticated client context inserted into request extensions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Auth {
    /// Identifier of the matched API secret, `None` when auth is disabled
    pub id: Option<String>,
}

impl Auth {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// Extract authentication token from request
///
/// Supports two token sources:
/// 1. Authorization header: `Authorization: Bearer <token>` (preferred)
/// 2. Query parameter: `?token=<token>`
fn extract_token(request: &Request) -> Result<String, AuthError> {
    if let Some(auth_header) = request.headers().get("authorization") {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            tracing::debug!("Token extracted from Authorization header");
            return Ok(token.to_string());
        }
        return Err(AuthError::InvalidAuthHeader);
    }

    if let Some(query) = request.uri().query() {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if key == "token" {
                tracing::debug!("Token extracted from query parameter");
                return Ok(value.to_string());
            }
        }
    }

    Err(AuthError::MissingAuthHeader)
}

/// Authentication middleware for the admin surface
///
/// When `auth_required` is off, an empty [`Auth`] is inserted and the
/// request passes through. Otherwise the bearer token is compared in
/// constant time against the configured API secrets and the matching
/// secret id is inserted as [`Auth`]; anything else is a 401.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if !state.config.auth_required {
        tracing::debug!("Authentication disabled, inserting empty Auth context");
        request.extensions_mut().insert(Auth::empty());
        return Ok(next.run(request).await);
    }

    let request_method = request.method().to_string();
    let request_path = request.uri().path().to_string();

    if !state.config.has_api_secret_auth() {
        return Err(AuthError::ConfigError(
            "Authentication required but no API secret configured".to_string(),
        ));
    }

    let token = extract_token(&request)?;

    match state.config.find_api_secret_id(&token) {
        Some(secret_id) => {
            tracing::info!(
                method = %request_method,
                path = %request_path,
                auth_id = %secret_id,
                "API secret authentication successful"
            );
            let auth = Auth::new(secret_id);
            request.extensions_mut().insert(auth);
            Ok(next.run(request).await)
        }
        None => {
            tracing::warn!(
                method = %request_method,
                path = %request_path,
                "API secret authentication failed: token mismatch"
            );
            Err(AuthError::Unauthorized("Invalid API secret".to_string()))
        }
    }
}
