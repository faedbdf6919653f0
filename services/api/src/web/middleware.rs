//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::error::ApiError;
use crate::web::state::AppState;

pub const SESSION_COOKIE: &str = "session";

/// Pulls the auth session id out of the `Cookie` header, if any.
pub fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then_some(value)
        })
}

/// Validates the session cookie and stores the owning user id in the request
/// extensions. Missing, unknown, or expired sessions get a 401.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_session_id = session_id(req.headers()).ok_or(ApiError::Unauthorized)?;

    let user_id = state
        .users
        .validate_auth_session(auth_session_id)
        .await
        .map_err(|e| {
            debug!(error = %e, "rejected auth session");
            ApiError::Unauthorized
        })?;

    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}
