//! services/api/src/web/auth.rs
//!
//! Account endpoints: signup, login, logout, and the current-user lookup.
//! Sessions are opaque ids stored server-side and carried in an HttpOnly cookie.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Duration, Utc};
use mangashelf_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::middleware::{session_id, SESSION_COOKIE};
use crate::web::state::AppState;

const SESSION_DAYS: i64 = 30;
const MIN_PASSWORD_CHARS: usize = 8;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn normalize_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(ApiError::BadRequest("A valid email address is required".to_string())),
    }
}

fn session_cookie(value: &str, max_age_secs: i64) -> String {
    format!("{SESSION_COOKIE}={value}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={max_age_secs}")
}

/// Opens a new auth session for `user_id` and returns its `Set-Cookie` value.
async fn open_session(state: &AppState, user_id: Uuid) -> Result<String, ApiError> {
    let auth_session_id = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::days(SESSION_DAYS);
    state
        .users
        .create_auth_session(&auth_session_id, user_id, expires_at)
        .await?;
    Ok(session_cookie(
        &auth_session_id,
        Duration::days(SESSION_DAYS).num_seconds(),
    ))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Create a new account and log it in.
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid email or password too short"),
        (status = 409, description = "Email already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email)?;
    if req.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(format!("Failed to hash password: {e}")))?
        .to_string();

    let user = state
        .users
        .create_user_with_email(&email, &password_hash)
        .await?;
    let cookie = open_session(&state, user.user_id).await?;
    info!(user_id = %user.user_id, "account created");

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            user_id: user.user_id,
            email: user.email,
        }),
    ))
}

/// Log in with an existing account.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    let credentials = match state.users.get_user_by_email(&email).await {
        Ok(found) => found,
        Err(PortError::NotFound(_)) => return Err(ApiError::Unauthorized),
        Err(e) => return Err(e.into()),
    };

    let parsed_hash = PasswordHash::new(&credentials.hashed_password)
        .map_err(|e| ApiError::Internal(format!("Stored password hash is invalid: {e}")))?;
    if Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        warn!(user_id = %credentials.user_id, "failed login attempt");
        return Err(ApiError::Unauthorized);
    }

    let cookie = open_session(&state, credentials.user_id).await?;
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            user_id: credentials.user_id,
            email: credentials.email,
        }),
    ))
}

/// Log out and invalidate the current session.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let auth_session_id = session_id(&headers).ok_or(ApiError::Unauthorized)?;
    state.users.delete_auth_session(auth_session_id).await?;

    Ok((StatusCode::OK, [(header::SET_COOKIE, session_cookie("", 0))]))
}

/// The account behind the current session.
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "The logged-in user", body = MeResponse),
        (status = 401, description = "Missing or expired session")
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<MeResponse>, ApiError> {
    let user = state.users.get_user_by_id(user_id).await?;
    Ok(Json(MeResponse {
        user_id: user.user_id,
        email: user.email,
        created_at: user.created_at,
    }))
}
