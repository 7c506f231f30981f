use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::{CredentialHasher, RequireUser};
use crate::server::AppState;
use crate::server::dto::{LoginRequest, RegisterRequest, TokenResponse};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::server::validation::{validate_password, validate_username};
use crate::types::{Session, User};

const SESSION_TTL_MINUTES: i64 = 60;

pub async fn register_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    validate_username(&req.username)?;
    validate_password(&req.password, &req.check_password)?;

    if store
        .get_user_by_username(&req.username)
        .api_err("Failed to check username")?
        .is_some()
    {
        return Err(ApiError::conflict(format!(
            "Username '{}' already in use",
            req.username
        )));
    }

    let hasher = CredentialHasher::new();
    let password_hash = hasher
        .hash(&req.password)
        .api_err("Failed to hash password")?;

    let user = User {
        id: Uuid::new_v4().to_string(),
        username: req.username,
        password_hash,
        created_at: Utc::now(),
    };

    // The unique index on username is the final authority under races
    store.create_user(&user).api_err("Failed to create user")?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

pub async fn logout(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    state
        .store
        .delete_session(&auth.session.id)
        .api_err("Failed to delete session")?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    if req.username.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Missing username or password"));
    }

    let hasher = CredentialHasher::new();

    // Verification failure is an empty result, not an error; both unknown
    // username and wrong password collapse into the same 401
    let user = store
        .get_user_by_username(&req.username)
        .api_err("Failed to look up user")?;

    let verified = match &user {
        Some(user) => hasher
            .verify(&req.password, &user.password_hash)
            .api_err("Failed to verify password")?,
        None => false,
    };

    let Some(user) = user.filter(|_| verified) else {
        return Err(ApiError::unauthorized("Incorrect username or password"));
    };

    let token = hasher
        .issue_session_token()
        .api_err("Failed to issue token")?;
    let now = Utc::now();
    let session = Session {
        id: Uuid::new_v4().to_string(),
        token_hash: token.hash,
        token_lookup: token.lookup,
        user_id: user.id,
        created_at: now,
        expires_at: now + Duration::minutes(SESSION_TTL_MINUTES),
        last_used_at: None,
    };

    store
        .create_session(&session)
        .api_err("Failed to create session")?;

    // Opportunistic cleanup; a failure here must not fail the login
    if let Err(e) = store.delete_expired_sessions() {
        tracing::warn!("Failed to purge expired sessions: {e}");
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(TokenResponse {
        access_token: token.raw,
        token_type: "bearer",
        expires_at: session.expires_at,
    })))
}
