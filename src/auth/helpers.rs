use std::sync::Arc;

use chrono::Utc;

use super::{CredentialHasher, token_lookup};
use crate::server::AppState;
use crate::types::{Session, User};

#[derive(Debug)]
pub enum SessionValidationError {
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    InternalError,
}

pub struct ValidatedSession {
    pub session: Session,
    pub user: User,
}

/// Extracts a token string from a Basic auth header.
/// Expects format: Basic base64(x-token:actual_token)
pub fn extract_basic_auth_token(header: &str) -> Option<String> {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    let (username, password) = credentials.split_once(':')?;

    if username != "x-token" {
        return None;
    }

    Some(password.to_string())
}

/// Validates a raw bearer token against the session store.
/// Returns the session and the user it belongs to.
pub fn validate_session(
    state: &Arc<AppState>,
    raw_token: &str,
) -> Result<ValidatedSession, SessionValidationError> {
    let lookup = token_lookup(raw_token).map_err(|_| SessionValidationError::InvalidToken)?;

    let session = state
        .store
        .get_session_by_lookup(&lookup)
        .map_err(|_| SessionValidationError::InternalError)?
        .ok_or(SessionValidationError::InvalidToken)?;

    let hasher = CredentialHasher::new();
    if !hasher
        .verify(raw_token, &session.token_hash)
        .map_err(|_| SessionValidationError::InternalError)?
    {
        return Err(SessionValidationError::InvalidToken);
    }

    if session.expires_at < Utc::now() {
        return Err(SessionValidationError::TokenExpired);
    }

    let user = state
        .store
        .get_user(&session.user_id)
        .map_err(|_| SessionValidationError::InternalError)?
        .ok_or(SessionValidationError::InvalidToken)?;

    if let Err(e) = state.store.update_session_last_used(&session.id) {
        tracing::warn!("Failed to update session last_used_at: {e}");
    }

    Ok(ValidatedSession { session, user })
}

/// Extracts token from Authorization header (Bearer or Basic).
/// Returns None if no auth header is present.
/// Returns Some(token_string) if auth header is present and valid format.
/// Returns Err if the auth scheme is unsupported.
pub fn extract_token_from_header(
    auth_header: Option<&str>,
) -> Result<Option<String>, SessionValidationError> {
    match auth_header {
        Some(header) if header.starts_with("Bearer ") => {
            Ok(Some(header.strip_prefix("Bearer ").unwrap().to_string()))
        }
        Some(header) if header.starts_with("Basic ") => extract_basic_auth_token(header)
            .ok_or(SessionValidationError::InvalidToken)
            .map(Some),
        Some(_) => Err(SessionValidationError::InvalidScheme),
        None => Ok(None),
    }
}
