use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::helpers::{SessionValidationError, extract_token_from_header, validate_session};
use crate::server::AppState;
use crate::types::{Session, User};

/// Extractor that requires an authenticated user session
pub struct RequireUser {
    pub session: Session,
    pub user: User,
}

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Token expired"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "data": null, "error": message });

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                "WWW-Authenticate",
                "Bearer realm=\"dossier\"".parse().unwrap(),
            );
        }

        response
    }
}

impl FromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        let raw_token = extract_token_from_header(auth_header)
            .map_err(|e| match e {
                SessionValidationError::InvalidScheme => AuthError::InvalidScheme,
                SessionValidationError::InvalidToken => AuthError::InvalidToken,
                _ => AuthError::InternalError,
            })?
            .ok_or(AuthError::MissingAuth)?;

        let validated = validate_session(state, &raw_token).map_err(|e| match e {
            SessionValidationError::InvalidScheme => AuthError::InvalidScheme,
            SessionValidationError::InvalidToken => AuthError::InvalidToken,
            SessionValidationError::TokenExpired => AuthError::TokenExpired,
            SessionValidationError::InternalError => AuthError::InternalError,
        })?;

        Ok(RequireUser {
            session: validated.session,
            user: validated.user,
        })
    }
}
