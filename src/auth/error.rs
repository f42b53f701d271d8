use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::routes::ErrorResponse;

#[derive(Debug)]
pub enum AuthError {
    /// Required identity header missing
    MissingIdentity,

    /// Identity header present but not a valid user id
    InvalidIdentity,

    /// Access forbidden (e.g., email domain not allowed)
    Forbidden(String),

    /// Internal error during authentication
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AuthError::MissingIdentity => (
                StatusCode::UNAUTHORIZED,
                "missing_identity",
                "Identity header required",
            ),
            AuthError::InvalidIdentity => (
                StatusCode::UNAUTHORIZED,
                "invalid_identity",
                "Invalid identity header",
            ),
            AuthError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.as_str()),
            AuthError::Internal(msg) => {
                tracing::error!(error = %msg, "Authentication failed internally");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred",
                )
            }
        };

        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingIdentity => write!(f, "Identity header required"),
            AuthError::InvalidIdentity => write!(f, "Invalid identity header"),
            AuthError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AuthError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}
