use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{AuthError, RefreshError, TokenRefreshError},
    db::DbError,
    integrations::TooManyWaitingError,
};

/// Standard error response body: `{"error": {"code": ..., "message": ...}}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorInfo {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Conflict(String),
    Validation(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    /// The payload was understood but is missing required data
    Unprocessable(String),
    /// An upstream identity provider failed
    BadGateway(String),
    Unavailable(String),
    Database(DbError),
    Internal(String),
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => ApiError::NotFound("Resource not found".to_string()),
            DbError::Conflict(msg) => ApiError::Conflict(msg),
            DbError::Validation(msg) => ApiError::Validation(msg),
            _ => ApiError::Database(err),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingIdentity | AuthError::InvalidIdentity => {
                ApiError::Unauthorized(err.to_string())
            }
            AuthError::Forbidden(msg) => ApiError::Forbidden(msg),
            AuthError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<TokenRefreshError> for ApiError {
    fn from(err: TokenRefreshError) -> Self {
        match err {
            TokenRefreshError::Race { .. } => ApiError::Conflict(err.to_string()),
            TokenRefreshError::Refresh(RefreshError::UnknownProvider(idp)) => {
                ApiError::NotFound(format!("Identity provider '{}' is not configured", idp))
            }
            TokenRefreshError::Refresh(e) => {
                tracing::warn!(error = %e, "Provider token refresh failed");
                ApiError::BadGateway(e.to_string())
            }
            TokenRefreshError::Database(e) => ApiError::Database(e),
        }
    }
}

impl From<TooManyWaitingError> for ApiError {
    fn from(err: TooManyWaitingError) -> Self {
        ApiError::Unavailable(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            ApiError::Unprocessable(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unprocessable", msg)
            }
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "upstream_error", msg),
            ApiError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
            ApiError::Database(err) => {
                tracing::error!(error = %err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "An internal database error occurred".to_string(),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_error_mapping() {
        assert!(matches!(ApiError::from(DbError::NotFound), ApiError::NotFound(_)));
        assert!(matches!(
            ApiError::from(DbError::Conflict("dup".into())),
            ApiError::Conflict(msg) if msg == "dup"
        ));
        assert!(matches!(
            ApiError::from(DbError::Internal("boom".into())),
            ApiError::Database(_)
        ));
    }

    #[test]
    fn test_token_refresh_error_mapping() {
        let race = TokenRefreshError::Race {
            idp: "gitlab".into(),
            attempts: 3,
        };
        assert_eq!(ApiError::from(race).into_response().status(), StatusCode::CONFLICT);

        let upstream = TokenRefreshError::Refresh(RefreshError::Upstream {
            status: 500,
            body: "oops".into(),
        });
        assert_eq!(
            ApiError::from(upstream).into_response().status(),
            StatusCode::BAD_GATEWAY
        );

        let unknown = TokenRefreshError::Refresh(RefreshError::UnknownProvider("x".into()));
        assert_eq!(
            ApiError::from(unknown).into_response().status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError::Forbidden("nope".into()).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"error": {"code": "forbidden", "message": "nope"}})
        );
    }
}
