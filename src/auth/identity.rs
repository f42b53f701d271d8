use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use super::AuthError;
use crate::{AppState, config::AuthConfig};

/// The user making a request, as asserted by the reverse proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
}

impl Identity {
    /// Read the identity from the configured proxy headers.
    pub fn from_headers(headers: &HeaderMap, config: &AuthConfig) -> Result<Self, AuthError> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let user_id = header(&config.identity_header).ok_or(AuthError::MissingIdentity)?;
        let email = header(&config.email_header).ok_or(AuthError::MissingIdentity)?;
        let user_id = Uuid::parse_str(user_id).map_err(|_| AuthError::InvalidIdentity)?;

        Ok(Self {
            user_id,
            email: email.to_string(),
        })
    }

    /// Require an email in the configured admin domain.
    pub fn require_admin(&self, config: &AuthConfig) -> Result<(), AuthError> {
        if config.is_admin_email(&self.email) {
            return Ok(());
        }
        let domain = config.admin_email_domain.as_deref().unwrap_or_default();
        Err(AuthError::Forbidden(format!(
            "Organization administration requires an email address in {}",
            domain.trim_start_matches('@')
        )))
    }
}

/// Middleware that authenticates the request from proxy headers.
///
/// On success the caller is recorded as a user and the [`Identity`] is made
/// available to handlers as a request extension.
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let identity = Identity::from_headers(req.headers(), &state.config.auth)?;

    state
        .db
        .users()
        .upsert(identity.user_id, &identity.email)
        .await
        .map_err(|e| AuthError::Internal(format!("Failed to record user: {}", e)))?;

    tracing::debug!(user_id = %identity.user_id, "Request authenticated");

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
