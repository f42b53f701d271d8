use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::{AppState, auth::Identity, auth::TokenRefreshGuard};

#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderTokenResponse {
    pub access_token: String,
    /// Unix seconds; 0 when the token does not expire
    pub access_token_expires_at: i64,
}

/// Return a usable access token for the caller at `idp`, refreshing it first
/// if it is about to expire.
#[tracing::instrument(skip(state, identity), fields(user_id = %identity.user_id))]
pub async fn get_provider_token(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(idp): Path<String>,
) -> Result<Json<ProviderTokenResponse>, ApiError> {
    let guard = TokenRefreshGuard::new(
        state.db.auth_tokens(),
        identity.user_id,
        &idp,
        &state.config.auth.token_refresh,
    );

    let tokens = guard
        .load_tokens(state.token_refresher.as_ref())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No tokens stored for provider '{}'", idp)))?;

    Ok(Json(ProviderTokenResponse {
        access_token: tokens.access_token,
        access_token_expires_at: tokens.access_token_expires_at,
    }))
}
