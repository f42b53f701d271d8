use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use super::{RefreshError, TokenRefresher};
use crate::{config::OAuthProviderConfig, models::TokenPair};

/// Token endpoint response (RFC 6749 section 5.1).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    /// Non-standard, returned by GitLab and Keycloak
    #[serde(default)]
    refresh_token_expires_in: Option<i64>,
}

/// Refreshes tokens against each provider's OAuth token endpoint.
pub struct OAuthTokenRefresher {
    http_client: reqwest::Client,
    providers: HashMap<String, OAuthProviderConfig>,
}

impl OAuthTokenRefresher {
    pub fn new(http_client: reqwest::Client, providers: HashMap<String, OAuthProviderConfig>) -> Self {
        Self {
            http_client,
            providers,
        }
    }
}

#[async_trait]
impl TokenRefresher for OAuthTokenRefresher {
    async fn refresh(
        &self,
        idp: &str,
        tokens: &TokenPair,
    ) -> Result<Option<TokenPair>, RefreshError> {
        let provider = self
            .providers
            .get(idp)
            .ok_or_else(|| RefreshError::UnknownProvider(idp.to_string()))?;

        let now = Utc::now().timestamp();
        // 0 means the provider issued a non-expiring access token
        if tokens.access_token_expires_at == 0
            || tokens.access_token_expires_at > now + provider.refresh_leeway_secs
        {
            return Ok(None);
        }
        if tokens.refresh_token_expires_at != 0 && tokens.refresh_token_expires_at <= now {
            return Err(RefreshError::RefreshTokenExpired);
        }

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", tokens.refresh_token.as_str()),
            ("client_id", provider.client_id.as_str()),
        ];
        if let Some(secret) = &provider.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self
            .http_client
            .post(&provider.token_url)
            .form(&form)
            .timeout(provider.timeout())
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(idp, status = %status, "Token endpoint rejected refresh");
            return Err(RefreshError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;

        Ok(Some(TokenPair {
            access_token: body.access_token,
            refresh_token: body
                .refresh_token
                .unwrap_or_else(|| tokens.refresh_token.clone()),
            access_token_expires_at: body.expires_in.map(|secs| now + secs).unwrap_or(0),
            refresh_token_expires_at: body
                .refresh_token_expires_in
                .map(|secs| now + secs)
                .unwrap_or(tokens.refresh_token_expires_at),
        }))
    }
}
