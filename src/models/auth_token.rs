use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An OAuth access/refresh token pair issued by a third-party identity provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds
    pub access_token_expires_at: i64,
    /// Unix seconds; 0 when the provider did not say
    pub refresh_token_expires_at: i64,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("access_token_expires_at", &self.access_token_expires_at)
            .field("refresh_token_expires_at", &self.refresh_token_expires_at)
            .finish()
    }
}

/// A token pair as persisted for one user and identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTokens {
    pub user_id: Uuid,
    pub idp: String,
    pub tokens: TokenPair,
    pub updated_at: DateTime<Utc>,
}
