//! Race-safe loading of third-party OAuth tokens.
//!
//! Several processes may try to refresh the same stored token pair at once.
//! Providers that rotate refresh tokens reject every attempt but the first
//! with `invalid_grant`, so a loser must not treat that as fatal: it backs
//! off, re-reads the row and uses the pair the winner stored.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    config::TokenRefreshConfig,
    db::{AuthTokenRepo, DbError},
    models::TokenPair,
    observability::metrics,
};

/// Errors from a token endpoint.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("No OAuth provider configured for '{0}'")]
    UnknownProvider(String),

    #[error("Refresh token has expired")]
    RefreshTokenExpired,

    #[error("Token endpoint returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Token endpoint request failed: {0}")]
    Transport(String),

    #[error("Invalid token endpoint response: {0}")]
    InvalidResponse(String),
}

impl RefreshError {
    /// Whether the provider rejected the refresh token as already used or revoked.
    ///
    /// Reads the OAuth error code from a JSON body and falls back to a
    /// substring match for providers that answer with plain text.
    pub fn is_invalid_grant(&self) -> bool {
        let RefreshError::Upstream { body, .. } = self else {
            return false;
        };

        match serde_json::from_str::<serde_json::Value>(body) {
            Ok(value) if value.is_object() => value
                .get("error")
                .and_then(|e| e.as_str())
                .is_some_and(|code| code == "invalid_grant"),
            _ => body.contains("invalid_grant"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenRefreshError {
    #[error("Token refresh for {idp} lost to concurrent refreshes after {attempts} attempts")]
    Race { idp: String, attempts: u32 },

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

/// Refreshes a token pair when it is about to expire.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Returns `Ok(None)` when `tokens` are still fresh.
    async fn refresh(&self, idp: &str, tokens: &TokenPair)
    -> Result<Option<TokenPair>, RefreshError>;
}

/// Loads one user's tokens for one identity provider, refreshing under a lock.
pub struct TokenRefreshGuard {
    repo: Arc<dyn AuthTokenRepo>,
    user_id: Uuid,
    idp: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl TokenRefreshGuard {
    pub fn new(
        repo: Arc<dyn AuthTokenRepo>,
        user_id: Uuid,
        idp: impl Into<String>,
        config: &TokenRefreshConfig,
    ) -> Self {
        Self {
            repo,
            user_id,
            idp: idp.into(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
        }
    }

    /// Return the current token pair, refreshing it first if needed.
    ///
    /// Returns `Ok(None)` if no tokens are stored for this user and provider.
    pub async fn load_tokens(
        &self,
        refresher: &dyn TokenRefresher,
    ) -> Result<Option<TokenPair>, TokenRefreshError> {
        for attempt in 1..=self.max_retries {
            let Some(locked) = self.repo.lock(self.user_id, &self.idp).await? else {
                return Ok(None);
            };
            let current = locked.current().tokens.clone();

            match refresher.refresh(&self.idp, &current).await {
                Ok(Some(refreshed)) => {
                    let stored = locked.store(&refreshed).await?;
                    metrics::record_token_refresh(&self.idp, "refreshed");
                    tracing::debug!(
                        user_id = %self.user_id,
                        idp = %self.idp,
                        "Refreshed third-party tokens"
                    );
                    return Ok(Some(stored.tokens));
                }
                Ok(None) => {
                    locked.release().await?;
                    metrics::record_token_refresh(&self.idp, "not_needed");
                    return Ok(Some(current));
                }
                Err(e) if e.is_invalid_grant() => {
                    // Release before sleeping so the winner can commit
                    locked.release().await?;
                    tracing::warn!(
                        user_id = %self.user_id,
                        idp = %self.idp,
                        attempt,
                        max_retries = self.max_retries,
                        "Refresh token rejected, checking for a concurrent refresh"
                    );
                    tokio::time::sleep(self.retry_delay).await;

                    if let Some(latest) = self.repo.get(self.user_id, &self.idp).await?
                        && latest.tokens.refresh_token != current.refresh_token
                    {
                        tracing::info!(
                            user_id = %self.user_id,
                            idp = %self.idp,
                            "Using tokens refreshed by another process"
                        );
                        metrics::record_token_refresh(&self.idp, "race_recovered");
                        return Ok(Some(latest.tokens));
                    }
                }
                Err(e) => {
                    locked.release().await?;
                    metrics::record_token_refresh(&self.idp, "error");
                    return Err(e.into());
                }
            }
        }

        metrics::record_token_refresh(&self.idp, "race");
        tracing::error!(
            user_id = %self.user_id,
            idp = %self.idp,
            attempts = self.max_retries,
            "Giving up on token refresh after repeated invalid_grant responses"
        );
        Err(TokenRefreshError::Race {
            idp: self.idp.clone(),
            attempts: self.max_retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            Mutex,
            atomic::{AtomicU32, Ordering},
        },
    };

    use chrono::Utc;

    use super::*;
    use crate::{
        db::{DbResult, LockedTokens, sqlite::SqliteAuthTokenRepo, tests::harness},
        models::StoredTokens,
    };

    type Rows = Arc<Mutex<HashMap<(Uuid, String), StoredTokens>>>;

    /// In-memory token store; "another process" can write through the shared rows.
    #[derive(Clone, Default)]
    struct MemoryTokenRepo {
        rows: Rows,
    }

    impl MemoryTokenRepo {
        fn seed(&self, user_id: Uuid, idp: &str, tokens: TokenPair) {
            self.rows.lock().unwrap().insert(
                (user_id, idp.to_string()),
                StoredTokens {
                    user_id,
                    idp: idp.to_string(),
                    tokens,
                    updated_at: Utc::now(),
                },
            );
        }

        fn current(&self, user_id: Uuid, idp: &str) -> TokenPair {
            self.rows.lock().unwrap()[&(user_id, idp.to_string())]
                .tokens
                .clone()
        }
    }

    struct MemoryLocked {
        rows: Rows,
        current: StoredTokens,
    }

    #[async_trait]
    impl LockedTokens for MemoryLocked {
        fn current(&self) -> &StoredTokens {
            &self.current
        }

        async fn store(self: Box<Self>, tokens: &TokenPair) -> DbResult<StoredTokens> {
            let stored = StoredTokens {
                tokens: tokens.clone(),
                ..self.current.clone()
            };
            self.rows.lock().unwrap().insert(
                (stored.user_id, stored.idp.clone()),
                stored.clone(),
            );
            Ok(stored)
        }

        async fn release(self: Box<Self>) -> DbResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl AuthTokenRepo for MemoryTokenRepo {
        async fn get(&self, user_id: Uuid, idp: &str) -> DbResult<Option<StoredTokens>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .get(&(user_id, idp.to_string()))
                .cloned())
        }

        async fn upsert(
            &self,
            user_id: Uuid,
            idp: &str,
            tokens: &TokenPair,
        ) -> DbResult<StoredTokens> {
            self.seed(user_id, idp, tokens.clone());
            Ok(self.get(user_id, idp).await?.unwrap())
        }

        async fn lock(
            &self,
            user_id: Uuid,
            idp: &str,
        ) -> DbResult<Option<Box<dyn LockedTokens>>> {
            Ok(self.get(user_id, idp).await?.map(|current| {
                Box::new(MemoryLocked {
                    rows: self.rows.clone(),
                    current,
                }) as Box<dyn LockedTokens>
            }))
        }
    }

    /// Refresher driven by a closure, counting its calls.
    struct FnRefresher<F> {
        calls: AtomicU32,
        f: F,
    }

    impl<F> FnRefresher<F>
    where
        F: Fn(u32, &TokenPair) -> Result<Option<TokenPair>, RefreshError> + Send + Sync,
    {
        fn new(f: F) -> Self {
            Self {
                calls: AtomicU32::new(0),
                f,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl<F> TokenRefresher for FnRefresher<F>
    where
        F: Fn(u32, &TokenPair) -> Result<Option<TokenPair>, RefreshError> + Send + Sync,
    {
        async fn refresh(
            &self,
            _idp: &str,
            tokens: &TokenPair,
        ) -> Result<Option<TokenPair>, RefreshError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            (self.f)(call, tokens)
        }
    }

    fn pair(access: &str, refresh: &str) -> TokenPair {
        TokenPair {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            access_token_expires_at: 1000,
            refresh_token_expires_at: 2000,
        }
    }

    fn invalid_grant() -> RefreshError {
        RefreshError::Upstream {
            status: 400,
            body: r#"{"error": "invalid_grant", "error_description": "grant is invalid"}"#
                .to_string(),
        }
    }

    fn guard(repo: Arc<dyn AuthTokenRepo>, user_id: Uuid) -> TokenRefreshGuard {
        TokenRefreshGuard::new(repo, user_id, "gitlab", &TokenRefreshConfig::default())
    }

    #[test]
    fn test_invalid_grant_detection() {
        assert!(invalid_grant().is_invalid_grant());
        assert!(
            RefreshError::Upstream {
                status: 400,
                body: "error=invalid_grant".to_string()
            }
            .is_invalid_grant()
        );
        assert!(
            !RefreshError::Upstream {
                status: 500,
                body: r#"{"error": "server_error"}"#.to_string()
            }
            .is_invalid_grant()
        );
        // A JSON body naming invalid_grant only in the description is another error
        assert!(
            !RefreshError::Upstream {
                status: 400,
                body: r#"{"error": "invalid_request", "error_description": "not invalid_grant"}"#
                    .to_string()
            }
            .is_invalid_grant()
        );
        assert!(!RefreshError::Transport("invalid_grant".to_string()).is_invalid_grant());
    }

    #[tokio::test]
    async fn test_no_stored_tokens_returns_none() {
        let repo = MemoryTokenRepo::default();
        let refresher = FnRefresher::new(|_, _| Ok(None));

        let result = guard(Arc::new(repo), Uuid::new_v4())
            .load_tokens(&refresher)
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn test_fresh_tokens_returned_unchanged() {
        let repo = MemoryTokenRepo::default();
        let user_id = Uuid::new_v4();
        repo.seed(user_id, "gitlab", pair("a1", "r1"));
        let refresher = FnRefresher::new(|_, _| Ok(None));

        let result = guard(Arc::new(repo), user_id)
            .load_tokens(&refresher)
            .await
            .unwrap();

        assert_eq!(result, Some(pair("a1", "r1")));
    }

    #[tokio::test]
    async fn test_refreshed_tokens_are_stored() {
        let repo = MemoryTokenRepo::default();
        let user_id = Uuid::new_v4();
        repo.seed(user_id, "gitlab", pair("a1", "r1"));
        let refresher = FnRefresher::new(|_, _| Ok(Some(pair("a2", "r2"))));

        let result = guard(Arc::new(repo.clone()), user_id)
            .load_tokens(&refresher)
            .await
            .unwrap();

        assert_eq!(result, Some(pair("a2", "r2")));
        assert_eq!(repo.current(user_id, "gitlab"), pair("a2", "r2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_grant_uses_tokens_rotated_by_another_process() {
        let repo = MemoryTokenRepo::default();
        let user_id = Uuid::new_v4();
        repo.seed(user_id, "gitlab", pair("a1", "r1"));

        let other = repo.clone();
        let refresher = FnRefresher::new(move |_, _| {
            // Another pod wins the refresh while our request is in flight
            other.seed(user_id, "gitlab", pair("a2", "r2"));
            Err(invalid_grant())
        });

        let start = tokio::time::Instant::now();
        let result = guard(Arc::new(repo), user_id)
            .load_tokens(&refresher)
            .await
            .unwrap();

        assert_eq!(result, Some(pair("a2", "r2")));
        assert_eq!(refresher.calls(), 1);
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_seen_on_a_later_retry() {
        let repo = MemoryTokenRepo::default();
        let user_id = Uuid::new_v4();
        repo.seed(user_id, "gitlab", pair("a1", "r1"));

        let other = repo.clone();
        let refresher = FnRefresher::new(move |call, _| {
            if call == 2 {
                other.seed(user_id, "gitlab", pair("a3", "r3"));
            }
            Err(invalid_grant())
        });

        let result = guard(Arc::new(repo), user_id)
            .load_tokens(&refresher)
            .await
            .unwrap();

        assert_eq!(result, Some(pair("a3", "r3")));
        assert_eq!(refresher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_race_error_after_max_retries() {
        let repo = MemoryTokenRepo::default();
        let user_id = Uuid::new_v4();
        repo.seed(user_id, "gitlab", pair("a1", "r1"));
        let refresher = FnRefresher::new(|_, _| Err(invalid_grant()));

        let start = tokio::time::Instant::now();
        let err = guard(Arc::new(repo), user_id)
            .load_tokens(&refresher)
            .await
            .unwrap_err();

        assert!(matches!(err, TokenRefreshError::Race { attempts: 3, .. }));
        assert_eq!(refresher.calls(), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_other_errors_propagate_without_retry() {
        let repo = MemoryTokenRepo::default();
        let user_id = Uuid::new_v4();
        repo.seed(user_id, "gitlab", pair("a1", "r1"));
        let refresher = FnRefresher::new(|_, _| {
            Err(RefreshError::Upstream {
                status: 500,
                body: r#"{"error": "server_error"}"#.to_string(),
            })
        });

        let err = guard(Arc::new(repo), user_id)
            .load_tokens(&refresher)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TokenRefreshError::Refresh(RefreshError::Upstream { status: 500, .. })
        ));
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_lock_store_and_release() {
        let repo: Arc<dyn AuthTokenRepo> = Arc::new(SqliteAuthTokenRepo::new(
            harness::create_migrated_pool().await,
        ));
        let user_id = Uuid::new_v4();
        repo.upsert(user_id, "gitlab", &pair("a1", "r1")).await.unwrap();

        let config = TokenRefreshConfig {
            max_retries: 2,
            retry_delay_ms: 1,
        };
        let guard = TokenRefreshGuard::new(repo.clone(), user_id, "gitlab", &config);

        let rejecting = FnRefresher::new(|_, _| Err(invalid_grant()));
        assert!(matches!(
            guard.load_tokens(&rejecting).await,
            Err(TokenRefreshError::Race { attempts: 2, .. })
        ));

        let refreshing = FnRefresher::new(|_, _| Ok(Some(pair("a2", "r2"))));
        let result = guard.load_tokens(&refreshing).await.unwrap();
        assert_eq!(result, Some(pair("a2", "r2")));
        assert_eq!(
            repo.get(user_id, "gitlab").await.unwrap().unwrap().tokens,
            pair("a2", "r2")
        );
    }
}
