use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{StoredTokens, TokenPair},
};

/// A token row held under a write lock until stored or released.
#[async_trait]
pub trait LockedTokens: Send {
    fn current(&self) -> &StoredTokens;

    /// Replace the token pair and commit, releasing the lock.
    async fn store(self: Box<Self>, tokens: &TokenPair) -> DbResult<StoredTokens>;

    /// Release the lock without changes.
    async fn release(self: Box<Self>) -> DbResult<()>;
}

#[async_trait]
pub trait AuthTokenRepo: Send + Sync {
    async fn get(&self, user_id: Uuid, idp: &str) -> DbResult<Option<StoredTokens>>;
    async fn upsert(&self, user_id: Uuid, idp: &str, tokens: &TokenPair)
    -> DbResult<StoredTokens>;

    /// Read the row for update. Returns `None` (and holds no lock) when absent.
    async fn lock(&self, user_id: Uuid, idp: &str) -> DbResult<Option<Box<dyn LockedTokens>>>;
}
