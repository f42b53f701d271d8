use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{Conversation, CreateConversation},
};

#[async_trait]
pub trait ConversationRepo: Send + Sync {
    /// Insert the primary metadata row and its org-scoped shadow row.
    async fn create(&self, input: CreateConversation) -> DbResult<Conversation>;
    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Conversation>>;

    /// Record activity on a conversation.
    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> DbResult<()>;

    async fn count_by_org(&self, org_id: Uuid) -> DbResult<i64>;
    async fn count(&self) -> DbResult<i64>;

    // ==================== Retention Operations ====================

    /// Conversations in the org last updated strictly before `cutoff`, oldest first.
    async fn list_expired(
        &self,
        org_id: Uuid,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> DbResult<Vec<Conversation>>;

    /// Delete the primary and shadow rows in one transaction.
    ///
    /// Returns `false` if the conversation did not exist.
    async fn delete(&self, id: Uuid) -> DbResult<bool>;
}
