use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{CreateOrganization, Organization, UpdateOrganization},
};

#[async_trait]
pub trait OrganizationRepo: Send + Sync {
    /// Create an organization and its owner membership in one transaction.
    ///
    /// Returns `DbError::Conflict` if the name is taken.
    async fn create_with_owner(
        &self,
        input: CreateOrganization,
        owner_id: Uuid,
    ) -> DbResult<Organization>;
    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Organization>>;
    async fn get_by_name(&self, name: &str) -> DbResult<Option<Organization>>;
    async fn count(&self) -> DbResult<i64>;
    async fn update(&self, id: Uuid, input: UpdateOrganization) -> DbResult<Organization>;

    /// Hard-delete an organization with its members and conversations.
    async fn delete_with_cleanup(&self, id: Uuid) -> DbResult<()>;

    // ==================== Retention Operations ====================

    /// Organizations with an inactive-user retention or grace period configured.
    async fn list_with_inactive_user_policy(&self) -> DbResult<Vec<Organization>>;

    /// Organizations with `conversation_expiration > 0`.
    async fn list_with_conversation_expiration(&self) -> DbResult<Vec<Organization>>;
}
