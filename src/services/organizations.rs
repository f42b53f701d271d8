use std::sync::Arc;

use uuid::Uuid;

use crate::{
    db::{DbError, DbPool, DbResult, ListResult},
    models::{
        CreateOrganization, OrgMember, Organization, RetentionAuditLogEntry,
        RetentionAuditLogQuery, UpdateOrganization,
    },
};

/// Service layer for organization operations
#[derive(Clone)]
pub struct OrganizationService {
    db: Arc<DbPool>,
}

impl OrganizationService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Create an organization owned by `owner_id`
    pub async fn create(&self, input: CreateOrganization, owner_id: Uuid) -> DbResult<Organization> {
        let org = self
            .db
            .organizations()
            .create_with_owner(input, owner_id)
            .await?;
        tracing::info!(org_id = %org.id, owner_id = %owner_id, "Organization created");
        Ok(org)
    }

    pub async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Organization>> {
        self.db.organizations().get_by_id(id).await
    }

    /// The caller's membership in the org, if any
    pub async fn membership(&self, org_id: Uuid, user_id: Uuid) -> DbResult<Option<OrgMember>> {
        self.db.org_members().get(org_id, user_id).await
    }

    pub async fn update(&self, id: Uuid, input: UpdateOrganization) -> DbResult<Organization> {
        let org = self.db.organizations().update(id, input).await?;
        tracing::info!(
            org_id = %org.id,
            conversation_expiration = ?org.conversation_expiration,
            inactive_user_retention_days = ?org.inactive_user_retention_days,
            inactive_user_grace_period_days = ?org.inactive_user_grace_period_days,
            "Organization updated"
        );
        Ok(org)
    }

    /// Delete an organization with its members and conversations, returning
    /// the organization as it was.
    pub async fn delete(&self, id: Uuid) -> DbResult<Organization> {
        let organizations = self.db.organizations();
        let org = organizations.get_by_id(id).await?.ok_or(DbError::NotFound)?;
        organizations.delete_with_cleanup(id).await?;
        tracing::info!(org_id = %id, "Organization deleted");
        Ok(org)
    }

    /// Retention audit entries for one organization, newest first
    pub async fn retention_audit_logs(
        &self,
        org_id: Uuid,
        mut query: RetentionAuditLogQuery,
    ) -> DbResult<(ListResult<RetentionAuditLogEntry>, i64)> {
        query.org_id = Some(org_id);
        let repo = self.db.retention_audit_logs();
        let total = repo.count(query.clone()).await?;
        let page = repo.list(query).await?;
        Ok((page, total))
    }
}
