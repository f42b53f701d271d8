use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{CreateRetentionAuditLog, OrgMember, OrgRole, RetentionCandidates, RetentionStatus},
};

/// Builds the audit entry for a purge once the deleted conversation count is known.
pub type PurgeAuditFn = dyn Fn(u64) -> CreateRetentionAuditLog + Send + Sync;

#[async_trait]
pub trait OrgMemberRepo: Send + Sync {
    async fn add(&self, org_id: Uuid, user_id: Uuid, role: OrgRole) -> DbResult<OrgMember>;
    async fn get(&self, org_id: Uuid, user_id: Uuid) -> DbResult<Option<OrgMember>>;
    async fn list_by_org(&self, org_id: Uuid) -> DbResult<Vec<OrgMember>>;

    /// Count members across all orgs grouped by retention status.
    async fn count_by_retention_status(&self) -> DbResult<Vec<(RetentionStatus, i64)>>;

    // ==================== Retention Operations ====================

    /// Members selected by a retention phase, oldest membership first.
    async fn list_retention_candidates(
        &self,
        org_id: Uuid,
        candidates: RetentionCandidates,
        limit: u32,
    ) -> DbResult<Vec<OrgMember>>;

    /// Most recent `last_updated_at` across the user's conversations in the org.
    async fn last_activity(&self, org_id: Uuid, user_id: Uuid)
    -> DbResult<Option<DateTime<Utc>>>;

    /// Move an active member to `retention_pending` and write the audit entry.
    ///
    /// Returns `false` without writing anything if the member is no longer active.
    async fn mark_retention_pending(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
        audit: CreateRetentionAuditLog,
    ) -> DbResult<bool>;

    /// Delete the member's conversations in the org, move the member to
    /// `retention_deleted`, and write the audit entry, all in one transaction.
    ///
    /// Returns the number of conversations deleted, or `None` if the member was
    /// no longer pending.
    async fn purge_member_data(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        audit: &PurgeAuditFn,
    ) -> DbResult<Option<u64>>;

    /// Return a pending member to `active` and write the audit entry.
    async fn recover(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        audit: CreateRetentionAuditLog,
    ) -> DbResult<bool>;
}
