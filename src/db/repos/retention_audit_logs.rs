use async_trait::async_trait;
use uuid::Uuid;

use super::ListResult;
use crate::{
    db::error::DbResult,
    models::{CreateRetentionAuditLog, RetentionAuditLogEntry, RetentionAuditLogQuery},
};

/// Append-only store: entries are never updated or deleted.
#[async_trait]
pub trait RetentionAuditLogRepo: Send + Sync {
    async fn create(&self, input: CreateRetentionAuditLog) -> DbResult<RetentionAuditLogEntry>;
    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<RetentionAuditLogEntry>>;

    /// List entries newest first using offset pagination.
    async fn list(
        &self,
        query: RetentionAuditLogQuery,
    ) -> DbResult<ListResult<RetentionAuditLogEntry>>;

    /// Count entries matching the query (ignores pagination parameters)
    async fn count(&self, query: RetentionAuditLogQuery) -> DbResult<i64>;
}
