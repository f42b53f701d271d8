use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::common::{insert_retention_audit_log, retention_audit_log_from_row};
use crate::{
    db::{
        error::DbResult,
        repos::{ListResult, RetentionAuditLogRepo},
    },
    models::{CreateRetentionAuditLog, RetentionAuditLogEntry, RetentionAuditLogQuery},
};

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

pub struct SqliteRetentionAuditLogRepo {
    pool: SqlitePool,
}

impl SqliteRetentionAuditLogRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Build the WHERE clause and its bind values for a query.
    fn filters(query: &RetentionAuditLogQuery) -> (String, Vec<String>) {
        let mut conditions = Vec::new();
        let mut binds = Vec::new();

        if let Some(org_id) = query.org_id {
            conditions.push("org_id = ?");
            binds.push(org_id.to_string());
        }
        if let Some(user_id) = query.user_id {
            conditions.push("user_id = ?");
            binds.push(user_id.to_string());
        }
        if let Some(action) = query.action {
            conditions.push("action = ?");
            binds.push(action.as_str().to_string());
        }

        let clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        (clause, binds)
    }
}

#[async_trait]
impl RetentionAuditLogRepo for SqliteRetentionAuditLogRepo {
    async fn create(&self, input: CreateRetentionAuditLog) -> DbResult<RetentionAuditLogEntry> {
        let mut conn = self.pool.acquire().await?;
        insert_retention_audit_log(&mut conn, input, Utc::now()).await
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<RetentionAuditLogEntry>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, org_id, action, data_scope, triggered_by, details, created_at
            FROM retention_audit_log
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(retention_audit_log_from_row).transpose()
    }

    async fn list(
        &self,
        query: RetentionAuditLogQuery,
    ) -> DbResult<ListResult<RetentionAuditLogEntry>> {
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = query.offset.unwrap_or(0).max(0);
        let (clause, binds) = Self::filters(&query);

        let sql = format!(
            r#"
            SELECT id, user_id, org_id, action, data_scope, triggered_by, details, created_at
            FROM retention_audit_log
            {}
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
            clause
        );

        let mut q = sqlx::query(&sql);
        for value in &binds {
            q = q.bind(value);
        }
        // Fetch one extra to determine if there are more items
        let rows = q
            .bind(limit + 1)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let has_more = rows.len() as i64 > limit;
        let items = rows
            .iter()
            .take(limit as usize)
            .map(retention_audit_log_from_row)
            .collect::<DbResult<Vec<_>>>()?;

        Ok(ListResult::new(items, has_more))
    }

    async fn count(&self, query: RetentionAuditLogQuery) -> DbResult<i64> {
        let (clause, binds) = Self::filters(&query);
        let sql = format!(
            "SELECT COUNT(*) AS count FROM retention_audit_log {}",
            clause
        );

        let mut q = sqlx::query(&sql);
        for value in &binds {
            q = q.bind(value);
        }
        let row = q.fetch_one(&self.pool).await?;
        Ok(row.get::<i64, _>("count"))
    }
}
