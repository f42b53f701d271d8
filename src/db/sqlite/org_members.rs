use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::{insert_retention_audit_log, parse_enum, parse_uuid};
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{OrgMemberRepo, PurgeAuditFn},
    },
    models::{
        CreateRetentionAuditLog, OrgMember, OrgRole, RetentionCandidates, RetentionStatus,
    },
};

const MEMBER_COLUMNS: &str =
    "org_id, user_id, role, retention_status, retention_pending_since, created_at";

pub struct SqliteOrgMemberRepo {
    pool: SqlitePool,
}

impl SqliteOrgMemberRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn member_from_row(row: &SqliteRow) -> DbResult<OrgMember> {
        let status: Option<String> = row.get("retention_status");
        Ok(OrgMember {
            org_id: parse_uuid(&row.get::<String, _>("org_id"))?,
            user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
            role: parse_enum(&row.get::<String, _>("role"))?,
            retention_status: RetentionStatus::from_column(status.as_deref())
                .map_err(DbError::Internal)?,
            retention_pending_since: row.get("retention_pending_since"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl OrgMemberRepo for SqliteOrgMemberRepo {
    async fn add(&self, org_id: Uuid, user_id: Uuid, role: OrgRole) -> DbResult<OrgMember> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO org_members (org_id, user_id, role, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(org_id.to_string())
        .bind(user_id.to_string())
        .bind(role.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict("User is already a member of this organization".to_string())
            }
            _ => DbError::from(e),
        })?;

        Ok(OrgMember {
            org_id,
            user_id,
            role,
            retention_status: RetentionStatus::Active,
            retention_pending_since: None,
            created_at: now,
        })
    }

    async fn get(&self, org_id: Uuid, user_id: Uuid) -> DbResult<Option<OrgMember>> {
        let query = format!(
            "SELECT {} FROM org_members WHERE org_id = ? AND user_id = ?",
            MEMBER_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(org_id.to_string())
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::member_from_row).transpose()
    }

    async fn list_by_org(&self, org_id: Uuid) -> DbResult<Vec<OrgMember>> {
        let query = format!(
            "SELECT {} FROM org_members WHERE org_id = ? ORDER BY created_at ASC, user_id ASC",
            MEMBER_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(org_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::member_from_row).collect()
    }

    async fn count_by_retention_status(&self) -> DbResult<Vec<(RetentionStatus, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT COALESCE(retention_status, 'active') AS status, COUNT(*) AS count
            FROM org_members
            GROUP BY COALESCE(retention_status, 'active')
            ORDER BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok((
                    parse_enum(&row.get::<String, _>("status"))?,
                    row.get::<i64, _>("count"),
                ))
            })
            .collect()
    }

    async fn list_retention_candidates(
        &self,
        org_id: Uuid,
        candidates: RetentionCandidates,
        limit: u32,
    ) -> DbResult<Vec<OrgMember>> {
        let condition = match candidates {
            RetentionCandidates::Active => {
                "(retention_status IS NULL OR retention_status = 'active')"
            }
            RetentionCandidates::Pending => "retention_status = 'retention_pending'",
            RetentionCandidates::PendingBefore(_) => {
                "retention_status = 'retention_pending' AND retention_pending_since < ?"
            }
        };
        let query = format!(
            "SELECT {} FROM org_members WHERE org_id = ? AND {} \
             ORDER BY created_at ASC, user_id ASC LIMIT ?",
            MEMBER_COLUMNS, condition
        );

        let mut q = sqlx::query(&query).bind(org_id.to_string());
        if let RetentionCandidates::PendingBefore(cutoff) = candidates {
            q = q.bind(cutoff);
        }
        let rows = q.bind(i64::from(limit)).fetch_all(&self.pool).await?;

        rows.iter().map(Self::member_from_row).collect()
    }

    async fn last_activity(
        &self,
        org_id: Uuid,
        user_id: Uuid,
    ) -> DbResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            r#"
            SELECT MAX(cm.last_updated_at) AS last_activity
            FROM conversation_metadata cm
            JOIN conversation_metadata_org cmo ON cmo.conversation_id = cm.conversation_id
            WHERE cmo.org_id = ? AND cmo.user_id = ?
            "#,
        )
        .bind(org_id.to_string())
        .bind(user_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("last_activity"))
    }

    async fn mark_retention_pending(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
        audit: CreateRetentionAuditLog,
    ) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE org_members
            SET retention_status = 'retention_pending', retention_pending_since = ?
            WHERE org_id = ? AND user_id = ?
              AND (retention_status IS NULL OR retention_status = 'active')
            "#,
        )
        .bind(at)
        .bind(org_id.to_string())
        .bind(user_id.to_string())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        insert_retention_audit_log(&mut *tx, audit, at).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn purge_member_data(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        audit: &PurgeAuditFn,
    ) -> DbResult<Option<u64>> {
        let org = org_id.to_string();
        let user = user_id.to_string();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE org_members
            SET retention_status = 'retention_deleted', retention_pending_since = NULL
            WHERE org_id = ? AND user_id = ? AND retention_status = 'retention_pending'
            "#,
        )
        .bind(&org)
        .bind(&user)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let deleted = sqlx::query(
            r#"
            DELETE FROM conversation_metadata
            WHERE conversation_id IN (
                SELECT conversation_id FROM conversation_metadata_org
                WHERE org_id = ? AND user_id = ?
            )
            "#,
        )
        .bind(&org)
        .bind(&user)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("DELETE FROM conversation_metadata_org WHERE org_id = ? AND user_id = ?")
            .bind(&org)
            .bind(&user)
            .execute(&mut *tx)
            .await?;

        insert_retention_audit_log(&mut *tx, audit(deleted), now).await?;
        tx.commit().await?;
        Ok(Some(deleted))
    }

    async fn recover(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        audit: CreateRetentionAuditLog,
    ) -> DbResult<bool> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE org_members
            SET retention_status = 'active', retention_pending_since = NULL
            WHERE org_id = ? AND user_id = ? AND retention_status = 'retention_pending'
            "#,
        )
        .bind(org_id.to_string())
        .bind(user_id.to_string())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        insert_retention_audit_log(&mut *tx, audit, now).await?;
        tx.commit().await?;
        Ok(true)
    }
}
