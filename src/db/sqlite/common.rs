use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection, sqlite::SqliteRow};
use uuid::Uuid;

use crate::{
    db::error::{DbError, DbResult},
    models::{CreateRetentionAuditLog, RetentionAuditLogEntry},
};

/// Parse a UUID string from the database, returning a DbError on failure
pub fn parse_uuid(s: &str) -> DbResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DbError::Internal(format!("Invalid UUID in database: {}", e)))
}

/// Parse an enum stored as text, returning a DbError on failure
pub fn parse_enum<T: std::str::FromStr<Err = String>>(s: &str) -> DbResult<T> {
    s.parse().map_err(DbError::Internal)
}

/// Append a retention audit entry on an existing connection or transaction.
pub async fn insert_retention_audit_log(
    conn: &mut SqliteConnection,
    input: CreateRetentionAuditLog,
    created_at: DateTime<Utc>,
) -> DbResult<RetentionAuditLogEntry> {
    let id = Uuid::new_v4();
    let data_scope = input
        .data_scope
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO retention_audit_log (id, user_id, org_id, action, data_scope, triggered_by, details, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(input.user_id.to_string())
    .bind(input.org_id.to_string())
    .bind(input.action.as_str())
    .bind(data_scope)
    .bind(input.triggered_by.as_str())
    .bind(&input.details)
    .bind(created_at)
    .execute(conn)
    .await?;

    Ok(RetentionAuditLogEntry {
        id,
        user_id: input.user_id,
        org_id: input.org_id,
        action: input.action,
        data_scope: input.data_scope,
        triggered_by: input.triggered_by,
        details: input.details,
        created_at,
    })
}

pub fn retention_audit_log_from_row(row: &SqliteRow) -> DbResult<RetentionAuditLogEntry> {
    let data_scope: Option<String> = row.get("data_scope");
    Ok(RetentionAuditLogEntry {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
        org_id: parse_uuid(&row.get::<String, _>("org_id"))?,
        action: parse_enum(&row.get::<String, _>("action"))?,
        data_scope: data_scope.as_deref().map(serde_json::from_str).transpose()?,
        triggered_by: parse_enum(&row.get::<String, _>("triggered_by"))?,
        details: row.get("details"),
        created_at: row.get("created_at"),
    })
}
