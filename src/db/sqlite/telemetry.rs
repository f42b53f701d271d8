use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::TelemetryRepo,
    },
    models::{TelemetryIdentity, TelemetryMetrics},
};

pub struct SqliteTelemetryRepo {
    pool: SqlitePool,
}

impl SqliteTelemetryRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn metrics_from_row(row: &SqliteRow) -> DbResult<TelemetryMetrics> {
        let data: String = row.get("metrics_data");
        Ok(TelemetryMetrics {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            collected_at: row.get("collected_at"),
            metrics_data: serde_json::from_str(&data)?,
            uploaded_at: row.get("uploaded_at"),
            upload_attempts: row.get("upload_attempts"),
            last_upload_error: row.get("last_upload_error"),
        })
    }
}

#[async_trait]
impl TelemetryRepo for SqliteTelemetryRepo {
    async fn record_metrics(
        &self,
        collected_at: DateTime<Utc>,
        metrics_data: Map<String, JsonValue>,
    ) -> DbResult<TelemetryMetrics> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO telemetry_metrics (id, collected_at, metrics_data, upload_attempts)
            VALUES (?, ?, ?, 0)
            "#,
        )
        .bind(id.to_string())
        .bind(collected_at)
        .bind(serde_json::to_string(&metrics_data)?)
        .execute(&self.pool)
        .await?;

        Ok(TelemetryMetrics {
            id,
            collected_at,
            metrics_data,
            uploaded_at: None,
            upload_attempts: 0,
            last_upload_error: None,
        })
    }

    async fn count_metrics(&self) -> DbResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM telemetry_metrics")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("count"))
    }

    async fn latest_collected_at(&self) -> DbResult<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT MAX(collected_at) AS latest FROM telemetry_metrics")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("latest"))
    }

    async fn latest_uploaded_at(&self) -> DbResult<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT MAX(uploaded_at) AS latest FROM telemetry_metrics")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("latest"))
    }

    async fn list_pending_upload(&self) -> DbResult<Vec<TelemetryMetrics>> {
        let rows = sqlx::query(
            r#"
            SELECT id, collected_at, metrics_data, uploaded_at, upload_attempts, last_upload_error
            FROM telemetry_metrics
            WHERE uploaded_at IS NULL
            ORDER BY collected_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::metrics_from_row).collect()
    }

    async fn mark_uploaded(&self, id: Uuid, at: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE telemetry_metrics
            SET uploaded_at = ?, upload_attempts = upload_attempts + 1, last_upload_error = NULL
            WHERE id = ?
            "#,
        )
        .bind(at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn record_upload_failure(&self, id: Uuid, error: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE telemetry_metrics
            SET upload_attempts = upload_attempts + 1, last_upload_error = ?
            WHERE id = ?
            "#,
        )
        .bind(error)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn get_identity(&self) -> DbResult<Option<TelemetryIdentity>> {
        let row = sqlx::query("SELECT customer_id, instance_id FROM telemetry_identity WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| TelemetryIdentity {
            customer_id: row.get("customer_id"),
            instance_id: row.get("instance_id"),
        }))
    }

    async fn save_identity(&self, identity: &TelemetryIdentity) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO telemetry_identity (id, customer_id, instance_id, created_at, updated_at)
            VALUES (1, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                customer_id = excluded.customer_id,
                instance_id = excluded.instance_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&identity.customer_id)
        .bind(&identity.instance_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
