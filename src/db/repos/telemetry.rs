use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{TelemetryIdentity, TelemetryMetrics},
};

#[async_trait]
pub trait TelemetryRepo: Send + Sync {
    async fn record_metrics(
        &self,
        collected_at: DateTime<Utc>,
        metrics_data: Map<String, JsonValue>,
    ) -> DbResult<TelemetryMetrics>;
    async fn count_metrics(&self) -> DbResult<i64>;
    async fn latest_collected_at(&self) -> DbResult<Option<DateTime<Utc>>>;
    async fn latest_uploaded_at(&self) -> DbResult<Option<DateTime<Utc>>>;

    /// Snapshots not yet uploaded, oldest first.
    async fn list_pending_upload(&self) -> DbResult<Vec<TelemetryMetrics>>;

    /// Mark a snapshot uploaded and count the attempt.
    async fn mark_uploaded(&self, id: Uuid, at: DateTime<Utc>) -> DbResult<()>;

    /// Record a failed upload attempt.
    async fn record_upload_failure(&self, id: Uuid, error: &str) -> DbResult<()>;

    async fn get_identity(&self) -> DbResult<Option<TelemetryIdentity>>;
    async fn save_identity(&self, identity: &TelemetryIdentity) -> DbResult<()>;
}
