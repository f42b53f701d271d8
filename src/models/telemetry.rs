use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

/// One collected usage snapshot awaiting (or past) upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryMetrics {
    pub id: Uuid,
    pub collected_at: DateTime<Utc>,
    pub metrics_data: Map<String, JsonValue>,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub upload_attempts: i64,
    pub last_upload_error: Option<String>,
}

/// Identity of this installation with the telemetry backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryIdentity {
    pub customer_id: Option<String>,
    pub instance_id: Option<String>,
}

impl TelemetryIdentity {
    /// Both identifiers must be known before uploads are attributed.
    pub fn is_established(&self) -> bool {
        self.customer_id.is_some() && self.instance_id.is_some()
    }
}
