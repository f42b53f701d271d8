//! Background job infrastructure for scheduled maintenance.
//!
//! Maintenance work is expressed as [`MaintenanceTaskProcessor`]s that take a
//! [`MaintenanceTask`] descriptor and return a JSON summary. The worker runs
//! every registered processor in sequence on a fixed interval:
//!
//! - **Inactive User Retention**: marks, purges and recovers org members
//! - **Conversation Expiration**: deletes conversations past the org limit
//!
//! # Example
//!
//! ```toml
//! [retention]
//! enabled = true
//! interval_hours = 24
//!
//! [retention.inactive_users]
//! batch_size = 50
//! ```

mod worker;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
pub use worker::{build_processors, run_task, start_maintenance_worker};

/// A single scheduled invocation of a processor.
#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceTask {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl MaintenanceTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// A unit of maintenance work.
///
/// Processors never fail as a whole: errors are reported inside the summary.
#[async_trait]
pub trait MaintenanceTaskProcessor: Send + Sync {
    /// Stable name used for scheduling, metrics and `run-task`.
    fn name(&self) -> &'static str;

    async fn process(&self, task: &MaintenanceTask) -> serde_json::Value;
}
