//! Deletes conversations that have been idle longer than their org allows.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{TaskStatus, collect_errors, days_before};
use crate::{
    db::{DbPool, DbResult},
    jobs::{MaintenanceTask, MaintenanceTaskProcessor},
    observability::metrics,
};

const TASK_NAME: &str = "conversation_expiration";

/// Results from a single conversation expiration run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationExpirationSummary {
    pub status: TaskStatus,
    pub orgs_processed: u64,
    pub conversations_deleted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct ConversationExpirationProcessor {
    db: Arc<DbPool>,
    batch_size: u32,
}

impl ConversationExpirationProcessor {
    pub fn new(db: Arc<DbPool>, batch_size: u32) -> Self {
        Self { db, batch_size }
    }

    pub async fn run(&self) -> ConversationExpirationSummary {
        self.run_at(Utc::now()).await
    }

    pub async fn run_at(&self, now: DateTime<Utc>) -> ConversationExpirationSummary {
        let mut summary = ConversationExpirationSummary::default();

        let orgs = match self
            .db
            .organizations()
            .list_with_conversation_expiration()
            .await
        {
            Ok(orgs) => orgs,
            Err(e) => {
                tracing::error!(error = %e, "Failed to process conversation expiration");
                summary.status = TaskStatus::Error;
                summary.error = Some(e.to_string());
                return summary;
            }
        };

        let mut errors = Vec::new();
        for org in orgs {
            let Some(days) = org.conversation_expiration_days() else {
                continue;
            };

            let result = match days_before(now, days) {
                Ok(cutoff) => self.expire_org(org.id, cutoff).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(deleted) => {
                    summary.orgs_processed += 1;
                    summary.conversations_deleted += deleted;
                    if deleted > 0 {
                        tracing::info!(
                            org_id = %org.id,
                            deleted,
                            "Deleted expired conversations"
                        );
                    }
                }
                Err(e) => {
                    let message = format!("Error processing org {}: {}", org.id, e);
                    tracing::error!(org_id = %org.id, error = %e, "{}", message);
                    metrics::record_maintenance_error(TASK_NAME);
                    errors.push(message);
                }
            }
        }

        metrics::record_conversations_expired(summary.conversations_deleted);
        summary.status = TaskStatus::from_errors(&errors);
        summary.errors = collect_errors(errors);
        summary
    }

    async fn expire_org(&self, org_id: Uuid, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let conversations = self.db.conversations();
        let expired = conversations
            .list_expired(org_id, cutoff, self.batch_size)
            .await?;

        let mut deleted = 0;
        for conversation in expired {
            match conversations.delete(conversation.id).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        conversation_id = %conversation.id,
                        error = %e,
                        "Failed to delete conversation"
                    );
                }
            }
        }

        Ok(deleted)
    }
}

#[async_trait]
impl MaintenanceTaskProcessor for ConversationExpirationProcessor {
    fn name(&self) -> &'static str {
        TASK_NAME
    }

    async fn process(&self, task: &MaintenanceTask) -> serde_json::Value {
        let start = Instant::now();
        let summary = self.run().await;
        metrics::record_maintenance_run(
            TASK_NAME,
            summary.status.as_str(),
            start.elapsed().as_secs_f64(),
        );

        if summary.conversations_deleted > 0 {
            tracing::info!(
                task_id = %task.id,
                orgs = summary.orgs_processed,
                conversations = summary.conversations_deleted,
                "Conversation expiration run complete"
            );
        } else {
            tracing::debug!(task_id = %task.id, "Conversation expiration run complete, nothing expired");
        }

        serde_json::to_value(&summary).unwrap_or_default()
    }
}
