//! Two-phase deletion of inactive members' data.
//!
//! For each organization with an inactive-user policy, one run performs:
//! - **Mark**: members idle longer than the inactivity threshold move to
//!   `retention_pending`; nothing is deleted yet
//! - **Delete**: members pending longer than the grace period have their
//!   conversations in the org removed and move to `retention_deleted`
//! - **Recover**: pending members with fresh activity return to `active`
//!
//! Activity is the newest `last_updated_at` across the member's conversations
//! in the org. Every transition writes a retention audit entry in the same
//! transaction as the status change.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{TaskStatus, collect_errors, days_before};
use crate::{
    db::{DbPool, DbResult},
    jobs::{MaintenanceTask, MaintenanceTaskProcessor},
    models::{
        CreateRetentionAuditLog, InactiveUserPolicy, Organization, RetentionAction,
        RetentionCandidates,
    },
    observability::metrics,
};

const TASK_NAME: &str = "inactive_user_retention";

/// Results from a single inactive-user retention run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InactiveUserRetentionSummary {
    pub status: TaskStatus,
    pub orgs_processed: u64,
    pub users_marked_for_retention: u64,
    pub users_data_deleted: u64,
    pub users_recovered: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    /// Run-level failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InactiveUserRetentionSummary {
    /// Check if any member changed state.
    pub fn has_transitions(&self) -> bool {
        self.users_marked_for_retention > 0 || self.users_data_deleted > 0 || self.users_recovered > 0
    }
}

#[derive(Debug, Default)]
struct OrgRetentionCounts {
    marked: u64,
    deleted: u64,
    recovered: u64,
}

pub struct InactiveUserRetentionProcessor {
    db: Arc<DbPool>,
    batch_size: u32,
}

impl InactiveUserRetentionProcessor {
    pub fn new(db: Arc<DbPool>, batch_size: u32) -> Self {
        Self { db, batch_size }
    }

    pub async fn run(&self) -> InactiveUserRetentionSummary {
        self.run_at(Utc::now()).await
    }

    /// Process every organization with a policy, using `now` as the clock.
    pub async fn run_at(&self, now: DateTime<Utc>) -> InactiveUserRetentionSummary {
        let mut summary = InactiveUserRetentionSummary::default();

        let orgs = match self.db.organizations().list_with_inactive_user_policy().await {
            Ok(orgs) => orgs,
            Err(e) => {
                tracing::error!(error = %e, "Failed to process inactive user data retention");
                summary.status = TaskStatus::Error;
                summary.error = Some(e.to_string());
                return summary;
            }
        };

        let mut errors = Vec::new();
        for org in orgs {
            let Some(policy) = org.inactive_user_policy() else {
                continue;
            };

            match self.process_org(&org, policy, now).await {
                Ok(counts) => {
                    summary.orgs_processed += 1;
                    summary.users_marked_for_retention += counts.marked;
                    summary.users_data_deleted += counts.deleted;
                    summary.users_recovered += counts.recovered;

                    if counts.marked > 0 || counts.deleted > 0 || counts.recovered > 0 {
                        tracing::info!(
                            org_id = %org.id,
                            marked = counts.marked,
                            deleted = counts.deleted,
                            recovered = counts.recovered,
                            "Org retention pass changed member state"
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

        metrics::record_retention_transition(
            RetentionAction::Marked.as_str(),
            summary.users_marked_for_retention,
        );
        metrics::record_retention_transition(
            RetentionAction::Deleted.as_str(),
            summary.users_data_deleted,
        );
        metrics::record_retention_transition(
            RetentionAction::Recovered.as_str(),
            summary.users_recovered,
        );

        summary.status = TaskStatus::from_errors(&errors);
        summary.errors = collect_errors(errors);
        summary
    }

    async fn process_org(
        &self,
        org: &Organization,
        policy: InactiveUserPolicy,
        now: DateTime<Utc>,
    ) -> DbResult<OrgRetentionCounts> {
        let inactivity_cutoff = days_before(now, policy.inactivity_days)?;
        let grace_cutoff = days_before(now, policy.grace_period_days)?;

        Ok(OrgRetentionCounts {
            marked: self.mark_inactive(org.id, inactivity_cutoff, now).await?,
            deleted: self.delete_past_grace(org.id, grace_cutoff).await?,
            recovered: self.recover_active(org.id, inactivity_cutoff).await?,
        })
    }

    async fn mark_inactive(
        &self,
        org_id: Uuid,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DbResult<u64> {
        let members = self.db.org_members();
        let candidates = members
            .list_retention_candidates(org_id, RetentionCandidates::Active, self.batch_size)
            .await?;

        let mut marked = 0;
        for member in candidates {
            let last_activity = members.last_activity(org_id, member.user_id).await?;
            // No conversations at all counts as infinitely old
            if last_activity.is_some_and(|at| at >= cutoff) {
                continue;
            }

            let details = match last_activity {
                Some(at) => format!("Last activity: {}", at.to_rfc3339()),
                None => "Last activity: never".to_string(),
            };
            let audit = CreateRetentionAuditLog::policy(org_id, member.user_id, RetentionAction::Marked)
                .with_details(details);

            if members
                .mark_retention_pending(org_id, member.user_id, now, audit)
                .await?
            {
                tracing::debug!(
                    user_id = %member.user_id,
                    org_id = %org_id,
                    last_activity = ?last_activity,
                    "Marked user for retention"
                );
                marked += 1;
            }
        }

        Ok(marked)
    }

    async fn delete_past_grace(&self, org_id: Uuid, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let members = self.db.org_members();
        let candidates = members
            .list_retention_candidates(
                org_id,
                RetentionCandidates::PendingBefore(cutoff),
                self.batch_size,
            )
            .await?;

        let mut deleted = 0;
        for member in candidates {
            let user_id = member.user_id;
            let audit = move |count: u64| {
                CreateRetentionAuditLog::policy(org_id, user_id, RetentionAction::Deleted)
                    .with_data_scope(serde_json::json!({ "conversations_deleted": count }))
                    .with_details(format!("Deleted {} conversations after grace period", count))
            };

            match members.purge_member_data(org_id, user_id, &audit).await {
                Ok(Some(count)) => {
                    tracing::info!(
                        user_id = %user_id,
                        org_id = %org_id,
                        conversations = count,
                        "Deleted conversations for user after grace period"
                    );
                    deleted += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        user_id = %user_id,
                        org_id = %org_id,
                        error = %e,
                        "Failed to delete data for user"
                    );
                }
            }
        }

        Ok(deleted)
    }

    async fn recover_active(&self, org_id: Uuid, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let members = self.db.org_members();
        let candidates = members
            .list_retention_candidates(org_id, RetentionCandidates::Pending, self.batch_size)
            .await?;

        let mut recovered = 0;
        for member in candidates {
            let Some(last_activity) = members.last_activity(org_id, member.user_id).await? else {
                continue;
            };
            if last_activity < cutoff {
                continue;
            }

            let audit =
                CreateRetentionAuditLog::policy(org_id, member.user_id, RetentionAction::Recovered)
                    .with_details(format!(
                        "User became active again: {}",
                        last_activity.to_rfc3339()
                    ));

            if members.recover(org_id, member.user_id, audit).await? {
                tracing::info!(
                    user_id = %member.user_id,
                    org_id = %org_id,
                    last_activity = %last_activity,
                    "Recovered user from retention"
                );
                recovered += 1;
            }
        }

        Ok(recovered)
    }
}

#[async_trait]
impl MaintenanceTaskProcessor for InactiveUserRetentionProcessor {
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

        if summary.has_transitions() {
            tracing::info!(
                task_id = %task.id,
                orgs = summary.orgs_processed,
                marked = summary.users_marked_for_retention,
                deleted = summary.users_data_deleted,
                recovered = summary.users_recovered,
                "Inactive user retention run complete"
            );
        } else {
            tracing::debug!(task_id = %task.id, "Inactive user retention run complete, no changes");
        }

        serde_json::to_value(&summary).unwrap_or_default()
    }
}
