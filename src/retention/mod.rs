//! Data retention processors for organization-scoped maintenance.
//!
//! Two batch processors run on the maintenance schedule:
//! 1. Inactive-user retention marks idle members, purges their conversations
//!    after a grace period, and recovers members who became active again
//! 2. Conversation expiration deletes conversations idle past the org limit
//!
//! Both process organizations serially and never abort a run because of a
//! single organization: per-org failures are collected into the summary.

mod conversation_expiration;
mod inactive_users;

pub use conversation_expiration::{ConversationExpirationProcessor, ConversationExpirationSummary};
use chrono::{DateTime, TimeDelta, Utc};
pub use inactive_users::{InactiveUserRetentionProcessor, InactiveUserRetentionSummary};
use serde::Serialize;

use crate::db::{DbError, DbResult};

/// Outcome of a maintenance run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Completed,
    /// At least one organization failed; the others were processed
    CompletedWithErrors,
    /// The run could not start or aborted
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Completed => "completed",
            TaskStatus::CompletedWithErrors => "completed_with_errors",
            TaskStatus::Error => "error",
        }
    }

    fn from_errors(errors: &[String]) -> Self {
        if errors.is_empty() {
            TaskStatus::Completed
        } else {
            TaskStatus::CompletedWithErrors
        }
    }
}

/// Per-org error list as reported in summaries: omitted when empty.
fn collect_errors(errors: Vec<String>) -> Option<Vec<String>> {
    if errors.is_empty() { None } else { Some(errors) }
}

/// `now` minus `days`, failing instead of panicking when the result leaves
/// chrono's representable range.
fn days_before(now: DateTime<Utc>, days: i64) -> DbResult<DateTime<Utc>> {
    TimeDelta::try_days(days)
        .and_then(|delta| now.checked_sub_signed(delta))
        .ok_or_else(|| {
            DbError::Validation(format!("Retention period of {} days is out of range", days))
        })
}
