use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Transition recorded in the retention audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionAction {
    Marked,
    Deleted,
    Recovered,
}

impl RetentionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionAction::Marked => "marked",
            RetentionAction::Deleted => "deleted",
            RetentionAction::Recovered => "recovered",
        }
    }
}

impl std::fmt::Display for RetentionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RetentionAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "marked" => Ok(RetentionAction::Marked),
            "deleted" => Ok(RetentionAction::Deleted),
            "recovered" => Ok(RetentionAction::Recovered),
            _ => Err(format!("Invalid retention action: {}", s)),
        }
    }
}

/// What initiated a retention transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionTrigger {
    /// The scheduled policy engine
    Policy,
    /// A manual administrator action
    Admin,
}

impl RetentionTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionTrigger::Policy => "policy",
            RetentionTrigger::Admin => "admin",
        }
    }
}

impl std::str::FromStr for RetentionTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "policy" => Ok(RetentionTrigger::Policy),
            "admin" => Ok(RetentionTrigger::Admin),
            _ => Err(format!("Invalid retention trigger: {}", s)),
        }
    }
}

/// An immutable record of one retention transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionAuditLogEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub action: RetentionAction,
    /// What data the action covered, e.g. `{"conversations_deleted": 3}`
    pub data_scope: Option<JsonValue>,
    pub triggered_by: RetentionTrigger,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateRetentionAuditLog {
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub action: RetentionAction,
    pub data_scope: Option<JsonValue>,
    pub triggered_by: RetentionTrigger,
    pub details: Option<String>,
}

impl CreateRetentionAuditLog {
    /// Entry written by the scheduled policy engine.
    pub fn policy(org_id: Uuid, user_id: Uuid, action: RetentionAction) -> Self {
        Self {
            user_id,
            org_id,
            action,
            data_scope: None,
            triggered_by: RetentionTrigger::Policy,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_data_scope(mut self, data_scope: JsonValue) -> Self {
        self.data_scope = Some(data_scope);
        self
    }
}

/// Query parameters for listing retention audit entries, newest first
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetentionAuditLogQuery {
    pub org_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub action: Option<RetentionAction>,
    /// Maximum number of results (default 100, max 1000)
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
