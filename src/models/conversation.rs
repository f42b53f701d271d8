use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A conversation as seen by the maintenance jobs: the primary metadata row
/// joined with its org-scoped shadow row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    /// The only activity signal used by inactive-user retention
    pub last_updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateConversation {
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    /// Defaults to the creation time
    pub last_updated_at: Option<DateTime<Utc>>,
}
