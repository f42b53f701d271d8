use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a user within an organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgRole {
    Owner,
    Admin,
    Member,
}

impl OrgRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgRole::Owner => "owner",
            OrgRole::Admin => "admin",
            OrgRole::Member => "member",
        }
    }

    /// Owners and admins may change org settings and read the retention audit log.
    pub fn can_manage(&self) -> bool {
        matches!(self, OrgRole::Owner | OrgRole::Admin)
    }
}

impl std::fmt::Display for OrgRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrgRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(OrgRole::Owner),
            "admin" => Ok(OrgRole::Admin),
            "member" => Ok(OrgRole::Member),
            _ => Err(format!("Invalid org role: {}", s)),
        }
    }
}

/// Retention lifecycle of an org membership.
///
/// `Active -> RetentionPending -> RetentionDeleted`, with
/// `RetentionPending -> Active` on recovery. `RetentionDeleted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionStatus {
    /// Stored as NULL or `active`
    #[default]
    Active,
    RetentionPending,
    RetentionDeleted,
}

impl RetentionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionStatus::Active => "active",
            RetentionStatus::RetentionPending => "retention_pending",
            RetentionStatus::RetentionDeleted => "retention_deleted",
        }
    }

    /// Decode the nullable database column; NULL means the member was never touched.
    pub fn from_column(value: Option<&str>) -> Result<Self, String> {
        match value {
            None => Ok(RetentionStatus::Active),
            Some(s) => s.parse(),
        }
    }

    /// Whether the automatic engine may move a member from `self` to `next`.
    pub fn can_transition_to(&self, next: RetentionStatus) -> bool {
        matches!(
            (self, next),
            (RetentionStatus::Active, RetentionStatus::RetentionPending)
                | (
                    RetentionStatus::RetentionPending,
                    RetentionStatus::RetentionDeleted
                )
                | (RetentionStatus::RetentionPending, RetentionStatus::Active)
        )
    }
}

impl std::fmt::Display for RetentionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RetentionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RetentionStatus::Active),
            "retention_pending" => Ok(RetentionStatus::RetentionPending),
            "retention_deleted" => Ok(RetentionStatus::RetentionDeleted),
            _ => Err(format!("Invalid retention status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgMember {
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub role: OrgRole,
    pub retention_status: RetentionStatus,
    /// Set iff `retention_status` is `RetentionPending`
    pub retention_pending_since: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Which members a retention phase selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionCandidates {
    /// Status NULL or `active` (mark phase)
    Active,
    /// Status `retention_pending` (recovery phase)
    Pending,
    /// Status `retention_pending` and marked strictly before the cutoff (delete phase)
    PendingBefore(DateTime<Utc>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_status_from_column() {
        assert_eq!(
            RetentionStatus::from_column(None).unwrap(),
            RetentionStatus::Active
        );
        assert_eq!(
            RetentionStatus::from_column(Some("retention_pending")).unwrap(),
            RetentionStatus::RetentionPending
        );
        assert!(RetentionStatus::from_column(Some("archived")).is_err());
    }

    #[test]
    fn test_deleted_is_terminal() {
        for next in [
            RetentionStatus::Active,
            RetentionStatus::RetentionPending,
            RetentionStatus::RetentionDeleted,
        ] {
            assert!(!RetentionStatus::RetentionDeleted.can_transition_to(next));
        }
        assert!(RetentionStatus::Active.can_transition_to(RetentionStatus::RetentionPending));
        assert!(!RetentionStatus::Active.can_transition_to(RetentionStatus::RetentionDeleted));
        assert!(RetentionStatus::RetentionPending.can_transition_to(RetentionStatus::Active));
    }

    #[test]
    fn test_role_round_trip_and_permissions() {
        assert_eq!("owner".parse::<OrgRole>().unwrap(), OrgRole::Owner);
        assert!(OrgRole::Admin.can_manage());
        assert!(!OrgRole::Member.can_manage());
        assert!("root".parse::<OrgRole>().is_err());
    }
}
