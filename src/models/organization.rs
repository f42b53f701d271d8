use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::validators::{validate_contact_email, validate_org_name};

/// Inactivity threshold applied when an org enables retention without one.
pub const DEFAULT_INACTIVITY_DAYS: i64 = 90;

/// Grace period applied when an org enables retention without one.
pub const DEFAULT_GRACE_PERIOD_DAYS: i64 = 30;

/// Upper bound for every day-valued policy field (100 years).
pub const MAX_POLICY_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    /// Days after which idle conversations are deleted (null/0 disables)
    pub conversation_expiration: Option<i64>,
    /// Days without activity before a member is marked for retention
    pub inactive_user_retention_days: Option<i64>,
    /// Days a marked member may recover before their data is deleted
    pub inactive_user_grace_period_days: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Effective inactive-user policy for one organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InactiveUserPolicy {
    pub inactivity_days: i64,
    pub grace_period_days: i64,
}

impl Organization {
    /// Returns the inactive-user policy if either threshold is configured.
    ///
    /// A missing or non-positive threshold falls back to its default, so an org
    /// that only sets a grace period still gets the 90 day inactivity window.
    pub fn inactive_user_policy(&self) -> Option<InactiveUserPolicy> {
        let inactivity = self.inactive_user_retention_days.filter(|d| *d > 0);
        let grace = self.inactive_user_grace_period_days.filter(|d| *d > 0);
        if inactivity.is_none() && grace.is_none() {
            return None;
        }
        Some(InactiveUserPolicy {
            inactivity_days: inactivity.unwrap_or(DEFAULT_INACTIVITY_DAYS),
            grace_period_days: grace.unwrap_or(DEFAULT_GRACE_PERIOD_DAYS),
        })
    }

    /// Conversation expiration in days, if enabled.
    pub fn conversation_expiration_days(&self) -> Option<i64> {
        self.conversation_expiration.filter(|d| *d > 0)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrganization {
    /// Display name, unique across the installation
    #[validate(custom(function = "validate_org_name"))]
    pub name: String,
    #[validate(length(max = 255))]
    pub contact_name: Option<String>,
    #[validate(custom(function = "validate_contact_email"))]
    pub contact_email: Option<String>,
    #[validate(range(min = 0, max = 36500))]
    pub conversation_expiration: Option<i64>,
    #[validate(range(min = 0, max = 36500))]
    pub inactive_user_retention_days: Option<i64>,
    #[validate(range(min = 0, max = 36500))]
    pub inactive_user_grace_period_days: Option<i64>,
}

impl CreateOrganization {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contact_name: None,
            contact_email: None,
            conversation_expiration: None,
            inactive_user_retention_days: None,
            inactive_user_grace_period_days: None,
        }
    }
}

/// Partial update; absent fields are left unchanged and `0` disables a policy.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateOrganization {
    #[validate(length(max = 255))]
    pub contact_name: Option<String>,
    #[validate(custom(function = "validate_contact_email"))]
    pub contact_email: Option<String>,
    #[validate(range(min = 0, max = 36500))]
    pub conversation_expiration: Option<i64>,
    #[validate(range(min = 0, max = 36500))]
    pub inactive_user_retention_days: Option<i64>,
    #[validate(range(min = 0, max = 36500))]
    pub inactive_user_grace_period_days: Option<i64>,
}
