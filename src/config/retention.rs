//! Retention maintenance configuration.
//!
//! Per-organization thresholds live on the organization itself; this section
//! only controls how often the maintenance worker runs and how much work each
//! phase may do per run.
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
//!
//! [retention.conversation_expiration]
//! batch_size = 100
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Whether the background maintenance worker runs.
    /// Default: false (must be explicitly enabled)
    #[serde(default)]
    pub enabled: bool,

    /// How often to run the maintenance worker (in hours).
    /// Default: 24 (once per day)
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    #[serde(default)]
    pub inactive_users: InactiveUserRetentionConfig,

    #[serde(default)]
    pub conversation_expiration: ConversationExpirationConfig,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_interval_hours(),
            inactive_users: InactiveUserRetentionConfig::default(),
            conversation_expiration: ConversationExpirationConfig::default(),
        }
    }
}

impl RetentionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours * 3600)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_hours == 0 {
            return Err(ConfigError::Validation(
                "retention.interval_hours must be at least 1".into(),
            ));
        }
        if self.inactive_users.batch_size == 0 || self.conversation_expiration.batch_size == 0 {
            return Err(ConfigError::Validation(
                "retention batch sizes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_interval_hours() -> u64 {
    24
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InactiveUserRetentionConfig {
    /// Whether the inactive-user processor is part of each run.
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum members handled per phase per organization.
    /// Default: 50
    #[serde(default = "default_member_batch_size")]
    pub batch_size: u32,
}

impl Default for InactiveUserRetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: default_member_batch_size(),
        }
    }
}

fn default_member_batch_size() -> u32 {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversationExpirationConfig {
    /// Whether the conversation expiration processor is part of each run.
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum conversations deleted per organization per run.
    /// Default: 100
    #[serde(default = "default_conversation_batch_size")]
    pub batch_size: u32,
}

impl Default for ConversationExpirationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: default_conversation_batch_size(),
        }
    }
}

fn default_conversation_batch_size() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RetentionConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.interval(), Duration::from_secs(24 * 3600));
        assert_eq!(config.inactive_users.batch_size, 50);
        assert_eq!(config.conversation_expiration.batch_size, 100);
    }

    #[test]
    fn test_parse_partial() {
        let config: RetentionConfig = toml::from_str(
            r#"
            enabled = true
            [inactive_users]
            batch_size = 10
            "#,
        )
        .unwrap();
        assert!(config.enabled);
        assert_eq!(config.inactive_users.batch_size, 10);
        assert!(config.conversation_expiration.enabled);
    }

    #[test]
    fn test_zero_batch_rejected() {
        let mut config = RetentionConfig::default();
        config.conversation_expiration.batch_size = 0;
        assert!(config.validate().is_err());
    }
}
