//! Third-party integration configuration.
//!
//! # Example
//!
//! ```toml
//! [integrations.jira]
//! enabled = true
//! label = "openhands"
//! mention = "@openhands"
//! webhook_secret = "${JIRA_WEBHOOK_SECRET}"
//!
//! [integrations.runtime_wait]
//! max_concurrent = 100
//! ```

use serde::{Deserialize, Serialize};

use super::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntegrationsConfig {
    #[serde(default)]
    pub jira: JiraConfig,

    #[serde(default)]
    pub runtime_wait: RuntimeWaitConfig,
}

impl IntegrationsConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.jira.enabled && (self.jira.label.is_empty() || self.jira.mention.is_empty()) {
            return Err(ConfigError::Validation(
                "integrations.jira.label and mention cannot be empty".into(),
            ));
        }
        if self.runtime_wait.max_concurrent == 0 {
            return Err(ConfigError::Validation(
                "integrations.runtime_wait.max_concurrent must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Jira Cloud webhook ingestion.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JiraConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Label that triggers a job when added to an issue.
    #[serde(default = "default_label")]
    pub label: String,

    /// Mention that triggers a job when used in a comment.
    #[serde(default = "default_mention")]
    pub mention: String,

    /// Shared secret for `X-Hub-Signature` verification. Unsigned webhooks are
    /// accepted when unset.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            label: default_label(),
            mention: default_mention(),
            webhook_secret: None,
        }
    }
}

impl std::fmt::Debug for JiraConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JiraConfig")
            .field("enabled", &self.enabled)
            .field("label", &self.label)
            .field("mention", &self.mention)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "****"))
            .finish()
    }
}

fn default_label() -> String {
    "openhands".to_string()
}

fn default_mention() -> String {
    "@openhands".to_string()
}

/// Bound on concurrent "wait for runtime readiness" operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeWaitConfig {
    /// New waiters beyond this are rejected, not queued.
    /// Default: 100
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for RuntimeWaitConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_max_concurrent() -> usize {
    100
}
