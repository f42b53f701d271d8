//! Authentication configuration.
//!
//! Users are identified by headers set by a trusted reverse proxy. Third-party
//! OAuth providers are configured per identity provider name so stored tokens
//! can be refreshed.
//!
//! # Example
//!
//! ```toml
//! [auth]
//! identity_header = "X-Forwarded-User"
//! email_header = "X-Forwarded-Email"
//! admin_email_domain = "example.com"
//!
//! [auth.providers.gitlab]
//! token_url = "https://gitlab.com/oauth/token"
//! client_id = "${GITLAB_CLIENT_ID}"
//! client_secret = "${GITLAB_CLIENT_SECRET}"
//! timeout_secs = 30
//! ```

use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

use super::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Header carrying the authenticated user's UUID.
    #[serde(default = "default_identity_header")]
    pub identity_header: String,

    /// Header carrying the authenticated user's email.
    #[serde(default = "default_email_header")]
    pub email_header: String,

    /// Email domain required for organization administration
    /// (e.g. `example.com`). When unset any authenticated user may create orgs.
    #[serde(default)]
    pub admin_email_domain: Option<String>,

    /// OAuth providers whose stored tokens may be refreshed, keyed by idp name.
    #[serde(default)]
    pub providers: HashMap<String, OAuthProviderConfig>,

    /// Refresh race handling.
    #[serde(default)]
    pub token_refresh: TokenRefreshConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            identity_header: default_identity_header(),
            email_header: default_email_header(),
            admin_email_domain: None,
            providers: HashMap::new(),
            token_refresh: TokenRefreshConfig::default(),
        }
    }
}

impl AuthConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.identity_header.is_empty() || self.email_header.is_empty() {
            return Err(ConfigError::Validation(
                "auth identity and email headers cannot be empty".into(),
            ));
        }
        for (name, provider) in &self.providers {
            url::Url::parse(&provider.token_url).map_err(|e| {
                ConfigError::Validation(format!(
                    "auth.providers.{}.token_url is not a valid URL: {}",
                    name, e
                ))
            })?;
            if provider.timeout_secs == 0 {
                return Err(ConfigError::Validation(format!(
                    "auth.providers.{}.timeout_secs must be at least 1",
                    name
                )));
            }
        }
        if self.token_refresh.max_retries == 0 {
            return Err(ConfigError::Validation(
                "auth.token_refresh.max_retries must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Whether an email address may administer organizations.
    pub fn is_admin_email(&self, email: &str) -> bool {
        match &self.admin_email_domain {
            None => true,
            Some(domain) => email
                .rsplit_once('@')
                .is_some_and(|(_, d)| d.eq_ignore_ascii_case(domain.trim_start_matches('@'))),
        }
    }
}

fn default_identity_header() -> String {
    "X-Forwarded-User".to_string()
}

fn default_email_header() -> String {
    "X-Forwarded-Email".to_string()
}

/// OAuth token endpoint for one identity provider.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OAuthProviderConfig {
    pub token_url: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Refresh when the access token expires within this many seconds.
    /// Default: 60
    #[serde(default = "default_refresh_leeway")]
    pub refresh_leeway_secs: i64,

    /// Upper bound on one token endpoint request. The refresh runs while the
    /// stored token row is locked, so a stalled provider must not hold it.
    /// Default: 30
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

impl OAuthProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl std::fmt::Debug for OAuthProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthProviderConfig")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "****"))
            .field("refresh_leeway_secs", &self.refresh_leeway_secs)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_refresh_leeway() -> i64 {
    60
}

fn default_provider_timeout() -> u64 {
    30
}

/// Retry behaviour when a concurrent refresh invalidates our refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenRefreshConfig {
    /// Attempts before giving up with a race error.
    /// Default: 3
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay before re-reading the stored tokens.
    /// Default: 500 ms
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for TokenRefreshConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl TokenRefreshConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_email_domain() {
        let mut config = AuthConfig::default();
        assert!(config.is_admin_email("anyone@example.org"));

        config.admin_email_domain = Some("openhands.dev".to_string());
        assert!(config.is_admin_email("ops@openhands.dev"));
        assert!(config.is_admin_email("ops@OpenHands.Dev"));
        assert!(!config.is_admin_email("ops@openhands.dev.evil.com"));
        assert!(!config.is_admin_email("openhands.dev"));

        config.admin_email_domain = Some("@openhands.dev".to_string());
        assert!(config.is_admin_email("ops@openhands.dev"));
    }

    #[test]
    fn test_provider_debug_redacts_secret() {
        let provider = OAuthProviderConfig {
            token_url: "https://idp.test/token".to_string(),
            client_id: "client".to_string(),
            client_secret: Some("hunter2".to_string()),
            refresh_leeway_secs: 60,
            timeout_secs: 30,
        };
        let debug = format!("{:?}", provider);
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_zero_provider_timeout_rejected() {
        let mut config = AuthConfig::default();
        config.providers.insert(
            "gitlab".to_string(),
            OAuthProviderConfig {
                token_url: "https://gitlab.test/oauth/token".to_string(),
                client_id: "client".to_string(),
                client_secret: None,
                refresh_leeway_secs: 60,
                timeout_secs: 0,
            },
        );
        assert!(config.validate().is_err());

        config.providers.get_mut("gitlab").unwrap().timeout_secs = 5;
        assert!(config.validate().is_ok());
    }
}
