//! Usage telemetry configuration.
//!
//! # Example
//!
//! ```toml
//! [telemetry]
//! enabled = true
//! collection_interval_days = 7
//! upload_interval_hours = 24
//! admin_email = "${STEWARD_ADMIN_EMAIL}"
//!
//! [telemetry.upload]
//! endpoint = "https://telemetry.example.com"
//! api_key = "${TELEMETRY_API_KEY}"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Default: false
    #[serde(default)]
    pub enabled: bool,

    /// Minimum days between collected snapshots.
    /// Default: 7
    #[serde(default = "default_collection_interval_days")]
    pub collection_interval_days: i64,

    /// Minimum hours between upload rounds.
    /// Default: 24
    #[serde(default = "default_upload_interval_hours")]
    pub upload_interval_hours: i64,

    /// Warn about licensing when the last upload is older than this.
    /// Default: 4
    #[serde(default = "default_license_warning_threshold_days")]
    pub license_warning_threshold_days: i64,

    /// Upload check cadence until an identity is established.
    /// Default: 180
    #[serde(default = "default_bootstrap_check_interval_secs")]
    pub bootstrap_check_interval_secs: u64,

    /// Check cadence once an identity is established.
    /// Default: 3600
    #[serde(default = "default_normal_check_interval_secs")]
    pub normal_check_interval_secs: u64,

    /// Contact for this installation. Falls back to the first user's email.
    #[serde(default)]
    pub admin_email: Option<String>,

    /// Upload destination. Snapshots are only collected when unset.
    #[serde(default)]
    pub upload: Option<TelemetryUploadConfig>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            collection_interval_days: default_collection_interval_days(),
            upload_interval_hours: default_upload_interval_hours(),
            license_warning_threshold_days: default_license_warning_threshold_days(),
            bootstrap_check_interval_secs: default_bootstrap_check_interval_secs(),
            normal_check_interval_secs: default_normal_check_interval_secs(),
            admin_email: None,
            upload: None,
        }
    }
}

impl TelemetryConfig {
    pub fn collection_interval(&self) -> chrono::Duration {
        chrono::Duration::days(self.collection_interval_days)
    }

    pub fn upload_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(self.upload_interval_hours)
    }

    pub fn bootstrap_check_interval(&self) -> Duration {
        Duration::from_secs(self.bootstrap_check_interval_secs)
    }

    pub fn normal_check_interval(&self) -> Duration {
        Duration::from_secs(self.normal_check_interval_secs)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.collection_interval_days <= 0
            || self.upload_interval_hours <= 0
            || self.license_warning_threshold_days <= 0
        {
            return Err(ConfigError::Validation(
                "telemetry intervals and thresholds must be positive".into(),
            ));
        }
        if self.bootstrap_check_interval_secs == 0 || self.normal_check_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "telemetry check intervals must be at least 1 second".into(),
            ));
        }
        if let Some(upload) = &self.upload {
            url::Url::parse(&upload.endpoint).map_err(|e| {
                ConfigError::Validation(format!("telemetry.upload.endpoint is invalid: {}", e))
            })?;
            if upload.requests_per_second <= 0.0 {
                return Err(ConfigError::Validation(
                    "telemetry.upload.requests_per_second must be positive".into(),
                ));
            }
        }
        Ok(())
    }
}

fn default_collection_interval_days() -> i64 {
    7
}

fn default_upload_interval_hours() -> i64 {
    24
}

fn default_license_warning_threshold_days() -> i64 {
    4
}

fn default_bootstrap_check_interval_secs() -> u64 {
    180
}

fn default_normal_check_interval_secs() -> u64 {
    3600
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryUploadConfig {
    /// Base URL of the telemetry backend.
    pub endpoint: String,

    /// Publishable key sent as a bearer token.
    pub api_key: String,

    /// Outbound request pacing.
    /// Default: 10
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Default: 30
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for TelemetryUploadConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryUploadConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"****")
            .field("requests_per_second", &self.requests_per_second)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_requests_per_second() -> f64 {
    10.0
}

fn default_timeout_secs() -> u64 {
    30
}
