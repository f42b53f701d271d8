//! Prometheus metrics for the maintenance service.
//!
//! Provides metrics for:
//! - HTTP request latency and counts
//! - Retention transitions and conversation expiration
//! - Runtime waits, token refresh and telemetry uploads

#[cfg(feature = "prometheus")]
use std::sync::OnceLock;

#[cfg(feature = "prometheus")]
use metrics::{counter, gauge, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::MetricsConfig;

/// Global Prometheus handle for the metrics endpoint.
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

const DURATION_BUCKETS_SECS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Initialize the metrics system with the given configuration.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
            DURATION_BUCKETS_SECS,
        )
        .map_err(|e| MetricsError::Setup(e.to_string()))?;

    let handle = builder.install_recorder().map_err(MetricsError::Install)?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::Setup("Metrics already initialized".to_string()))?;

    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(_config: &MetricsConfig) -> Result<(), MetricsError> {
    let _ = DURATION_BUCKETS_SECS;
    Ok(())
}

/// Get the Prometheus handle for rendering metrics.
#[cfg(feature = "prometheus")]
pub fn get_prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP
// ─────────────────────────────────────────────────────────────────────────────

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    {
        let status_class = format!("{}xx", status / 100);
        counter!(
            "http_requests_total",
            "method" => method.to_string(),
            "path" => path.to_string(),
            "status" => status.to_string(),
        )
        .increment(1);
        histogram!(
            "http_request_duration_seconds",
            "method" => method.to_string(),
            "path" => path.to_string(),
            "status_class" => status_class,
        )
        .record(duration_secs);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (method, path, status, duration_secs);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Maintenance
// ─────────────────────────────────────────────────────────────────────────────

/// Record inactive-user retention transitions.
///
/// # Arguments
/// * `action` - The audit action ("marked", "deleted", "recovered")
/// * `count` - Number of members that made the transition
pub fn record_retention_transition(action: &str, count: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "retention_transitions_total",
            "action" => action.to_string()
        )
        .increment(count);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (action, count);
    }
}

/// Record conversations removed by the expiration sweeper.
pub fn record_conversations_expired(count: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!("conversations_expired_total").increment(count);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = count;
    }
}

/// Record a maintenance task run and its duration.
///
/// # Arguments
/// * `task` - Task name (e.g. "inactive_user_retention")
/// * `status` - Final task status ("completed", "completed_with_errors", "error")
pub fn record_maintenance_run(task: &str, status: &str, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "maintenance_task_runs_total",
            "task" => task.to_string(),
            "status" => status.to_string(),
        )
        .increment(1);
        histogram!(
            "maintenance_task_duration_seconds",
            "task" => task.to_string()
        )
        .record(duration_secs);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (task, status, duration_secs);
    }
}

/// Record a per-organization maintenance error.
pub fn record_maintenance_error(task: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "maintenance_task_errors_total",
            "task" => task.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = task;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Integrations
// ─────────────────────────────────────────────────────────────────────────────

/// Set the number of in-flight runtime waits.
pub fn set_runtime_wait_current(current: usize) {
    #[cfg(feature = "prometheus")]
    {
        gauge!("runtime_wait_current").set(current as f64);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = current;
    }
}

/// Record a runtime wait that was admitted.
pub fn record_runtime_wait_started() {
    #[cfg(feature = "prometheus")]
    {
        counter!("runtime_wait_total").increment(1);
    }
}

/// Record the outcome of a runtime wait.
///
/// `status` is one of "success", "timeout", "error", "cancelled" or "rejected".
pub fn record_runtime_wait_completed(status: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "runtime_wait_completed_total",
            "status" => status.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = status;
    }
}

/// Record a processed Jira webhook payload.
///
/// `outcome` is one of "accepted", "skipped" or "failed".
pub fn record_jira_event(outcome: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "jira_events_total",
            "outcome" => outcome.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = outcome;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth
// ─────────────────────────────────────────────────────────────────────────────

/// Record a token refresh attempt.
///
/// # Arguments
/// * `idp` - Identity provider name
/// * `outcome` - "refreshed", "not_needed", "race", "race_recovered", "invalid_grant" or "error"
pub fn record_token_refresh(idp: &str, outcome: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "token_refresh_total",
            "idp" => idp.to_string(),
            "outcome" => outcome.to_string(),
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (idp, outcome);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Telemetry
// ─────────────────────────────────────────────────────────────────────────────

/// Record a telemetry collection or upload attempt.
///
/// # Arguments
/// * `operation` - "collect" or "upload"
/// * `outcome` - "success" or "error"
pub fn record_telemetry_operation(operation: &str, outcome: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "telemetry_operations_total",
            "operation" => operation.to_string(),
            "outcome" => outcome.to_string(),
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (operation, outcome);
    }
}

/// Metrics errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
