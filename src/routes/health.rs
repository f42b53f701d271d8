//! Health check endpoints for Kubernetes probes and monitoring.

use axum::{Json, extract::State, response::IntoResponse};
use http::StatusCode;
use serde::Serialize;

use crate::AppState;
#[cfg(feature = "prometheus")]
use crate::observability::metrics::get_prometheus_handle;

/// Detailed health status response.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// Overall status: "healthy" or "unhealthy"
    pub status: String,
    pub version: String,
    pub subsystems: SubsystemStatus,
}

#[derive(Debug, Serialize)]
pub struct SubsystemStatus {
    pub database: ComponentStatus,
    pub runtime_waits: RuntimeWaitStatus,
    pub telemetry_running: bool,
}

/// Status of a single component.
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Latency of the health check in milliseconds
    pub latency_ms: u64,
}

/// In-flight runtime waits against the configured ceiling.
#[derive(Debug, Serialize)]
pub struct RuntimeWaitStatus {
    pub current: usize,
    pub max: usize,
}

/// Full health check with subsystem status.
#[tracing::instrument(name = "health.check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let start = std::time::Instant::now();
    let db_healthy = state.db.health_check().await.is_ok();
    let latency_ms = start.elapsed().as_millis() as u64;

    let health = HealthStatus {
        status: if db_healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        subsystems: SubsystemStatus {
            database: ComponentStatus {
                healthy: db_healthy,
                message: (!db_healthy).then(|| "Database connection failed".to_string()),
                latency_ms,
            },
            runtime_waits: RuntimeWaitStatus {
                current: state.runtime_waits.current(),
                max: state.runtime_waits.max(),
            },
            telemetry_running: state.telemetry.is_running().await,
        },
    };

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

/// Liveness: the process is up and serving requests.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness: only route traffic here while SQLite answers.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.db.health_check().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Prometheus scrape endpoint.
pub async fn metrics() -> impl IntoResponse {
    #[cfg(feature = "prometheus")]
    let (status, body) = match get_prometheus_handle() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Metrics recorder is not installed".to_string(),
        ),
    };
    #[cfg(not(feature = "prometheus"))]
    let (status, body) = (
        StatusCode::NOT_FOUND,
        "Built without the prometheus feature".to_string(),
    );

    (status, [("content-type", PROMETHEUS_CONTENT_TYPE)], body)
}
