use axum::{Json, extract::State};

use crate::{AppState, telemetry::LicenseWarningStatus};

/// Whether the UI should show a stale-telemetry license warning
pub async fn license_status(State(state): State<AppState>) -> Json<LicenseWarningStatus> {
    Json(state.telemetry.license_warning_status().await)
}
