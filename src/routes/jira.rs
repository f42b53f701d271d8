use axum::{Json, extract::State, http::HeaderMap};
use bytes::Bytes;
use serde_json::{Value, json};

use super::ApiError;
use crate::{
    AppState,
    integrations::{
        JiraParseOutcome, JiraPayloadParser,
        jira::{SIGNATURE_HEADER, verify_signature},
    },
    observability::metrics,
};

/// Receive a Jira Cloud webhook.
///
/// Accepted and skipped events both answer 200 so Jira does not retry them;
/// payloads addressed to us but missing data answer 422.
#[tracing::instrument(name = "jira.webhook", skip_all)]
pub async fn events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let jira = &state.config.integrations.jira;

    if let Some(secret) = &jira.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(secret, &body, signature) {
            metrics::record_jira_event("unauthorized");
            tracing::warn!("Rejected Jira webhook with invalid signature");
            return Err(ApiError::Unauthorized("Invalid webhook signature".to_string()));
        }
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON payload: {}", e)))?;

    match JiraPayloadParser::new(&jira.label, &jira.mention).parse(&payload) {
        JiraParseOutcome::Accepted(event) => {
            metrics::record_jira_event("accepted");
            tracing::info!(
                event_type = ?event.event_type,
                issue_key = %event.issue_key,
                workspace = %event.workspace_name,
                "Accepted Jira webhook"
            );
            Ok(Json(json!({ "status": "accepted", "event": event })))
        }
        JiraParseOutcome::Skipped(reason) => {
            metrics::record_jira_event("skipped");
            tracing::debug!(reason = %reason, "Skipped Jira webhook");
            Ok(Json(json!({ "status": "skipped", "reason": reason })))
        }
        JiraParseOutcome::Failed(reason) => {
            metrics::record_jira_event("failed");
            tracing::warn!(reason = %reason, "Malformed Jira webhook");
            Err(ApiError::Unprocessable(reason))
        }
    }
}
