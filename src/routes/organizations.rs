use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use axum_valid::Valid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ApiError;
use crate::{
    AppState,
    auth::Identity,
    models::{
        CreateOrganization, OrgMember, OrgRole, Organization, RetentionAction,
        RetentionAuditLogEntry, RetentionAuditLogQuery, UpdateOrganization,
    },
};

const DEFAULT_PAGE_SIZE: i64 = 100;
const MAX_PAGE_SIZE: i64 = 1000;

/// Organization as seen by one of its members
#[derive(Debug, Serialize, Deserialize)]
pub struct OrgResponse {
    pub id: Uuid,
    pub name: String,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub conversation_expiration: Option<i64>,
    pub inactive_user_retention_days: Option<i64>,
    pub inactive_user_grace_period_days: Option<i64>,
    /// The caller's role in the organization
    pub role: Option<OrgRole>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrgResponse {
    fn new(org: Organization, role: Option<OrgRole>) -> Self {
        Self {
            id: org.id,
            name: org.name,
            contact_name: org.contact_name,
            contact_email: org.contact_email,
            conversation_expiration: org.conversation_expiration,
            inactive_user_retention_days: org.inactive_user_retention_days,
            inactive_user_grace_period_days: org.inactive_user_grace_period_days,
            role,
            created_at: org.created_at,
            updated_at: org.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteOrgResponse {
    pub message: String,
    pub organization: OrgResponse,
}

#[derive(Debug, Deserialize)]
pub struct AuditLogListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub action: Option<RetentionAction>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub limit: i64,
    pub offset: i64,
    pub total: i64,
    pub has_more: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditLogListResponse {
    pub data: Vec<RetentionAuditLogEntry>,
    pub pagination: PaginationMeta,
}

fn not_found(org_id: Uuid) -> ApiError {
    ApiError::NotFound(format!("Organization '{}' not found", org_id))
}

/// Load the org and the caller's membership. Non-members get a 404 so org ids
/// cannot be probed.
async fn load_membership(
    state: &AppState,
    org_id: Uuid,
    identity: &Identity,
) -> Result<(Organization, OrgMember), ApiError> {
    let service = &state.services.organizations;
    let org = service
        .get_by_id(org_id)
        .await?
        .ok_or_else(|| not_found(org_id))?;
    let member = service
        .membership(org_id, identity.user_id)
        .await?
        .ok_or_else(|| not_found(org_id))?;
    Ok((org, member))
}

/// Create an organization owned by the caller
#[tracing::instrument(skip(state, identity, input), fields(user_id = %identity.user_id))]
pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Valid(Json(input)): Valid<Json<CreateOrganization>>,
) -> Result<(StatusCode, Json<OrgResponse>), ApiError> {
    identity.require_admin(&state.config.auth)?;

    let org = state
        .services
        .organizations
        .create(input, identity.user_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(OrgResponse::new(org, Some(OrgRole::Owner))),
    ))
}

/// Get an organization the caller belongs to
pub async fn get(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(org_id): Path<Uuid>,
) -> Result<Json<OrgResponse>, ApiError> {
    let (org, member) = load_membership(&state, org_id, &identity).await?;
    Ok(Json(OrgResponse::new(org, Some(member.role))))
}

/// Update contact details and retention settings (owner or admin)
#[tracing::instrument(skip(state, identity, input), fields(user_id = %identity.user_id))]
pub async fn update(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(org_id): Path<Uuid>,
    Valid(Json(input)): Valid<Json<UpdateOrganization>>,
) -> Result<Json<OrgResponse>, ApiError> {
    let (_, member) = load_membership(&state, org_id, &identity).await?;
    if !member.role.can_manage() {
        return Err(ApiError::Forbidden(
            "Only organization owners and admins can update settings".to_string(),
        ));
    }

    let org = state.services.organizations.update(org_id, input).await?;
    Ok(Json(OrgResponse::new(org, Some(member.role))))
}

/// Delete an organization with its members and conversations (owner only)
#[tracing::instrument(skip(state, identity), fields(user_id = %identity.user_id))]
pub async fn delete(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(org_id): Path<Uuid>,
) -> Result<Json<DeleteOrgResponse>, ApiError> {
    let (_, member) = load_membership(&state, org_id, &identity).await?;
    if member.role != OrgRole::Owner {
        return Err(ApiError::Forbidden(
            "Only the organization owner can delete it".to_string(),
        ));
    }

    let org = state.services.organizations.delete(org_id).await?;
    Ok(Json(DeleteOrgResponse {
        message: "Organization deleted successfully".to_string(),
        organization: OrgResponse::new(org, None),
    }))
}

/// Page through the retention audit log, newest first (owner or admin)
pub async fn list_retention_audit_logs(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(org_id): Path<Uuid>,
    Query(query): Query<AuditLogListQuery>,
) -> Result<Json<AuditLogListResponse>, ApiError> {
    let (_, member) = load_membership(&state, org_id, &identity).await?;
    if !member.role.can_manage() {
        return Err(ApiError::Forbidden(
            "Only organization owners and admins can read the retention audit log".to_string(),
        ));
    }

    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);
    if !(1..=MAX_PAGE_SIZE).contains(&limit) || offset < 0 {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {} and offset must be non-negative",
            MAX_PAGE_SIZE
        )));
    }

    let (page, total) = state
        .services
        .organizations
        .retention_audit_logs(
            org_id,
            RetentionAuditLogQuery {
                action: query.action,
                limit: Some(limit),
                offset: Some(offset),
                ..Default::default()
            },
        )
        .await?;

    Ok(Json(AuditLogListResponse {
        data: page.items,
        pagination: PaginationMeta {
            limit,
            offset,
            total,
            has_more: page.has_more,
        },
    }))
}
