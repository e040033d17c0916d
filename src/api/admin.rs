// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Super-admin endpoints.
//!
//! These endpoints require the super-admin flag and provide:
//! - Role request review (approve / reject)
//! - Per-store custom role limits and store activation
//! - Super-admin grants
//! - System statistics and audit log queries

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use super::stores::{parse_status, RoleRequestListQuery};
use crate::{
    audit_log,
    auth::SuperAdminOnly,
    error::ApiError,
    rbac::{ApprovalOutcome, ApproveRoleRequest, CustomRoleUsage, RejectRoleRequest},
    state::AppState,
    storage::{
        AuditEvent, AuditEventType, AuditRepository, CustomRoleRepository, CustomRoleRequest,
        OrganizationRepository, RoleRequestRepository, RoleRequestStatus, Store, StoreRepository,
        StoredUser, UserRepository,
    },
};

/// Largest page of audit events returned at once.
const MAX_AUDIT_PAGE: usize = 1000;
const DEFAULT_AUDIT_PAGE: usize = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetLimitRequest {
    /// New limit, 0 to 50
    pub limit: u32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetStoreActiveRequest {
    pub active: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetSuperAdminRequest {
    pub enabled: bool,
}

/// System statistics response.
#[derive(Debug, Serialize, ToSchema)]
pub struct SystemStatsResponse {
    pub total_users: usize,
    pub super_admins: usize,
    pub organizations: usize,
    pub stores: usize,
    pub active_custom_roles: usize,
    pub pending_role_requests: usize,
    pub uptime_seconds: u64,
    pub timestamp: String,
}

/// Query parameters for audit log queries.
#[derive(Debug, Deserialize, IntoParams)]
pub struct AuditQueryParams {
    /// Start date (YYYY-MM-DD), defaults to today.
    pub start_date: Option<String>,
    /// End date (YYYY-MM-DD), defaults to today.
    pub end_date: Option<String>,
    pub user_id: Option<String>,
    /// snake_case event type, e.g. `role_request_approved`
    pub event_type: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    /// Maximum number of results (default 100, max 1000).
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Response for audit log queries.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogResponse {
    pub events: Vec<AuditEvent>,
    /// Matches before limit/offset.
    pub total: usize,
    pub has_more: bool,
}

// ============================================================================
// Role request review
// ============================================================================

/// List role requests across all stores, newest first.
#[utoipa::path(
    get,
    path = "/v1/admin/role-requests",
    tag = "Admin",
    params(RoleRequestListQuery),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Role requests", body = [CustomRoleRequest]),
        (status = 400, description = "Unknown status"),
        (status = 403, description = "Not a super-admin")
    )
)]
pub async fn list_role_requests(
    SuperAdminOnly(_admin): SuperAdminOnly,
    State(state): State<AppState>,
    Query(query): Query<RoleRequestListQuery>,
) -> Result<Json<Vec<CustomRoleRequest>>, ApiError> {
    let status = parse_status(query.status.as_deref())?;
    Ok(Json(RoleRequestRepository::new(&state.db).list(status)?))
}

/// Approve a pending request, optionally with a modified permission set.
#[utoipa::path(
    post,
    path = "/v1/admin/role-requests/{request_id}/approve",
    tag = "Admin",
    params(("request_id" = String, Path, description = "Role request ID")),
    request_body = ApproveRoleRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Approved", body = ApprovalOutcome),
        (status = 400, description = "Invalid permissions"),
        (status = 403, description = "Not a super-admin"),
        (status = 404, description = "Role request not found"),
        (status = 409, description = "Not pending, duplicate name, or limit reached")
    )
)]
pub async fn approve_role_request(
    SuperAdminOnly(admin): SuperAdminOnly,
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Json(body): Json<ApproveRoleRequest>,
) -> Result<Json<ApprovalOutcome>, ApiError> {
    Ok(Json(state.workflow().approve(&admin, &request_id, &body)?))
}

/// Reject a pending request with a reason.
#[utoipa::path(
    post,
    path = "/v1/admin/role-requests/{request_id}/reject",
    tag = "Admin",
    params(("request_id" = String, Path, description = "Role request ID")),
    request_body = RejectRoleRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Rejected", body = CustomRoleRequest),
        (status = 400, description = "Missing reason"),
        (status = 403, description = "Not a super-admin"),
        (status = 404, description = "Role request not found"),
        (status = 409, description = "Not pending")
    )
)]
pub async fn reject_role_request(
    SuperAdminOnly(admin): SuperAdminOnly,
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Json(body): Json<RejectRoleRequest>,
) -> Result<Json<CustomRoleRequest>, ApiError> {
    Ok(Json(state.workflow().reject(&admin, &request_id, &body.reason)?))
}

// ============================================================================
// Limits and grants
// ============================================================================

/// Change a store's custom role limit.
#[utoipa::path(
    put,
    path = "/v1/admin/stores/{store_id}/custom-role-limit",
    tag = "Admin",
    params(("store_id" = String, Path, description = "Store ID")),
    request_body = SetLimitRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Usage under the new limit", body = CustomRoleUsage),
        (status = 400, description = "Limit out of range"),
        (status = 403, description = "Not a super-admin"),
        (status = 404, description = "Store not found")
    )
)]
pub async fn set_custom_role_limit(
    SuperAdminOnly(admin): SuperAdminOnly,
    State(state): State<AppState>,
    Path(store_id): Path<String>,
    Json(body): Json<SetLimitRequest>,
) -> Result<Json<CustomRoleUsage>, ApiError> {
    Ok(Json(state.workflow().set_limit(&admin, &store_id, body.limit)?))
}

/// Activate or deactivate a store.
///
/// Staff of an inactive store lose their store roles; organization
/// memberships are unaffected.
#[utoipa::path(
    put,
    path = "/v1/admin/stores/{store_id}/active",
    tag = "Admin",
    params(("store_id" = String, Path, description = "Store ID")),
    request_body = SetStoreActiveRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Updated store", body = Store),
        (status = 403, description = "Not a super-admin"),
        (status = 404, description = "Store not found")
    )
)]
pub async fn set_store_active(
    SuperAdminOnly(admin): SuperAdminOnly,
    State(state): State<AppState>,
    Path(store_id): Path<String>,
    Json(body): Json<SetStoreActiveRequest>,
) -> Result<Json<Store>, ApiError> {
    let (previous, store) = StoreRepository::new(&state.db).set_active(&store_id, body.active)?;

    if previous != body.active {
        // Every staff context of the store is affected
        state.contexts.clear();
        let event_type = if body.active {
            AuditEventType::StoreActivated
        } else {
            AuditEventType::StoreDeactivated
        };
        info!(store_id = %store.id, active = body.active, admin = %admin.user_id, "Store activation changed");
        audit_log!(
            &state.files,
            event_type,
            &admin.user_id,
            "store",
            &store.id,
            serde_json::json!({ "organization_id": store.organization_id })
        );
    }

    Ok(Json(store))
}

/// Grant or revoke the super-admin flag.
#[utoipa::path(
    put,
    path = "/v1/admin/users/{user_id}/super-admin",
    tag = "Admin",
    params(("user_id" = String, Path, description = "User ID")),
    request_body = SetSuperAdminRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Updated user", body = StoredUser),
        (status = 400, description = "Cannot revoke your own flag"),
        (status = 403, description = "Not a super-admin")
    )
)]
pub async fn set_super_admin(
    SuperAdminOnly(admin): SuperAdminOnly,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<SetSuperAdminRequest>,
) -> Result<Json<StoredUser>, ApiError> {
    if user_id == admin.user_id && !body.enabled {
        return Err(ApiError::bad_request("cannot revoke your own super-admin flag"));
    }

    let (previous, user) = UserRepository::new(&state.db).set_super_admin(&user_id, body.enabled)?;
    state.contexts.invalidate_user(&user_id);

    if previous != body.enabled {
        let event_type = if body.enabled {
            AuditEventType::SuperAdminGranted
        } else {
            AuditEventType::SuperAdminRevoked
        };
        info!(target_user = %user_id, enabled = body.enabled, admin = %admin.user_id, "Super-admin flag changed");
        audit_log!(&state.files, event_type, &admin.user_id, "user", &user_id);
    }

    Ok(Json(user))
}

// ============================================================================
// Observability
// ============================================================================

/// Get system statistics.
#[utoipa::path(
    get,
    path = "/v1/admin/stats",
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "System statistics", body = SystemStatsResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not a super-admin")
    )
)]
pub async fn get_system_stats(
    SuperAdminOnly(admin): SuperAdminOnly,
    State(state): State<AppState>,
) -> Result<Json<SystemStatsResponse>, ApiError> {
    let users = UserRepository::new(&state.db);
    let stats = SystemStatsResponse {
        total_users: users.count()?,
        super_admins: users.list_super_admins()?.len(),
        organizations: OrganizationRepository::new(&state.db).count()?,
        stores: StoreRepository::new(&state.db).count()?,
        active_custom_roles: CustomRoleRepository::new(&state.db).count_all_active()?,
        pending_role_requests: RoleRequestRepository::new(&state.db)
            .list(Some(RoleRequestStatus::Pending))?
            .len(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now().to_rfc3339(),
    };

    audit_log!(&state.files, AuditEventType::AdminAccess, &admin.user_id);

    Ok(Json(stats))
}

/// Query audit logs.
///
/// Filters by date range, user, event type and resource. Defaults to today.
#[utoipa::path(
    get,
    path = "/v1/admin/audit/events",
    tag = "Admin",
    params(AuditQueryParams),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Audit events", body = AuditLogResponse),
        (status = 400, description = "Invalid query parameters"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not a super-admin")
    )
)]
pub async fn query_audit_logs(
    SuperAdminOnly(admin): SuperAdminOnly,
    Query(params): Query<AuditQueryParams>,
    State(state): State<AppState>,
) -> Result<Json<AuditLogResponse>, ApiError> {
    let today = Utc::now().format("%Y-%m-%d").to_string();
    let start_date = params.start_date.as_deref().unwrap_or(&today);
    let end_date = params.end_date.as_deref().unwrap_or(&today);

    let mut events = AuditRepository::new(&state.files).read_events_range(start_date, end_date)?;
    filter_events(&mut events, &params);

    let total = events.len();
    let limit = params.limit.unwrap_or(DEFAULT_AUDIT_PAGE).min(MAX_AUDIT_PAGE);
    let offset = params.offset.unwrap_or(0);
    let has_more = offset.saturating_add(limit) < total;
    let events: Vec<AuditEvent> = events.into_iter().skip(offset).take(limit).collect();

    audit_log!(&state.files, AuditEventType::AdminAccess, &admin.user_id);

    Ok(Json(AuditLogResponse {
        events,
        total,
        has_more,
    }))
}

fn filter_events(events: &mut Vec<AuditEvent>, params: &AuditQueryParams) {
    if let Some(user_id) = &params.user_id {
        events.retain(|e| e.user_id.as_deref() == Some(user_id.as_str()));
    }
    if let Some(event_type) = &params.event_type {
        events.retain(|e| {
            serde_json::to_value(e.event_type)
                .ok()
                .and_then(|v| v.as_str().map(|s| s == event_type))
                .unwrap_or(false)
        });
    }
    if let Some(resource_type) = &params.resource_type {
        events.retain(|e| e.resource_type.as_deref() == Some(resource_type.as_str()));
    }
    if let Some(resource_id) = &params.resource_id {
        events.retain(|e| e.resource_id.as_deref() == Some(resource_id.as_str()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> AuditQueryParams {
        AuditQueryParams {
            start_date: None,
            end_date: None,
            user_id: None,
            event_type: None,
            resource_type: None,
            resource_id: None,
            limit: None,
            offset: None,
        }
    }

    #[test]
    fn filters_combine() {
        let mut events = vec![
            AuditEvent::new(AuditEventType::RoleRequestApproved)
                .with_user("root")
                .with_resource("role_request", "r1"),
            AuditEvent::new(AuditEventType::RoleRequestRejected)
                .with_user("root")
                .with_resource("role_request", "r2"),
            AuditEvent::new(AuditEventType::StaffAdded)
                .with_user("owner")
                .with_resource("store_staff", "st1"),
        ];

        let mut by_type = params();
        by_type.event_type = Some("role_request_approved".to_string());
        let mut approved = events.clone();
        filter_events(&mut approved, &by_type);
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].resource_id.as_deref(), Some("r1"));

        let mut by_user = params();
        by_user.user_id = Some("root".to_string());
        by_user.resource_type = Some("role_request".to_string());
        filter_events(&mut events, &by_user);
        assert_eq!(events.len(), 2);
    }
}
