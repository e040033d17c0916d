// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Store endpoints: staff, custom roles and role requests.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use super::access::{authorize, deny, store_context};
use crate::audit_log;
use crate::auth::Auth;
use crate::error::ApiError;
use crate::rbac::{
    CustomRoleUsage, DeactivationOutcome, Role, RoleScope, SubmitRoleRequest,
};
use crate::state::AppState;
use crate::storage::{
    AuditEventType, CustomRole, CustomRoleRepository, CustomRoleRequest, RoleRequestRepository,
    RoleRequestStatus, Store, StoreRepository, StoreStaff,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddStaffRequest {
    pub user_id: String,
    /// Built-in store role
    pub role: Option<Role>,
    /// Active custom role of this store
    pub custom_role_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetCustomRoleRequest {
    /// `null` detaches the current custom role
    pub custom_role_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct CustomRoleListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct RoleRequestListQuery {
    /// pending, approved, rejected or cancelled
    pub status: Option<String>,
}

/// Parse an optional status filter.
pub(crate) fn parse_status(raw: Option<&str>) -> Result<Option<RoleRequestStatus>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => RoleRequestStatus::parse(s)
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("unknown status `{s}`"))),
    }
}

/// Get a store.
#[utoipa::path(
    get,
    path = "/v1/stores/{store_id}",
    tag = "Stores",
    params(("store_id" = String, Path, description = "Store ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Store", body = Store),
        (status = 403, description = "Missing store:read"),
        (status = 404, description = "Store not found")
    )
)]
pub async fn get_store(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(store_id): Path<String>,
) -> Result<Json<Store>, ApiError> {
    let (store, context) = store_context(&state, &user.user_id, &store_id)?;
    authorize(&state, &context, "store:read", "store", &store.id)?;
    Ok(Json(store))
}

/// List active staff, highest role first.
#[utoipa::path(
    get,
    path = "/v1/stores/{store_id}/staff",
    tag = "Stores",
    params(("store_id" = String, Path, description = "Store ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Active staff", body = [StoreStaff]),
        (status = 403, description = "Missing staff:read"),
        (status = 404, description = "Store not found")
    )
)]
pub async fn list_staff(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(store_id): Path<String>,
) -> Result<Json<Vec<StoreStaff>>, ApiError> {
    let (store, context) = store_context(&state, &user.user_id, &store_id)?;
    authorize(&state, &context, "staff:read", "store", &store.id)?;
    Ok(Json(StoreRepository::new(&state.db).staff(&store.id)?))
}

/// Add a staff member with a built-in role, a custom role, or both.
#[utoipa::path(
    post,
    path = "/v1/stores/{store_id}/staff",
    tag = "Stores",
    params(("store_id" = String, Path, description = "Store ID")),
    request_body = AddStaffRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Staff added", body = StoreStaff),
        (status = 400, description = "No role, or not a store role"),
        (status = 403, description = "Missing permission or role too high"),
        (status = 404, description = "Store or custom role not found"),
        (status = 409, description = "Already staff, or custom role inactive")
    )
)]
pub async fn add_staff(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(store_id): Path<String>,
    Json(request): Json<AddStaffRequest>,
) -> Result<(StatusCode, Json<StoreStaff>), ApiError> {
    let (store, context) = store_context(&state, &user.user_id, &store_id)?;
    authorize(&state, &context, "staff:create", "store", &store.id)?;

    let custom_role_id = request
        .custom_role_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if request.role.is_none() && custom_role_id.is_none() {
        return Err(ApiError::bad_request("a role or a custom role is required"));
    }
    if let Some(role) = request.role {
        if role.scope() != RoleScope::Store {
            return Err(ApiError::bad_request(format!("{role} is not a store role")));
        }
        if !context.can_assign(role) {
            return Err(deny(
                &state,
                &user.user_id,
                "store",
                &store.id,
                &format!("cannot grant {role}"),
            ));
        }
    }
    if custom_role_id.is_some() {
        authorize(&state, &context, "roles:assign", "store", &store.id)?;
    }

    let staff = StoreRepository::new(&state.db).add_staff(
        &store.id,
        request.user_id.trim(),
        request.role,
        custom_role_id,
    )?;
    state.contexts.invalidate_user(&staff.user_id);

    info!(store_id = %store.id, staff_id = %staff.id, member = %staff.user_id, "Staff added");
    audit_log!(
        &state.files,
        AuditEventType::StaffAdded,
        &user.user_id,
        "store_staff",
        &staff.id,
        serde_json::json!({
            "store_id": store.id,
            "staff_user_id": staff.user_id,
            "role": staff.role,
            "custom_role_id": staff.custom_role_id,
        })
    );

    Ok((StatusCode::CREATED, Json(staff)))
}

/// Remove a staff member, or leave the store (soft delete).
#[utoipa::path(
    delete,
    path = "/v1/stores/{store_id}/staff/{staff_id}",
    tag = "Stores",
    params(
        ("store_id" = String, Path, description = "Store ID"),
        ("staff_id" = String, Path, description = "Staff row ID")
    ),
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Staff removed"),
        (status = 403, description = "Missing staff:delete or member outranks caller"),
        (status = 404, description = "Store or staff not found")
    )
)]
pub async fn remove_staff(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path((store_id, staff_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let (store, context) = store_context(&state, &user.user_id, &store_id)?;

    let repo = StoreRepository::new(&state.db);
    let existing = repo
        .staff_member(&staff_id)?
        .filter(|s| s.store_id == store.id && s.is_active)
        .ok_or_else(|| ApiError::not_found(format!("Store staff {staff_id} not found")))?;
    // Leaving needs no permission
    if existing.user_id != user.user_id {
        authorize(&state, &context, "staff:delete", "store", &store.id)?;
        if let Some(role) = existing.role.filter(|role| !context.can_assign(*role)) {
            return Err(deny(
                &state,
                &user.user_id,
                "store_staff",
                &existing.id,
                &format!("cannot remove staff with role {role}"),
            ));
        }
    }

    let removed = repo.remove_staff(&store.id, &existing.id)?;
    state.contexts.invalidate_user(&removed.user_id);

    info!(store_id = %store.id, staff_id = %removed.id, "Staff removed");
    audit_log!(
        &state.files,
        AuditEventType::StaffRemoved,
        &user.user_id,
        "store_staff",
        &removed.id,
        serde_json::json!({ "store_id": store.id, "staff_user_id": removed.user_id })
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Attach or detach a staff member's custom role.
#[utoipa::path(
    put,
    path = "/v1/stores/{store_id}/staff/{staff_id}/custom-role",
    tag = "Stores",
    params(
        ("store_id" = String, Path, description = "Store ID"),
        ("staff_id" = String, Path, description = "Staff row ID")
    ),
    request_body = SetCustomRoleRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Updated staff row", body = StoreStaff),
        (status = 400, description = "Custom role not active in this store"),
        (status = 403, description = "Missing roles:assign"),
        (status = 404, description = "Store, staff or custom role not found"),
        (status = 409, description = "Nothing to detach, or staff would have no role")
    )
)]
pub async fn set_staff_custom_role(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path((store_id, staff_id)): Path<(String, String)>,
    Json(request): Json<SetCustomRoleRequest>,
) -> Result<Json<StoreStaff>, ApiError> {
    let (store, context) = store_context(&state, &user.user_id, &store_id)?;
    let workflow = state.workflow();
    let staff = match request.custom_role_id.as_deref().map(str::trim) {
        Some(role_id) if !role_id.is_empty() => {
            workflow.assign(&context, &store.id, &staff_id, role_id)?
        }
        _ => workflow.unassign(&context, &store.id, &staff_id)?,
    };
    Ok(Json(staff))
}

/// List the store's custom roles.
#[utoipa::path(
    get,
    path = "/v1/stores/{store_id}/custom-roles",
    tag = "Stores",
    params(
        ("store_id" = String, Path, description = "Store ID"),
        CustomRoleListQuery
    ),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Custom roles", body = [CustomRole]),
        (status = 403, description = "Missing roles:read"),
        (status = 404, description = "Store not found")
    )
)]
pub async fn list_custom_roles(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(store_id): Path<String>,
    Query(query): Query<CustomRoleListQuery>,
) -> Result<Json<Vec<CustomRole>>, ApiError> {
    let (store, context) = store_context(&state, &user.user_id, &store_id)?;
    authorize(&state, &context, "roles:read", "store", &store.id)?;
    Ok(Json(
        CustomRoleRepository::new(&state.db).list_for_store(&store.id, query.include_inactive)?,
    ))
}

/// Deactivate a custom role and detach it from all staff.
#[utoipa::path(
    delete,
    path = "/v1/stores/{store_id}/custom-roles/{role_id}",
    tag = "Stores",
    params(
        ("store_id" = String, Path, description = "Store ID"),
        ("role_id" = String, Path, description = "Custom role ID")
    ),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Role deactivated", body = DeactivationOutcome),
        (status = 403, description = "Missing roles:delete"),
        (status = 404, description = "Store or custom role not found"),
        (status = 409, description = "Already inactive")
    )
)]
pub async fn deactivate_custom_role(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path((store_id, role_id)): Path<(String, String)>,
) -> Result<Json<DeactivationOutcome>, ApiError> {
    let (store, context) = store_context(&state, &user.user_id, &store_id)?;
    Ok(Json(state.workflow().deactivate(&context, &store.id, &role_id)?))
}

/// Custom role usage against the store's limit.
#[utoipa::path(
    get,
    path = "/v1/stores/{store_id}/custom-roles/usage",
    tag = "Stores",
    params(("store_id" = String, Path, description = "Store ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Usage", body = CustomRoleUsage),
        (status = 403, description = "Missing roles:read"),
        (status = 404, description = "Store not found")
    )
)]
pub async fn custom_role_usage(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(store_id): Path<String>,
) -> Result<Json<CustomRoleUsage>, ApiError> {
    let (store, context) = store_context(&state, &user.user_id, &store_id)?;
    authorize(&state, &context, "roles:read", "store", &store.id)?;
    Ok(Json(state.workflow().usage(&store.id)?))
}

/// List the store's role requests, newest first.
#[utoipa::path(
    get,
    path = "/v1/stores/{store_id}/role-requests",
    tag = "Stores",
    params(
        ("store_id" = String, Path, description = "Store ID"),
        RoleRequestListQuery
    ),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Role requests", body = [CustomRoleRequest]),
        (status = 400, description = "Unknown status"),
        (status = 403, description = "Missing roles:read"),
        (status = 404, description = "Store not found")
    )
)]
pub async fn list_role_requests(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(store_id): Path<String>,
    Query(query): Query<RoleRequestListQuery>,
) -> Result<Json<Vec<CustomRoleRequest>>, ApiError> {
    let status = parse_status(query.status.as_deref())?;
    let (store, context) = store_context(&state, &user.user_id, &store_id)?;
    authorize(&state, &context, "roles:read", "store", &store.id)?;
    Ok(Json(
        RoleRequestRepository::new(&state.db).list_for_store(&store.id, status)?,
    ))
}

/// Submit a custom role request for review.
#[utoipa::path(
    post,
    path = "/v1/stores/{store_id}/role-requests",
    tag = "Stores",
    params(("store_id" = String, Path, description = "Store ID")),
    request_body = SubmitRoleRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Request submitted", body = CustomRoleRequest),
        (status = 400, description = "Invalid name or permissions"),
        (status = 403, description = "Missing roles:request"),
        (status = 404, description = "Store not found"),
        (status = 409, description = "Duplicate name or limit reached")
    )
)]
pub async fn submit_role_request(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(store_id): Path<String>,
    Json(request): Json<SubmitRoleRequest>,
) -> Result<(StatusCode, Json<CustomRoleRequest>), ApiError> {
    let (store, context) = store_context(&state, &user.user_id, &store_id)?;
    let submitted = state.workflow().submit(&context, &store.id, &request)?;
    Ok((StatusCode::CREATED, Json(submitted)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_filter_parsing() {
        assert_eq!(parse_status(None).unwrap(), None);
        assert_eq!(parse_status(Some("  ")).unwrap(), None);
        assert_eq!(
            parse_status(Some("pending")).unwrap(),
            Some(RoleRequestStatus::Pending)
        );
        assert!(parse_status(Some("approvedish")).is_err());
    }

    #[test]
    fn set_custom_role_accepts_null() {
        let request: SetCustomRoleRequest =
            serde_json::from_str(r#"{"custom_role_id":null}"#).unwrap();
        assert!(request.custom_role_id.is_none());
    }
}
