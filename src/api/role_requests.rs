// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Individual custom role requests, outside any store route.

use axum::{
    extract::{Path, State},
    Json,
};

use super::access::{deny, store_context};
use crate::auth::Auth;
use crate::error::ApiError;
use crate::rbac::AccessScope;
use crate::state::AppState;
use crate::storage::{CustomRoleRequest, RoleRequestRepository};

/// Get one role request.
///
/// Visible to its requester and to anyone with `roles:read` in its store.
#[utoipa::path(
    get,
    path = "/v1/role-requests/{request_id}",
    tag = "Role Requests",
    params(("request_id" = String, Path, description = "Role request ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Role request", body = CustomRoleRequest),
        (status = 403, description = "Not visible to the caller"),
        (status = 404, description = "Role request not found")
    )
)]
pub async fn get_role_request(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<CustomRoleRequest>, ApiError> {
    let request = RoleRequestRepository::new(&state.db).require(&request_id)?;
    if request.requested_by == user.user_id {
        return Ok(Json(request));
    }

    let (_, context) = store_context(&state, &user.user_id, &request.store_id)?;
    if !context.has_permission("roles:read") {
        return Err(deny(
            &state,
            &user.user_id,
            "role_request",
            &request.id,
            "missing permission `roles:read`",
        ));
    }
    Ok(Json(request))
}

/// Cancel a pending request. Only its requester or a super-admin may.
#[utoipa::path(
    post,
    path = "/v1/role-requests/{request_id}/cancel",
    tag = "Role Requests",
    params(("request_id" = String, Path, description = "Role request ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Request cancelled", body = CustomRoleRequest),
        (status = 403, description = "Not the requester"),
        (status = 404, description = "Role request not found"),
        (status = 409, description = "Request already reviewed")
    )
)]
pub async fn cancel_role_request(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<CustomRoleRequest>, ApiError> {
    let context = state.resolve_context(&user.user_id, &AccessScope::Platform)?;
    Ok(Json(state.workflow().cancel(&context, &request_id)?))
}
