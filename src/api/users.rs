// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User endpoints: profile, resolved context and permission checks.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::Auth;
use crate::error::ApiError;
use crate::rbac::{AccessScope, Permission, Role, UserContext};
use crate::state::AppState;
use crate::storage::{
    Membership, Organization, OrganizationRepository, Store, StoreRepository, StoreStaff,
    StoredUser, UserRepository,
};

/// Upper bound on permissions in one check request.
const MAX_CHECKED_PERMISSIONS: usize = 100;

/// Response for GET /v1/users/me
#[derive(Debug, Serialize, ToSchema)]
pub struct UserMeResponse {
    pub user: StoredUser,
    pub memberships: Vec<Membership>,
    /// Active staff rows
    pub staff: Vec<StoreStaff>,
}

/// Scope selection for context queries. A store wins over an organization.
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ScopeQuery {
    pub organization_id: Option<String>,
    pub store_id: Option<String>,
}

impl ScopeQuery {
    /// Build the scope, failing with 404 for unknown tenants.
    fn into_scope(self, state: &AppState) -> Result<AccessScope, ApiError> {
        let scope = AccessScope::from_ids(self.organization_id, self.store_id);
        match &scope {
            AccessScope::Store(id) => {
                state.db.require::<Store>(id)?;
            }
            AccessScope::Organization(id) => {
                state.db.require::<Organization>(id)?;
            }
            AccessScope::Platform => {}
        }
        Ok(scope)
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckMode {
    /// Allowed when any permission is held
    Any,
    /// Allowed only when every permission is held
    #[default]
    All,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PermissionCheckRequest {
    pub permissions: Vec<String>,
    #[serde(default)]
    pub mode: CheckMode,
    pub organization_id: Option<String>,
    pub store_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionCheckResult {
    pub permission: String,
    pub allowed: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionCheckResponse {
    pub allowed: bool,
    pub effective_role: Role,
    pub results: Vec<PermissionCheckResult>,
}

/// Get the current user's profile, memberships and staff rows.
///
/// The profile row is created on first call and refreshed from token claims
/// afterwards.
#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "User information", body = UserMeResponse),
        (status = 401, description = "Unauthorized - invalid or missing token"),
    )
)]
pub async fn get_current_user(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<UserMeResponse>, ApiError> {
    let stored = UserRepository::new(&state.db).upsert_profile(
        &user.user_id,
        user.email.as_deref(),
        user.name.as_deref(),
    )?;
    let memberships = OrganizationRepository::new(&state.db).memberships_for_user(&user.user_id)?;
    let staff = StoreRepository::new(&state.db).active_staff_for_user(&user.user_id, None)?;

    Ok(Json(UserMeResponse {
        user: stored,
        memberships,
        staff,
    }))
}

/// Resolve the current user's roles and permissions in a scope.
#[utoipa::path(
    get,
    path = "/v1/users/me/context",
    tag = "Users",
    params(ScopeQuery),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Resolved context", body = UserContext),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Organization or store not found")
    )
)]
pub async fn get_current_context(
    Auth(user): Auth,
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<UserContext>, ApiError> {
    let scope = query.into_scope(&state)?;
    Ok(Json(state.resolve_context(&user.user_id, &scope)?))
}

/// Check permissions for the current user in a scope.
#[utoipa::path(
    post,
    path = "/v1/users/me/permissions/check",
    tag = "Users",
    request_body = PermissionCheckRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Check results", body = PermissionCheckResponse),
        (status = 400, description = "Invalid permission string"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Organization or store not found")
    )
)]
pub async fn check_permissions(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<PermissionCheckRequest>,
) -> Result<Json<PermissionCheckResponse>, ApiError> {
    if request.permissions.is_empty() {
        return Err(ApiError::bad_request("at least one permission is required"));
    }
    if request.permissions.len() > MAX_CHECKED_PERMISSIONS {
        return Err(ApiError::bad_request(format!(
            "at most {MAX_CHECKED_PERMISSIONS} permissions per check"
        )));
    }
    for raw in &request.permissions {
        Permission::parse(raw).map_err(|e| ApiError::bad_request(format!("`{raw}`: {e}")))?;
    }

    let scope = ScopeQuery {
        organization_id: request.organization_id,
        store_id: request.store_id,
    }
    .into_scope(&state)?;
    let context = state.resolve_context(&user.user_id, &scope)?;

    let results: Vec<PermissionCheckResult> = request
        .permissions
        .into_iter()
        .map(|permission| PermissionCheckResult {
            allowed: context.has_permission(&permission),
            permission,
        })
        .collect();
    let allowed = match request.mode {
        CheckMode::Any => results.iter().any(|r| r.allowed),
        CheckMode::All => results.iter().all(|r| r.allowed),
    };

    Ok(Json(PermissionCheckResponse {
        allowed,
        effective_role: context.effective_role,
        results,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_request_defaults_to_all() {
        let request: PermissionCheckRequest =
            serde_json::from_str(r#"{"permissions":["orders:read"]}"#).unwrap();
        assert_eq!(request.mode, CheckMode::All);
        assert!(request.store_id.is_none());

        let request: PermissionCheckRequest =
            serde_json::from_str(r#"{"permissions":["orders:read"],"mode":"any","store_id":"s1"}"#)
                .unwrap();
        assert_eq!(request.mode, CheckMode::Any);
        assert_eq!(request.store_id.as_deref(), Some("s1"));
    }
}
