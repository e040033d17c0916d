// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Read-only views of the built-in role table and the permission catalog.

use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::Auth;
use crate::rbac::{CatalogEntry, Role, RoleScope, PERMISSION_CATALOG};

/// One built-in role.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoleInfo {
    pub role: Role,
    pub scope: RoleScope,
    /// Higher outranks lower
    pub level: u8,
    pub permissions: Vec<String>,
}

impl From<Role> for RoleInfo {
    fn from(role: Role) -> Self {
        Self {
            role,
            scope: role.scope(),
            level: role.level(),
            permissions: role.permissions().iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// List built-in roles, highest level first.
#[utoipa::path(
    get,
    path = "/v1/roles",
    tag = "Roles",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Built-in roles", body = [RoleInfo]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_roles(Auth(_user): Auth) -> Json<Vec<RoleInfo>> {
    Json(Role::ALL.into_iter().map(RoleInfo::from).collect())
}

/// List permissions a custom role may contain.
///
/// Besides these entries, `resource:*` is requestable for every listed
/// resource except `settings`.
#[utoipa::path(
    get,
    path = "/v1/permissions/catalog",
    tag = "Roles",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Requestable permissions", body = [CatalogEntry]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn permission_catalog(Auth(_user): Auth) -> Json<&'static [CatalogEntry]> {
    Json(PERMISSION_CATALOG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_info_carries_table() {
        let info = RoleInfo::from(Role::DeliveryBoy);
        assert_eq!(info.scope, RoleScope::Store);
        assert!(info.permissions.contains(&"deliveries:update".to_string()));

        let json = serde_json::to_value(RoleInfo::from(Role::StoreAdmin)).unwrap();
        assert_eq!(json["role"], "STORE_ADMIN");
        assert_eq!(json["scope"], "store");
    }
}
