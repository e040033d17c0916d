// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Permission enforcement shared by the tenant endpoints.
//!
//! Every tenant handler resolves the caller's context for the organization or
//! store in the path, then checks one permission. Unknown tenants are 404
//! before any permission check; refusals are 403 and audited.

use tracing::warn;

use crate::error::ApiError;
use crate::rbac::{AccessScope, UserContext};
use crate::state::AppState;
use crate::storage::{AuditEvent, AuditEventType, AuditRepository, Organization, Store};

/// Load a store and resolve the caller's context in it.
pub fn store_context(state: &AppState, user_id: &str, store_id: &str) -> Result<(Store, UserContext), ApiError> {
    let store = state.db.require::<Store>(store_id)?;
    let context = state.resolve_context(user_id, &AccessScope::Store(store.id.clone()))?;
    Ok((store, context))
}

/// Load an organization and resolve the caller's context in it.
pub fn organization_context(
    state: &AppState,
    user_id: &str,
    organization_id: &str,
) -> Result<(Organization, UserContext), ApiError> {
    let organization = state.db.require::<Organization>(organization_id)?;
    let context =
        state.resolve_context(user_id, &AccessScope::Organization(organization.id.clone()))?;
    Ok((organization, context))
}

/// Require `permission`, auditing the refusal.
pub fn authorize(
    state: &AppState,
    context: &UserContext,
    permission: &str,
    resource_type: &str,
    resource_id: &str,
) -> Result<(), ApiError> {
    context.require_permission(permission).map_err(|denied| {
        deny(state, &context.user_id, resource_type, resource_id, &denied.to_string())
    })
}

/// Audit and build a 403 for a refused action.
pub fn deny(state: &AppState, user_id: &str, resource_type: &str, resource_id: &str, reason: &str) -> ApiError {
    warn!(
        user_id = %user_id,
        resource_type = %resource_type,
        resource_id = %resource_id,
        reason = %reason,
        "Permission denied"
    );
    AuditRepository::new(&state.files).record(
        AuditEvent::new(AuditEventType::PermissionDenied)
            .with_user(user_id)
            .with_resource(resource_type, resource_id)
            .failed(reason),
    );
    ApiError::forbidden(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::Role;
    use crate::state::test_state;
    use crate::storage::{OrganizationRepository, StoreRepository};
    use axum::http::StatusCode;
    use chrono::Utc;

    #[test]
    fn unknown_store_is_not_found() {
        let (state, _temp) = test_state();
        let err = store_context(&state, "u1", "missing").unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn authorize_checks_and_audits() {
        let (state, _temp) = test_state();
        let (org, _) = OrganizationRepository::new(&state.db)
            .create("Acme", "acme", "owner")
            .unwrap();
        let store = StoreRepository::new(&state.db)
            .create(&org.id, "Shop", "shop", 5)
            .unwrap();
        StoreRepository::new(&state.db)
            .add_staff(&store.id, "driver", Some(Role::DeliveryBoy), None)
            .unwrap();

        let (_, owner) = store_context(&state, "owner", &store.id).unwrap();
        assert!(authorize(&state, &owner, "staff:create", "store", &store.id).is_ok());

        let (_, driver) = store_context(&state, "driver", &store.id).unwrap();
        let err = authorize(&state, &driver, "staff:create", "store", &store.id).unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let events = AuditRepository::new(&state.files).read_events(&today).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, AuditEventType::PermissionDenied);
        assert_eq!(events[0].user_id.as_deref(), Some("driver"));
        assert!(!events[0].success);
    }
}
