// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    rbac::{
        AccessScope, ApprovalOutcome, ApproveRoleRequest, CatalogEntry, CustomRoleGrant,
        CustomRoleUsage, DeactivationOutcome, RejectRoleRequest, Role, RoleScope,
        SubmitRoleRequest, UserContext,
    },
    state::AppState,
    storage::{
        AuditEvent, AuditEventType, CustomRole, CustomRoleRequest, Membership, Notification,
        NotificationKind, Organization, RoleRequestStatus, Store, StoreStaff, StoredUser,
    },
};

pub mod access;
pub mod admin;
pub mod health;
pub mod notifications;
pub mod organizations;
pub mod role_requests;
pub mod roles;
pub mod stores;
pub mod users;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        // Users
        .route("/users/me", get(users::get_current_user))
        .route("/users/me/context", get(users::get_current_context))
        .route("/users/me/permissions/check", post(users::check_permissions))
        // Role table
        .route("/roles", get(roles::list_roles))
        .route("/permissions/catalog", get(roles::permission_catalog))
        // Organizations
        .route("/organizations", post(organizations::create_organization))
        .route("/organizations/{organization_id}", get(organizations::get_organization))
        .route(
            "/organizations/{organization_id}/members",
            get(organizations::list_members).post(organizations::add_member),
        )
        .route(
            "/organizations/{organization_id}/members/{user_id}",
            delete(organizations::remove_member),
        )
        .route(
            "/organizations/{organization_id}/stores",
            post(organizations::create_store),
        )
        // Stores
        .route("/stores/{store_id}", get(stores::get_store))
        .route(
            "/stores/{store_id}/staff",
            get(stores::list_staff).post(stores::add_staff),
        )
        .route(
            "/stores/{store_id}/staff/{staff_id}",
            delete(stores::remove_staff),
        )
        .route(
            "/stores/{store_id}/staff/{staff_id}/custom-role",
            put(stores::set_staff_custom_role),
        )
        .route(
            "/stores/{store_id}/custom-roles",
            get(stores::list_custom_roles),
        )
        .route(
            "/stores/{store_id}/custom-roles/usage",
            get(stores::custom_role_usage),
        )
        .route(
            "/stores/{store_id}/custom-roles/{role_id}",
            delete(stores::deactivate_custom_role),
        )
        .route(
            "/stores/{store_id}/role-requests",
            get(stores::list_role_requests).post(stores::submit_role_request),
        )
        // Role requests
        .route("/role-requests/{request_id}", get(role_requests::get_role_request))
        .route(
            "/role-requests/{request_id}/cancel",
            post(role_requests::cancel_role_request),
        )
        // Notifications
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route(
            "/notifications/{notification_id}/read",
            post(notifications::mark_read),
        )
        // Admin
        .route("/admin/role-requests", get(admin::list_role_requests))
        .route(
            "/admin/role-requests/{request_id}/approve",
            post(admin::approve_role_request),
        )
        .route(
            "/admin/role-requests/{request_id}/reject",
            post(admin::reject_role_request),
        )
        .route(
            "/admin/stores/{store_id}/custom-role-limit",
            put(admin::set_custom_role_limit),
        )
        .route("/admin/stores/{store_id}/active", put(admin::set_store_active))
        .route(
            "/admin/users/{user_id}/super-admin",
            put(admin::set_super_admin),
        )
        .route("/admin/stats", get(admin::get_system_stats))
        .route("/admin/audit/events", get(admin::query_audit_logs))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        users::get_current_user,
        users::get_current_context,
        users::check_permissions,
        roles::list_roles,
        roles::permission_catalog,
        organizations::create_organization,
        organizations::get_organization,
        organizations::list_members,
        organizations::add_member,
        organizations::remove_member,
        organizations::create_store,
        stores::get_store,
        stores::list_staff,
        stores::add_staff,
        stores::remove_staff,
        stores::set_staff_custom_role,
        stores::list_custom_roles,
        stores::deactivate_custom_role,
        stores::custom_role_usage,
        stores::list_role_requests,
        stores::submit_role_request,
        role_requests::get_role_request,
        role_requests::cancel_role_request,
        notifications::list_notifications,
        notifications::mark_read,
        notifications::mark_all_read,
        admin::list_role_requests,
        admin::approve_role_request,
        admin::reject_role_request,
        admin::set_custom_role_limit,
        admin::set_store_active,
        admin::set_super_admin,
        admin::get_system_stats,
        admin::query_audit_logs
    ),
    components(
        schemas(
            Role,
            RoleScope,
            AccessScope,
            UserContext,
            CustomRoleGrant,
            CatalogEntry,
            Organization,
            Membership,
            Store,
            StoreStaff,
            StoredUser,
            CustomRole,
            CustomRoleRequest,
            RoleRequestStatus,
            SubmitRoleRequest,
            ApproveRoleRequest,
            RejectRoleRequest,
            CustomRoleUsage,
            ApprovalOutcome,
            DeactivationOutcome,
            Notification,
            NotificationKind,
            AuditEvent,
            AuditEventType
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Users", description = "Current user, resolved context and permission checks"),
        (name = "Roles", description = "Built-in roles and the permission catalog"),
        (name = "Organizations", description = "Organizations, memberships and store creation"),
        (name = "Stores", description = "Staff, custom roles and role requests of a store"),
        (name = "Role Requests", description = "Individual custom role requests"),
        (name = "Notifications", description = "In-app notifications"),
        (name = "Admin", description = "Super-admin review and operations")
    )
)]
pub struct ApiDoc;
