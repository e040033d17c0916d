// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Organization, membership and store creation endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use super::access::{authorize, deny, organization_context};
use crate::audit_log;
use crate::auth::Auth;
use crate::error::ApiError;
use crate::rbac::{Role, RoleScope};
use crate::state::AppState;
use crate::storage::repository::organizations::{is_valid_slug, slugify};
use crate::storage::{
    AuditEventType, Membership, Organization, OrganizationRepository, Store, StoreRepository,
};

const NAME_MIN_LEN: usize = 2;
const NAME_MAX_LEN: usize = 100;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrganizationRequest {
    pub name: String,
    /// Derived from the name when omitted
    pub slug: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrganizationResponse {
    pub organization: Organization,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<Store>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddMemberRequest {
    pub user_id: String,
    /// Organization-scoped role
    pub role: Role,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateStoreRequest {
    pub name: String,
    /// Derived from the name when omitted
    pub slug: Option<String>,
}

/// Validate a display name and pick a slug.
fn name_and_slug(name: &str, slug: Option<&str>) -> Result<(String, String), ApiError> {
    let name = name.trim();
    let len = name.chars().count();
    if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&len) {
        return Err(ApiError::bad_request(format!(
            "name must be {NAME_MIN_LEN}-{NAME_MAX_LEN} characters"
        )));
    }
    let slug = match slug.map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => slug.to_string(),
        None => slugify(name),
    };
    if !is_valid_slug(&slug) {
        return Err(ApiError::bad_request(
            "slug must be 2-64 lowercase letters, digits or '-'",
        ));
    }
    Ok((name.to_string(), slug))
}

/// Create an organization. The caller becomes its `OWNER`.
#[utoipa::path(
    post,
    path = "/v1/organizations",
    tag = "Organizations",
    request_body = CreateOrganizationRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Organization created", body = Organization),
        (status = 400, description = "Invalid name or slug"),
        (status = 401, description = "Not authenticated"),
        (status = 409, description = "Slug already taken")
    )
)]
pub async fn create_organization(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<CreateOrganizationRequest>,
) -> Result<(StatusCode, Json<Organization>), ApiError> {
    let (name, slug) = name_and_slug(&request.name, request.slug.as_deref())?;
    let (organization, _owner) =
        OrganizationRepository::new(&state.db).create(&name, &slug, &user.user_id)?;
    state.contexts.invalidate_user(&user.user_id);

    info!(organization_id = %organization.id, user_id = %user.user_id, "Organization created");
    audit_log!(
        &state.files,
        AuditEventType::OrganizationCreated,
        &user.user_id,
        "organization",
        &organization.id,
        serde_json::json!({ "slug": organization.slug })
    );

    Ok((StatusCode::CREATED, Json(organization)))
}

/// Get an organization and its store.
#[utoipa::path(
    get,
    path = "/v1/organizations/{organization_id}",
    tag = "Organizations",
    params(("organization_id" = String, Path, description = "Organization ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Organization", body = OrganizationResponse),
        (status = 403, description = "Missing org:read"),
        (status = 404, description = "Organization not found")
    )
)]
pub async fn get_organization(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
) -> Result<Json<OrganizationResponse>, ApiError> {
    let (organization, context) = organization_context(&state, &user.user_id, &organization_id)?;
    authorize(&state, &context, "org:read", "organization", &organization.id)?;

    let store = StoreRepository::new(&state.db).for_organization(&organization.id)?;
    Ok(Json(OrganizationResponse {
        organization,
        store,
    }))
}

/// List an organization's members, highest role first.
#[utoipa::path(
    get,
    path = "/v1/organizations/{organization_id}/members",
    tag = "Organizations",
    params(("organization_id" = String, Path, description = "Organization ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Members", body = [Membership]),
        (status = 403, description = "Missing members:read"),
        (status = 404, description = "Organization not found")
    )
)]
pub async fn list_members(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
) -> Result<Json<Vec<Membership>>, ApiError> {
    let (organization, context) = organization_context(&state, &user.user_id, &organization_id)?;
    authorize(&state, &context, "members:read", "organization", &organization.id)?;
    Ok(Json(
        OrganizationRepository::new(&state.db).members(&organization.id)?,
    ))
}

/// Add a member. The caller must outrank the granted role.
#[utoipa::path(
    post,
    path = "/v1/organizations/{organization_id}/members",
    tag = "Organizations",
    params(("organization_id" = String, Path, description = "Organization ID")),
    request_body = AddMemberRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Member added", body = Membership),
        (status = 400, description = "Not an organization role"),
        (status = 403, description = "Missing members:create or role too high"),
        (status = 404, description = "Organization not found"),
        (status = 409, description = "Already a member")
    )
)]
pub async fn add_member(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
    Json(request): Json<AddMemberRequest>,
) -> Result<(StatusCode, Json<Membership>), ApiError> {
    let (organization, context) = organization_context(&state, &user.user_id, &organization_id)?;
    authorize(&state, &context, "members:create", "organization", &organization.id)?;

    if request.role.scope() != RoleScope::Organization {
        return Err(ApiError::bad_request(format!(
            "{} is not an organization role",
            request.role
        )));
    }
    if !context.can_assign(request.role) {
        return Err(deny(
            &state,
            &user.user_id,
            "organization",
            &organization.id,
            &format!("cannot grant {}", request.role),
        ));
    }

    let membership = OrganizationRepository::new(&state.db).add_member(
        &organization.id,
        request.user_id.trim(),
        request.role,
    )?;
    state.contexts.invalidate_user(&membership.user_id);

    info!(
        organization_id = %organization.id,
        member = %membership.user_id,
        role = %membership.role,
        "Member added"
    );
    audit_log!(
        &state.files,
        AuditEventType::MembershipAdded,
        &user.user_id,
        "membership",
        &membership.id,
        serde_json::json!({
            "organization_id": organization.id,
            "member_user_id": membership.user_id,
            "role": membership.role,
        })
    );

    Ok((StatusCode::CREATED, Json(membership)))
}

/// Remove a member, or leave the organization. The last `OWNER` cannot be removed.
#[utoipa::path(
    delete,
    path = "/v1/organizations/{organization_id}/members/{user_id}",
    tag = "Organizations",
    params(
        ("organization_id" = String, Path, description = "Organization ID"),
        ("user_id" = String, Path, description = "Member user ID")
    ),
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Member removed"),
        (status = 403, description = "Missing members:delete or member outranks caller"),
        (status = 404, description = "Organization or membership not found"),
        (status = 409, description = "Last owner")
    )
)]
pub async fn remove_member(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path((organization_id, member_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let (organization, context) = organization_context(&state, &user.user_id, &organization_id)?;
    // Leaving needs no permission; removing others needs members:delete and a higher role
    let leaving = member_id == user.user_id;
    if !leaving {
        authorize(&state, &context, "members:delete", "organization", &organization.id)?;
    }

    let repo = OrganizationRepository::new(&state.db);
    let existing = repo
        .membership(&organization.id, &member_id)?
        .ok_or_else(|| ApiError::not_found(format!("Membership of {member_id} not found")))?;
    if !leaving && !context.can_assign(existing.role) {
        return Err(deny(
            &state,
            &user.user_id,
            "membership",
            &existing.id,
            &format!("cannot remove a member with role {}", existing.role),
        ));
    }

    let removed = repo.remove_member(&organization.id, &member_id)?;
    state.contexts.invalidate_user(&member_id);

    info!(organization_id = %organization.id, member = %member_id, "Member removed");
    audit_log!(
        &state.files,
        AuditEventType::MembershipRemoved,
        &user.user_id,
        "membership",
        &removed.id,
        serde_json::json!({
            "organization_id": organization.id,
            "member_user_id": member_id,
            "role": removed.role,
        })
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Create the organization's store.
#[utoipa::path(
    post,
    path = "/v1/organizations/{organization_id}/stores",
    tag = "Organizations",
    params(("organization_id" = String, Path, description = "Organization ID")),
    request_body = CreateStoreRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Store created", body = Store),
        (status = 400, description = "Invalid name or slug"),
        (status = 403, description = "Missing store:create"),
        (status = 404, description = "Organization not found"),
        (status = 409, description = "Organization already has a store, or slug taken")
    )
)]
pub async fn create_store(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
    Json(request): Json<CreateStoreRequest>,
) -> Result<(StatusCode, Json<Store>), ApiError> {
    let (organization, context) = organization_context(&state, &user.user_id, &organization_id)?;
    authorize(&state, &context, "store:create", "organization", &organization.id)?;

    let (name, slug) = name_and_slug(&request.name, request.slug.as_deref())?;
    let store = StoreRepository::new(&state.db).create(
        &organization.id,
        &name,
        &slug,
        state.default_custom_role_limit,
    )?;
    state.contexts.clear();

    info!(store_id = %store.id, organization_id = %organization.id, "Store created");
    audit_log!(
        &state.files,
        AuditEventType::StoreCreated,
        &user.user_id,
        "store",
        &store.id,
        serde_json::json!({
            "organization_id": organization.id,
            "custom_role_limit": store.custom_role_limit,
        })
    );

    Ok((StatusCode::CREATED, Json(store)))
}
