// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custom role request workflow.
//!
//! ## Lifecycle
//!
//! ```text
//! submit ──► PENDING ──approve──► APPROVED  (creates CustomRole, assigns staff)
//!               │   ──reject───► REJECTED
//!               └───cancel───► CANCELLED
//! ```
//!
//! Every multi-row change runs in one database write transaction together
//! with the notifications it produces. Audit events are appended after the
//! transaction commits.
//!
//! ## Limits
//!
//! A store may hold `custom_role_limit` custom roles. On submit the limit is
//! checked against active roles plus pending requests, so a store cannot
//! queue more requests than it could ever have approved. On approve only
//! active roles count, since the request being approved already holds one of
//! the pending slots.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use super::cache::ContextCache;
use super::context::UserContext;
use super::roles::{validate_requested_permissions, CatalogError, Role};
use crate::storage::repository::stores::active_staff_in;
use crate::storage::{
    AuditEvent, AuditEventType, AuditRepository, CustomRole, CustomRoleRequest, DbError,
    FileStorage, Notification, NotificationKind, PlatformDb, RoleRequestStatus, Store,
    StoreRepository, StoreStaff, StoredUser, WriteTx, MAX_CUSTOM_ROLE_LIMIT,
};

/// Role name length bounds (characters).
pub const ROLE_NAME_MIN_LEN: usize = 2;
pub const ROLE_NAME_MAX_LEN: usize = 50;

const DESCRIPTION_MAX_LEN: usize = 500;
const REASON_MAX_LEN: usize = 1000;

/// Errors produced by workflow operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Permissions(#[from] CatalogError),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("custom role limit reached ({used} of {limit} in use)")]
    LimitReached { used: usize, limit: u32 },

    #[error(transparent)]
    Db(DbError),
}

impl From<DbError> for WorkflowError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => WorkflowError::NotFound(format!("{what} not found")),
            DbError::AlreadyExists(what) => WorkflowError::Conflict(format!("{what} already exists")),
            DbError::Constraint(msg) => WorkflowError::Conflict(msg),
            other => WorkflowError::Db(other),
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

// =============================================================================
// Inputs / Outputs
// =============================================================================

/// Request body for submitting a custom role request.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SubmitRoleRequest {
    /// Display name of the new role (2-50 chars)
    pub role_name: String,
    pub description: Option<String>,
    /// Requested permission strings
    pub permissions: Vec<String>,
    /// Staff rows that receive the role once approved
    #[serde(default)]
    pub target_staff_ids: Vec<String>,
}

/// Request body for approving a role request.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ApproveRoleRequest {
    /// Replacement permission list; omitted keeps the requested set
    pub permissions: Option<Vec<String>>,
    pub note: Option<String>,
}

/// Request body for rejecting a role request.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RejectRoleRequest {
    pub reason: String,
}

/// Custom role quota of a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CustomRoleUsage {
    pub store_id: String,
    pub limit: u32,
    pub active_roles: usize,
    pub pending_requests: usize,
    /// Slots left for new submissions
    pub remaining: usize,
}

impl CustomRoleUsage {
    fn new(store: &Store, active_roles: usize, pending_requests: usize) -> Self {
        let used = active_roles + pending_requests;
        Self {
            store_id: store.id.clone(),
            limit: store.custom_role_limit,
            active_roles,
            pending_requests,
            remaining: (store.custom_role_limit as usize).saturating_sub(used),
        }
    }
}

/// Result of an approval.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApprovalOutcome {
    pub request: CustomRoleRequest,
    pub custom_role: CustomRole,
    /// Staff rows that received the role
    pub assigned_staff_ids: Vec<String>,
}

/// Result of a deactivation.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeactivationOutcome {
    pub custom_role: CustomRole,
    /// Staff rows the role was removed from
    pub unassigned_staff_ids: Vec<String>,
    /// Staff rows deactivated because nothing else was left on them
    pub deactivated_staff_ids: Vec<String>,
}

// =============================================================================
// Validation
// =============================================================================

/// Validate and normalize a custom role name.
///
/// Names may not collide with built-in roles, including spellings such as
/// `Store Admin` or `store-admin`.
pub fn validate_role_name(raw: &str) -> WorkflowResult<String> {
    let name = raw.trim();
    let len = name.chars().count();
    if !(ROLE_NAME_MIN_LEN..=ROLE_NAME_MAX_LEN).contains(&len) {
        return Err(WorkflowError::Validation(format!(
            "role name must be {ROLE_NAME_MIN_LEN}-{ROLE_NAME_MAX_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == ' ' || c == '-' || c == '_')
    {
        return Err(WorkflowError::Validation(
            "role name may only contain letters, digits, spaces, '-' and '_'".to_string(),
        ));
    }
    let as_builtin: String = name
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect();
    if Role::parse(&as_builtin).is_some() {
        return Err(WorkflowError::Validation(format!(
            "`{name}` is a built-in role name"
        )));
    }
    Ok(name.to_string())
}

/// Case-insensitive role name comparison.
fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

fn normalize_optional(raw: Option<&str>, max: usize, field: &str) -> WorkflowResult<Option<String>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(text) if text.chars().count() > max => Err(WorkflowError::Validation(format!(
            "{field} must be at most {max} characters"
        ))),
        Some(text) => Ok(Some(text.to_string())),
        None => Ok(None),
    }
}

fn dedup_ids(ids: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.trim();
        if !id.is_empty() && !out.iter().any(|seen| seen == id) {
            out.push(id.to_string());
        }
    }
    out
}

fn pending_in(tx: &WriteTx<'_>, store_id: &str) -> Result<Vec<CustomRoleRequest>, DbError> {
    tx.scan(|r: &CustomRoleRequest| r.store_id == store_id && r.status == RoleRequestStatus::Pending)
}

fn active_roles_in(tx: &WriteTx<'_>, store_id: &str) -> Result<Vec<CustomRole>, DbError> {
    tx.scan(|r: &CustomRole| r.store_id == store_id && r.is_active)
}

fn request_link(request_id: &str) -> String {
    format!("/v1/role-requests/{request_id}")
}

// =============================================================================
// RoleWorkflow
// =============================================================================

/// Custom role request workflow over the platform database.
pub struct RoleWorkflow<'a> {
    db: &'a PlatformDb,
    files: &'a FileStorage,
    contexts: &'a ContextCache,
}

impl<'a> RoleWorkflow<'a> {
    pub fn new(db: &'a PlatformDb, files: &'a FileStorage, contexts: &'a ContextCache) -> Self {
        Self {
            db,
            files,
            contexts,
        }
    }

    fn audit(&self) -> AuditRepository<'a> {
        AuditRepository::new(self.files)
    }

    /// Record a refused action and build the error for it.
    fn deny(&self, actor: &UserContext, resource_type: &str, resource_id: &str, reason: String) -> WorkflowError {
        warn!(
            user_id = %actor.user_id,
            resource_type = %resource_type,
            resource_id = %resource_id,
            reason = %reason,
            "Workflow action denied"
        );
        self.audit().record(
            AuditEvent::new(AuditEventType::PermissionDenied)
                .with_user(&actor.user_id)
                .with_resource(resource_type, resource_id)
                .failed(&reason),
        );
        WorkflowError::Forbidden(reason)
    }

    /// Require `permission` in a context resolved for `store_id`.
    fn require_store_permission(
        &self,
        actor: &UserContext,
        store_id: &str,
        permission: &str,
    ) -> WorkflowResult<()> {
        if !actor.is_super_admin && !actor.is_scoped_to_store(store_id) {
            return Err(self.deny(
                actor,
                "store",
                store_id,
                "context was not resolved for this store".to_string(),
            ));
        }
        actor
            .require_permission(permission)
            .map_err(|e| self.deny(actor, "store", store_id, e.to_string()))
    }

    fn require_super_admin(&self, actor: &UserContext, resource_type: &str, resource_id: &str) -> WorkflowResult<()> {
        if actor.is_super_admin {
            Ok(())
        } else {
            Err(self.deny(
                actor,
                resource_type,
                resource_id,
                "super-admin access required".to_string(),
            ))
        }
    }

    // =========================================================================
    // Submit
    // =========================================================================

    /// Submit a custom role request for a store.
    pub fn submit(
        &self,
        actor: &UserContext,
        store_id: &str,
        input: &SubmitRoleRequest,
    ) -> WorkflowResult<CustomRoleRequest> {
        self.require_store_permission(actor, store_id, "roles:request")?;

        let role_name = validate_role_name(&input.role_name)?;
        let description = normalize_optional(input.description.as_deref(), DESCRIPTION_MAX_LEN, "description")?;
        let permissions: Vec<String> = validate_requested_permissions(&input.permissions)?
            .into_iter()
            .map(String::from)
            .collect();
        let target_staff_ids = dedup_ids(&input.target_staff_ids);

        let (request, notified) = self.db.write(|tx| -> WorkflowResult<_> {
            let store = tx.require::<Store>(store_id)?;
            if !store.is_active {
                return Err(WorkflowError::Conflict("store is not active".to_string()));
            }

            let staff = active_staff_in(tx, store_id)?;
            if let Some(missing) = target_staff_ids
                .iter()
                .find(|id| !staff.iter().any(|s| &s.id == *id))
            {
                return Err(WorkflowError::Validation(format!(
                    "staff {missing} is not active in this store"
                )));
            }

            let active = active_roles_in(tx, store_id)?;
            let pending = pending_in(tx, store_id)?;

            if active.iter().any(|r| same_name(&r.name, &role_name))
                || pending
                    .iter()
                    .any(|r| same_name(&r.role_name, &role_name))
            {
                return Err(WorkflowError::Conflict(format!(
                    "a custom role or pending request named `{role_name}` already exists"
                )));
            }

            let used = active.len() + pending.len();
            if used >= store.custom_role_limit as usize {
                return Err(WorkflowError::LimitReached {
                    used,
                    limit: store.custom_role_limit,
                });
            }

            let now = Utc::now();
            let request = CustomRoleRequest {
                id: uuid::Uuid::new_v4().to_string(),
                store_id: store_id.to_string(),
                requested_by: actor.user_id.clone(),
                role_name: role_name.clone(),
                description: description.clone(),
                requested_permissions: permissions.clone(),
                target_staff_ids: target_staff_ids.clone(),
                status: RoleRequestStatus::Pending,
                reviewed_by: None,
                reviewed_at: None,
                review_note: None,
                approved_permissions: None,
                custom_role_id: None,
                created_at: now,
                updated_at: now,
            };
            tx.insert(&request)?;

            let admins = tx.scan(|u: &StoredUser| u.is_super_admin)?;
            for admin in &admins {
                tx.insert(
                    &Notification::new(
                        &admin.id,
                        NotificationKind::RoleRequestSubmitted,
                        "New custom role request",
                        format!("Store {} requested the role `{}`", store.name, role_name),
                    )
                    .with_link(request_link(&request.id)),
                )?;
            }

            Ok((request, admins.len()))
        })?;

        info!(
            request_id = %request.id,
            store_id = %store_id,
            user_id = %actor.user_id,
            permissions = request.requested_permissions.len(),
            notified,
            "Custom role request submitted"
        );
        self.audit().record(
            AuditEvent::new(AuditEventType::RoleRequestSubmitted)
                .with_user(&actor.user_id)
                .with_resource("role_request", &request.id)
                .with_details(serde_json::json!({
                    "store_id": store_id,
                    "role_name": request.role_name,
                    "permissions": request.requested_permissions,
                    "target_staff_ids": request.target_staff_ids,
                })),
        );

        Ok(request)
    }

    // =========================================================================
    // Review
    // =========================================================================

    /// Approve a pending request (super-admin only).
    pub fn approve(
        &self,
        actor: &UserContext,
        request_id: &str,
        input: &ApproveRoleRequest,
    ) -> WorkflowResult<ApprovalOutcome> {
        self.require_super_admin(actor, "role_request", request_id)?;

        let modified: Option<Vec<String>> = match &input.permissions {
            Some(list) => Some(
                validate_requested_permissions(list)?
                    .into_iter()
                    .map(String::from)
                    .collect(),
            ),
            None => None,
        };
        let note = normalize_optional(input.note.as_deref(), REASON_MAX_LEN, "note")?;

        let outcome = self.db.write(|tx| -> WorkflowResult<_> {
            let mut request = tx.require::<CustomRoleRequest>(request_id)?;
            ensure_pending(&request)?;

            let store = tx.require::<Store>(&request.store_id)?;
            let active = active_roles_in(tx, &store.id)?;
            if active.len() >= store.custom_role_limit as usize {
                return Err(WorkflowError::LimitReached {
                    used: active.len(),
                    limit: store.custom_role_limit,
                });
            }
            if active
                .iter()
                .any(|r| same_name(&r.name, &request.role_name))
            {
                return Err(WorkflowError::Conflict(format!(
                    "a custom role named `{}` already exists",
                    request.role_name
                )));
            }

            let permissions = modified
                .clone()
                .unwrap_or_else(|| request.requested_permissions.clone());
            let now = Utc::now();
            let custom_role = CustomRole {
                id: uuid::Uuid::new_v4().to_string(),
                store_id: store.id.clone(),
                name: request.role_name.clone(),
                description: request.description.clone(),
                permissions: permissions.clone(),
                request_id: request.id.clone(),
                created_by: request.requested_by.clone(),
                approved_by: actor.user_id.clone(),
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            tx.insert(&custom_role)?;

            // Targets removed since submission are skipped
            let mut assigned = Vec::new();
            for staff_id in &request.target_staff_ids {
                let Some(mut staff) = tx.get::<StoreStaff>(staff_id)? else {
                    continue;
                };
                if staff.store_id != store.id || !staff.is_active {
                    continue;
                }
                staff.custom_role_id = Some(custom_role.id.clone());
                staff.updated_at = now;
                tx.put(&staff)?;
                tx.insert(
                    &Notification::new(
                        &staff.user_id,
                        NotificationKind::CustomRoleAssigned,
                        "New role assigned",
                        format!("You were given the role `{}` in {}", custom_role.name, store.name),
                    )
                    .with_link(format!("/v1/stores/{}/custom-roles", store.id)),
                )?;
                assigned.push(staff);
            }

            request.status = RoleRequestStatus::Approved;
            request.reviewed_by = Some(actor.user_id.clone());
            request.reviewed_at = Some(now);
            request.review_note = note.clone();
            request.approved_permissions = Some(permissions);
            request.custom_role_id = Some(custom_role.id.clone());
            request.updated_at = now;
            tx.put(&request)?;

            tx.insert(
                &Notification::new(
                    &request.requested_by,
                    NotificationKind::RoleRequestApproved,
                    "Custom role approved",
                    format!("Your request for `{}` was approved", request.role_name),
                )
                .with_link(request_link(&request.id)),
            )?;

            Ok((request, custom_role, assigned))
        })?;

        let (request, custom_role, assigned) = outcome;
        for staff in &assigned {
            self.contexts.invalidate_user(&staff.user_id);
        }
        let assigned_staff_ids: Vec<String> = assigned.into_iter().map(|s| s.id).collect();

        info!(
            request_id = %request.id,
            custom_role_id = %custom_role.id,
            reviewer = %actor.user_id,
            assigned = assigned_staff_ids.len(),
            modified = modified.is_some(),
            "Custom role request approved"
        );
        self.audit().record(
            AuditEvent::new(AuditEventType::RoleRequestApproved)
                .with_user(&actor.user_id)
                .with_resource("role_request", &request.id)
                .with_details(serde_json::json!({
                    "store_id": request.store_id,
                    "custom_role_id": custom_role.id,
                    "permissions": custom_role.permissions,
                    "permissions_modified": modified.is_some(),
                    "assigned_staff_ids": assigned_staff_ids,
                })),
        );

        Ok(ApprovalOutcome {
            request,
            custom_role,
            assigned_staff_ids,
        })
    }

    /// Reject a pending request (super-admin only). A reason is required.
    pub fn reject(
        &self,
        actor: &UserContext,
        request_id: &str,
        reason: &str,
    ) -> WorkflowResult<CustomRoleRequest> {
        self.require_super_admin(actor, "role_request", request_id)?;

        let reason = normalize_optional(Some(reason), REASON_MAX_LEN, "reason")?
            .ok_or_else(|| WorkflowError::Validation("a rejection reason is required".to_string()))?;

        let request = self.db.write(|tx| -> WorkflowResult<_> {
            let mut request = tx.require::<CustomRoleRequest>(request_id)?;
            ensure_pending(&request)?;

            let now = Utc::now();
            request.status = RoleRequestStatus::Rejected;
            request.reviewed_by = Some(actor.user_id.clone());
            request.reviewed_at = Some(now);
            request.review_note = Some(reason.clone());
            request.updated_at = now;
            tx.put(&request)?;

            tx.insert(
                &Notification::new(
                    &request.requested_by,
                    NotificationKind::RoleRequestRejected,
                    "Custom role rejected",
                    format!("Your request for `{}` was rejected: {reason}", request.role_name),
                )
                .with_link(request_link(&request.id)),
            )?;
            Ok(request)
        })?;

        info!(
            request_id = %request.id,
            reviewer = %actor.user_id,
            "Custom role request rejected"
        );
        self.audit().record(
            AuditEvent::new(AuditEventType::RoleRequestRejected)
                .with_user(&actor.user_id)
                .with_resource("role_request", &request.id)
                .with_details(serde_json::json!({
                    "store_id": request.store_id,
                    "reason": reason,
                })),
        );

        Ok(request)
    }

    /// Cancel a pending request (its requester or a super-admin).
    pub fn cancel(&self, actor: &UserContext, request_id: &str) -> WorkflowResult<CustomRoleRequest> {
        let request = self.db.write(|tx| -> WorkflowResult<_> {
            let mut request = tx.require::<CustomRoleRequest>(request_id)?;
            if request.requested_by != actor.user_id && !actor.is_super_admin {
                return Err(WorkflowError::Forbidden(
                    "only the requester can cancel this request".to_string(),
                ));
            }
            ensure_pending(&request)?;

            request.status = RoleRequestStatus::Cancelled;
            request.updated_at = Utc::now();
            tx.put(&request)?;
            Ok(request)
        });

        let request = match request {
            Ok(request) => request,
            Err(WorkflowError::Forbidden(reason)) => {
                return Err(self.deny(actor, "role_request", request_id, reason));
            }
            Err(other) => return Err(other),
        };

        info!(request_id = %request.id, user_id = %actor.user_id, "Custom role request cancelled");
        self.audit().record(
            AuditEvent::new(AuditEventType::RoleRequestCancelled)
                .with_user(&actor.user_id)
                .with_resource("role_request", &request.id)
                .with_details(serde_json::json!({ "store_id": request.store_id })),
        );

        Ok(request)
    }

    // =========================================================================
    // Usage and limits
    // =========================================================================

    /// Custom role quota of a store.
    pub fn usage(&self, store_id: &str) -> WorkflowResult<CustomRoleUsage> {
        let store = self.db.require::<Store>(store_id)?;
        let active = self
            .db
            .scan(|r: &CustomRole| r.store_id == store_id && r.is_active)?
            .len();
        let pending = self
            .db
            .scan(|r: &CustomRoleRequest| {
                r.store_id == store_id && r.status == RoleRequestStatus::Pending
            })?
            .len();
        Ok(CustomRoleUsage::new(&store, active, pending))
    }

    /// Change a store's custom role limit (super-admin only).
    ///
    /// Lowering the limit below current usage is allowed; it only blocks new
    /// submissions and approvals until usage drops.
    pub fn set_limit(&self, actor: &UserContext, store_id: &str, limit: u32) -> WorkflowResult<CustomRoleUsage> {
        self.require_super_admin(actor, "store", store_id)?;
        if limit > MAX_CUSTOM_ROLE_LIMIT {
            return Err(WorkflowError::Validation(format!(
                "custom role limit must be between 0 and {MAX_CUSTOM_ROLE_LIMIT}"
            )));
        }

        let (previous, _store) = StoreRepository::new(self.db).set_custom_role_limit(store_id, limit)?;
        let usage = self.usage(store_id)?;

        info!(
            store_id = %store_id,
            previous,
            limit,
            user_id = %actor.user_id,
            "Custom role limit changed"
        );
        self.audit().record(
            AuditEvent::new(AuditEventType::CustomRoleLimitChanged)
                .with_user(&actor.user_id)
                .with_resource("store", store_id)
                .with_details(serde_json::json!({ "previous": previous, "limit": limit })),
        );

        Ok(usage)
    }

    // =========================================================================
    // Assignment
    // =========================================================================

    /// Attach an active custom role of the store to a staff row.
    pub fn assign(
        &self,
        actor: &UserContext,
        store_id: &str,
        staff_id: &str,
        custom_role_id: &str,
    ) -> WorkflowResult<StoreStaff> {
        self.require_store_permission(actor, store_id, "roles:assign")?;

        let (staff, role) = self.db.write(|tx| -> WorkflowResult<_> {
            let mut staff = require_active_staff(tx, store_id, staff_id)?;
            let role = tx.require::<CustomRole>(custom_role_id)?;
            if role.store_id != store_id || !role.is_active {
                return Err(WorkflowError::Validation(
                    "custom role is not active in this store".to_string(),
                ));
            }

            staff.custom_role_id = Some(role.id.clone());
            staff.updated_at = Utc::now();
            tx.put(&staff)?;
            tx.insert(
                &Notification::new(
                    &staff.user_id,
                    NotificationKind::CustomRoleAssigned,
                    "New role assigned",
                    format!("You were given the role `{}`", role.name),
                )
                .with_link(format!("/v1/stores/{store_id}/custom-roles")),
            )?;
            Ok((staff, role))
        })?;

        self.contexts.invalidate_user(&staff.user_id);
        info!(
            staff_id = %staff.id,
            custom_role_id = %role.id,
            user_id = %actor.user_id,
            "Custom role assigned"
        );
        self.audit().record(
            AuditEvent::new(AuditEventType::CustomRoleAssigned)
                .with_user(&actor.user_id)
                .with_resource("store_staff", &staff.id)
                .with_details(serde_json::json!({
                    "store_id": store_id,
                    "custom_role_id": role.id,
                    "staff_user_id": staff.user_id,
                })),
        );
        Ok(staff)
    }

    /// Detach the custom role from a staff row.
    ///
    /// Refused when the row has no built-in role, since it would be left
    /// granting nothing; remove the staff member instead.
    pub fn unassign(&self, actor: &UserContext, store_id: &str, staff_id: &str) -> WorkflowResult<StoreStaff> {
        self.require_store_permission(actor, store_id, "roles:assign")?;

        let (staff, previous) = self.db.write(|tx| -> WorkflowResult<_> {
            let mut staff = require_active_staff(tx, store_id, staff_id)?;
            let Some(previous) = staff.custom_role_id.take() else {
                return Err(WorkflowError::Conflict(
                    "staff member has no custom role".to_string(),
                ));
            };
            if staff.role.is_none() {
                return Err(WorkflowError::Conflict(
                    "staff member would be left without any role".to_string(),
                ));
            }
            staff.updated_at = Utc::now();
            tx.put(&staff)?;
            Ok((staff, previous))
        })?;

        self.contexts.invalidate_user(&staff.user_id);
        info!(staff_id = %staff.id, custom_role_id = %previous, "Custom role unassigned");
        self.audit().record(
            AuditEvent::new(AuditEventType::CustomRoleUnassigned)
                .with_user(&actor.user_id)
                .with_resource("store_staff", &staff.id)
                .with_details(serde_json::json!({
                    "store_id": store_id,
                    "custom_role_id": previous,
                })),
        );
        Ok(staff)
    }

    /// Deactivate a custom role and strip it from every staff row.
    ///
    /// Staff rows left without any role are deactivated. The freed slot
    /// counts towards the store's limit again.
    pub fn deactivate(
        &self,
        actor: &UserContext,
        store_id: &str,
        custom_role_id: &str,
    ) -> WorkflowResult<DeactivationOutcome> {
        self.require_store_permission(actor, store_id, "roles:delete")?;

        let outcome = self.db.write(|tx| -> WorkflowResult<_> {
            let mut role = tx.require::<CustomRole>(custom_role_id)?;
            if role.store_id != store_id {
                return Err(WorkflowError::NotFound(format!(
                    "Custom role {custom_role_id} not found"
                )));
            }
            if !role.is_active {
                return Err(WorkflowError::Conflict(
                    "custom role is already inactive".to_string(),
                ));
            }

            let now = Utc::now();
            role.is_active = false;
            role.updated_at = now;
            tx.put(&role)?;

            let holders = tx.scan(|s: &StoreStaff| {
                s.is_active && s.custom_role_id.as_deref() == Some(custom_role_id)
            })?;
            let mut unassigned = Vec::with_capacity(holders.len());
            let mut deactivated = Vec::new();
            for mut staff in holders {
                staff.custom_role_id = None;
                if !staff.has_any_role() {
                    staff.is_active = false;
                    deactivated.push(staff.id.clone());
                }
                staff.updated_at = now;
                tx.put(&staff)?;
                unassigned.push(staff.id);
            }

            Ok(DeactivationOutcome {
                custom_role: role,
                unassigned_staff_ids: unassigned,
                deactivated_staff_ids: deactivated,
            })
        })?;

        self.contexts.clear();
        info!(
            custom_role_id = %custom_role_id,
            store_id = %store_id,
            unassigned = outcome.unassigned_staff_ids.len(),
            deactivated = outcome.deactivated_staff_ids.len(),
            "Custom role deactivated"
        );
        self.audit().record(
            AuditEvent::new(AuditEventType::CustomRoleDeactivated)
                .with_user(&actor.user_id)
                .with_resource("custom_role", custom_role_id)
                .with_details(serde_json::json!({
                    "store_id": store_id,
                    "unassigned_staff_ids": outcome.unassigned_staff_ids,
                    "deactivated_staff_ids": outcome.deactivated_staff_ids,
                })),
        );
        Ok(outcome)
    }
}

fn ensure_pending(request: &CustomRoleRequest) -> WorkflowResult<()> {
    if request.status.can_transition_to(RoleRequestStatus::Approved) {
        Ok(())
    } else {
        Err(WorkflowError::Conflict(format!(
            "request is already {}",
            request.status
        )))
    }
}

fn require_active_staff(tx: &WriteTx<'_>, store_id: &str, staff_id: &str) -> WorkflowResult<StoreStaff> {
    let staff = tx.require::<StoreStaff>(staff_id)?;
    if staff.store_id != store_id || !staff.is_active {
        return Err(WorkflowError::NotFound(format!(
            "Store staff {staff_id} not found"
        )));
    }
    Ok(staff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::{AccessScope, ContextResolver};
    use crate::storage::{
        AuditRepository, CustomRoleRepository, NotificationRepository, OrganizationRepository,
        StoragePaths, UserRepository,
    };
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        db: PlatformDb,
        files: FileStorage,
        contexts: ContextCache,
        store_id: String,
        staff_id: String,
    }

    impl Fixture {
        fn workflow(&self) -> RoleWorkflow<'_> {
            RoleWorkflow::new(&self.db, &self.files, &self.contexts)
        }

        fn ctx(&self, user_id: &str) -> UserContext {
            ContextResolver::new(&self.db)
                .resolve(user_id, &AccessScope::Store(self.store_id.clone()))
                .unwrap()
        }

        fn admin(&self) -> UserContext {
            ContextResolver::new(&self.db)
                .resolve("root", &AccessScope::Platform)
                .unwrap()
        }

        fn submit(&self, name: &str) -> WorkflowResult<CustomRoleRequest> {
            self.workflow().submit(
                &self.ctx("owner"),
                &self.store_id,
                &SubmitRoleRequest {
                    role_name: name.to_string(),
                    description: Some("Handles refunds".to_string()),
                    permissions: vec!["orders:refund".to_string(), "orders:read".to_string()],
                    target_staff_ids: vec![self.staff_id.clone()],
                },
            )
        }

        fn audit_types(&self) -> Vec<AuditEventType> {
            let today = Utc::now().format("%Y-%m-%d").to_string();
            AuditRepository::new(&self.files)
                .read_events(&today)
                .unwrap()
                .into_iter()
                .map(|e| e.event_type)
                .collect()
        }
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let db = PlatformDb::open(&temp.path().join("test.redb")).unwrap();
        let mut files = FileStorage::new(StoragePaths::new(temp.path()));
        files.initialize().unwrap();

        UserRepository::new(&db).set_super_admin("root", true).unwrap();
        let (org, _) = OrganizationRepository::new(&db)
            .create("Acme", "acme", "owner")
            .unwrap();
        let stores = StoreRepository::new(&db);
        let store = stores.create(&org.id, "Acme Shop", "acme-shop", 2).unwrap();
        let staff = stores
            .add_staff(&store.id, "clerk", Some(Role::DeliveryBoy), None)
            .unwrap();

        Fixture {
            _temp: temp,
            db,
            files,
            contexts: ContextCache::new(64, Duration::from_secs(60)),
            store_id: store.id,
            staff_id: staff.id,
        }
    }

    #[test]
    fn role_name_rules() {
        assert_eq!(validate_role_name("  Refund Desk ").unwrap(), "Refund Desk");
        assert!(validate_role_name("R").is_err());
        assert!(validate_role_name(&"x".repeat(51)).is_err());
        assert!(validate_role_name("Refunds!").is_err());
        assert!(validate_role_name("store admin").is_err());
        assert!(validate_role_name("Sales-Manager").is_err());
        assert!(validate_role_name("owner").is_err());
        assert!(validate_role_name("Night_Shift-2").is_ok());
    }

    #[test]
    fn duplicate_names_ignore_unicode_case() {
        let f = fixture();
        f.submit("Ünit Desk").unwrap();
        assert!(matches!(f.submit("ünit desk"), Err(WorkflowError::Conflict(_))));
        assert!(same_name("ÉQUIPE", "équipe"));
        assert!(!same_name("Desk", "Desks"));
    }

    #[test]
    fn submit_creates_pending_request_and_notifies_admins() {
        let f = fixture();
        let request = f.submit("Refund Desk").unwrap();

        assert_eq!(request.status, RoleRequestStatus::Pending);
        assert_eq!(request.requested_by, "owner");
        assert_eq!(request.requested_permissions, vec!["orders:refund", "orders:read"]);

        let admin_inbox = NotificationRepository::new(&f.db)
            .list_for_user("root", false)
            .unwrap();
        assert_eq!(admin_inbox.len(), 1);
        assert_eq!(admin_inbox[0].kind, NotificationKind::RoleRequestSubmitted);
        assert_eq!(f.audit_types(), vec![AuditEventType::RoleRequestSubmitted]);
    }

    #[test]
    fn submit_requires_permission() {
        let f = fixture();
        let result = f.workflow().submit(
            &f.ctx("clerk"),
            &f.store_id,
            &SubmitRoleRequest {
                role_name: "Refund Desk".to_string(),
                description: None,
                permissions: vec!["orders:refund".to_string()],
                target_staff_ids: vec![],
            },
        );
        assert!(matches!(result, Err(WorkflowError::Forbidden(_))));
        assert_eq!(f.audit_types(), vec![AuditEventType::PermissionDenied]);
    }

    #[test]
    fn submit_requires_store_scoped_context() {
        let f = fixture();
        let platform_ctx = ContextResolver::new(&f.db)
            .resolve("owner", &AccessScope::Platform)
            .unwrap();
        let result = f.workflow().submit(
            &platform_ctx,
            &f.store_id,
            &SubmitRoleRequest {
                role_name: "Refund Desk".to_string(),
                description: None,
                permissions: vec!["orders:refund".to_string()],
                target_staff_ids: vec![],
            },
        );
        assert!(matches!(result, Err(WorkflowError::Forbidden(_))));
    }

    #[test]
    fn submit_rejects_bad_permissions_and_targets() {
        let f = fixture();
        let workflow = f.workflow();
        let owner = f.ctx("owner");
        let base = SubmitRoleRequest {
            role_name: "Refund Desk".to_string(),
            description: None,
            permissions: vec!["staff:create".to_string()],
            target_staff_ids: vec![],
        };
        assert!(matches!(
            workflow.submit(&owner, &f.store_id, &base),
            Err(WorkflowError::Permissions(CatalogError::NotRequestable(_)))
        ));

        let empty = SubmitRoleRequest {
            permissions: vec![],
            ..base.clone()
        };
        assert!(matches!(
            workflow.submit(&owner, &f.store_id, &empty),
            Err(WorkflowError::Permissions(CatalogError::Empty))
        ));

        let bad_target = SubmitRoleRequest {
            permissions: vec!["orders:read".to_string()],
            target_staff_ids: vec!["nobody".to_string()],
            ..base
        };
        assert!(matches!(
            workflow.submit(&owner, &f.store_id, &bad_target),
            Err(WorkflowError::Validation(_))
        ));
    }

    #[test]
    fn duplicate_names_are_rejected_case_insensitively() {
        let f = fixture();
        f.submit("Refund Desk").unwrap();
        assert!(matches!(
            f.submit("refund desk"),
            Err(WorkflowError::Conflict(_))
        ));
    }

    #[test]
    fn limit_counts_pending_requests() {
        let f = fixture();
        f.submit("Desk One").unwrap();
        f.submit("Desk Two").unwrap();
        assert!(matches!(
            f.submit("Desk Three"),
            Err(WorkflowError::LimitReached { used: 2, limit: 2 })
        ));

        let usage = f.workflow().usage(&f.store_id).unwrap();
        assert_eq!(usage.pending_requests, 2);
        assert_eq!(usage.remaining, 0);
    }

    #[test]
    fn approve_creates_role_and_assigns_staff() {
        let f = fixture();
        let request = f.submit("Refund Desk").unwrap();
        let before = f.ctx("clerk");
        assert!(!before.has_permission("orders:refund"));

        let outcome = f
            .workflow()
            .approve(
                &f.admin(),
                &request.id,
                &ApproveRoleRequest {
                    permissions: Some(vec!["orders:refund".to_string()]),
                    note: Some("ok".to_string()),
                },
            )
            .unwrap();

        assert_eq!(outcome.request.status, RoleRequestStatus::Approved);
        assert_eq!(outcome.request.reviewed_by.as_deref(), Some("root"));
        assert_eq!(outcome.custom_role.permissions, vec!["orders:refund"]);
        assert_eq!(outcome.assigned_staff_ids, vec![f.staff_id.clone()]);
        assert_eq!(
            outcome.request.custom_role_id.as_deref(),
            Some(outcome.custom_role.id.as_str())
        );

        let after = f.ctx("clerk");
        assert!(after.has_permission("orders:refund"));
        assert_eq!(after.custom_role.unwrap().name, "Refund Desk");

        let requester_inbox = NotificationRepository::new(&f.db)
            .list_for_user("owner", false)
            .unwrap();
        assert_eq!(requester_inbox[0].kind, NotificationKind::RoleRequestApproved);
        let clerk_inbox = NotificationRepository::new(&f.db)
            .list_for_user("clerk", false)
            .unwrap();
        assert_eq!(clerk_inbox[0].kind, NotificationKind::CustomRoleAssigned);

        let usage = f.workflow().usage(&f.store_id).unwrap();
        assert_eq!(usage.active_roles, 1);
        assert_eq!(usage.pending_requests, 0);
    }

    #[test]
    fn terminal_requests_cannot_move() {
        let f = fixture();
        let request = f.submit("Refund Desk").unwrap();
        f.workflow()
            .reject(&f.admin(), &request.id, "too broad")
            .unwrap();

        assert!(matches!(
            f.workflow()
                .approve(&f.admin(), &request.id, &ApproveRoleRequest::default()),
            Err(WorkflowError::Conflict(_))
        ));
        assert!(matches!(
            f.workflow().cancel(&f.ctx("owner"), &request.id),
            Err(WorkflowError::Conflict(_))
        ));
        // No custom role was created
        assert_eq!(f.workflow().usage(&f.store_id).unwrap().active_roles, 0);
    }

    #[test]
    fn only_super_admin_reviews() {
        let f = fixture();
        let request = f.submit("Refund Desk").unwrap();
        assert!(matches!(
            f.workflow()
                .approve(&f.ctx("owner"), &request.id, &ApproveRoleRequest::default()),
            Err(WorkflowError::Forbidden(_))
        ));
        assert!(matches!(
            f.workflow().reject(&f.ctx("owner"), &request.id, "no"),
            Err(WorkflowError::Forbidden(_))
        ));
    }

    #[test]
    fn reject_requires_reason() {
        let f = fixture();
        let request = f.submit("Refund Desk").unwrap();
        assert!(matches!(
            f.workflow().reject(&f.admin(), &request.id, "   "),
            Err(WorkflowError::Validation(_))
        ));
        let rejected = f
            .workflow()
            .reject(&f.admin(), &request.id, "Use SALES_MANAGER")
            .unwrap();
        assert_eq!(rejected.status, RoleRequestStatus::Rejected);
        assert_eq!(rejected.review_note.as_deref(), Some("Use SALES_MANAGER"));
    }

    #[test]
    fn approve_validates_modified_permissions() {
        let f = fixture();
        let request = f.submit("Refund Desk").unwrap();

        let approve = |permissions: &[&str]| {
            f.workflow().approve(
                &f.admin(),
                &request.id,
                &ApproveRoleRequest {
                    permissions: Some(permissions.iter().map(|p| p.to_string()).collect()),
                    note: None,
                },
            )
        };
        assert!(matches!(
            approve(&["*"]),
            Err(WorkflowError::Permissions(CatalogError::NotRequestable(_)))
        ));
        assert!(matches!(
            approve(&[]),
            Err(WorkflowError::Permissions(CatalogError::Empty))
        ));
        assert!(matches!(
            approve(&["orders:refund", "staff:create"]),
            Err(WorkflowError::Permissions(CatalogError::NotRequestable(_)))
        ));

        let still = f.db.require::<CustomRoleRequest>(&request.id).unwrap();
        assert_eq!(still.status, RoleRequestStatus::Pending);
        assert!(CustomRoleRepository::new(&f.db)
            .list_for_store(&f.store_id, true)
            .unwrap()
            .is_empty());
        assert!(!f.ctx("clerk").has_permission("orders:refund"));
    }

    #[test]
    fn approve_rechecks_limit_against_active_roles() {
        let f = fixture();
        let first = f.submit("Desk One").unwrap();
        let second = f.submit("Desk Two").unwrap();
        f.workflow()
            .approve(&f.admin(), &first.id, &ApproveRoleRequest::default())
            .unwrap();

        f.workflow().set_limit(&f.admin(), &f.store_id, 1).unwrap();
        assert!(matches!(
            f.workflow()
                .approve(&f.admin(), &second.id, &ApproveRoleRequest::default()),
            Err(WorkflowError::LimitReached { used: 1, limit: 1 })
        ));
        // Failed approval left the request pending
        let still = f.db.require::<CustomRoleRequest>(&second.id).unwrap();
        assert_eq!(still.status, RoleRequestStatus::Pending);
    }

    #[test]
    fn cancel_by_requester_only() {
        let f = fixture();
        let request = f.submit("Refund Desk").unwrap();
        assert!(matches!(
            f.workflow().cancel(&f.ctx("clerk"), &request.id),
            Err(WorkflowError::Forbidden(_))
        ));
        let cancelled = f.workflow().cancel(&f.ctx("owner"), &request.id).unwrap();
        assert_eq!(cancelled.status, RoleRequestStatus::Cancelled);
        assert_eq!(f.workflow().usage(&f.store_id).unwrap().remaining, 2);
    }

    #[test]
    fn assign_unassign_and_deactivate() {
        let f = fixture();
        let request = f.submit("Refund Desk").unwrap();
        let outcome = f
            .workflow()
            .approve(
                &f.admin(),
                &request.id,
                &ApproveRoleRequest {
                    permissions: None,
                    note: None,
                },
            )
            .unwrap();
        let role_id = outcome.custom_role.id;

        // Custom-only staff member
        let custom_only = StoreRepository::new(&f.db)
            .add_staff(&f.store_id, "temp", None, Some(role_id.as_str()))
            .unwrap();

        let owner = f.ctx("owner");
        assert!(matches!(
            f.workflow().unassign(&owner, &f.store_id, &custom_only.id),
            Err(WorkflowError::Conflict(_))
        ));

        let staff = f.workflow().unassign(&owner, &f.store_id, &f.staff_id).unwrap();
        assert!(staff.custom_role_id.is_none());
        let staff = f
            .workflow()
            .assign(&owner, &f.store_id, &f.staff_id, &role_id)
            .unwrap();
        assert_eq!(staff.custom_role_id.as_deref(), Some(role_id.as_str()));

        let result = f.workflow().deactivate(&owner, &f.store_id, &role_id).unwrap();
        assert!(!result.custom_role.is_active);
        assert_eq!(result.unassigned_staff_ids.len(), 2);
        assert_eq!(result.deactivated_staff_ids, vec![custom_only.id.clone()]);

        let clerk = f.db.require::<StoreStaff>(&f.staff_id).unwrap();
        assert!(clerk.is_active);
        assert!(clerk.custom_role_id.is_none());
        assert_eq!(f.workflow().usage(&f.store_id).unwrap().active_roles, 0);

        assert!(matches!(
            f.workflow().deactivate(&owner, &f.store_id, &role_id),
            Err(WorkflowError::Conflict(_))
        ));
    }

    #[test]
    fn store_admin_cannot_deactivate() {
        let f = fixture();
        StoreRepository::new(&f.db)
            .add_staff(&f.store_id, "manager", Some(Role::StoreAdmin), None)
            .unwrap();
        let result = f
            .workflow()
            .deactivate(&f.ctx("manager"), &f.store_id, "whatever");
        assert!(matches!(result, Err(WorkflowError::Forbidden(_))));
    }

    #[test]
    fn set_limit_bounds() {
        let f = fixture();
        assert!(matches!(
            f.workflow().set_limit(&f.admin(), &f.store_id, 51),
            Err(WorkflowError::Validation(_))
        ));
        assert!(matches!(
            f.workflow().set_limit(&f.ctx("owner"), &f.store_id, 10),
            Err(WorkflowError::Forbidden(_))
        ));
        let usage = f.workflow().set_limit(&f.admin(), &f.store_id, 10).unwrap();
        assert_eq!(usage.limit, 10);
        assert_eq!(usage.remaining, 10);
    }
}
