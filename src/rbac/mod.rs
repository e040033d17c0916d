// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Roles and Permissions
//!
//! - [`permission`]: `resource:action` strings, wildcard matching, sets
//! - [`roles`]: the built-in role table and the requestable permission catalog
//! - [`context`]: resolving a user's effective role and permissions in a scope
//! - [`cache`]: LRU cache of resolved contexts
//! - [`workflow`]: custom role requests, approvals and assignments

pub mod cache;
pub mod context;
pub mod permission;
pub mod roles;
pub mod workflow;

pub use cache::{run_sweeper, ContextCache};
pub use context::{
    effective_role, AccessScope, ContextResolver, CustomRoleGrant, PermissionDenied, UserContext,
};
pub use permission::{grants, Permission, PermissionError, PermissionSet, GLOBAL_WILDCARD};
pub use roles::{
    is_requestable, role_grants, validate_requested_permissions, CatalogEntry, CatalogError, Role,
    RoleScope, ORGANIZATION_ROLE_PRECEDENCE, PERMISSION_CATALOG, STORE_ROLE_PRECEDENCE,
};
pub use workflow::{
    validate_role_name, ApprovalOutcome, ApproveRoleRequest, CustomRoleUsage, DeactivationOutcome,
    RejectRoleRequest, RoleWorkflow, SubmitRoleRequest, WorkflowError, WorkflowResult,
};
