// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the platform database.
//!
//! Each repository provides the row operations for one entity type. Writes
//! that span several entities (the role request workflow) open their own
//! transaction through [`crate::storage::PlatformDb::write`].

pub mod custom_roles;
pub mod notifications;
pub mod organizations;
pub mod role_requests;
pub mod stores;
pub mod users;

pub use custom_roles::{CustomRole, CustomRoleRepository};
pub use notifications::{Notification, NotificationKind, NotificationRepository};
pub use organizations::{Membership, Organization, OrganizationRepository};
pub use role_requests::{CustomRoleRequest, RoleRequestRepository, RoleRequestStatus};
pub use stores::{Store, StoreRepository, StoreStaff, DEFAULT_CUSTOM_ROLE_LIMIT, MAX_CUSTOM_ROLE_LIMIT};
pub use users::{StoredUser, UserRepository};
