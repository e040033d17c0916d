// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state lives under the data directory (`DATA_DIR`):
//!
//! ```text
//! <data_dir>/
//!   platform.redb            # users, organizations, memberships, stores,
//!                            # staff, custom roles, role requests,
//!                            # notifications
//!   audit/
//!     {date}/events.jsonl    # Daily audit logs
//! ```
//!
//! Relational rows go through [`PlatformDb`]; the audit log is plain
//! append-only files handled by [`FileStorage`].

pub mod audit;
pub mod database;
pub mod fs;
pub mod paths;
pub mod repository;

pub use audit::{AuditEvent, AuditEventType, AuditRepository};
pub use database::{DbError, DbResult, PlatformDb, Record, WriteTx};
pub use fs::{FileStorage, StorageError, StorageResult};
pub use paths::StoragePaths;
pub use repository::{
    CustomRole, CustomRoleRepository, CustomRoleRequest, Membership, Notification,
    NotificationKind, NotificationRepository, Organization, OrganizationRepository,
    RoleRequestRepository, RoleRequestStatus, Store, StoreRepository, StoreStaff, StoredUser,
    UserRepository, DEFAULT_CUSTOM_ROLE_LIMIT, MAX_CUSTOM_ROLE_LIMIT,
};
