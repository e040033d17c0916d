// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Store and store-staff rows.
//!
//! Each organization owns at most one store. Staff rows attach users to a
//! store with a store-scoped role, a custom role, or both. Removing staff is
//! a soft delete (`is_active = false`).

use chrono::{DateTime, Utc};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::database::{DbError, DbResult, PlatformDb, Record, WriteTx, STORES, STORE_STAFF};
use super::organizations::Organization;
use crate::rbac::{Role, RoleScope};

/// Default number of custom roles a store may hold.
pub const DEFAULT_CUSTOM_ROLE_LIMIT: u32 = 5;

/// Upper bound for a store's custom role limit.
pub const MAX_CUSTOM_ROLE_LIMIT: u32 = 50;

/// Store stored in the platform database.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Store {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub slug: String,
    /// Maximum active custom roles plus pending requests
    pub custom_role_limit: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Store {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = STORES;
    const KIND: &'static str = "Store";

    fn key(&self) -> &str {
        &self.id
    }
}

/// A user's assignment to a store.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct StoreStaff {
    pub id: String,
    pub store_id: String,
    pub user_id: String,
    /// Built-in store role
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Approved custom role of the same store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_role_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoreStaff {
    /// Whether this row still grants anything.
    pub fn has_any_role(&self) -> bool {
        self.role.is_some() || self.custom_role_id.is_some()
    }
}

impl Record for StoreStaff {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = STORE_STAFF;
    const KIND: &'static str = "Store staff";

    fn key(&self) -> &str {
        &self.id
    }
}

/// Active staff rows of a store, read inside a write transaction.
pub fn active_staff_in(tx: &WriteTx<'_>, store_id: &str) -> DbResult<Vec<StoreStaff>> {
    tx.scan(|s: &StoreStaff| s.store_id == store_id && s.is_active)
}

/// Repository for stores and their staff.
pub struct StoreRepository<'a> {
    db: &'a PlatformDb,
}

impl<'a> StoreRepository<'a> {
    pub fn new(db: &'a PlatformDb) -> Self {
        Self { db }
    }

    /// Create the organization's store.
    pub fn create(
        &self,
        organization_id: &str,
        name: &str,
        slug: &str,
        custom_role_limit: u32,
    ) -> DbResult<Store> {
        self.db.write(|tx| {
            tx.require::<Organization>(organization_id)?;
            let existing = tx.scan(|s: &Store| s.organization_id == organization_id || s.slug == slug)?;
            if existing.iter().any(|s| s.organization_id == organization_id) {
                return Err(DbError::Constraint(
                    "organization already has a store".to_string(),
                ));
            }
            if !existing.is_empty() {
                return Err(DbError::AlreadyExists(format!("Store slug {slug}")));
            }

            let now = Utc::now();
            let store = Store {
                id: uuid::Uuid::new_v4().to_string(),
                organization_id: organization_id.to_string(),
                name: name.to_string(),
                slug: slug.to_string(),
                custom_role_limit: custom_role_limit.min(MAX_CUSTOM_ROLE_LIMIT),
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            tx.insert(&store)?;
            Ok(store)
        })
    }

    pub fn get(&self, store_id: &str) -> DbResult<Option<Store>> {
        self.db.get(store_id)
    }

    pub fn require(&self, store_id: &str) -> DbResult<Store> {
        self.db.require(store_id)
    }

    pub fn for_organization(&self, organization_id: &str) -> DbResult<Option<Store>> {
        Ok(self
            .db
            .scan(|s: &Store| s.organization_id == organization_id)?
            .into_iter()
            .next())
    }

    pub fn count(&self) -> DbResult<usize> {
        Ok(self.db.list::<Store>()?.len())
    }

    /// Set the custom role limit. Returns `(previous, updated)`.
    pub fn set_custom_role_limit(&self, store_id: &str, limit: u32) -> DbResult<(u32, Store)> {
        if limit > MAX_CUSTOM_ROLE_LIMIT {
            return Err(DbError::Constraint(format!(
                "custom role limit must be between 0 and {MAX_CUSTOM_ROLE_LIMIT}"
            )));
        }
        self.db.write(|tx| {
            let mut store = tx.require::<Store>(store_id)?;
            let previous = store.custom_role_limit;
            store.custom_role_limit = limit;
            store.updated_at = Utc::now();
            tx.put(&store)?;
            Ok((previous, store))
        })
    }

    /// Activate or deactivate a store. Returns `(previous, updated)`.
    ///
    /// Staff of an inactive store keep their rows but resolve no store role.
    pub fn set_active(&self, store_id: &str, active: bool) -> DbResult<(bool, Store)> {
        self.db.write(|tx| {
            let mut store = tx.require::<Store>(store_id)?;
            let previous = store.is_active;
            if previous != active {
                store.is_active = active;
                store.updated_at = Utc::now();
                tx.put(&store)?;
            }
            Ok((previous, store))
        })
    }

    // ========== Staff ==========

    pub fn staff_member(&self, staff_id: &str) -> DbResult<Option<StoreStaff>> {
        self.db.get(staff_id)
    }

    /// Active staff of a store, highest role first.
    pub fn staff(&self, store_id: &str) -> DbResult<Vec<StoreStaff>> {
        let mut staff = self
            .db
            .scan(|s: &StoreStaff| s.store_id == store_id && s.is_active)?;
        staff.sort_by_key(|s| (s.role.map_or(usize::MAX, Role::precedence), s.created_at));
        Ok(staff)
    }

    /// Active staff rows of a user, optionally restricted to one store.
    pub fn active_staff_for_user(&self, user_id: &str, store_id: Option<&str>) -> DbResult<Vec<StoreStaff>> {
        self.db.scan(|s: &StoreStaff| {
            s.user_id == user_id && s.is_active && store_id.is_none_or(|id| s.store_id == id)
        })
    }

    /// Add a user to a store's staff.
    ///
    /// The role must be store-scoped; a custom role must be active and belong
    /// to the same store; a user holds at most one active row per store.
    pub fn add_staff(
        &self,
        store_id: &str,
        user_id: &str,
        role: Option<Role>,
        custom_role_id: Option<&str>,
    ) -> DbResult<StoreStaff> {
        if role.is_none() && custom_role_id.is_none() {
            return Err(DbError::Constraint(
                "staff needs a role or a custom role".to_string(),
            ));
        }
        if let Some(role) = role {
            if role.scope() != RoleScope::Store {
                return Err(DbError::Constraint(format!("{role} is not a store role")));
            }
        }

        self.db.write(|tx| {
            let store = tx.require::<Store>(store_id)?;
            if !store.is_active {
                return Err(DbError::Constraint("store is not active".to_string()));
            }
            if let Some(custom_role_id) = custom_role_id {
                let custom = tx.require::<super::custom_roles::CustomRole>(custom_role_id)?;
                if custom.store_id != store_id || !custom.is_active {
                    return Err(DbError::Constraint(
                        "custom role is not active in this store".to_string(),
                    ));
                }
            }
            if active_staff_in(tx, store_id)?
                .iter()
                .any(|s| s.user_id == user_id)
            {
                return Err(DbError::AlreadyExists(format!(
                    "Staff {user_id} in store {store_id}"
                )));
            }

            let now = Utc::now();
            let staff = StoreStaff {
                id: uuid::Uuid::new_v4().to_string(),
                store_id: store_id.to_string(),
                user_id: user_id.to_string(),
                role,
                custom_role_id: custom_role_id.map(str::to_string),
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            tx.insert(&staff)?;
            Ok(staff)
        })
    }

    /// Soft-delete a staff row.
    pub fn remove_staff(&self, store_id: &str, staff_id: &str) -> DbResult<StoreStaff> {
        self.db.write(|tx| {
            let mut staff = tx.require::<StoreStaff>(staff_id)?;
            if staff.store_id != store_id || !staff.is_active {
                return Err(DbError::NotFound(format!("Store staff {staff_id}")));
            }
            staff.is_active = false;
            staff.updated_at = Utc::now();
            tx.put(&staff)?;
            Ok(staff)
        })
    }
}
