// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custom role rows.
//!
//! A custom role is created when a role request is approved. It belongs to
//! one store and counts against that store's custom role limit while active.

use chrono::{DateTime, Utc};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::database::{DbResult, PlatformDb, Record, CUSTOM_ROLES};

/// Store-specific role built from an approved permission subset.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct CustomRole {
    pub id: String,
    pub store_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Approved permission strings
    pub permissions: Vec<String>,
    /// Request this role was created from
    pub request_id: String,
    /// Requester of the originating request
    pub created_by: String,
    /// Super-admin who approved it
    pub approved_by: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for CustomRole {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = CUSTOM_ROLES;
    const KIND: &'static str = "Custom role";

    fn key(&self) -> &str {
        &self.id
    }
}

/// Repository for custom roles.
pub struct CustomRoleRepository<'a> {
    db: &'a PlatformDb,
}

impl<'a> CustomRoleRepository<'a> {
    pub fn new(db: &'a PlatformDb) -> Self {
        Self { db }
    }

    pub fn get(&self, role_id: &str) -> DbResult<Option<CustomRole>> {
        self.db.get(role_id)
    }

    /// Custom roles of a store, newest first.
    pub fn list_for_store(&self, store_id: &str, include_inactive: bool) -> DbResult<Vec<CustomRole>> {
        let mut roles = self
            .db
            .scan(|r: &CustomRole| r.store_id == store_id && (include_inactive || r.is_active))?;
        roles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(roles)
    }

    pub fn count_active(&self, store_id: &str) -> DbResult<usize> {
        Ok(self.list_for_store(store_id, false)?.len())
    }

    pub fn count_all_active(&self) -> DbResult<usize> {
        Ok(self.db.scan(|r: &CustomRole| r.is_active)?.len())
    }
}
