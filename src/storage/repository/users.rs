// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User rows.
//!
//! Users are identified by the auth provider's subject (`sub` claim). A row
//! is created the first time a user calls `/v1/users/me`, or when a user is
//! granted super-admin before ever logging in.

use chrono::{DateTime, Utc};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::database::{DbResult, PlatformDb, Record, USERS};

/// User stored in the platform database.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct StoredUser {
    /// Auth provider subject
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Platform operator flag; overrides every membership
    #[serde(default)]
    pub is_super_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredUser {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            email: None,
            name: None,
            is_super_admin: false,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for StoredUser {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = USERS;
    const KIND: &'static str = "User";

    fn key(&self) -> &str {
        &self.id
    }
}

/// Repository for user rows.
pub struct UserRepository<'a> {
    db: &'a PlatformDb,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a PlatformDb) -> Self {
        Self { db }
    }

    pub fn get(&self, user_id: &str) -> DbResult<Option<StoredUser>> {
        self.db.get(user_id)
    }

    pub fn require(&self, user_id: &str) -> DbResult<StoredUser> {
        self.db.require(user_id)
    }

    /// Create the row on first sight, refreshing profile fields afterwards.
    pub fn upsert_profile(
        &self,
        user_id: &str,
        email: Option<&str>,
        name: Option<&str>,
    ) -> DbResult<StoredUser> {
        self.db.write(|tx| {
            let mut user = tx
                .get::<StoredUser>(user_id)?
                .unwrap_or_else(|| StoredUser::new(user_id));
            let email = email.map(str::to_string).or(user.email.take());
            let name = name.map(str::to_string).or(user.name.take());
            user.email = email;
            user.name = name;
            user.updated_at = Utc::now();
            tx.put(&user)?;
            Ok(user)
        })
    }

    /// Set the super-admin flag, creating the row if needed.
    ///
    /// Returns the previous flag value with the updated row.
    pub fn set_super_admin(&self, user_id: &str, enabled: bool) -> DbResult<(bool, StoredUser)> {
        self.db.write(|tx| {
            let mut user = tx
                .get::<StoredUser>(user_id)?
                .unwrap_or_else(|| StoredUser::new(user_id));
            let previous = user.is_super_admin;
            user.is_super_admin = enabled;
            user.updated_at = Utc::now();
            tx.put(&user)?;
            Ok((previous, user))
        })
    }

    pub fn is_super_admin(&self, user_id: &str) -> DbResult<bool> {
        Ok(self.get(user_id)?.is_some_and(|u| u.is_super_admin))
    }

    pub fn list_super_admins(&self) -> DbResult<Vec<StoredUser>> {
        self.db.scan(|u: &StoredUser| u.is_super_admin)
    }

    pub fn count(&self) -> DbResult<usize> {
        Ok(self.db.list::<StoredUser>()?.len())
    }
}
