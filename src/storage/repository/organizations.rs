// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Organization and membership rows.
//!
//! An organization is the top-level tenant. Memberships attach users to it
//! with an organization-scoped role; at most one membership exists per
//! (organization, user) pair.

use chrono::{DateTime, Utc};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::database::{
    DbError, DbResult, PlatformDb, Record, WriteTx, MEMBERSHIPS, ORGANIZATIONS,
};
use crate::rbac::Role;

/// Organization stored in the platform database.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Organization {
    pub id: String,
    pub name: String,
    /// Unique, URL-safe identifier
    pub slug: String,
    /// User who created the organization
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Organization {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = ORGANIZATIONS;
    const KIND: &'static str = "Organization";

    fn key(&self) -> &str {
        &self.id
    }
}

/// Organization membership with an organization-scoped role.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Membership {
    pub id: String,
    pub organization_id: String,
    pub user_id: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(organization_id: &str, user_id: &str, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            organization_id: organization_id.to_string(),
            user_id: user_id.to_string(),
            role,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for Membership {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = MEMBERSHIPS;
    const KIND: &'static str = "Membership";

    fn key(&self) -> &str {
        &self.id
    }
}

/// Whether `slug` is 2-64 chars of `[a-z0-9-]`, not starting or ending with `-`.
pub fn is_valid_slug(slug: &str) -> bool {
    (2..=64).contains(&slug.len())
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !slug.starts_with('-')
        && !slug.ends_with('-')
}

/// Derive a slug from a display name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.truncate(64);
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Repository for organizations and their memberships.
pub struct OrganizationRepository<'a> {
    db: &'a PlatformDb,
}

impl<'a> OrganizationRepository<'a> {
    pub fn new(db: &'a PlatformDb) -> Self {
        Self { db }
    }

    /// Create an organization and make `owner_id` its `OWNER`.
    pub fn create(&self, name: &str, slug: &str, owner_id: &str) -> DbResult<(Organization, Membership)> {
        self.db.write(|tx| {
            if !tx.scan(|o: &Organization| o.slug == slug)?.is_empty() {
                return Err(DbError::AlreadyExists(format!("Organization slug {slug}")));
            }

            let now = Utc::now();
            let org = Organization {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.to_string(),
                slug: slug.to_string(),
                owner_id: owner_id.to_string(),
                created_at: now,
                updated_at: now,
            };
            let membership = Membership::new(&org.id, owner_id, Role::Owner);

            tx.insert(&org)?;
            tx.insert(&membership)?;
            Ok((org, membership))
        })
    }

    pub fn get(&self, organization_id: &str) -> DbResult<Option<Organization>> {
        self.db.get(organization_id)
    }

    pub fn require(&self, organization_id: &str) -> DbResult<Organization> {
        self.db.require(organization_id)
    }

    pub fn count(&self) -> DbResult<usize> {
        Ok(self.db.list::<Organization>()?.len())
    }

    /// All memberships of a user, across organizations.
    pub fn memberships_for_user(&self, user_id: &str) -> DbResult<Vec<Membership>> {
        self.db.scan(|m: &Membership| m.user_id == user_id)
    }

    pub fn membership(&self, organization_id: &str, user_id: &str) -> DbResult<Option<Membership>> {
        Ok(self
            .db
            .scan(|m: &Membership| m.organization_id == organization_id && m.user_id == user_id)?
            .into_iter()
            .next())
    }

    pub fn members(&self, organization_id: &str) -> DbResult<Vec<Membership>> {
        let mut members = self
            .db
            .scan(|m: &Membership| m.organization_id == organization_id)?;
        members.sort_by_key(|m| (m.role.precedence(), m.created_at));
        Ok(members)
    }

    /// Add a member. The role must be organization-scoped.
    pub fn add_member(&self, organization_id: &str, user_id: &str, role: Role) -> DbResult<Membership> {
        if role.scope() != crate::rbac::RoleScope::Organization {
            return Err(DbError::Constraint(format!(
                "{role} is not an organization role"
            )));
        }

        self.db.write(|tx| {
            tx.require::<Organization>(organization_id)?;
            if find_membership(tx, organization_id, user_id)?.is_some() {
                return Err(DbError::AlreadyExists(format!(
                    "Membership of {user_id} in {organization_id}"
                )));
            }
            let membership = Membership::new(organization_id, user_id, role);
            tx.insert(&membership)?;
            Ok(membership)
        })
    }

    /// Remove a member. The last `OWNER` of an organization cannot be removed.
    pub fn remove_member(&self, organization_id: &str, user_id: &str) -> DbResult<Membership> {
        self.db.write(|tx| {
            let membership = find_membership(tx, organization_id, user_id)?.ok_or_else(|| {
                DbError::NotFound(format!("Membership of {user_id} in {organization_id}"))
            })?;

            if membership.role == Role::Owner {
                let owners = tx.scan(|m: &Membership| {
                    m.organization_id == organization_id && m.role == Role::Owner
                })?;
                if owners.len() <= 1 {
                    return Err(DbError::Constraint(
                        "cannot remove the last owner of an organization".to_string(),
                    ));
                }
            }

            tx.remove::<Membership>(&membership.id)?;
            Ok(membership)
        })
    }
}

fn find_membership(tx: &WriteTx<'_>, organization_id: &str, user_id: &str) -> DbResult<Option<Membership>> {
    Ok(tx
        .scan(|m: &Membership| m.organization_id == organization_id && m.user_id == user_id)?
        .into_iter()
        .next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PlatformDb) {
        let temp = TempDir::new().unwrap();
        let db = PlatformDb::open(&temp.path().join("test.redb")).unwrap();
        (temp, db)
    }

    #[test]
    fn create_makes_creator_owner() {
        let (_temp, db) = setup();
        let repo = OrganizationRepository::new(&db);

        let (org, membership) = repo.create("Acme", "acme", "user_1").unwrap();
        assert_eq!(membership.role, Role::Owner);
        assert_eq!(membership.organization_id, org.id);
        assert_eq!(repo.members(&org.id).unwrap().len(), 1);
        assert_eq!(
            repo.membership(&org.id, "user_1").unwrap().unwrap().role,
            Role::Owner
        );
    }

    #[test]
    fn slug_is_unique() {
        let (_temp, db) = setup();
        let repo = OrganizationRepository::new(&db);
        repo.create("Acme", "acme", "user_1").unwrap();
        assert!(matches!(
            repo.create("Acme Two", "acme", "user_2"),
            Err(DbError::AlreadyExists(_))
        ));
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn membership_is_unique_per_pair() {
        let (_temp, db) = setup();
        let repo = OrganizationRepository::new(&db);
        let (org, _) = repo.create("Acme", "acme", "owner").unwrap();

        repo.add_member(&org.id, "user_2", Role::Viewer).unwrap();
        assert!(matches!(
            repo.add_member(&org.id, "user_2", Role::Member),
            Err(DbError::AlreadyExists(_))
        ));
    }

    #[test]
    fn store_roles_are_not_memberships() {
        let (_temp, db) = setup();
        let repo = OrganizationRepository::new(&db);
        let (org, _) = repo.create("Acme", "acme", "owner").unwrap();
        assert!(matches!(
            repo.add_member(&org.id, "user_2", Role::SalesManager),
            Err(DbError::Constraint(_))
        ));
    }

    #[test]
    fn last_owner_cannot_be_removed() {
        let (_temp, db) = setup();
        let repo = OrganizationRepository::new(&db);
        let (org, _) = repo.create("Acme", "acme", "owner").unwrap();

        assert!(matches!(
            repo.remove_member(&org.id, "owner"),
            Err(DbError::Constraint(_))
        ));

        repo.add_member(&org.id, "owner_2", Role::Owner).unwrap();
        repo.remove_member(&org.id, "owner").unwrap();
        assert!(repo.membership(&org.id, "owner").unwrap().is_none());
    }

    #[test]
    fn members_sorted_by_precedence() {
        let (_temp, db) = setup();
        let repo = OrganizationRepository::new(&db);
        let (org, _) = repo.create("Acme", "acme", "owner").unwrap();
        repo.add_member(&org.id, "v", Role::Viewer).unwrap();
        repo.add_member(&org.id, "a", Role::Admin).unwrap();

        let roles: Vec<Role> = repo.members(&org.id).unwrap().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Owner, Role::Admin, Role::Viewer]);
    }

    #[test]
    fn slug_helpers() {
        assert_eq!(slugify("  Acme Widgets, Inc. "), "acme-widgets-inc");
        assert!(is_valid_slug("acme-widgets"));
        assert!(!is_valid_slug("-acme"));
        assert!(!is_valid_slug("Acme"));
        assert!(!is_valid_slug("a"));

        // A separator landing on the cut is trimmed
        let name = format!("{} b", "a".repeat(63));
        let slug = slugify(&name);
        assert_eq!(slug, "a".repeat(63));
        assert!(is_valid_slug(&slug));
    }
}
