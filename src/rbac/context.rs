// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User context resolution.
//!
//! A [`UserContext`] is everything the permission checks need to know about
//! one user within one [`AccessScope`]: the picked organization membership,
//! the picked store staff row, the custom role attached to that row, and the
//! single effective role derived from them.
//!
//! ## Resolution
//!
//! 1. Super-admins resolve to `SUPER_ADMIN` with the global wildcard.
//! 2. Memberships are filtered to the scope's organization and the highest
//!    by [`ORGANIZATION_ROLE_PRECEDENCE`] is picked.
//! 3. Active staff rows of active stores are filtered to the scope and the
//!    highest by [`STORE_ROLE_PRECEDENCE`] is picked. Rows carrying only a
//!    custom role rank below every built-in store role.
//! 4. The effective role is the higher-level of the two, or `CUSTOMER`.
//! 5. Permissions are the effective role's table plus the picked staff row's
//!    active custom role.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::cache::ContextCache;
use super::permission::{PermissionSet, GLOBAL_WILDCARD};
use super::roles::{Role, ORGANIZATION_ROLE_PRECEDENCE, STORE_ROLE_PRECEDENCE};
use crate::storage::{
    CustomRole, DbResult, Membership, PlatformDb, Store, StoreStaff, StoredUser,
};

/// Where a permission check applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AccessScope {
    /// No tenant restriction: every membership and staff row counts.
    Platform,
    Organization(String),
    Store(String),
}

impl AccessScope {
    /// Build from optional query parameters; a store wins over an organization.
    pub fn from_ids(organization_id: Option<String>, store_id: Option<String>) -> Self {
        match (store_id, organization_id) {
            (Some(store_id), _) => AccessScope::Store(store_id),
            (None, Some(organization_id)) => AccessScope::Organization(organization_id),
            (None, None) => AccessScope::Platform,
        }
    }
}

/// The custom role contributing to a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CustomRoleGrant {
    pub id: String,
    pub name: String,
    pub permissions: Vec<String>,
}

/// A permission check failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("missing permission `{permission}`")]
pub struct PermissionDenied {
    pub permission: String,
}

/// Resolved roles and permissions of one user in one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserContext {
    pub user_id: String,
    pub scope: AccessScope,
    pub is_super_admin: bool,
    pub organization_id: Option<String>,
    pub organization_role: Option<Role>,
    pub store_id: Option<String>,
    pub store_role: Option<Role>,
    /// Staff row the store role and custom role come from
    pub staff_id: Option<String>,
    pub custom_role: Option<CustomRoleGrant>,
    pub effective_role: Role,
    pub permissions: PermissionSet,
}

impl UserContext {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.allows(permission)
    }

    pub fn require_permission(&self, permission: &str) -> Result<(), PermissionDenied> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(PermissionDenied {
                permission: permission.to_string(),
            })
        }
    }

    pub fn has_any_permission(&self, permissions: &[&str]) -> bool {
        self.permissions.allows_any(permissions)
    }

    pub fn has_all_permissions(&self, permissions: &[&str]) -> bool {
        self.permissions.allows_all(permissions)
    }

    /// Whether this user may hand `role` to someone else.
    pub fn can_assign(&self, role: Role) -> bool {
        self.effective_role.can_assign(role)
    }

    /// Whether the context was resolved for exactly this store.
    pub fn is_scoped_to_store(&self, store_id: &str) -> bool {
        matches!(&self.scope, AccessScope::Store(id) if id == store_id)
    }

    pub fn is_scoped_to_organization(&self, organization_id: &str) -> bool {
        matches!(&self.scope, AccessScope::Organization(id) if id == organization_id)
    }
}

/// Loads rows and resolves [`UserContext`]s, optionally through a cache.
pub struct ContextResolver<'a> {
    db: &'a PlatformDb,
    cache: Option<&'a ContextCache>,
}

impl<'a> ContextResolver<'a> {
    pub fn new(db: &'a PlatformDb) -> Self {
        Self { db, cache: None }
    }

    pub fn with_cache(mut self, cache: &'a ContextCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Resolve a user's context within `scope`.
    pub fn resolve(&self, user_id: &str, scope: &AccessScope) -> DbResult<UserContext> {
        if let Some(cached) = self.cache.and_then(|c| c.get(user_id, scope)) {
            return Ok(cached);
        }

        let seen = self.cache.map(ContextCache::generation);
        let context = self.resolve_uncached(user_id, scope)?;
        if let (Some(cache), Some(seen)) = (self.cache, seen) {
            cache.put(context.clone(), seen);
        }
        Ok(context)
    }

    fn resolve_uncached(&self, user_id: &str, scope: &AccessScope) -> DbResult<UserContext> {
        let is_super_admin = self
            .db
            .get::<StoredUser>(user_id)?
            .is_some_and(|u| u.is_super_admin);

        // Organization the scope points at, if any
        let (scope_organization, scope_store): (Option<String>, Option<Store>) = match scope {
            AccessScope::Platform => (None, None),
            AccessScope::Organization(id) => (Some(id.clone()), None),
            AccessScope::Store(id) => {
                let store = self.db.get::<Store>(id)?;
                // Unknown stores match no organization
                let organization = Some(
                    store
                        .as_ref()
                        .map(|s| s.organization_id.clone())
                        .unwrap_or_default(),
                );
                (organization, store)
            }
        };

        let memberships = self.db.scan(|m: &Membership| {
            m.user_id == user_id
                && scope_organization
                    .as_deref()
                    .is_none_or(|org| m.organization_id == org)
        })?;
        let membership = pick_membership(&memberships);

        let active_stores = self.db.scan(|s: &Store| s.is_active)?;
        let staff_rows = self.db.scan(|s: &StoreStaff| {
            if s.user_id != user_id || !s.is_active {
                return false;
            }
            let Some(store) = active_stores.iter().find(|st| st.id == s.store_id) else {
                return false;
            };
            match scope {
                AccessScope::Platform => true,
                AccessScope::Organization(org) => &store.organization_id == org,
                AccessScope::Store(id) => &s.store_id == id,
            }
        })?;
        let staff = pick_staff(&staff_rows);

        let custom_role = match staff.and_then(|s| s.custom_role_id.as_deref()) {
            Some(role_id) => self
                .db
                .get::<CustomRole>(role_id)?
                .filter(|r| r.is_active && staff.is_some_and(|s| s.store_id == r.store_id))
                .map(|r| CustomRoleGrant {
                    id: r.id,
                    name: r.name,
                    permissions: r.permissions,
                }),
            None => None,
        };

        let organization_role = membership.map(|m| m.role);
        let store_role = staff.and_then(|s| s.role);

        let effective_role = if is_super_admin {
            Role::SuperAdmin
        } else {
            effective_role(organization_role, store_role)
        };

        let mut permissions = PermissionSet::new();
        if is_super_admin {
            permissions.extend([GLOBAL_WILDCARD]);
        } else {
            permissions.extend(effective_role.permissions().iter().copied());
            if let Some(custom) = &custom_role {
                permissions.extend(custom.permissions.iter());
            }
        }

        let organization_id = membership
            .map(|m| m.organization_id.clone())
            .or_else(|| scope_store.as_ref().map(|s| s.organization_id.clone()))
            .or_else(|| match scope {
                AccessScope::Organization(id) => Some(id.clone()),
                _ => None,
            });
        let store_id = staff
            .map(|s| s.store_id.clone())
            .or_else(|| scope_store.as_ref().map(|s| s.id.clone()));

        tracing::debug!(
            user_id = %user_id,
            scope = ?scope,
            effective_role = %effective_role,
            permissions = permissions.len(),
            "Resolved user context"
        );

        Ok(UserContext {
            user_id: user_id.to_string(),
            scope: scope.clone(),
            is_super_admin,
            organization_id,
            organization_role,
            store_id,
            store_role,
            staff_id: staff.map(|s| s.id.clone()),
            custom_role,
            effective_role,
            permissions,
        })
    }
}

/// Higher-level of the organization and store roles, or `CUSTOMER`.
pub fn effective_role(organization_role: Option<Role>, store_role: Option<Role>) -> Role {
    match (organization_role, store_role) {
        (Some(org), Some(store)) => {
            if store.outranks(org) {
                store
            } else {
                org
            }
        }
        (Some(role), None) | (None, Some(role)) => role,
        (None, None) => Role::Customer,
    }
}

fn pick_membership(memberships: &[Membership]) -> Option<&Membership> {
    memberships.iter().min_by_key(|m| {
        let rank = ORGANIZATION_ROLE_PRECEDENCE
            .iter()
            .position(|r| *r == m.role)
            .unwrap_or(usize::MAX);
        (rank, m.created_at)
    })
}

fn pick_staff(rows: &[StoreStaff]) -> Option<&StoreStaff> {
    rows.iter().min_by_key(|s| {
        let rank = s
            .role
            .and_then(|role| STORE_ROLE_PRECEDENCE.iter().position(|r| *r == role))
            .unwrap_or(usize::MAX);
        (rank, s.created_at)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{OrganizationRepository, StoreRepository, UserRepository};
    use chrono::Utc;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        db: PlatformDb,
        org_id: String,
        store_id: String,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let db = PlatformDb::open(&temp.path().join("test.redb")).unwrap();
        let (org, _) = OrganizationRepository::new(&db)
            .create("Acme", "acme", "owner")
            .unwrap();
        let store = StoreRepository::new(&db)
            .create(&org.id, "Acme Shop", "acme-shop", 5)
            .unwrap();
        Fixture {
            _temp: temp,
            db,
            org_id: org.id,
            store_id: store.id,
        }
    }

    fn custom_role(db: &PlatformDb, store_id: &str, permissions: &[&str], active: bool) -> CustomRole {
        let now = Utc::now();
        let role = CustomRole {
            id: uuid::Uuid::new_v4().to_string(),
            store_id: store_id.to_string(),
            name: "Refund Desk".to_string(),
            description: None,
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            request_id: "req".to_string(),
            created_by: "owner".to_string(),
            approved_by: "root".to_string(),
            is_active: active,
            created_at: now,
            updated_at: now,
        };
        db.put(&role).unwrap();
        role
    }

    #[test]
    fn unknown_user_is_customer() {
        let f = fixture();
        let ctx = ContextResolver::new(&f.db)
            .resolve("stranger", &AccessScope::Platform)
            .unwrap();
        assert_eq!(ctx.effective_role, Role::Customer);
        assert!(ctx.has_permission("orders:read:own"));
        assert!(!ctx.has_permission("orders:read"));
        assert!(!ctx.is_super_admin);
    }

    #[test]
    fn super_admin_overrides_everything() {
        let f = fixture();
        UserRepository::new(&f.db).set_super_admin("root", true).unwrap();

        let ctx = ContextResolver::new(&f.db)
            .resolve("root", &AccessScope::Store(f.store_id.clone()))
            .unwrap();
        assert!(ctx.is_super_admin);
        assert_eq!(ctx.effective_role, Role::SuperAdmin);
        assert!(ctx.has_permission("billing:delete"));
        assert_eq!(ctx.permissions.iter().collect::<Vec<_>>(), vec!["*"]);
        assert_eq!(ctx.store_id.as_deref(), Some(f.store_id.as_str()));
    }

    #[test]
    fn owner_membership_applies_to_store_scope() {
        let f = fixture();
        let ctx = ContextResolver::new(&f.db)
            .resolve("owner", &AccessScope::Store(f.store_id.clone()))
            .unwrap();
        assert_eq!(ctx.organization_role, Some(Role::Owner));
        assert_eq!(ctx.store_role, None);
        assert_eq!(ctx.effective_role, Role::Owner);
        assert_eq!(ctx.organization_id.as_deref(), Some(f.org_id.as_str()));
        assert!(ctx.has_permission("roles:request"));
    }

    #[test]
    fn higher_store_role_beats_lower_membership() {
        let f = fixture();
        OrganizationRepository::new(&f.db)
            .add_member(&f.org_id, "clerk", Role::Viewer)
            .unwrap();
        StoreRepository::new(&f.db)
            .add_staff(&f.store_id, "clerk", Some(Role::SalesManager), None)
            .unwrap();

        let ctx = ContextResolver::new(&f.db)
            .resolve("clerk", &AccessScope::Store(f.store_id.clone()))
            .unwrap();
        assert_eq!(ctx.organization_role, Some(Role::Viewer));
        assert_eq!(ctx.store_role, Some(Role::SalesManager));
        assert_eq!(ctx.effective_role, Role::SalesManager);
        assert!(ctx.has_permission("orders:refund"));
    }

    #[test]
    fn higher_membership_beats_lower_store_role() {
        let f = fixture();
        OrganizationRepository::new(&f.db)
            .add_member(&f.org_id, "boss", Role::Admin)
            .unwrap();
        StoreRepository::new(&f.db)
            .add_staff(&f.store_id, "boss", Some(Role::DeliveryBoy), None)
            .unwrap();

        let ctx = ContextResolver::new(&f.db)
            .resolve("boss", &AccessScope::Store(f.store_id.clone()))
            .unwrap();
        assert_eq!(ctx.effective_role, Role::Admin);
        assert!(ctx.has_permission("staff:create"));
    }

    #[test]
    fn custom_role_permissions_are_added() {
        let f = fixture();
        let role = custom_role(&f.db, &f.store_id, &["orders:refund", "coupons:*"], true);
        StoreRepository::new(&f.db)
            .add_staff(&f.store_id, "desk", Some(Role::DeliveryBoy), Some(&role.id))
            .unwrap();

        let ctx = ContextResolver::new(&f.db)
            .resolve("desk", &AccessScope::Store(f.store_id.clone()))
            .unwrap();
        assert_eq!(ctx.effective_role, Role::DeliveryBoy);
        assert_eq!(ctx.custom_role.as_ref().map(|c| c.id.as_str()), Some(role.id.as_str()));
        assert!(ctx.has_permission("orders:refund"));
        assert!(ctx.has_permission("coupons:delete"));
        assert!(ctx.has_permission("deliveries:update"));
        assert!(!ctx.has_permission("products:update"));
    }

    #[test]
    fn custom_only_staff_ranks_below_builtin() {
        let f = fixture();
        let role = custom_role(&f.db, &f.store_id, &["orders:refund"], true);
        let stores = StoreRepository::new(&f.db);
        stores
            .add_staff(&f.store_id, "multi", None, Some(&role.id))
            .unwrap();

        // Second store row for the same user in another organization
        let (org2, _) = OrganizationRepository::new(&f.db)
            .create("Other", "other", "someone")
            .unwrap();
        let store2 = stores.create(&org2.id, "Other Shop", "other-shop", 5).unwrap();
        stores
            .add_staff(&store2.id, "multi", Some(Role::ContentManager), None)
            .unwrap();

        let ctx = ContextResolver::new(&f.db)
            .resolve("multi", &AccessScope::Platform)
            .unwrap();
        assert_eq!(ctx.store_role, Some(Role::ContentManager));
        assert_eq!(ctx.store_id.as_deref(), Some(store2.id.as_str()));
        assert!(ctx.custom_role.is_none());

        // Custom-only row still resolves when scoped to its store
        let scoped = ContextResolver::new(&f.db)
            .resolve("multi", &AccessScope::Store(f.store_id.clone()))
            .unwrap();
        assert_eq!(scoped.store_role, None);
        assert_eq!(scoped.effective_role, Role::Customer);
        assert!(scoped.has_permission("orders:refund"));
    }

    #[test]
    fn inactive_custom_role_is_ignored() {
        let f = fixture();
        let role = custom_role(&f.db, &f.store_id, &["orders:refund"], false);
        let mut staff = StoreRepository::new(&f.db)
            .add_staff(&f.store_id, "desk", Some(Role::DeliveryBoy), None)
            .unwrap();
        staff.custom_role_id = Some(role.id);
        f.db.put(&staff).unwrap();

        let ctx = ContextResolver::new(&f.db)
            .resolve("desk", &AccessScope::Store(f.store_id.clone()))
            .unwrap();
        assert!(ctx.custom_role.is_none());
        assert!(!ctx.has_permission("orders:refund"));
    }

    #[test]
    fn scope_restricts_memberships() {
        let f = fixture();
        let (other, _) = OrganizationRepository::new(&f.db)
            .create("Other", "other", "someone")
            .unwrap();

        let ctx = ContextResolver::new(&f.db)
            .resolve("owner", &AccessScope::Organization(other.id.clone()))
            .unwrap();
        assert_eq!(ctx.organization_role, None);
        assert_eq!(ctx.effective_role, Role::Customer);
        assert!(ctx.is_scoped_to_organization(&other.id));

        let ctx = ContextResolver::new(&f.db)
            .resolve("owner", &AccessScope::Store("missing-store".to_string()))
            .unwrap();
        assert_eq!(ctx.effective_role, Role::Customer);
    }

    #[test]
    fn removed_staff_no_longer_counts() {
        let f = fixture();
        let stores = StoreRepository::new(&f.db);
        let staff = stores
            .add_staff(&f.store_id, "temp", Some(Role::InventoryManager), None)
            .unwrap();
        stores.remove_staff(&f.store_id, &staff.id).unwrap();

        let ctx = ContextResolver::new(&f.db)
            .resolve("temp", &AccessScope::Store(f.store_id.clone()))
            .unwrap();
        assert_eq!(ctx.effective_role, Role::Customer);
    }

    #[test]
    fn inactive_store_grants_no_store_role() {
        let f = fixture();
        let stores = StoreRepository::new(&f.db);
        stores
            .add_staff(&f.store_id, "driver", Some(Role::DeliveryBoy), None)
            .unwrap();
        stores.set_active(&f.store_id, false).unwrap();

        let scope = AccessScope::Store(f.store_id.clone());
        let driver = ContextResolver::new(&f.db).resolve("driver", &scope).unwrap();
        assert_eq!(driver.store_role, None);
        assert_eq!(driver.staff_id, None);
        assert_eq!(driver.effective_role, Role::Customer);

        // Memberships are untouched
        let owner = ContextResolver::new(&f.db).resolve("owner", &scope).unwrap();
        assert_eq!(owner.effective_role, Role::Owner);

        stores.set_active(&f.store_id, true).unwrap();
        let driver = ContextResolver::new(&f.db).resolve("driver", &scope).unwrap();
        assert_eq!(driver.effective_role, Role::DeliveryBoy);
    }

    #[test]
    fn checks_and_assignment() {
        let f = fixture();
        let ctx = ContextResolver::new(&f.db)
            .resolve("owner", &AccessScope::Organization(f.org_id.clone()))
            .unwrap();
        assert!(ctx.has_any_permission(&["platform:manage", "org:delete"]));
        assert!(ctx.has_all_permissions(&["org:delete", "members:create"]));
        assert!(ctx.require_permission("billing:update").is_ok());
        assert_eq!(
            ctx.require_permission("platform:manage"),
            Err(PermissionDenied {
                permission: "platform:manage".to_string()
            })
        );
        assert!(ctx.can_assign(Role::Admin));
        assert!(!ctx.can_assign(Role::Owner));
    }

    #[test]
    fn resolver_uses_cache() {
        let f = fixture();
        let cache = ContextCache::new(16, Duration::from_secs(60));
        let scope = AccessScope::Store(f.store_id.clone());

        let first = ContextResolver::new(&f.db)
            .with_cache(&cache)
            .resolve("owner", &scope)
            .unwrap();
        // Change the row behind the cache's back
        OrganizationRepository::new(&f.db)
            .add_member(&f.org_id, "owner_2", Role::Owner)
            .unwrap();
        OrganizationRepository::new(&f.db)
            .remove_member(&f.org_id, "owner")
            .unwrap();

        let cached = ContextResolver::new(&f.db)
            .with_cache(&cache)
            .resolve("owner", &scope)
            .unwrap();
        assert_eq!(cached, first);

        cache.invalidate_user("owner");
        let fresh = ContextResolver::new(&f.db)
            .with_cache(&cache)
            .resolve("owner", &scope)
            .unwrap();
        assert_eq!(fresh.effective_role, Role::Customer);
    }

    #[test]
    fn removal_during_resolve_is_not_cached() {
        let f = fixture();
        OrganizationRepository::new(&f.db)
            .add_member(&f.org_id, "admin", Role::Admin)
            .unwrap();
        let cache = ContextCache::new(16, Duration::from_secs(60));
        let resolver = ContextResolver::new(&f.db).with_cache(&cache);
        let scope = AccessScope::Organization(f.org_id.clone());

        // A resolve that loads rows, then loses the race with a removal
        let seen = cache.generation();
        let stale = resolver.resolve_uncached("admin", &scope).unwrap();
        assert!(stale.has_permission("members:delete"));
        OrganizationRepository::new(&f.db)
            .remove_member(&f.org_id, "admin")
            .unwrap();
        cache.invalidate_user("admin");
        assert!(!cache.put(stale, seen));

        let ctx = resolver.resolve("admin", &scope).unwrap();
        assert_eq!(ctx.organization_role, None);
        assert_eq!(ctx.effective_role, Role::Customer);
        assert!(!ctx.has_permission("members:delete"));
    }

    #[test]
    fn effective_role_rules() {
        assert_eq!(effective_role(None, None), Role::Customer);
        assert_eq!(effective_role(Some(Role::Member), None), Role::Member);
        assert_eq!(
            effective_role(Some(Role::Member), Some(Role::DeliveryBoy)),
            Role::DeliveryBoy
        );
        assert_eq!(
            effective_role(Some(Role::Owner), Some(Role::StoreAdmin)),
            Role::Owner
        );
    }

    #[test]
    fn scope_from_ids() {
        assert_eq!(AccessScope::from_ids(None, None), AccessScope::Platform);
        assert_eq!(
            AccessScope::from_ids(Some("o".into()), None),
            AccessScope::Organization("o".into())
        );
        assert_eq!(
            AccessScope::from_ids(Some("o".into()), Some("s".into())),
            AccessScope::Store("s".into())
        );
    }
}
