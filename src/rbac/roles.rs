// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Built-in roles and the static role → permission table.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::permission::{grants, Permission, PermissionError};

/// Where a role can be held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoleScope {
    /// Platform operators (super-admins)
    Platform,
    /// Organization memberships
    Organization,
    /// Store staff assignments
    Store,
    /// Shoppers without any membership
    Customer,
}

/// Built-in roles.
///
/// ## Role Hierarchy
///
/// Levels decide which role wins when a user holds several, and which roles
/// an actor may hand out (strictly lower levels only).
///
/// | Role | Scope | Level |
/// |------|-------|-------|
/// | `SuperAdmin` | platform | 100 |
/// | `Owner` | organization | 90 |
/// | `Admin` | organization | 80 |
/// | `StoreAdmin` | store | 70 |
/// | `SalesManager` | store | 60 |
/// | `InventoryManager` | store | 55 |
/// | `MarketingManager` | store | 50 |
/// | `CustomerService` | store | 45 |
/// | `ContentManager` | store | 40 |
/// | `DeliveryBoy` | store | 30 |
/// | `Member` | organization | 25 |
/// | `Viewer` | organization | 20 |
/// | `Customer` | customer | 10 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SuperAdmin,
    Owner,
    Admin,
    Member,
    Viewer,
    StoreAdmin,
    SalesManager,
    InventoryManager,
    CustomerService,
    ContentManager,
    MarketingManager,
    DeliveryBoy,
    Customer,
}

/// Organization roles, highest precedence first.
pub const ORGANIZATION_ROLE_PRECEDENCE: [Role; 4] =
    [Role::Owner, Role::Admin, Role::Member, Role::Viewer];

/// Store roles, highest precedence first.
pub const STORE_ROLE_PRECEDENCE: [Role; 7] = [
    Role::StoreAdmin,
    Role::SalesManager,
    Role::InventoryManager,
    Role::MarketingManager,
    Role::CustomerService,
    Role::ContentManager,
    Role::DeliveryBoy,
];

const SUPER_ADMIN_PERMISSIONS: &[&str] = &["*"];

const OWNER_PERMISSIONS: &[&str] = &[
    "org:*",
    "members:*",
    "billing:*",
    "store:*",
    "staff:*",
    "roles:*",
    "settings:*",
    "products:*",
    "categories:*",
    "brands:*",
    "inventory:*",
    "orders:*",
    "customers:*",
    "reviews:*",
    "analytics:*",
    "reports:*",
    "marketing:*",
    "coupons:*",
    "content:*",
    "deliveries:*",
    "support:*",
];

const ADMIN_PERMISSIONS: &[&str] = &[
    "org:read",
    "org:update",
    "members:*",
    "billing:read",
    "store:*",
    "staff:*",
    "roles:*",
    "settings:*",
    "products:*",
    "categories:*",
    "brands:*",
    "inventory:*",
    "orders:*",
    "customers:*",
    "reviews:*",
    "analytics:*",
    "reports:*",
    "marketing:*",
    "coupons:*",
    "content:*",
    "deliveries:*",
    "support:*",
];

const MEMBER_PERMISSIONS: &[&str] = &[
    "org:read",
    "members:read",
    "store:read",
    "products:read",
    "categories:read",
    "orders:read",
    "customers:read",
    "analytics:read",
];

const VIEWER_PERMISSIONS: &[&str] = &[
    "org:read",
    "store:read",
    "products:read",
    "categories:read",
    "orders:read",
    "analytics:read",
];

const STORE_ADMIN_PERMISSIONS: &[&str] = &[
    "store:read",
    "store:update",
    "staff:*",
    "roles:read",
    "roles:request",
    "roles:assign",
    "settings:read",
    "settings:update",
    "products:*",
    "categories:*",
    "brands:*",
    "inventory:*",
    "orders:*",
    "customers:*",
    "reviews:*",
    "analytics:*",
    "reports:*",
    "marketing:*",
    "coupons:*",
    "content:*",
    "deliveries:*",
    "support:*",
];

const SALES_MANAGER_PERMISSIONS: &[&str] = &[
    "store:read",
    "orders:*",
    "customers:*",
    "products:read",
    "inventory:read",
    "coupons:read",
    "deliveries:read",
    "analytics:read",
    "reports:read",
    "reports:export",
];

const INVENTORY_MANAGER_PERMISSIONS: &[&str] = &[
    "store:read",
    "products:*",
    "categories:*",
    "brands:*",
    "inventory:*",
    "orders:read",
    "reports:read",
];

const MARKETING_MANAGER_PERMISSIONS: &[&str] = &[
    "store:read",
    "marketing:*",
    "coupons:*",
    "content:read",
    "products:read",
    "customers:read",
    "analytics:read",
    "reports:read",
];

const CUSTOMER_SERVICE_PERMISSIONS: &[&str] = &[
    "store:read",
    "orders:read",
    "orders:update",
    "customers:read",
    "customers:update",
    "products:read",
    "reviews:*",
    "support:*",
];

const CONTENT_MANAGER_PERMISSIONS: &[&str] = &[
    "store:read",
    "products:read",
    "products:update",
    "categories:*",
    "brands:*",
    "content:*",
    "reviews:read",
];

const DELIVERY_BOY_PERMISSIONS: &[&str] = &["orders:read", "deliveries:read", "deliveries:update"];

const CUSTOMER_PERMISSIONS: &[&str] = &[
    "profile:read",
    "profile:update",
    "orders:create",
    "orders:read:own",
    "reviews:create",
    "wishlist:*",
];

impl Role {
    /// Every built-in role, highest level first.
    pub const ALL: [Role; 13] = [
        Role::SuperAdmin,
        Role::Owner,
        Role::Admin,
        Role::StoreAdmin,
        Role::SalesManager,
        Role::InventoryManager,
        Role::MarketingManager,
        Role::CustomerService,
        Role::ContentManager,
        Role::DeliveryBoy,
        Role::Member,
        Role::Viewer,
        Role::Customer,
    ];

    pub fn scope(self) -> RoleScope {
        match self {
            Role::SuperAdmin => RoleScope::Platform,
            Role::Owner | Role::Admin | Role::Member | Role::Viewer => RoleScope::Organization,
            Role::StoreAdmin
            | Role::SalesManager
            | Role::InventoryManager
            | Role::CustomerService
            | Role::ContentManager
            | Role::MarketingManager
            | Role::DeliveryBoy => RoleScope::Store,
            Role::Customer => RoleScope::Customer,
        }
    }

    pub fn level(self) -> u8 {
        match self {
            Role::SuperAdmin => 100,
            Role::Owner => 90,
            Role::Admin => 80,
            Role::StoreAdmin => 70,
            Role::SalesManager => 60,
            Role::InventoryManager => 55,
            Role::MarketingManager => 50,
            Role::CustomerService => 45,
            Role::ContentManager => 40,
            Role::DeliveryBoy => 30,
            Role::Member => 25,
            Role::Viewer => 20,
            Role::Customer => 10,
        }
    }

    /// Static permission list for this role.
    pub fn permissions(self) -> &'static [&'static str] {
        match self {
            Role::SuperAdmin => SUPER_ADMIN_PERMISSIONS,
            Role::Owner => OWNER_PERMISSIONS,
            Role::Admin => ADMIN_PERMISSIONS,
            Role::Member => MEMBER_PERMISSIONS,
            Role::Viewer => VIEWER_PERMISSIONS,
            Role::StoreAdmin => STORE_ADMIN_PERMISSIONS,
            Role::SalesManager => SALES_MANAGER_PERMISSIONS,
            Role::InventoryManager => INVENTORY_MANAGER_PERMISSIONS,
            Role::CustomerService => CUSTOMER_SERVICE_PERMISSIONS,
            Role::ContentManager => CONTENT_MANAGER_PERMISSIONS,
            Role::MarketingManager => MARKETING_MANAGER_PERMISSIONS,
            Role::DeliveryBoy => DELIVERY_BOY_PERMISSIONS,
            Role::Customer => CUSTOMER_PERMISSIONS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "SUPER_ADMIN",
            Role::Owner => "OWNER",
            Role::Admin => "ADMIN",
            Role::Member => "MEMBER",
            Role::Viewer => "VIEWER",
            Role::StoreAdmin => "STORE_ADMIN",
            Role::SalesManager => "SALES_MANAGER",
            Role::InventoryManager => "INVENTORY_MANAGER",
            Role::CustomerService => "CUSTOMER_SERVICE",
            Role::ContentManager => "CONTENT_MANAGER",
            Role::MarketingManager => "MARKETING_MANAGER",
            Role::DeliveryBoy => "DELIVERY_BOY",
            Role::Customer => "CUSTOMER",
        }
    }

    /// Parse role from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Role> {
        let wanted = s.trim().to_ascii_uppercase();
        Role::ALL.into_iter().find(|role| role.as_str() == wanted)
    }

    /// Whether this role's static table grants `permission`.
    pub fn grants(self, permission: &str) -> bool {
        role_grants(self, permission)
    }

    pub fn outranks(self, other: Role) -> bool {
        self.level() > other.level()
    }

    /// Whether a holder of this role may hand `other` to someone else.
    ///
    /// Only strictly lower roles can be granted; `Owner` is reserved for
    /// super-admins and `SuperAdmin` is never granted through memberships.
    pub fn can_assign(self, other: Role) -> bool {
        match other {
            Role::SuperAdmin => false,
            Role::Owner => self == Role::SuperAdmin,
            _ => self.outranks(other),
        }
    }

    /// Position in the precedence list of this role's scope (0 = highest).
    pub fn precedence(self) -> usize {
        let list: &[Role] = match self.scope() {
            RoleScope::Organization => &ORGANIZATION_ROLE_PRECEDENCE,
            RoleScope::Store => &STORE_ROLE_PRECEDENCE,
            RoleScope::Platform | RoleScope::Customer => return 0,
        };
        list.iter().position(|r| *r == self).unwrap_or(list.len())
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check a role's static table against a requested permission.
pub fn role_grants(role: Role, permission: &str) -> bool {
    match Permission::parse(permission) {
        Ok(requested) => role
            .permissions()
            .iter()
            .any(|granted| grants(granted, requested.as_str())),
        Err(_) => false,
    }
}

// =============================================================================
// Requestable catalogue (custom roles)
// =============================================================================

/// A permission that a store may put into a custom role.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct CatalogEntry {
    pub permission: &'static str,
    pub description: &'static str,
}

const fn entry(permission: &'static str, description: &'static str) -> CatalogEntry {
    CatalogEntry {
        permission,
        description,
    }
}

/// Concrete permissions that custom roles may contain.
pub const PERMISSION_CATALOG: &[CatalogEntry] = &[
    entry("products:create", "Create products"),
    entry("products:read", "View products"),
    entry("products:update", "Edit products"),
    entry("products:delete", "Delete products"),
    entry("categories:create", "Create categories"),
    entry("categories:read", "View categories"),
    entry("categories:update", "Edit categories"),
    entry("categories:delete", "Delete categories"),
    entry("brands:create", "Create brands"),
    entry("brands:read", "View brands"),
    entry("brands:update", "Edit brands"),
    entry("brands:delete", "Delete brands"),
    entry("inventory:read", "View stock levels"),
    entry("inventory:update", "Adjust stock levels"),
    entry("orders:read", "View orders"),
    entry("orders:update", "Update order status"),
    entry("orders:cancel", "Cancel orders"),
    entry("orders:refund", "Refund orders"),
    entry("customers:read", "View customers"),
    entry("customers:update", "Edit customer records"),
    entry("reviews:read", "View reviews"),
    entry("reviews:moderate", "Approve or hide reviews"),
    entry("analytics:read", "View analytics dashboards"),
    entry("reports:read", "View reports"),
    entry("reports:export", "Export reports"),
    entry("marketing:read", "View campaigns"),
    entry("marketing:manage", "Run campaigns"),
    entry("coupons:create", "Create coupons"),
    entry("coupons:read", "View coupons"),
    entry("coupons:update", "Edit coupons"),
    entry("coupons:delete", "Delete coupons"),
    entry("content:read", "View store pages"),
    entry("content:update", "Edit store pages"),
    entry("deliveries:read", "View deliveries"),
    entry("deliveries:update", "Update delivery status"),
    entry("support:read", "View support tickets"),
    entry("support:respond", "Answer support tickets"),
    entry("settings:read", "View store settings"),
];

/// Resources whose `resource:*` wildcard may never be delegated.
const NON_DELEGABLE_WILDCARDS: &[&str] = &["settings"];

/// Whether `permission` may appear in a custom role.
pub fn is_requestable(permission: &Permission) -> bool {
    if permission.is_global_wildcard() {
        return false;
    }
    if PERMISSION_CATALOG
        .iter()
        .any(|e| e.permission == permission.as_str())
    {
        return true;
    }
    permission.action() == "*"
        && !NON_DELEGABLE_WILDCARDS.contains(&permission.resource())
        && PERMISSION_CATALOG
            .iter()
            .any(|e| e.permission.split(':').next() == Some(permission.resource()))
}

/// Reason a custom-role permission list was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("at least one permission is required")]
    Empty,

    #[error(transparent)]
    Invalid(#[from] PermissionError),

    #[error("permission `{0}` cannot be granted to a custom role")]
    NotRequestable(String),
}

/// Parse, check and deduplicate a custom-role permission list.
///
/// Order of first occurrence is kept.
pub fn validate_requested_permissions<S: AsRef<str>>(
    raw: &[S],
) -> Result<Vec<Permission>, CatalogError> {
    let mut out: Vec<Permission> = Vec::with_capacity(raw.len());
    for item in raw {
        let permission = Permission::parse(item.as_ref())?;
        if !is_requestable(&permission) {
            return Err(CatalogError::NotRequestable(permission.to_string()));
        }
        if !out.contains(&permission) {
            out.push(permission);
        }
    }
    if out.is_empty() {
        return Err(CatalogError::Empty);
    }
    Ok(out)
}
