// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Permission strings and wildcard matching.
//!
//! A permission is either the global wildcard `*` or `resource:action`,
//! where the action may itself be `*` (every action on the resource) or a
//! chain of segments such as `orders:read:own`.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Global wildcard: grants every permission.
pub const GLOBAL_WILDCARD: &str = "*";

/// Errors produced while parsing a permission string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
    #[error("permission string is empty")]
    Empty,

    #[error("permission `{0}` has no action (expected `resource:action`)")]
    MissingAction(String),

    #[error("permission `{0}` contains an invalid segment")]
    InvalidSegment(String),

    #[error("permission `{0}` uses a wildcard outside the action position")]
    MisplacedWildcard(String),
}

/// A validated permission string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "products:update")]
pub struct Permission(String);

impl Permission {
    /// Parse and validate a permission string.
    pub fn parse(raw: &str) -> Result<Self, PermissionError> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(PermissionError::Empty);
        }
        if value == GLOBAL_WILDCARD {
            return Ok(Self(value.to_string()));
        }

        let (resource, action) = value
            .split_once(':')
            .ok_or_else(|| PermissionError::MissingAction(value.to_string()))?;

        if resource == GLOBAL_WILDCARD {
            return Err(PermissionError::MisplacedWildcard(value.to_string()));
        }
        if !is_resource(resource) {
            return Err(PermissionError::InvalidSegment(value.to_string()));
        }
        if action.is_empty() {
            return Err(PermissionError::MissingAction(value.to_string()));
        }
        if action != GLOBAL_WILDCARD {
            for segment in action.split(':') {
                if segment == GLOBAL_WILDCARD {
                    return Err(PermissionError::MisplacedWildcard(value.to_string()));
                }
                if !is_segment(segment) {
                    return Err(PermissionError::InvalidSegment(value.to_string()));
                }
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resource part, or `*` for the global wildcard.
    pub fn resource(&self) -> &str {
        resource_of(&self.0)
    }

    /// Action part (may contain further `:` segments), empty for `*`.
    pub fn action(&self) -> &str {
        self.0.split_once(':').map(|(_, action)| action).unwrap_or("")
    }

    pub fn is_global_wildcard(&self) -> bool {
        self.0 == GLOBAL_WILDCARD
    }

    /// True for `*` and `resource:*`.
    pub fn is_wildcard(&self) -> bool {
        self.is_global_wildcard() || self.action() == GLOBAL_WILDCARD
    }

    /// Whether holding `self` grants `requested`.
    pub fn grants(&self, requested: &Permission) -> bool {
        grants(self.as_str(), requested.as_str())
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Permission {
    type Error = PermissionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Permission::parse(&value)
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.0
    }
}

fn is_resource(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn is_segment(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn resource_of(permission: &str) -> &str {
    permission
        .split_once(':')
        .map(|(resource, _)| resource)
        .unwrap_or(permission)
}

/// Check a single granted permission string against a requested one.
///
/// Matches the global wildcard, an exact string, or a resource wildcard
/// whose resource equals the requested permission's resource.
pub fn grants(granted: &str, requested: &str) -> bool {
    if granted == GLOBAL_WILDCARD || granted == requested {
        return true;
    }
    match granted.strip_suffix(":*") {
        Some(resource) => requested != GLOBAL_WILDCARD && resource_of(requested) == resource,
        None => false,
    }
}

/// An owned list of granted permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Vec<String>)]
pub struct PermissionSet(Vec<String>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from static role-table entries.
    pub fn from_static(grants: &[&str]) -> Self {
        let mut set = Self::new();
        set.extend(grants.iter().copied());
        set
    }

    /// Add grants, skipping duplicates.
    pub fn extend<I, S>(&mut self, grants: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for grant in grants {
            let grant = grant.as_ref();
            if !self.0.iter().any(|g| g == grant) {
                self.0.push(grant.to_string());
            }
        }
    }

    /// Whether any grant covers `requested`.
    ///
    /// Requests that are not valid permission strings are never allowed.
    pub fn allows(&self, requested: &str) -> bool {
        let Ok(requested) = Permission::parse(requested) else {
            return false;
        };
        self.0.iter().any(|g| grants(g, requested.as_str()))
    }

    pub fn allows_any(&self, requested: &[&str]) -> bool {
        requested.iter().any(|p| self.allows(p))
    }

    pub fn allows_all(&self, requested: &[&str]) -> bool {
        requested.iter().all(|p| self.allows(p))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
