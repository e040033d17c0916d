// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custom role request rows.
//!
//! A request moves out of `PENDING` exactly once; `APPROVED`, `REJECTED` and
//! `CANCELLED` are terminal.

use chrono::{DateTime, Utc};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::database::{DbResult, PlatformDb, Record, ROLE_REQUESTS};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleRequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl RoleRequestStatus {
    pub fn is_terminal(self) -> bool {
        self != RoleRequestStatus::Pending
    }

    /// Only `PENDING` requests may move, and only to a terminal status.
    pub fn can_transition_to(self, next: RoleRequestStatus) -> bool {
        self == RoleRequestStatus::Pending && next.is_terminal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoleRequestStatus::Pending => "PENDING",
            RoleRequestStatus::Approved => "APPROVED",
            RoleRequestStatus::Rejected => "REJECTED",
            RoleRequestStatus::Cancelled => "CANCELLED",
        }
    }

    /// Case-insensitive parse (`pending`, `PENDING`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(RoleRequestStatus::Pending),
            "APPROVED" => Some(RoleRequestStatus::Approved),
            "REJECTED" => Some(RoleRequestStatus::Rejected),
            "CANCELLED" => Some(RoleRequestStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for RoleRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A store's request for a new custom role.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct CustomRoleRequest {
    pub id: String,
    pub store_id: String,
    /// User who submitted the request
    pub requested_by: String,
    pub role_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Validated, deduplicated permission strings as submitted
    pub requested_permissions: Vec<String>,
    /// Staff rows that receive the role on approval
    #[serde(default)]
    pub target_staff_ids: Vec<String>,
    pub status: RoleRequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Approval note or rejection reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_note: Option<String>,
    /// Permission set actually granted (may differ from the request)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_permissions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_role_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for CustomRoleRequest {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = ROLE_REQUESTS;
    const KIND: &'static str = "Role request";

    fn key(&self) -> &str {
        &self.id
    }
}

/// Repository for role requests.
pub struct RoleRequestRepository<'a> {
    db: &'a PlatformDb,
}

impl<'a> RoleRequestRepository<'a> {
    pub fn new(db: &'a PlatformDb) -> Self {
        Self { db }
    }

    pub fn get(&self, request_id: &str) -> DbResult<Option<CustomRoleRequest>> {
        self.db.get(request_id)
    }

    pub fn require(&self, request_id: &str) -> DbResult<CustomRoleRequest> {
        self.db.require(request_id)
    }

    /// All requests, optionally filtered by status, newest first.
    pub fn list(&self, status: Option<RoleRequestStatus>) -> DbResult<Vec<CustomRoleRequest>> {
        let mut requests = self
            .db
            .scan(|r: &CustomRoleRequest| status.is_none_or(|s| r.status == s))?;
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    /// Requests of one store, newest first.
    pub fn list_for_store(
        &self,
        store_id: &str,
        status: Option<RoleRequestStatus>,
    ) -> DbResult<Vec<CustomRoleRequest>> {
        let mut requests = self.db.scan(|r: &CustomRoleRequest| {
            r.store_id == store_id && status.is_none_or(|s| r.status == s)
        })?;
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    pub fn count_pending(&self, store_id: &str) -> DbResult<usize> {
        Ok(self
            .list_for_store(store_id, Some(RoleRequestStatus::Pending))?
            .len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(id: &str, store_id: &str, status: RoleRequestStatus) -> CustomRoleRequest {
        let now = Utc::now();
        CustomRoleRequest {
            id: id.to_string(),
            store_id: store_id.to_string(),
            requested_by: "owner".to_string(),
            role_name: format!("Role {id}"),
            description: None,
            requested_permissions: vec!["orders:read".to_string()],
            target_staff_ids: Vec::new(),
            status,
            reviewed_by: None,
            reviewed_at: None,
            review_note: None,
            approved_permissions: None,
            custom_role_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn status_transitions() {
        use RoleRequestStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Pending));
        for terminal in [Approved, Rejected, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Pending, Approved, Rejected, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn status_parse_and_serde() {
        assert_eq!(RoleRequestStatus::parse("pending"), Some(RoleRequestStatus::Pending));
        assert_eq!(RoleRequestStatus::parse("nope"), None);
        assert_eq!(
            serde_json::to_string(&RoleRequestStatus::Cancelled).unwrap(),
            r#""CANCELLED""#
        );
    }

    #[test]
    fn list_filters() {
        let temp = TempDir::new().unwrap();
        let db = PlatformDb::open(&temp.path().join("test.redb")).unwrap();
        db.put(&request("a", "s1", RoleRequestStatus::Pending)).unwrap();
        db.put(&request("b", "s1", RoleRequestStatus::Rejected)).unwrap();
        db.put(&request("c", "s2", RoleRequestStatus::Pending)).unwrap();

        let repo = RoleRequestRepository::new(&db);
        assert_eq!(repo.list(None).unwrap().len(), 3);
        assert_eq!(repo.list(Some(RoleRequestStatus::Pending)).unwrap().len(), 2);
        assert_eq!(repo.list_for_store("s1", None).unwrap().len(), 2);
        assert_eq!(repo.count_pending("s1").unwrap(), 1);
        assert!(repo.require("missing").is_err());
    }
}
