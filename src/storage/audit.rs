// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for security-sensitive operations.
//!
//! Role requests, custom role changes, tenancy changes and administrative
//! actions are appended to a daily JSONL file.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{FileStorage, StorageError, StorageResult};

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Role request workflow
    RoleRequestSubmitted,
    RoleRequestApproved,
    RoleRequestRejected,
    RoleRequestCancelled,

    // Custom roles
    CustomRoleAssigned,
    CustomRoleUnassigned,
    CustomRoleDeactivated,
    CustomRoleLimitChanged,

    // Tenancy
    OrganizationCreated,
    MembershipAdded,
    MembershipRemoved,
    StoreCreated,
    StoreActivated,
    StoreDeactivated,
    StaffAdded,
    StaffRemoved,

    // Platform
    SuperAdminGranted,
    SuperAdminRevoked,
    PermissionDenied,
    AdminAccess,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of event.
    pub event_type: AuditEventType,
    /// User who triggered the event (if known).
    pub user_id: Option<String>,
    /// Resource affected (store id, role request id, etc.).
    pub resource_id: Option<String>,
    /// Resource type (store, role_request, custom_role, etc.).
    pub resource_type: Option<String>,
    /// Additional details as JSON.
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error message if operation failed.
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            user_id: None,
            resource_id: None,
            resource_type: None,
            details: None,
            success: true,
            error: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Repository for audit events.
pub struct AuditRepository<'a> {
    storage: &'a FileStorage,
}

impl<'a> AuditRepository<'a> {
    pub fn new(storage: &'a FileStorage) -> Self {
        Self { storage }
    }

    /// Append an audit event to the daily JSONL file.
    pub fn log(&self, event: &AuditEvent) -> StorageResult<()> {
        let date = event.timestamp.format("%Y-%m-%d").to_string();
        let path = self.storage.paths().audit_events_file(&date);
        let line = serde_json::to_vec(event)?;
        self.storage.append_line(&path, &line)
    }

    /// Log an event, reporting failures through tracing instead of the caller.
    ///
    /// Audit writes happen after the audited change is committed, so a
    /// failure here must not turn a successful request into an error.
    pub fn record(&self, event: AuditEvent) {
        if let Err(e) = self.log(&event) {
            tracing::error!(
                event_type = ?event.event_type,
                event_id = %event.event_id,
                error = %e,
                "Failed to write audit event"
            );
        }
    }

    /// Read audit events for a specific date. A missing file is an empty day.
    pub fn read_events(&self, date: &str) -> StorageResult<Vec<AuditEvent>> {
        let path = self.storage.paths().audit_events_file(date);
        if !self.storage.exists(&path) {
            return Ok(Vec::new());
        }
        let content = self.storage.read_raw(&path)?;

        let mut events = Vec::new();
        for line in content.split(|b| *b == b'\n') {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<AuditEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!(date = %date, error = %e, "Skipping malformed audit line");
                }
            }
        }

        Ok(events)
    }

    /// Read events for an inclusive date range (`YYYY-MM-DD`).
    pub fn read_events_range(
        &self,
        start_date: &str,
        end_date: &str,
    ) -> StorageResult<Vec<AuditEvent>> {
        let start = parse_date(start_date)?;
        let end = parse_date(end_date)?;
        if start > end {
            return Err(StorageError::InvalidQuery(
                "start_date must not be after end_date".to_string(),
            ));
        }

        let mut all_events = Vec::new();
        let mut current = start;
        while current <= end {
            all_events.extend(self.read_events(&current.format("%Y-%m-%d").to_string())?);
            current = current
                .succ_opt()
                .ok_or_else(|| StorageError::InvalidQuery("Date overflow".to_string()))?;
        }

        Ok(all_events)
    }
}

fn parse_date(date: &str) -> StorageResult<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| StorageError::InvalidQuery(format!("Invalid date {date}: {e}")))
}

/// Helper macro for logging audit events.
#[macro_export]
macro_rules! audit_log {
    ($storage:expr, $event_type:expr, $user_id:expr) => {{
        $crate::storage::AuditRepository::new($storage)
            .record($crate::storage::AuditEvent::new($event_type).with_user($user_id));
    }};
    ($storage:expr, $event_type:expr, $user_id:expr, $resource_type:expr, $resource_id:expr) => {{
        $crate::storage::AuditRepository::new($storage).record(
            $crate::storage::AuditEvent::new($event_type)
                .with_user($user_id)
                .with_resource($resource_type, $resource_id),
        );
    }};
    ($storage:expr, $event_type:expr, $user_id:expr, $resource_type:expr, $resource_id:expr, $details:expr) => {{
        $crate::storage::AuditRepository::new($storage).record(
            $crate::storage::AuditEvent::new($event_type)
                .with_user($user_id)
                .with_resource($resource_type, $resource_id)
                .with_details($details),
        );
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoragePaths;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileStorage) {
        let temp = TempDir::new().unwrap();
        let mut storage = FileStorage::new(StoragePaths::new(temp.path()));
        storage.initialize().unwrap();
        (temp, storage)
    }

    #[test]
    fn create_audit_event() {
        let event = AuditEvent::new(AuditEventType::RoleRequestSubmitted)
            .with_user("user_123")
            .with_resource("role_request", "req_abc");

        assert_eq!(event.event_type, AuditEventType::RoleRequestSubmitted);
        assert_eq!(event.user_id, Some("user_123".to_string()));
        assert_eq!(event.resource_type, Some("role_request".to_string()));
        assert_eq!(event.resource_id, Some("req_abc".to_string()));
        assert!(event.success);
    }

    #[test]
    fn failed_event() {
        let event = AuditEvent::new(AuditEventType::PermissionDenied)
            .with_user("user_123")
            .failed("missing roles:request");

        assert!(!event.success);
        assert_eq!(event.error, Some("missing roles:request".to_string()));
    }

    #[test]
    fn log_and_read_events() {
        let (_temp, storage) = setup();
        let repo = AuditRepository::new(&storage);

        repo.log(
            &AuditEvent::new(AuditEventType::StoreCreated)
                .with_user("user_1")
                .with_resource("store", "s1"),
        )
        .unwrap();
        repo.log(
            &AuditEvent::new(AuditEventType::StaffAdded)
                .with_user("user_2")
                .with_resource("store_staff", "st1"),
        )
        .unwrap();

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let events = repo.read_events(&today).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AuditEventType::StoreCreated);
        assert_eq!(events[1].event_type, AuditEventType::StaffAdded);
    }

    #[test]
    fn missing_day_is_empty() {
        let (_temp, storage) = setup();
        let repo = AuditRepository::new(&storage);
        assert!(repo.read_events("2020-01-01").unwrap().is_empty());
    }

    #[test]
    fn range_rejects_bad_dates() {
        let (_temp, storage) = setup();
        let repo = AuditRepository::new(&storage);
        assert!(matches!(
            repo.read_events_range("2026-13-01", "2026-01-02"),
            Err(StorageError::InvalidQuery(_))
        ));
        assert!(matches!(
            repo.read_events_range("2026-01-05", "2026-01-02"),
            Err(StorageError::InvalidQuery(_))
        ));
    }

    #[test]
    fn macro_records_details() {
        let (_temp, storage) = setup();
        audit_log!(
            &storage,
            AuditEventType::CustomRoleLimitChanged,
            "admin_1",
            "store",
            "s1",
            serde_json::json!({ "old": 5, "new": 8 })
        );

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let events = AuditRepository::new(&storage).read_events(&today).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].details.as_ref().unwrap()["new"], 8);
    }
}
