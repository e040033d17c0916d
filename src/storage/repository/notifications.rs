// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-app notification rows.

use chrono::{DateTime, Utc};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::database::{DbError, DbResult, PlatformDb, Record, NOTIFICATIONS};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    RoleRequestSubmitted,
    RoleRequestApproved,
    RoleRequestRejected,
    CustomRoleAssigned,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Notification {
    pub id: String,
    /// Recipient
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// Relative API path of the subject
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            kind,
            title: title.into(),
            message: message.into(),
            link: None,
            read: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

impl Record for Notification {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = NOTIFICATIONS;
    const KIND: &'static str = "Notification";

    fn key(&self) -> &str {
        &self.id
    }
}

/// Repository for notifications.
pub struct NotificationRepository<'a> {
    db: &'a PlatformDb,
}

impl<'a> NotificationRepository<'a> {
    pub fn new(db: &'a PlatformDb) -> Self {
        Self { db }
    }

    /// A user's notifications, newest first.
    pub fn list_for_user(&self, user_id: &str, unread_only: bool) -> DbResult<Vec<Notification>> {
        let mut items = self
            .db
            .scan(|n: &Notification| n.user_id == user_id && (!unread_only || !n.read))?;
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    /// Mark one notification read. Other users' notifications are reported
    /// as missing.
    pub fn mark_read(&self, notification_id: &str, user_id: &str) -> DbResult<Notification> {
        self.db.write(|tx| {
            let mut notification = tx
                .get::<Notification>(notification_id)?
                .filter(|n| n.user_id == user_id)
                .ok_or_else(|| DbError::NotFound(format!("Notification {notification_id}")))?;
            if !notification.read {
                notification.read = true;
                tx.put(&notification)?;
            }
            Ok(notification)
        })
    }

    /// Mark every unread notification of a user read. Returns how many changed.
    pub fn mark_all_read(&self, user_id: &str) -> DbResult<usize> {
        self.db.write(|tx| {
            let unread = tx.scan(|n: &Notification| n.user_id == user_id && !n.read)?;
            for mut notification in unread.iter().cloned() {
                notification.read = true;
                tx.put(&notification)?;
            }
            Ok(unread.len())
        })
    }
}
