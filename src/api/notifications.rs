// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The caller's in-app notifications.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::Auth;
use crate::error::ApiError;
use crate::state::AppState;
use crate::storage::{Notification, NotificationRepository};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationListResponse {
    pub notifications: Vec<Notification>,
    pub unread: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkAllReadResponse {
    pub updated: usize,
}

/// List notifications, newest first.
#[utoipa::path(
    get,
    path = "/v1/notifications",
    tag = "Notifications",
    params(NotificationQuery),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Notifications", body = NotificationListResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_notifications(
    Auth(user): Auth,
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<NotificationListResponse>, ApiError> {
    let notifications =
        NotificationRepository::new(&state.db).list_for_user(&user.user_id, query.unread_only)?;
    let unread = notifications.iter().filter(|n| !n.read).count();
    Ok(Json(NotificationListResponse {
        notifications,
        unread,
    }))
}

/// Mark one notification read.
#[utoipa::path(
    post,
    path = "/v1/notifications/{notification_id}/read",
    tag = "Notifications",
    params(("notification_id" = String, Path, description = "Notification ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Notification", body = Notification),
        (status = 404, description = "Notification not found")
    )
)]
pub async fn mark_read(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
) -> Result<Json<Notification>, ApiError> {
    Ok(Json(
        NotificationRepository::new(&state.db).mark_read(&notification_id, &user.user_id)?,
    ))
}

/// Mark every notification read.
#[utoipa::path(
    post,
    path = "/v1/notifications/read-all",
    tag = "Notifications",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Number of notifications updated", body = MarkAllReadResponse)
    )
)]
pub async fn mark_all_read(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<MarkAllReadResponse>, ApiError> {
    let updated = NotificationRepository::new(&state.db).mark_all_read(&user.user_id)?;
    Ok(Json(MarkAllReadResponse { updated }))
}
