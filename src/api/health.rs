// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;
use crate::storage::StoredUser;

/// Health check response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    /// Individual health checks and their results.
    pub checks: HealthChecks,
}

/// Individual health check results.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// Audit directory write probe.
    pub data_dir: String,
    /// Platform database read.
    pub database: String,
    /// JWKS (authentication keys) status.
    /// Only present when a JWKS URL is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks: Option<String>,
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

fn status_label(ok: bool, failed: &str) -> String {
    if ok { "ok" } else { failed }.to_string()
}

async fn check_jwks(state: &AppState) -> Option<String> {
    let jwks = state.auth_config.jwks.as_ref()?;
    if jwks.is_cached().await {
        return Some("ok".to_string());
    }
    Some(status_label(jwks.refresh().await.is_ok(), "unavailable"))
}

/// Health check endpoint handler.
///
/// Returns 200 if all checks pass, 503 if any check fails.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = ReadyResponse),
        (status = 503, description = "Service is unhealthy", body = ReadyResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let data_ok = state.files.health_check().is_ok();
    let db_ok = state.db.get::<StoredUser>("__health__").is_ok();
    let jwks = check_jwks(&state).await;
    let jwks_ok = jwks.as_deref().is_none_or(|s| s == "ok");
    let all_ok = data_ok && db_ok && jwks_ok;

    let response = ReadyResponse {
        status: status_label(all_ok, "degraded"),
        checks: HealthChecks {
            service: "ok".to_string(),
            data_dir: status_label(data_ok, "unavailable"),
            database: status_label(db_ok, "unavailable"),
            jwks,
        },
    };

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe handler.
///
/// Returns 200 only if all dependencies are available.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service is not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(state: State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    health(state).await
}
