// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Storefront Access - Role & Permission Service
//!
//! Resolves what a user may do inside a multi-tenant storefront platform and
//! runs the custom role request/approval workflow.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Bearer JWT authentication (JWKS)
//! - `rbac` - Role table, permission matching, context resolution, workflow
//! - `storage` - Platform database (redb) and the audit log

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod rbac;
pub mod state;
pub mod storage;
