// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer JWT authentication. Identity comes from the token; roles and
//! permissions do not. They are resolved per request from the platform
//! database (see [`crate::rbac`]).
//!
//! ## Auth Flow
//!
//! 1. The frontend authenticates the user with the identity provider
//! 2. Requests carry `Authorization: Bearer <JWT>`
//! 3. The server:
//!    - Fetches the provider JWKS via HTTPS (cached with a TTL)
//!    - Verifies signature, expiry, issuer, audience
//!    - Maps `sub` to the canonical `user_id`
//!
//! ## Security
//!
//! - All `/v1` endpoints require authentication
//! - Clock skew tolerance is 60 seconds
//! - Unsigned tokens are accepted only in `dev` builds and tests, and only
//!   when no JWKS URL is configured

pub mod claims;
pub mod error;
pub mod extractor;
pub mod jwks;

pub use claims::AuthenticatedUser;
pub use error::AuthError;
pub use extractor::{Auth, SuperAdminOnly};
pub use jwks::JwksManager;
