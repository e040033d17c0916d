// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and authenticated user representation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Claims read from a bearer token.
///
/// Only identity claims are used. Roles never come from the token; they are
/// resolved from memberships and staff rows for every request.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    /// Subject, the canonical user ID
    pub sub: String,

    #[serde(default)]
    pub iat: i64,

    #[serde(default)]
    pub exp: i64,

    #[serde(default)]
    pub iss: String,

    /// Validated by jsonwebtoken, not read directly
    #[serde(default)]
    #[allow(dead_code)]
    pub aud: Option<serde_json::Value>,

    /// Session ID
    #[serde(default)]
    pub sid: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub name: Option<String>,
}

/// Authenticated user information extracted from a JWT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    /// Canonical user ID (`sub` claim)
    pub user_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Token issuer
    #[serde(skip)]
    pub issuer: String,

    /// Token expiration (Unix timestamp)
    #[serde(skip)]
    pub expires_at: i64,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: TokenClaims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email.filter(|e| !e.trim().is_empty()),
            name: claims.name.filter(|n| !n.trim().is_empty()),
            session_id: claims.sid,
            issuer: claims.iss,
            expires_at: claims.exp,
        }
    }

    /// Whether the token has expired at `now` (Unix seconds), allowing `leeway`.
    pub fn is_expired_at(&self, now: i64, leeway: i64) -> bool {
        self.expires_at > 0 && self.expires_at < now - leeway
    }
}
