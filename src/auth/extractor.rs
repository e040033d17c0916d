// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated users.
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//!
//! async fn admin_handler(SuperAdminOnly(ctx): SuperAdminOnly) -> impl IntoResponse {
//!     // ctx is the platform-scoped UserContext of a super-admin
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, decode_header, Validation};
use tracing::warn;

use super::claims::TokenClaims;
use super::{AuthError, AuthenticatedUser, JwksManager};
use crate::rbac::{AccessScope, UserContext};
use crate::state::{AppState, AuthConfig};
use crate::storage::{AuditEvent, AuditEventType, AuditRepository};

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Extractor for authenticated users.
///
/// ## Verification modes
///
/// - **JWKS configured**: signature, expiry, issuer and audience are verified.
/// - **No JWKS** (`dev` feature or tests only): the token is decoded without
///   a signature check; expiry and issuer are still enforced.
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidAuthHeader)?;

        let user = verify_jwt(token, &state.auth_config).await?;
        parts.extensions.insert(user.clone());
        Ok(Auth(user))
    }
}

async fn verify_jwt(token: &str, auth_config: &AuthConfig) -> Result<AuthenticatedUser, AuthError> {
    match &auth_config.jwks {
        Some(jwks) => verify_with_jwks(token, jwks, auth_config).await,
        None => verify_unsigned(token, auth_config),
    }
}

async fn verify_with_jwks(
    token: &str,
    jwks: &JwksManager,
    auth_config: &AuthConfig,
) -> Result<AuthenticatedUser, AuthError> {
    let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;

    let (decoding_key, algorithm) = match &header.kid {
        Some(kid) => jwks.get_decoding_key(kid).await?,
        None => jwks.get_any_decoding_key().await?,
    };

    let mut validation = Validation::new(algorithm);
    validation.leeway = CLOCK_SKEW_LEEWAY;
    if let Some(issuer) = &auth_config.issuer {
        validation.set_issuer(&[issuer]);
    }
    match &auth_config.audience {
        Some(audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }

    let token_data = decode::<TokenClaims>(token, &decoding_key, &validation)?;
    Ok(AuthenticatedUser::from_claims(token_data.claims))
}

#[cfg(any(test, feature = "dev"))]
fn verify_unsigned(token: &str, auth_config: &AuthConfig) -> Result<AuthenticatedUser, AuthError> {
    let token_data = jsonwebtoken::dangerous::insecure_decode::<TokenClaims>(token)
        .map_err(|_| AuthError::MalformedToken)?;
    let user = AuthenticatedUser::from_claims(token_data.claims);

    if user.is_expired_at(chrono::Utc::now().timestamp(), CLOCK_SKEW_LEEWAY as i64) {
        return Err(AuthError::TokenExpired);
    }
    if let Some(issuer) = &auth_config.issuer {
        if &user.issuer != issuer {
            return Err(AuthError::InvalidIssuer);
        }
    }
    Ok(user)
}

#[cfg(not(any(test, feature = "dev")))]
fn verify_unsigned(_token: &str, _auth_config: &AuthConfig) -> Result<AuthenticatedUser, AuthError> {
    Err(AuthError::NotConfigured)
}

/// Extractor that requires the super-admin flag.
///
/// Yields the caller's platform-scoped context. Refusals are audited.
pub struct SuperAdminOnly(pub UserContext);

impl FromRequestParts<AppState> for SuperAdminOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Auth(user) = Auth::from_request_parts(parts, state).await?;

        let context = state
            .resolve_context(&user.user_id, &AccessScope::Platform)
            .map_err(|e| AuthError::InternalError(e.to_string()))?;

        if !context.is_super_admin {
            warn!(user_id = %user.user_id, path = %parts.uri.path(), "Super-admin access denied");
            AuditRepository::new(&state.files).record(
                AuditEvent::new(AuditEventType::PermissionDenied)
                    .with_user(&user.user_id)
                    .with_resource("endpoint", parts.uri.path())
                    .failed("super-admin access required"),
            );
            return Err(AuthError::SuperAdminRequired);
        }

        Ok(SuperAdminOnly(context))
    }
}

/// Unsigned JWT for tests.
#[cfg(test)]
pub(crate) fn test_jwt(user_id: &str) -> String {
    test_jwt_with(user_id, 9999999999, "test")
}

#[cfg(test)]
pub(crate) fn test_jwt_with(user_id: &str, exp: i64, issuer: &str) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    let header = r#"{"alg":"RS256","typ":"JWT"}"#;
    let claims = format!(
        r#"{{"sub":"{user_id}","iat":1609459200,"exp":{exp},"iss":"{issuer}","sid":"sess_123","email":"{user_id}@example.com"}}"#
    );
    format!(
        "{}.{}.fake_signature",
        URL_SAFE_NO_PAD.encode(header.as_bytes()),
        URL_SAFE_NO_PAD.encode(claims.as_bytes())
    )
}
