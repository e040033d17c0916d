// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::JwksManager;
use crate::rbac::{AccessScope, ContextCache, ContextResolver, RoleWorkflow, UserContext};
use crate::storage::{DbResult, FileStorage, PlatformDb, DEFAULT_CUSTOM_ROLE_LIMIT};

/// Default number of cached user contexts.
pub const DEFAULT_CONTEXT_CACHE_CAPACITY: usize = 1024;

/// Default lifetime of a cached user context.
pub const DEFAULT_CONTEXT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Token verification settings.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// JWKS source; `None` means unverified tokens (dev builds and tests only)
    pub jwks: Option<JwksManager>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<PlatformDb>,
    pub files: Arc<FileStorage>,
    pub contexts: Arc<ContextCache>,
    pub auth_config: AuthConfig,
    /// Limit given to newly created stores
    pub default_custom_role_limit: u32,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(db: PlatformDb, files: FileStorage) -> Self {
        Self {
            db: Arc::new(db),
            files: Arc::new(files),
            contexts: Arc::new(ContextCache::new(
                DEFAULT_CONTEXT_CACHE_CAPACITY,
                DEFAULT_CONTEXT_CACHE_TTL,
            )),
            auth_config: AuthConfig::default(),
            default_custom_role_limit: DEFAULT_CUSTOM_ROLE_LIMIT,
            started_at: Instant::now(),
        }
    }

    pub fn with_auth_config(mut self, auth_config: AuthConfig) -> Self {
        self.auth_config = auth_config;
        self
    }

    pub fn with_context_cache(mut self, capacity: usize, ttl: Duration) -> Self {
        self.contexts = Arc::new(ContextCache::new(capacity, ttl));
        self
    }

    pub fn with_default_custom_role_limit(mut self, limit: u32) -> Self {
        self.default_custom_role_limit = limit;
        self
    }

    /// Resolve a user's context through the shared cache.
    pub fn resolve_context(&self, user_id: &str, scope: &AccessScope) -> DbResult<UserContext> {
        ContextResolver::new(&self.db)
            .with_cache(&self.contexts)
            .resolve(user_id, scope)
    }

    pub fn workflow(&self) -> RoleWorkflow<'_> {
        RoleWorkflow::new(&self.db, &self.files, &self.contexts)
    }
}

/// Fresh state over a temporary data directory, no JWKS configured.
#[cfg(test)]
pub fn test_state() -> (AppState, tempfile::TempDir) {
    use crate::storage::StoragePaths;

    let temp = tempfile::TempDir::new().expect("temp dir");
    let paths = StoragePaths::new(temp.path());
    let db = PlatformDb::open(&paths.database_file()).expect("open db");
    let mut files = FileStorage::new(paths);
    files.initialize().expect("init storage");
    (AppState::new(db, files), temp)
}
