// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache for resolved user contexts.
//!
//! Keyed by `(user_id, scope)`. Entries expire after a TTL; writes that change
//! memberships, staff rows, custom roles or super-admin flags invalidate the
//! affected users (or the whole cache for store-wide changes).
//!
//! Every invalidation bumps a generation counter. A resolver reads the
//! generation before loading rows and hands it back to [`ContextCache::put`],
//! which discards the context if an invalidation happened in between.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::context::{AccessScope, UserContext};

type Key = (String, AccessScope);

struct CacheEntry {
    context: UserContext,
    inserted_at: Instant,
}

/// In-process LRU cache of user contexts.
pub struct ContextCache {
    cache: Mutex<LruCache<Key, CacheEntry>>,
    generation: AtomicU64,
    ttl: Duration,
}

impl ContextCache {
    /// Create a cache holding at most `capacity` contexts (minimum 1).
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            generation: AtomicU64::new(0),
            ttl,
        }
    }

    /// Current invalidation generation. Read before resolving from storage.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Cached context, or `None` if absent or expired.
    pub fn get(&self, user_id: &str, scope: &AccessScope) -> Option<UserContext> {
        let key = (user_id.to_string(), scope.clone());
        let mut cache = self.cache.lock().ok()?;
        if let Some(entry) = cache.get(&key) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.context.clone());
            }
            cache.pop(&key);
        }
        None
    }

    /// Store a context resolved at generation `seen`.
    ///
    /// Returns `false` and drops the context if the cache was invalidated
    /// since `seen`.
    pub fn put(&self, context: UserContext, seen: u64) -> bool {
        let key = (context.user_id.clone(), context.scope.clone());
        let Ok(mut cache) = self.cache.lock() else {
            return false;
        };
        // Invalidations bump under the same lock
        if self.generation.load(Ordering::SeqCst) != seen {
            debug!(user_id = %key.0, "Dropping context resolved before an invalidation");
            return false;
        }
        cache.put(
                key,
                CacheEntry {
                    context,
                    inserted_at: Instant::now(),
                },
            );
        true
    }

    /// Drop every cached scope of one user.
    pub fn invalidate_user(&self, user_id: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            self.generation.fetch_add(1, Ordering::SeqCst);
            let keys: Vec<Key> = cache
                .iter()
                .filter(|((user, _), _)| user == user_id)
                .map(|(key, _)| key.clone())
                .collect();
            for key in keys {
                cache.pop(&key);
            }
        }
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let Ok(mut cache) = self.cache.lock() else {
            return 0;
        };
        let expired: Vec<Key> = cache
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() >= self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            cache.pop(key);
        }
        expired.len()
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            self.generation.fetch_add(1, Ordering::SeqCst);
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Purge expired contexts every `interval` until `shutdown` fires.
///
/// ```rust,ignore
/// tokio::spawn(run_sweeper(state.contexts.clone(), ttl, shutdown.clone()));
/// ```
pub async fn run_sweeper(cache: Arc<ContextCache>, interval: Duration, shutdown: CancellationToken) {
    info!(interval_secs = interval.as_secs(), "Context cache sweeper starting");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!(purged, remaining = cache.len(), "Purged expired contexts");
                }
            },
            _ = shutdown.cancelled() => {
                info!("Context cache sweeper shutting down");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::{PermissionSet, Role};

    fn context(user_id: &str, scope: AccessScope) -> UserContext {
        UserContext {
            user_id: user_id.to_string(),
            scope,
            is_super_admin: false,
            organization_id: None,
            organization_role: None,
            store_id: None,
            store_role: None,
            staff_id: None,
            custom_role: None,
            effective_role: Role::Customer,
            permissions: PermissionSet::from_static(Role::Customer.permissions()),
        }
    }

    impl ContextCache {
        fn put_now(&self, context: UserContext) -> bool {
            self.put(context, self.generation())
        }
    }

    #[test]
    fn put_and_get() {
        let cache = ContextCache::new(10, Duration::from_secs(300));
        assert!(cache.get("u1", &AccessScope::Platform).is_none());

        cache.put_now(context("u1", AccessScope::Platform));
        let hit = cache.get("u1", &AccessScope::Platform).unwrap();
        assert_eq!(hit.user_id, "u1");
        assert!(cache.get("u1", &AccessScope::Store("s1".into())).is_none());
    }

    #[test]
    fn invalidate_user_drops_all_scopes() {
        let cache = ContextCache::new(10, Duration::from_secs(300));
        cache.put_now(context("u1", AccessScope::Platform));
        cache.put_now(context("u1", AccessScope::Store("s1".into())));
        cache.put_now(context("u2", AccessScope::Platform));

        cache.invalidate_user("u1");
        assert_eq!(cache.len(), 1);
        assert!(cache.get("u2", &AccessScope::Platform).is_some());

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn put_after_invalidation_is_dropped() {
        let cache = ContextCache::new(10, Duration::from_secs(300));
        let seen = cache.generation();

        cache.invalidate_user("u1");
        assert!(!cache.put(context("u1", AccessScope::Platform), seen));
        assert!(cache.get("u1", &AccessScope::Platform).is_none());

        let seen = cache.generation();
        cache.clear();
        assert!(!cache.put(context("u1", AccessScope::Platform), seen));
        assert!(cache.is_empty());

        assert!(cache.put_now(context("u1", AccessScope::Platform)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn purge_keeps_generation() {
        let cache = ContextCache::new(10, Duration::from_secs(300));
        let seen = cache.generation();
        cache.purge_expired();
        assert!(cache.put(context("u1", AccessScope::Platform), seen));
    }

    #[test]
    fn ttl_expiry() {
        let cache = ContextCache::new(10, Duration::from_millis(1));
        cache.put_now(context("u1", AccessScope::Platform));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("u1", &AccessScope::Platform).is_none());
    }

    #[test]
    fn purge_drops_only_expired() {
        let cache = ContextCache::new(10, Duration::from_millis(20));
        cache.put_now(context("u1", AccessScope::Platform));
        std::thread::sleep(Duration::from_millis(30));
        cache.put_now(context("u2", AccessScope::Platform));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn sweeper_stops_on_cancel() {
        let cache = Arc::new(ContextCache::new(10, Duration::from_secs(60)));
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_sweeper(cache, Duration::from_secs(3600), shutdown.clone()));
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    #[test]
    fn capacity_evicts_least_recent() {
        let cache = ContextCache::new(1, Duration::from_secs(300));
        cache.put_now(context("u1", AccessScope::Platform));
        cache.put_now(context("u2", AccessScope::Platform));
        assert!(cache.get("u1", &AccessScope::Platform).is_none());
        assert!(cache.get("u2", &AccessScope::Platform).is_some());
    }
}
