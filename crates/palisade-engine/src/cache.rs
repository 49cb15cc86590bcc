//! Result cache keyed by operation, portfolio fingerprint, parameters,
//! and data version.
//!
//! Entries are immutable; recomputation writes new entries under new
//! keys (the bumped data version) rather than mutating in place.
//! Mutations of a user's portfolio or baskets invalidate that user's
//! keys.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Full cache key for one analytical result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultKey {
    /// Operation name (e.g., "risk_analysis").
    pub operation: String,
    /// Owning user.
    pub user_id: String,
    /// Hash of the canonical portfolio.
    pub portfolio_fingerprint: String,
    /// Hash of the request parameters.
    pub params_hash: u64,
    /// Data version at computation time.
    pub data_version: u64,
}

/// Hashes any serializable parameter bag into a key component.
#[must_use]
pub fn params_hash<T: Serialize>(params: &T) -> u64 {
    let encoded = serde_json::to_string(params).unwrap_or_default();
    let mut hasher = DefaultHasher::new();
    encoded.hash(&mut hasher);
    hasher.finish()
}

struct CacheEntry {
    value: Arc<serde_json::Value>,
    inserted_at: Instant,
}

/// Hit/miss statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultCacheStats {
    /// Cache hits.
    pub hits: u64,
    /// Cache misses.
    pub misses: u64,
    /// Entries dropped by invalidation.
    pub invalidations: u64,
    /// Live entry count.
    pub entries: usize,
}

impl ResultCacheStats {
    /// Hit rate in [0, 1].
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Process-wide result cache with TTL and per-user invalidation.
pub struct ResultCache {
    entries: DashMap<ResultKey, CacheEntry>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl ResultCache {
    /// Creates a cache with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Fetches a live entry, counting hit/miss.
    #[must_use]
    pub fn get(&self, key: &ResultKey) -> Option<Arc<serde_json::Value>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.inserted_at.elapsed() <= self.ttl {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
        }
        // Expired entries are dropped lazily.
        self.entries
            .remove_if(key, |_, e| e.inserted_at.elapsed() > self.ttl);
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Inserts a freshly computed result.
    pub fn put(&self, key: ResultKey, value: serde_json::Value) -> Arc<serde_json::Value> {
        let value = Arc::new(value);
        self.entries.insert(
            key,
            CacheEntry {
                value: value.clone(),
                inserted_at: Instant::now(),
            },
        );
        value
    }

    /// Drops every key belonging to a user.
    pub fn invalidate_user(&self, user_id: &str) {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.user_id != user_id);
        let dropped = before - self.entries.len();
        if dropped > 0 {
            debug!(user_id, dropped, "invalidated user cache entries");
            self.invalidations
                .fetch_add(dropped as u64, Ordering::Relaxed);
        }
    }

    /// Statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> ResultCacheStats {
        ResultCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}
