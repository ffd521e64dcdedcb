/// C1 Idempotency Store.
///
/// Three tiers, cheapest first: a process-local set, a Redis fast-cache
/// existence check, then the durable `processed_events` table via
/// `idempotent-consumer`. A hit at any tier short-circuits the rest; a miss
/// falls through and back-fills every cheaper tier it missed.
use idempotent_consumer::IdempotencyGuard;
use nova_cache::{CacheKey, CacheOperations, NovaCache};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::{AppError, Result};

/// Bounded process-local membership set. On overflow the oldest half of
/// entries is evicted to make room, per the `LocalSeen` spec.
struct LocalSeen {
    order: VecDeque<String>,
    capacity: usize,
}

impl LocalSeen {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn contains(&self, key: &str) -> bool {
        self.order.iter().any(|k| k == key)
    }

    fn insert(&mut self, key: String) {
        if self.order.iter().any(|k| k == &key) {
            return;
        }
        if self.order.len() >= self.capacity {
            let evict = self.order.len() / 2;
            for _ in 0..evict {
                self.order.pop_front();
            }
        }
        self.order.push_back(key);
    }
}

pub struct IdempotencyStore {
    local: Mutex<LocalSeen>,
    cache: NovaCache,
    guard: IdempotencyGuard,
    fast_cache_ttl_secs: u64,
}

impl IdempotencyStore {
    /// `fast_cache_ttl_secs` mirrors the durable store's own TTL (7 days,
    /// per the idempotency record's `expiresAt`) so a replayed event still
    /// hits the cache tier for as long as the durable record would still
    /// have been found anyway.
    pub fn new(cache: NovaCache, guard: IdempotencyGuard) -> Self {
        Self {
            local: Mutex::new(LocalSeen::new(10_000)),
            cache,
            guard,
            fast_cache_ttl_secs: 7 * 24 * 3600,
        }
    }

    /// Returns `true` if `key` has already been seen by any tier. A miss is
    /// NOT recorded here — call `mark_seen` only after the guarded work
    /// actually commits, so a crash mid-processing does not wrongly suppress
    /// a retry.
    ///
    /// Ordered lookup: local set -> fast-cache exists-check -> durable store.
    /// Fails open (returns `Ok(false)`) only once the durable store is also
    /// unreachable; both cache and store failures are logged rather than
    /// propagated, so a transient Redis or Postgres hiccup never nacks an
    /// event that would otherwise be a clean dedup hit.
    pub async fn is_seen(&self, key: &str) -> Result<bool> {
        if self.local.lock().unwrap().contains(key) {
            return Ok(true);
        }

        let cache_key = CacheKey::idempotency(key);
        let cache_hit = match self.cache.exists(&cache_key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(error = %e, key, "idempotency cache check failed, falling through to durable store");
                false
            }
        };
        if cache_hit {
            self.local.lock().unwrap().insert(key.to_string());
            return Ok(true);
        }

        match self.guard.is_processed(key).await {
            Ok(true) => {
                self.backfill(key).await;
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) => {
                tracing::error!(error = %e, key, "idempotency durable store unreachable, failing open");
                Ok(false)
            }
        }
    }

    /// Mark `key` as processed across all three tiers.
    pub async fn mark_seen(&self, key: &str) -> Result<()> {
        self.guard
            .mark_processed(key, None)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        self.backfill(key).await;
        Ok(())
    }

    async fn backfill(&self, key: &str) {
        self.local.lock().unwrap().insert(key.to_string());
        let cache_key = CacheKey::idempotency(key);
        let _ = self.cache.set(&cache_key, &true, self.fast_cache_ttl_secs).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_seen_evicts_oldest_half_on_overflow() {
        let mut seen = LocalSeen::new(4);
        seen.insert("a".into());
        seen.insert("b".into());
        seen.insert("c".into());
        seen.insert("d".into());
        assert!(seen.contains("a"));
        seen.insert("e".into());
        assert!(!seen.contains("a"));
        assert!(!seen.contains("b"));
        assert!(seen.contains("c"));
        assert!(seen.contains("d"));
        assert!(seen.contains("e"));
    }

    #[test]
    fn local_seen_dedupes_inserts() {
        let mut seen = LocalSeen::new(4);
        seen.insert("a".into());
        seen.insert("a".into());
        assert_eq!(seen.order.len(), 1);
    }
}
