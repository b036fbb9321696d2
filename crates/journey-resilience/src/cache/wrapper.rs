//! Cache-aside memoization over the shared store.

use std::future::Future;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::key::{CacheParams, derive_key};
use crate::connection::StoreConnection;

/// Largest serialized value written by default (1 MiB)
pub const DEFAULT_MAX_VALUE_SIZE: usize = 1024 * 1024;

/// Per-call cache settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub key_prefix: String,
    pub max_value_size: usize,
}

impl CacheConfig {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl_secs,
            key_prefix: String::new(),
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
        }
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_max_value_size(mut self, bytes: usize) -> Self {
        self.max_value_size = bytes;
        self
    }
}

/// Result of a wrapped computation
#[derive(Debug, Clone, PartialEq)]
pub struct CacheOutcome<T> {
    /// Whether the value came from the store
    pub hit: bool,
    pub value: T,
    /// Store key the value lives (or would live) under
    pub key: String,
    /// Time from entry to return
    pub duration: Duration,
}

/// Memoizes computations behind derived store keys.
///
/// Concurrent misses on one key each run their own computation; there is no
/// in-flight coordination.
#[derive(Debug, Clone)]
pub struct CacheWrapper {
    conn: StoreConnection,
}

impl CacheWrapper {
    pub fn new(conn: StoreConnection) -> Self {
        Self { conn }
    }

    /// Return the cached value for `logical_key` + `params`, or compute it.
    ///
    /// Store failures never surface: an unavailable store means `compute`
    /// runs and nothing is written. Errors from `compute` are returned as-is.
    pub async fn wrap<T, E, F, Fut>(
        &self,
        logical_key: &str,
        config: &CacheConfig,
        params: &CacheParams,
        compute: F,
    ) -> Result<CacheOutcome<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let key = derive_key(logical_key, &config.key_prefix, params);

        let read_key = key.clone();
        let cached = self
            .conn
            .guarded("cache_get", |store| async move { store.get(&read_key).await })
            .await;

        let store_usable = match cached {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    tracing::debug!(key = %key, "Cache hit");
                    return Ok(CacheOutcome {
                        hit: true,
                        value,
                        key,
                        duration: started.elapsed(),
                    });
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Unreadable cache entry, treating as miss");
                    true
                }
            },
            Ok(None) => {
                tracing::debug!(key = %key, "Cache miss");
                true
            }
            Err(reason) => {
                tracing::debug!(key = %key, %reason, "Cache bypassed");
                false
            }
        };

        let value = compute().await?;

        if store_usable {
            self.store_value(&key, config, &value).await;
        }

        Ok(CacheOutcome {
            hit: false,
            value,
            key,
            duration: started.elapsed(),
        })
    }

    async fn store_value<T: Serialize>(&self, key: &str, config: &CacheConfig, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to serialize value for cache");
                return;
            }
        };

        if json.len() > config.max_value_size {
            tracing::warn!(
                key = %key,
                size = json.len(),
                max = config.max_value_size,
                "Value exceeds cache size limit, not storing"
            );
            return;
        }

        let ttl = config.ttl_secs;
        // failures are logged by the guard
        let _ = self
            .conn
            .guarded("cache_set", |store| async move { store.set_ex(key, &json, ttl).await })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::StoreConfig;
    use crate::store::{Fault, MemoryStore, Store};
    use serde::Deserialize;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Journey {
        from: String,
        to: String,
        fare_pence: u32,
    }

    fn journey(fare_pence: u32) -> Journey {
        Journey {
            from: "A".to_string(),
            to: "B".to_string(),
            fare_pence,
        }
    }

    fn wrapper(store: &MemoryStore) -> CacheWrapper {
        let conn =
            StoreConnection::with_connector(StoreConfig::new("memory://test"), Arc::new(store.clone()));
        CacheWrapper::new(conn)
    }

    #[tokio::test]
    async fn test_param_order_hits_previous_entry() {
        let store = MemoryStore::new();
        let cache = wrapper(&store);
        let config = CacheConfig::new(300);
        let b_calls = AtomicUsize::new(0);

        let first = cache
            .wrap(
                "journeys",
                &config,
                &CacheParams::new().with("from", "A").with("to", "B"),
                || async { Ok::<_, std::convert::Infallible>(journey(1250)) },
            )
            .await
            .unwrap();
        assert!(!first.hit);

        let second = cache
            .wrap(
                "journeys",
                &config,
                &CacheParams::new().with("to", "B").with("from", "A"),
                || async {
                    b_calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, std::convert::Infallible>(journey(9999))
                },
            )
            .await
            .unwrap();

        assert!(second.hit);
        assert_eq!(second.value, journey(1250));
        assert_eq!(second.key, first.key);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unavailable_store_bypasses_cache() {
        let store = MemoryStore::new();
        store.set_fault(Some(Fault::Unavailable));
        let cache = wrapper(&store);

        let outcome = cache
            .wrap("journeys", &CacheConfig::new(60), &CacheParams::new(), || async {
                Ok::<_, std::convert::Infallible>(journey(700))
            })
            .await
            .unwrap();

        assert!(!outcome.hit);
        assert_eq!(outcome.value, journey(700));

        store.set_fault(None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_store_bypasses_cache() {
        let cache = CacheWrapper::new(StoreConnection::new(StoreConfig::unconfigured()));

        let outcome = cache
            .wrap("journeys", &CacheConfig::new(60), &CacheParams::new(), || async {
                Ok::<_, std::convert::Infallible>(42u32)
            })
            .await
            .unwrap();

        assert!(!outcome.hit);
        assert_eq!(outcome.value, 42);
        assert_eq!(outcome.key, "cache:journeys");
    }

    #[tokio::test]
    async fn test_compute_error_propagates_unchanged() {
        #[derive(Debug, PartialEq)]
        struct UpstreamDown;

        let store = MemoryStore::new();
        let cache = wrapper(&store);

        let err = cache
            .wrap("journeys", &CacheConfig::new(60), &CacheParams::new(), || async {
                Err::<Journey, _>(UpstreamDown)
            })
            .await
            .unwrap_err();

        assert_eq!(err, UpstreamDown);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_value_returned_but_not_stored() {
        let store = MemoryStore::new();
        let cache = wrapper(&store);
        let config = CacheConfig::new(60).with_max_value_size(16);

        let outcome = cache
            .wrap("blob", &config, &CacheParams::new(), || async {
                Ok::<_, std::convert::Infallible>("y".repeat(64))
            })
            .await
            .unwrap();

        assert!(!outcome.hit);
        assert_eq!(outcome.value.len(), 64);
        assert_eq!(store.get("cache:blob").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss_and_overwritten() {
        let store = MemoryStore::new();
        store.set_ex("cache:journeys", "{not json", 60).await.unwrap();
        let cache = wrapper(&store);

        let outcome = cache
            .wrap("journeys", &CacheConfig::new(60), &CacheParams::new(), || async {
                Ok::<_, std::convert::Infallible>(journey(300))
            })
            .await
            .unwrap();

        assert!(!outcome.hit);
        let stored = store.get("cache:journeys").await.unwrap().unwrap();
        assert_eq!(serde_json::from_str::<Journey>(&stored).unwrap(), journey(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_carries_ttl() {
        let store = MemoryStore::new();
        let cache = wrapper(&store);

        let outcome = cache
            .wrap(
                "stations",
                &CacheConfig::new(300).with_prefix("v1:"),
                &CacheParams::new(),
                || async { Ok::<_, std::convert::Infallible>(vec!["KGX".to_string(), "EDB".to_string()]) },
            )
            .await
            .unwrap();

        assert_eq!(outcome.key, "cache:v1:stations");
        assert_eq!(store.ttl(&outcome.key), Some(Duration::from_secs(300)));
    }

    #[tokio::test]
    async fn test_concurrent_misses_each_compute() {
        let store = MemoryStore::new();
        let cache = wrapper(&store);
        let calls = AtomicUsize::new(0);
        let (gate_tx, gate_rx) = tokio::sync::watch::channel(false);
        let config = CacheConfig::new(60);
        let params = CacheParams::new();

        let compute = || {
            let mut gate = gate_rx.clone();
            let calls = &calls;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let _ = gate.wait_for(|open| *open).await;
                Ok::<_, std::convert::Infallible>(1u8)
            }
        };

        let opener = async {
            tokio::task::yield_now().await;
            let _ = gate_tx.send(true);
        };
        let (a, b, ()) = tokio::join!(
            cache.wrap("same", &config, &params, compute),
            cache.wrap("same", &config, &params, compute),
            opener,
        );

        assert!(!a.unwrap().hit);
        assert!(!b.unwrap().hit);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
