//! # Maintenance
//!
//! Pattern invalidation and cache diagnostics.

use serde::Serialize;

use crate::cache::{CACHE_NAMESPACE, HASH_FUNCTION_ID};
use crate::connection::StoreConnection;
use crate::store::scan_all;

/// Snapshot of cache health
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub connected: bool,
    pub key_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<String>,
    pub hash_function_id: &'static str,
}

impl CacheStats {
    fn disconnected() -> Self {
        Self {
            connected: false,
            key_count: 0,
            memory_usage: None,
            hash_function_id: HASH_FUNCTION_ID,
        }
    }
}

/// Bulk invalidation and stats over the shared store
#[derive(Debug, Clone)]
pub struct Maintenance {
    conn: StoreConnection,
}

impl Maintenance {
    pub fn new(conn: StoreConnection) -> Self {
        Self { conn }
    }

    /// Delete every key matching `pattern` (glob syntax).
    ///
    /// Walks the keyspace with SCAN, then issues a single DEL. Returns the
    /// number of keys removed, or 0 when the store is unavailable.
    pub async fn invalidate(&self, pattern: &str) -> u64 {
        let deleted = self
            .conn
            .guarded("invalidate", |store| async move {
                let keys = scan_all(store.as_ref(), pattern).await?;
                if keys.is_empty() {
                    return Ok(0);
                }
                store.delete_many(&keys).await
            })
            .await
            .unwrap_or(0);

        tracing::info!(pattern, deleted, "Cache invalidated");
        deleted
    }

    /// Count cached entries and report store memory use.
    pub async fn stats(&self) -> CacheStats {
        let pattern = format!("{CACHE_NAMESPACE}*");
        let collected = self
            .conn
            .guarded("stats", |store| async move {
                let keys = scan_all(store.as_ref(), &pattern).await?;
                let info = store.memory_info().await?;
                Ok((keys.len() as u64, parse_used_memory(&info)))
            })
            .await;

        match collected {
            Ok((key_count, memory_usage)) => CacheStats {
                connected: true,
                key_count,
                memory_usage,
                hash_function_id: HASH_FUNCTION_ID,
            },
            Err(_) => CacheStats::disconnected(),
        }
    }
}

/// Pull `used_memory_human` out of `INFO memory` output.
fn parse_used_memory(info: &str) -> Option<String> {
    info.lines()
        .find_map(|line| line.trim().strip_prefix("used_memory_human:"))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::StoreConfig;
    use crate::store::{Fault, MemoryStore, Store};
    use std::sync::Arc;

    fn maintenance(store: &MemoryStore) -> Maintenance {
        let conn =
            StoreConnection::with_connector(StoreConfig::new("memory://test"), Arc::new(store.clone()));
        Maintenance::new(conn)
    }

    #[tokio::test]
    async fn test_invalidate_deletes_only_matches() {
        let store = MemoryStore::new();
        for i in 0..130 {
            store.set_ex(&format!("ns:{i}"), "v", 60).await.unwrap();
        }
        store.set_ex("other:1", "v", 60).await.unwrap();
        store.set_ex("ns", "v", 60).await.unwrap();

        let deleted = maintenance(&store).invalidate("ns:*").await;

        assert_eq!(deleted, 130);
        assert_eq!(store.len(), 2);
        assert!(store.get("other:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_no_matches() {
        let store = MemoryStore::new();
        store.set_ex("other:1", "v", 60).await.unwrap();
        assert_eq!(maintenance(&store).invalidate("ns:*").await, 0);
    }

    #[tokio::test]
    async fn test_invalidate_unavailable_is_zero() {
        let store = MemoryStore::new();
        store.set_ex("ns:1", "v", 60).await.unwrap();
        store.set_fault(Some(Fault::Unavailable));

        assert_eq!(maintenance(&store).invalidate("ns:*").await, 0);
    }

    #[tokio::test]
    async fn test_stats_counts_cache_namespace() {
        let store = MemoryStore::new();
        store.set_ex("cache:journeys:abc", "{}", 60).await.unwrap();
        store.set_ex("cache:stations", "[]", 60).await.unwrap();
        store.set_ex("ratelimit:1.2.3.4", "1", 60).await.unwrap();

        let stats = maintenance(&store).stats().await;

        assert!(stats.connected);
        assert_eq!(stats.key_count, 2);
        assert!(stats.memory_usage.is_some());
        assert_eq!(stats.hash_function_id, HASH_FUNCTION_ID);
    }

    #[tokio::test]
    async fn test_stats_degrade_when_unconfigured() {
        let maintenance = Maintenance::new(StoreConnection::new(StoreConfig::unconfigured()));
        let stats = maintenance.stats().await;
        assert_eq!(stats, CacheStats::disconnected());

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["connected"], false);
        assert_eq!(json["keyCount"], 0);
        assert!(json.get("memoryUsage").is_none());
        assert_eq!(json["hashFunctionId"], HASH_FUNCTION_ID);
        assert!(json.get("hashFunction").is_none());
    }

    #[test]
    fn test_parse_used_memory() {
        let info = "# Memory\r\nused_memory:1048576\r\nused_memory_human:1.00M\r\nused_memory_rss:2\r\n";
        assert_eq!(parse_used_memory(info), Some("1.00M".to_string()));
        assert_eq!(parse_used_memory("# Memory\r\n"), None);
    }
}
