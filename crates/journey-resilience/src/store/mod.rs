//! # Store Module
//!
//! Command-level abstraction over the shared key-value store.
//!
//! Only the commands this layer consumes are modelled: GET, SET EX, the
//! INCR/EXPIRE/TTL counting pipeline, SCAN, bulk DEL, PING and INFO memory.
//! Backends:
//!
//! - [`RedisStore`] - Redis through a tokio `ConnectionManager` (feature `redis`)
//! - [`MemoryStore`] - in-process backend with TTLs and fault injection

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::{Fault, MemoryStore};
#[cfg(feature = "redis")]
pub use redis_store::{RedisConnector, RedisStore};

/// Page size used for cursor-paginated SCAN.
pub const SCAN_PAGE_SIZE: usize = 100;

/// Shared handle to a connected store.
pub type SharedStore = Arc<dyn Store>;

/// Raw reply of the INCR / EXPIRE / TTL pipeline, one integer per command.
///
/// Kept unparsed so callers decide what counts as malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowReply(pub Vec<i64>);

/// Commands the resilience layer issues against the shared store.
#[async_trait]
pub trait Store: Send + Sync {
    /// GET a string value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// SET with expiry in seconds
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Atomically INCR `key`, EXPIRE it to `window_secs`, then read its TTL.
    async fn incr_window(&self, key: &str, window_secs: u64) -> Result<WindowReply>;

    /// One SCAN page. Returns the next cursor (0 when finished) and the keys.
    async fn scan_page(&self, cursor: u64, pattern: &str, count: usize)
    -> Result<(u64, Vec<String>)>;

    /// Bulk DEL, returning how many keys existed.
    async fn delete_many(&self, keys: &[String]) -> Result<u64>;

    /// PING
    async fn ping(&self) -> Result<()>;

    /// INFO memory, as the raw diagnostic text.
    async fn memory_info(&self) -> Result<String>;

    /// Release backend resources. In-flight commands are already drained.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Opens store handles for a configured address.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `url`, returning a ready handle.
    async fn connect(&self, url: &str) -> Result<SharedStore>;
}

/// Connector that dispatches on the URL scheme.
///
/// `memory://` yields a fresh [`MemoryStore`]; anything else goes to Redis.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConnector;

#[async_trait]
impl Connector for DefaultConnector {
    async fn connect(&self, url: &str) -> Result<SharedStore> {
        if url.starts_with("memory://") {
            return Ok(Arc::new(MemoryStore::new()));
        }

        #[cfg(feature = "redis")]
        {
            RedisConnector.connect(url).await
        }

        #[cfg(not(feature = "redis"))]
        {
            Err(crate::error::StoreError::Unavailable(format!(
                "no backend compiled in for {url}"
            )))
        }
    }
}

/// Collect every key matching `pattern` by walking SCAN cursors.
///
/// SCAN may return a key more than once, so the result is deduplicated.
pub async fn scan_all(store: &dyn Store, pattern: &str) -> Result<Vec<String>> {
    let mut cursor = 0;
    let mut keys = Vec::new();

    loop {
        let (next, page) = store.scan_page(cursor, pattern, SCAN_PAGE_SIZE).await?;
        keys.extend(page);
        if next == 0 {
            break;
        }
        cursor = next;
    }

    keys.sort_unstable();
    keys.dedup();
    Ok(keys)
}
