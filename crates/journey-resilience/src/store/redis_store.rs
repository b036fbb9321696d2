//! # Redis Store
//!
//! [`Store`] implementation over a multiplexed Redis connection.

use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use super::{Connector, SharedStore, Store, WindowReply};
use crate::error::Result;

/// Redis-backed store.
///
/// `ConnectionManager` is cheap to clone and reconnects on its own after a
/// dropped socket, so each command works on a clone.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Open a connection to `url`
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn incr_window(&self, key: &str, window_secs: u64) -> Result<WindowReply> {
        let mut conn = self.conn.clone();

        // MULTI / INCR / EXPIRE / TTL / EXEC
        let reply: Vec<i64> = redis::pipe()
            .atomic()
            .incr(key, 1i64)
            .expire(key, window_secs as i64)
            .ttl(key)
            .query_async(&mut conn)
            .await?;

        Ok(WindowReply(reply))
    }

    async fn scan_page(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>)> {
        let mut conn = self.conn.clone();
        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        Ok((next, keys))
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let deleted: u64 = conn.del(keys).await?;
        Ok(deleted)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn memory_info(&self) -> Result<String> {
        let mut conn = self.conn.clone();
        let info: String = redis::cmd("INFO").arg("memory").query_async(&mut conn).await?;
        Ok(info)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Connector producing [`RedisStore`] handles.
#[derive(Debug, Default, Clone, Copy)]
pub struct RedisConnector;

#[async_trait]
impl Connector for RedisConnector {
    async fn connect(&self, url: &str) -> Result<SharedStore> {
        let store = RedisStore::connect(url).await?;
        Ok(Arc::new(store))
    }
}
