//! # Rate Limiter
//!
//! Per-identity request counting on the shared store.
//!
//! Each check runs one atomic MULTI/EXEC pipeline (INCR, EXPIRE, TTL), so the
//! count and remaining TTL are observed together even under concurrent
//! traffic. The expiry is refreshed on every increment: a client that keeps
//! calling keeps its window open.

use serde::Serialize;

use crate::connection::StoreConnection;
use crate::error::StoreError;
use crate::store::WindowReply;

/// Default key prefix for rate-limit counters
pub const DEFAULT_RATE_LIMIT_PREFIX: &str = "ratelimit";

/// Rate-limit policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    pub limit: u64,
    pub window_secs: u64,
    pub key_prefix: String,
}

impl RateLimitConfig {
    pub fn new(limit: u64, window_secs: u64) -> Self {
        Self {
            limit,
            window_secs,
            key_prefix: DEFAULT_RATE_LIMIT_PREFIX.to_string(),
        }
    }

    pub fn per_minute(limit: u64) -> Self {
        Self::new(limit, 60)
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Store key holding the counter for `identity`
    pub fn key_for(&self, identity: &str) -> String {
        format!("{}:{identity}", self.key_prefix)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_minute(100)
    }
}

/// Outcome of a rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub count: u64,
    pub limit: u64,
    pub remaining: u64,
    /// Seconds until the window resets
    pub reset_secs: u64,
}

impl RateLimitDecision {
    /// Decision used whenever the store cannot be consulted
    pub const fn fail_open(config: &RateLimitConfig) -> Self {
        Self {
            allowed: true,
            count: 0,
            limit: config.limit,
            remaining: config.limit,
            reset_secs: config.window_secs,
        }
    }

    fn from_window(count: u64, ttl: i64, config: &RateLimitConfig) -> Self {
        Self {
            allowed: count <= config.limit,
            count,
            limit: config.limit,
            remaining: config.limit.saturating_sub(count),
            reset_secs: u64::try_from(ttl)
                .ok()
                .filter(|ttl| *ttl > 0)
                .unwrap_or(config.window_secs),
        }
    }
}

/// Store-backed fixed-budget rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    conn: StoreConnection,
}

impl RateLimiter {
    pub fn new(conn: StoreConnection) -> Self {
        Self { conn }
    }

    /// Count a request from `identity` and decide whether it may proceed.
    ///
    /// Never blocks traffic on infrastructure faults: an unavailable store,
    /// a timeout or a malformed reply all yield [`RateLimitDecision::fail_open`].
    pub async fn check(&self, identity: &str, config: &RateLimitConfig) -> RateLimitDecision {
        let key = config.key_for(identity);
        let window = config.window_secs;

        let counted = self
            .conn
            .guarded("rate_limit", |store| async move {
                let reply = store.incr_window(&key, window).await?;
                parse_window(&reply)
            })
            .await;

        match counted {
            Ok((count, ttl)) => {
                let decision = RateLimitDecision::from_window(count, ttl, config);
                if !decision.allowed {
                    tracing::debug!(
                        identity,
                        count,
                        limit = config.limit,
                        "Rate limit exceeded"
                    );
                }
                decision
            }
            Err(_) => RateLimitDecision::fail_open(config),
        }
    }
}

/// Validate the `[count, expire_ack, ttl]` pipeline reply.
fn parse_window(reply: &WindowReply) -> Result<(u64, i64), StoreError> {
    match reply.0.as_slice() {
        [count, _, ttl] if *count > 0 => Ok((*count as u64, *ttl)),
        [count, _, _] => Err(StoreError::Pipeline(format!("non-positive counter {count}"))),
        other => Err(StoreError::Pipeline(format!(
            "expected 3 replies, got {}",
            other.len()
        ))),
    }
}
