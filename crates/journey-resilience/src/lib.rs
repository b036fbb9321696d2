//! # Journey Resilience Library
//!
//! Fail-open response cache and per-client rate limiter for the journey-search
//! gateway, both backed by one shared Redis store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Gateway Route Handlers                     │
//! └─────────────────────────────────────────────────────────────┘
//!                    │                   │
//!                    ▼                   ▼
//! ┌─────────────────────────┐   ┌──────────────────────────────┐
//! │      RateLimiter        │   │        CacheWrapper          │
//! │  (INCR/EXPIRE/TTL)      │   │  (derived keys, JSON, TTL)   │
//! └─────────────────────────┘   └──────────────────────────────┘
//!                    │                   │        Maintenance
//!                    ▼                   ▼      (SCAN/DEL, INFO)
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    StoreConnection                           │
//! │     (lazy connect, backoff, timeouts, fail-open guard)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │           Store trait: RedisStore | MemoryStore              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every store-touching operation has a bounded timeout and a defined
//! fallback. A missing store address is the only error that escapes, and only
//! from [`StoreConnection::obtain`].
//!
//! ## Features
//!
//! - `redis`: Enable the Redis backend (default)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use journey_resilience::{
//!     CacheConfig, CacheParams, CacheWrapper, RateLimitConfig, RateLimiter,
//!     StoreConfig, StoreConnection,
//! };
//!
//! let conn = StoreConnection::new(StoreConfig::new("redis://127.0.0.1:6379"));
//! let limiter = RateLimiter::new(conn.clone());
//! let cache = CacheWrapper::new(conn.clone());
//!
//! let decision = limiter.check("203.0.113.7", &RateLimitConfig::per_minute(60)).await;
//! if decision.allowed {
//!     let params = CacheParams::new().with("from", "KGX").with("to", "EDB");
//!     let outcome = cache
//!         .wrap("journeys", &CacheConfig::new(300), &params, || planner.search(&query))
//!         .await?;
//! }
//!
//! conn.close().await;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod connection;
pub mod error;
pub mod maintenance;
pub mod ratelimit;
pub mod store;

// Re-export commonly used types
pub use cache::{CacheConfig, CacheOutcome, CacheParams, CacheWrapper, HASH_FUNCTION_ID};
pub use connection::{Backoff, ConnectionState, StoreConfig, StoreConnection};
pub use error::{Degraded, Result, StoreError};
pub use maintenance::{CacheStats, Maintenance};
pub use ratelimit::{RateLimitConfig, RateLimitDecision, RateLimiter};
pub use store::{Connector, MemoryStore, SharedStore, Store};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
