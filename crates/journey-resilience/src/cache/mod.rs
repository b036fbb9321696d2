//! # Cache Module
//!
//! Response memoization over the shared store.
//!
//! Keys are derived from a logical name plus canonicalized parameters
//! ([`derive_key`]); values are stored as JSON with a per-call TTL.

pub mod key;
pub mod wrapper;

pub use key::{CACHE_NAMESPACE, CacheParams, HASH_FUNCTION_ID, combined_hash, derive_key};
pub use wrapper::{CacheConfig, CacheOutcome, CacheWrapper, DEFAULT_MAX_VALUE_SIZE};
