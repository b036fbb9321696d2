//! Resilience layer error types

use thiserror::Error;

/// Errors raised by store backends and the connection lifecycle.
///
/// Only [`StoreError::Configuration`] is meant to travel past this crate;
/// everything else is folded into a [`Degraded`] outcome by
/// [`StoreConnection::guarded`](crate::connection::StoreConnection::guarded).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store address is not configured")]
    Configuration,

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store command timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Malformed pipeline reply: {0}")]
    Pipeline(String),

    #[error("Redis error: {0}")]
    Redis(String),
}

impl StoreError {
    /// Whether this error is the hard misconfiguration case.
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Redis(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Why a store-touching operation fell back to its fail-open value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Degraded {
    #[error("store is not configured")]
    Unconfigured,

    #[error("store is unavailable")]
    Unavailable,

    #[error("store command timed out")]
    TimedOut,

    #[error("store reply was malformed")]
    Malformed,
}

impl From<&StoreError> for Degraded {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::Configuration => Self::Unconfigured,
            StoreError::Timeout { .. } => Self::TimedOut,
            StoreError::Pipeline(_) | StoreError::Serialization(_) => Self::Malformed,
            StoreError::Unavailable(_) | StoreError::Redis(_) => Self::Unavailable,
        }
    }
}
