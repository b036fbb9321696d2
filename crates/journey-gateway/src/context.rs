//! # Gateway Context
//!
//! Application state and dependency injection for route handlers.

use journey_resilience::{
    CacheWrapper, Maintenance, RateLimitConfig, RateLimiter, StoreConfig, StoreConnection,
};

/// Shared state handed to every handler and middleware.
///
/// All components share one [`StoreConnection`]; cloning the context is cheap.
#[derive(Debug, Clone)]
pub struct GatewayContext {
    /// Shared store connection
    pub connection: StoreConnection,

    /// Response cache for handlers
    pub cache: CacheWrapper,

    /// Per-client limiter
    pub limiter: RateLimiter,

    /// Invalidation and stats
    pub maintenance: Maintenance,

    /// Policy applied by the rate-limit middleware
    pub rate_limit: RateLimitConfig,
}

impl GatewayContext {
    /// Create a context around an existing connection
    pub fn new(connection: StoreConnection, rate_limit: RateLimitConfig) -> Self {
        Self {
            cache: CacheWrapper::new(connection.clone()),
            limiter: RateLimiter::new(connection.clone()),
            maintenance: Maintenance::new(connection.clone()),
            connection,
            rate_limit,
        }
    }
}

/// Builder for [`GatewayContext`]
#[derive(Debug, Default)]
pub struct GatewayContextBuilder {
    connection: Option<StoreConnection>,
    rate_limit: Option<RateLimitConfig>,
}

impl GatewayContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_connection(mut self, connection: StoreConnection) -> Self {
        self.connection = Some(connection);
        self
    }

    #[must_use]
    pub fn with_store_config(self, config: StoreConfig) -> Self {
        self.with_connection(StoreConnection::new(config))
    }

    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    /// Build the context. Without a connection the gateway runs fail-open.
    pub fn build(self) -> GatewayContext {
        let connection = self
            .connection
            .unwrap_or_else(|| StoreConnection::new(StoreConfig::unconfigured()));
        GatewayContext::new(connection, self.rate_limit.unwrap_or_default())
    }
}
