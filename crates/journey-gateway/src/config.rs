//! # Gateway Configuration
//!
//! Environment-based configuration for the gateway service.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use journey_resilience::{RateLimitConfig, StoreConfig};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

/// Gateway server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub server_addr: SocketAddr,

    /// Shared store connection settings
    pub store: StoreConfig,

    /// Default rate-limit policy applied to every route
    pub rate_limit: RateLimitConfig,

    /// Logging level
    pub log_level: String,

    /// CORS allowed origins
    pub cors_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let server_addr = lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let server_addr: SocketAddr = server_addr.parse().map_err(|_| ConfigError::Invalid {
            var: "SERVER_ADDR",
            value: server_addr.clone(),
        })?;

        // An unset address is a valid, permanently fail-open mode.
        let url = lookup("STORE_URL")
            .or_else(|| lookup("REDIS_URL"))
            .filter(|url| !url.trim().is_empty());

        let mut store = StoreConfig {
            url,
            ..StoreConfig::default()
        };
        if let Some(ms) = parse_var(&lookup, "STORE_CONNECT_TIMEOUT_MS")? {
            store.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, "STORE_COMMAND_TIMEOUT_MS")? {
            store.command_timeout = Duration::from_millis(ms);
        }

        let mut rate_limit = RateLimitConfig::default();
        if let Some(limit) = parse_var(&lookup, "RATE_LIMIT_REQUESTS")? {
            rate_limit.limit = limit;
        }
        if let Some(window) = parse_var(&lookup, "RATE_LIMIT_WINDOW_SECS")? {
            rate_limit.window_secs = window;
        }
        if let Some(prefix) = lookup("RATE_LIMIT_PREFIX") {
            rate_limit.key_prefix = prefix;
        }

        Ok(Self {
            server_addr,
            store,
            rate_limit,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            cors_origins: lookup("CORS_ORIGINS")
                .unwrap_or_else(|| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }
}

fn parse_var<F>(lookup: &F, var: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
{
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { var, value })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&'static str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<&str, String> = vars.iter().map(|(k, v)| (*k, (*v).to_string())).collect();
        Config::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.server_addr.port(), 8080);
        assert!(config.store.url.is_none());
        assert_eq!(config.store.command_timeout, Duration::from_secs(5));
        assert_eq!(config.rate_limit, RateLimitConfig::default());
        assert_eq!(config.cors_origins, vec!["*".to_string()]);
    }

    #[test]
    fn test_store_and_rate_limit_vars() {
        let config = config_from(&[
            ("REDIS_URL", "redis://cache:6379"),
            ("STORE_COMMAND_TIMEOUT_MS", "250"),
            ("RATE_LIMIT_REQUESTS", "30"),
            ("RATE_LIMIT_WINDOW_SECS", "10"),
            ("RATE_LIMIT_PREFIX", "rl:search"),
        ])
        .unwrap();

        assert_eq!(config.store.url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.store.command_timeout, Duration::from_millis(250));
        assert_eq!(config.rate_limit.limit, 30);
        assert_eq!(config.rate_limit.window_secs, 10);
        assert_eq!(config.rate_limit.key_prefix, "rl:search");
    }

    #[test]
    fn test_store_url_wins_over_redis_url() {
        let config = config_from(&[("STORE_URL", "memory://"), ("REDIS_URL", "redis://x")]).unwrap();
        assert_eq!(config.store.url.as_deref(), Some("memory://"));
    }

    #[test]
    fn test_blank_store_url_is_unconfigured() {
        let config = config_from(&[("STORE_URL", "  ")]).unwrap();
        assert!(config.store.url.is_none());
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let err = config_from(&[("RATE_LIMIT_REQUESTS", "lots")]).unwrap_err();
        assert!(err.to_string().contains("RATE_LIMIT_REQUESTS"));

        assert!(config_from(&[("SERVER_ADDR", "nowhere")]).is_err());
    }
}
