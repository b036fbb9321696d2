//! # Journey Gateway
//!
//! HTTP edge of the journey-search gateway: per-client rate limiting in front
//! of every route, plus health and cache administration endpoints. Route
//! handlers for journey search are supplied by the embedding application and
//! use [`GatewayContext::cache`] to memoize their upstream calls.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Axum HTTP Server                          │
//! │           (TraceLayer, CORS, rate-limit middleware)          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │     Application routes          │    /admin/cache/*          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    GatewayContext                            │
//! │   (StoreConnection, CacheWrapper, RateLimiter, Maintenance)  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Redis (shared, optional)                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod routes;

use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use context::{GatewayContext, GatewayContextBuilder};
pub use error::{ApiError, ApiResult};
pub use identity::client_identity;
pub use middleware::rate_limit_middleware;

/// Build the Axum router.
///
/// `app` carries the embedding application's routes (state already applied).
/// Everything except `/health` sits behind the rate limiter.
pub fn build_router(ctx: GatewayContext, app: Router, cors_origins: &[String]) -> Router {
    let limited = Router::new()
        .route("/admin/cache/stats", get(routes::cache_stats))
        .route("/admin/cache", delete(routes::invalidate_cache))
        .with_state(ctx.clone())
        .merge(app)
        .layer(axum::middleware::from_fn_with_state(
            ctx.clone(),
            middleware::rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(routes::health_check))
        .with_state(ctx)
        .merge(limited)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([
            middleware::X_RATELIMIT_LIMIT,
            middleware::X_RATELIMIT_REMAINING,
            middleware::X_RATELIMIT_RESET,
            axum::http::header::RETRY_AFTER,
        ]);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
