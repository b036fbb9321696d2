//! # Routes
//!
//! Health and cache administration endpoints.

use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use journey_resilience::{CacheStats, StoreError};
use serde::{Deserialize, Serialize};

use crate::context::GatewayContext;
use crate::error::{ApiError, ApiResult};

/// Health check payload
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok`: the gateway serves even when the store is down
    pub status: &'static str,
    /// `up`, `down` or `unconfigured`
    pub store: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// Health check endpoint
pub async fn health_check(State(ctx): State<GatewayContext>) -> Json<HealthResponse> {
    let store = if !ctx.connection.is_configured() {
        "unconfigured"
    } else if ctx.connection.is_available().await {
        "up"
    } else {
        "down"
    };

    Json(HealthResponse {
        status: "ok",
        store,
        version: crate::VERSION,
        timestamp: Utc::now(),
    })
}

/// Cache diagnostics
pub async fn cache_stats(State(ctx): State<GatewayContext>) -> Json<CacheStats> {
    Json(ctx.maintenance.stats().await)
}

/// Query for [`invalidate_cache`]
#[derive(Debug, Deserialize)]
pub struct InvalidateQuery {
    pub pattern: Option<String>,
}

/// Result of [`invalidate_cache`]
#[derive(Debug, Serialize, Deserialize)]
pub struct InvalidateResponse {
    pub pattern: String,
    pub deleted: u64,
}

/// Delete cached entries matching a glob pattern
pub async fn invalidate_cache(
    State(ctx): State<GatewayContext>,
    Query(query): Query<InvalidateQuery>,
) -> ApiResult<Json<InvalidateResponse>> {
    let pattern = query
        .pattern
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::InvalidInput("pattern is required".to_string()))?;

    if !ctx.connection.is_configured() {
        return Err(StoreError::Configuration.into());
    }

    let deleted = ctx.maintenance.invalidate(&pattern).await;
    Ok(Json(InvalidateResponse { pattern, deleted }))
}
