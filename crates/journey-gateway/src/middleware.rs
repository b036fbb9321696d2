//! # Rate-Limit Middleware
//!
//! Applies the limiter in front of every route and reports the decision in
//! `X-RateLimit-*` headers.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use journey_resilience::RateLimitDecision;
use serde::Serialize;

use crate::context::GatewayContext;
use crate::identity::client_identity;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// 429 body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RejectionBody {
    error: &'static str,
    limit: u64,
    remaining: u64,
    reset_time: u64,
}

/// Response sent when a client exceeds its budget
#[derive(Debug, Clone, Copy)]
pub struct RateLimitRejection(pub RateLimitDecision);

impl IntoResponse for RateLimitRejection {
    fn into_response(self) -> Response {
        let decision = self.0;
        let body = RejectionBody {
            error: "Too many requests",
            limit: decision.limit,
            remaining: decision.remaining,
            reset_time: decision.reset_secs,
        };

        let mut response = (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();
        let headers = response.headers_mut();
        insert_rate_limit_headers(headers, &decision);
        headers.insert(header::RETRY_AFTER, HeaderValue::from(decision.reset_secs));

        response
    }
}

/// Rate limiting middleware.
///
/// Identifies the caller from trusted address headers, counts the request and
/// either rejects with 429 or forwards. Successful responses get the
/// `X-RateLimit-*` headers; error responses pass through untouched.
pub async fn rate_limit_middleware(
    State(ctx): State<GatewayContext>,
    request: Request,
    next: Next,
) -> Response {
    let identity = client_identity(request.headers());
    let decision = ctx.limiter.check(&identity, &ctx.rate_limit).await;

    if !decision.allowed {
        tracing::info!(
            identity = %identity,
            count = decision.count,
            limit = decision.limit,
            "Request rate limited"
        );
        return RateLimitRejection(decision).into_response();
    }

    let mut response = next.run(request).await;
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        insert_rate_limit_headers(response.headers_mut(), &decision);
    }

    response
}

fn insert_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_secs));
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use axum::{Router, middleware};
    use journey_resilience::{RateLimitConfig, StoreConfig, StoreConnection};
    use tower::ServiceExt;

    fn app(ctx: GatewayContext) -> Router {
        Router::new()
            .route("/journeys", get(|| async { "ok" }))
            .route(
                "/broken",
                get(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
            )
            .layer(middleware::from_fn_with_state(ctx, rate_limit_middleware))
    }

    fn memory_ctx(limit: u64) -> GatewayContext {
        GatewayContext::new(
            StoreConnection::new(StoreConfig::new("memory://")),
            RateLimitConfig::new(limit, 60),
        )
    }

    fn request(uri: &str, ip: &str) -> Request {
        axum::http::Request::builder()
            .uri(uri)
            .header("cf-connecting-ip", ip)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_allowed_response_carries_headers() {
        let response = app(memory_ctx(3))
            .oneshot(request("/journeys", "1.2.3.4"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[&X_RATELIMIT_LIMIT], "3");
        assert_eq!(headers[&X_RATELIMIT_REMAINING], "2");
        assert_eq!(headers[&X_RATELIMIT_RESET], "60");
        assert!(headers.get(header::RETRY_AFTER).is_none());

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_rejection_is_structured_429() {
        let router = app(memory_ctx(1));

        let first = router.clone().oneshot(request("/journeys", "1.2.3.4")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = router.oneshot(request("/journeys", "1.2.3.4")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers()[&X_RATELIMIT_REMAINING], "0");
        assert_eq!(second.headers()[header::RETRY_AFTER], "60");

        let body = axum::body::to_bytes(second.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["limit"], 1);
        assert_eq!(json["remaining"], 0);
        assert_eq!(json["resetTime"], 60);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_error_responses_pass_through_without_headers() {
        let response = app(memory_ctx(5))
            .oneshot(request("/broken", "1.2.3.4"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(response.headers().get(&X_RATELIMIT_LIMIT).is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_store_never_rejects() {
        let ctx = GatewayContext::new(
            StoreConnection::new(StoreConfig::unconfigured()),
            RateLimitConfig::new(1, 60),
        );
        let router = app(ctx);

        for _ in 0..5 {
            let response = router.clone().oneshot(request("/journeys", "1.2.3.4")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()[&X_RATELIMIT_REMAINING], "1");
        }
    }

    #[tokio::test]
    async fn test_clients_are_limited_separately() {
        let router = app(memory_ctx(1));

        let a = router.clone().oneshot(request("/journeys", "10.0.0.1")).await.unwrap();
        let b = router.clone().oneshot(request("/journeys", "10.0.0.2")).await.unwrap();
        let a_again = router.oneshot(request("/journeys", "10.0.0.1")).await.unwrap();

        assert_eq!(a.status(), StatusCode::OK);
        assert_eq!(b.status(), StatusCode::OK);
        assert_eq!(a_again.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
