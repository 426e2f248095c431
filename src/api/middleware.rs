//! Rate Limiting Middleware
//!
//! Admits or rejects each request before it reaches a handler.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use super::handlers::AppState;
use crate::error::CacheError;

/// Identifier used when a request carries no usable client address.
pub const FALLBACK_IDENTIFIER: &str = "unknown";

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Derives the caller identifier from proxy headers.
///
/// Takes the first `X-Forwarded-For` entry, then `X-Real-IP`, then falls
/// back to [`FALLBACK_IDENTIFIER`] so the limiter always has a bucket.
pub fn client_identifier(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or(FALLBACK_IDENTIFIER)
        .to_string()
}

/// Rejects callers over their budget with 429 and `Retry-After`.
///
/// Allowed responses carry `X-RateLimit-Limit` and `X-RateLimit-Remaining`.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, CacheError> {
    let identifier = client_identifier(request.headers());
    let decision = state.rate_limiter.allow(
        &identifier,
        state.rate_limit.max_requests,
        state.rate_limit.window,
    );

    if !decision.allowed {
        warn!(identifier = %identifier, limit = decision.limit, "Rate limit exceeded");
        return Err(CacheError::RateLimited {
            retry_after_ms: decision.reset_after.as_millis() as u64,
        });
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));

    Ok(response)
}
