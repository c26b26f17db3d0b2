//! # Rate Limiting Middleware
//!
//! Global request rate limiting for the HTTP API, backed by the
//! `governor` crate. One limiter covers the whole process; there is no
//! per-client keying, so a single noisy caller can exhaust the budget
//! for everyone behind the same deployment.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Fallback requests-per-second budget.
const DEFAULT_RPS: NonZeroU32 = NonZeroU32::new(100).unwrap();

/// Shared process-wide rate limiter.
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Build a limiter allowing `requests_per_second` requests per second.
///
/// Zero falls back to [`DEFAULT_RPS`]; disabling the limiter entirely
/// is the router's decision, not the limiter's.
#[must_use]
pub fn create_rate_limiter(requests_per_second: u32) -> GlobalRateLimiter {
    let rps = NonZeroU32::new(requests_per_second).unwrap_or(DEFAULT_RPS);
    let quota = Quota::per_second(rps);
    Arc::new(RateLimiter::direct(quota))
}

/// Read the configured rate limit from `COHORT_RATE_LIMIT`.
///
/// Unset or unparseable values default to 100. Zero disables limiting.
#[must_use]
pub fn get_rate_limit_from_env() -> u32 {
    std::env::var("COHORT_RATE_LIMIT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(100)
}

/// Reject requests above the configured budget with 429.
pub async fn rate_limit_middleware(
    State(limiter): State<GlobalRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    match limiter.check() {
        Ok(()) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!(
                event = "rate_limit_exceeded",
                path = %request.uri().path(),
                "Request rejected by rate limiter"
            );
            Err((StatusCode::TOO_MANY_REQUESTS, "Too Many Requests"))
        }
    }
}
