//! # API Key Authentication
//!
//! Optional bearer-token authentication for the HTTP API. When the
//! `COHORT_API_KEY` environment variable is set, every endpoint except
//! `/health` requires a matching `Authorization` header. When it is
//! unset, the API is open.

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

/// Read the configured API key, if any.
///
/// An empty value counts as unset, so `COHORT_API_KEY=""` does not
/// lock every caller out with an unmatchable key.
#[must_use]
pub fn get_api_key_from_env() -> Option<String> {
    std::env::var("COHORT_API_KEY")
        .ok()
        .filter(|key| !key.is_empty())
}

/// Require a valid API key on every route except `/health`.
pub async fn api_key_auth_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    // No key configured means an open API.
    let Some(expected_key) = get_api_key_from_env() else {
        return Ok(next.run(request).await);
    };

    // Health stays reachable for load balancers and liveness probes.
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let Some(header_value) = auth_header else {
        tracing::warn!(
            event = "auth_failure",
            reason = "missing_authorization_header",
            "Rejected request without Authorization header"
        );
        return Err((StatusCode::UNAUTHORIZED, "Unauthorized"));
    };

    // Accept both "Bearer <key>" and a bare key.
    let provided_key = header_value
        .strip_prefix("Bearer ")
        .unwrap_or(header_value);

    // Compare in constant time. Both buffers are padded to a common
    // length so ct_eq always walks the same number of bytes; equality
    // additionally requires matching lengths.
    let provided_bytes = provided_key.as_bytes();
    let expected_bytes = expected_key.as_bytes();
    let max_len = provided_bytes.len().max(expected_bytes.len());

    let mut padded_provided = vec![0u8; max_len];
    let mut padded_expected = vec![0u8; max_len];
    padded_provided[..provided_bytes.len()].copy_from_slice(provided_bytes);
    padded_expected[..expected_bytes.len()].copy_from_slice(expected_bytes);

    let bytes_match: bool = padded_provided.ct_eq(&padded_expected).into();
    let is_valid = bytes_match && provided_bytes.len() == expected_bytes.len();

    if is_valid {
        Ok(next.run(request).await)
    } else {
        tracing::warn!(
            event = "auth_failure",
            reason = "invalid_api_key",
            "Rejected request with invalid API key"
        );
        Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_api_key_empty_returns_none() {
        // SAFETY: Single-threaded test; no other code reads the
        // environment concurrently.
        unsafe { std::env::remove_var("COHORT_API_KEY") };
        assert!(get_api_key_from_env().is_none());
    }
}
