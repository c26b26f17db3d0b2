//! # Cohort HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Session status
//! - `GET /experiments` - List the experiment catalog
//! - `POST /resolve` - Resolve a variant for a subject
//! - `POST /convert` - Record a goal completion
//! - `POST /audit` - Audit an experiment's split against its weights
//! - `GET /assignments` - List stored assignments
//! - `DELETE /assignments` - Clear stored assignments
//! - `POST /export` - Export the assignment ledger
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `COHORT_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `COHORT_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `COHORT_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

// Re-exports for external use
pub use auth::get_api_key_from_env;
pub use middleware::{create_rate_limiter, get_rate_limit_from_env};
// Re-export handlers and types for integration tests (via `cohort::api::*`)
#[allow(unused_imports)]
pub use handlers::{
    assignments_handler, audit_handler, clear_assignments_handler, convert_handler,
    experiments_handler, export_handler, health_handler, now_epoch_millis, resolve_handler,
    status_handler,
};
#[allow(unused_imports)]
pub use types::{
    AssignmentsResponse, AuditRequest, AuditResponse, ClearResponse, ConvertRequest,
    ConvertResponse, ExperimentSummary, ExperimentsResponse, ExportResponse, HealthResponse,
    ResolveRequest, ResolveResponse, StatusResponse,
};

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use cohort_core::{CohortError, Session};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
    /// The session, wrapped for concurrent access. Resolutions take the
    /// write half; listings and audits share the read half.
    pub session: Arc<tokio::sync::RwLock<Session>>,
}

impl AppState {
    /// Create new application state around a session.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session: Arc::new(tokio::sync::RwLock::new(session)),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer from the `COHORT_CORS_ORIGINS` environment
/// variable. Unset means localhost-only; `*` means fully permissive.
fn build_cors_layer() -> CorsLayer {
    match std::env::var("COHORT_CORS_ORIGINS").ok().as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS configured to allow ALL origins: do not use this in production"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let origin_list: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(value) => {
                            tracing::info!("CORS allowing origin: {}", trimmed);
                            Some(value)
                        }
                        Err(_) => {
                            tracing::warn!("Ignoring invalid CORS origin: {}", trimmed);
                            None
                        }
                    }
                })
                .collect();

            if origin_list.is_empty() {
                tracing::warn!("No valid CORS origins configured, falling back to localhost");
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(origin_list)
                    .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => {
            tracing::info!("CORS restricted to localhost (set COHORT_CORS_ORIGINS to change)");
            build_localhost_cors()
        }
    }
}

/// The default development CORS policy: common localhost ports only.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .iter()
    .map(|origin| origin.parse::<HeaderValue>().ok())
    .flatten()
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER
// =============================================================================

/// Create the API router with all endpoints and middleware.
#[must_use]
pub fn create_router(state: AppState) -> Router {
    let rate_limit = get_rate_limit_from_env();
    let limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled via COHORT_RATE_LIMIT=0");
        None
    };

    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED. Set COHORT_API_KEY to require bearer tokens."
        );
    }

    let cors = build_cors_layer();

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/experiments", get(handlers::experiments_handler))
        .route("/resolve", post(handlers::resolve_handler))
        .route("/convert", post(handlers::convert_handler))
        .route("/audit", post(handlers::audit_handler))
        .route(
            "/assignments",
            get(handlers::assignments_handler).delete(handlers::clear_assignments_handler),
        )
        .route("/export", post(handlers::export_handler));

    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }

    if let Some(limiter) = limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER
// =============================================================================

/// Run the API server on the given address until shutdown.
pub async fn run_server(addr: &str, session: Session) -> Result<(), CohortError> {
    let state = AppState::new(session);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| CohortError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("Cohort HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| CohortError::IoError(format!("Server error: {}", e)))?;

    Ok(())
}
