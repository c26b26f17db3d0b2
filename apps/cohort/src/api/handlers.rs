//! # API Endpoint Handlers
//!
//! The actual HTTP endpoint handlers. Requests validate at the boundary
//! (in [`super::types`]) before any lock is taken; the wall clock is
//! sampled once per request and passed down, since the core never reads
//! a clock of its own.

use super::{
    AppState,
    types::{
        AssignmentsResponse, AuditRequest, AuditResponse, ClearResponse, ConvertRequest,
        ConvertResponse, ExperimentSummary, ExperimentsResponse, ExportResponse, HealthResponse,
        ResolveRequest, ResolveResponse, StatusResponse,
    },
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use cohort_core::{
    CohortError, ExperimentId, Resolution, Session, VariantId,
    audit::audit_distribution,
    export::{export_ledger, ledger_checksum},
};
use std::collections::BTreeMap;

/// Largest synthetic population one audit request may ask for.
const MAX_AUDIT_SAMPLE: u32 = 1_000_000;

// =============================================================================
// CLOCK
// =============================================================================

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |elapsed| {
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
        })
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Cap the synthetic population so one request stays bounded.
fn validate_sample_size(sample_size: u32) -> Result<(), CohortError> {
    if sample_size > MAX_AUDIT_SAMPLE {
        return Err(CohortError::InvalidConfiguration(format!(
            "sample size {} exceeds maximum {}",
            sample_size, MAX_AUDIT_SAMPLE
        )));
    }
    Ok(())
}

/// The winning arm's config payload, straight from the catalog.
fn arm_config(
    session: &Session,
    namespace: &ExperimentId,
    variant_id: &VariantId,
) -> Option<BTreeMap<String, serde_json::Value>> {
    session
        .catalog()
        .get(namespace)
        .and_then(|experiment| experiment.arm(variant_id))
        .map(|arm| arm.config.clone())
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Get session status.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.read().await;
    let now = now_epoch_millis();

    let backend = if session.is_persistent() {
        "redb"
    } else {
        "memory"
    };
    let response = StatusResponse {
        backend: backend.to_string(),
        persistent: session.is_persistent(),
        experiment_count: session.catalog().len(),
        running_count: session.running_experiments(now).len(),
        assignment_count: session.assignment_count(),
        buffered_events: session.events().len(),
    };

    (StatusCode::OK, Json(response))
}

/// List the experiment catalog.
pub async fn experiments_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.read().await;
    let now = now_epoch_millis();

    let experiments: Vec<ExperimentSummary> = session
        .catalog()
        .iter()
        .map(|experiment| ExperimentSummary::from_experiment(experiment, now))
        .collect();

    let response = ExperimentsResponse {
        count: experiments.len(),
        experiments,
    };

    (StatusCode::OK, Json(response))
}

/// Resolve a variant for a subject.
pub async fn resolve_handler(
    State(state): State<AppState>,
    Json(request): Json<ResolveRequest>,
) -> impl IntoResponse {
    let namespace = match request.namespace() {
        Ok(namespace) => namespace,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ResolveResponse::error(format!("Invalid request: {}", e))),
            );
        }
    };
    let identifier = match request.subject() {
        Ok(identifier) => identifier,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ResolveResponse::error(format!("Invalid request: {}", e))),
            );
        }
    };

    let mut session = state.session.write().await;
    match session.resolve(&identifier, &namespace, now_epoch_millis()) {
        Ok(Resolution::Assigned { assignment, fresh }) => {
            let config = arm_config(&session, &namespace, &assignment.variant_id);
            (
                StatusCode::OK,
                Json(ResolveResponse::assigned(assignment, fresh, config)),
            )
        }
        Ok(Resolution::Inactive(reason)) => (
            StatusCode::OK,
            Json(ResolveResponse::inactive(reason.as_str())),
        ),
        Ok(Resolution::OutOfAudience) => {
            (StatusCode::OK, Json(ResolveResponse::out_of_audience()))
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ResolveResponse::error(format!("Resolve failed: {}", e))),
        ),
    }
}

/// Record a goal completion.
pub async fn convert_handler(
    State(state): State<AppState>,
    Json(request): Json<ConvertRequest>,
) -> impl IntoResponse {
    let namespace = match request.namespace() {
        Ok(namespace) => namespace,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ConvertResponse::error(format!("Invalid request: {}", e))),
            );
        }
    };
    let identifier = match request.subject() {
        Ok(identifier) => identifier,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ConvertResponse::error(format!("Invalid request: {}", e))),
            );
        }
    };
    let goal = match request.goal() {
        Ok(goal) => goal,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ConvertResponse::error(format!("Invalid request: {}", e))),
            );
        }
    };

    let mut session = state.session.write().await;
    match session.convert(
        &identifier,
        &namespace,
        goal,
        request.value,
        now_epoch_millis(),
    ) {
        Ok(Some(event)) => (StatusCode::OK, Json(ConvertResponse::converted(&event))),
        Ok(None) => (StatusCode::OK, Json(ConvertResponse::skipped())),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ConvertResponse::error(format!("Convert failed: {}", e))),
        ),
    }
}

/// Audit an experiment's observed split against its weights.
pub async fn audit_handler(
    State(state): State<AppState>,
    Json(request): Json<AuditRequest>,
) -> impl IntoResponse {
    let namespace = match request.namespace() {
        Ok(namespace) => namespace,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(AuditResponse::error(format!("Invalid request: {}", e))),
            );
        }
    };
    if let Err(e) = validate_sample_size(request.sample_size()) {
        return (
            StatusCode::BAD_REQUEST,
            Json(AuditResponse::error(format!("Invalid request: {}", e))),
        );
    }

    let session = state.session.read().await;
    let Some(experiment) = session.catalog().get(&namespace) else {
        return (
            StatusCode::NOT_FOUND,
            Json(AuditResponse::error(format!(
                "Experiment not found: {}",
                namespace.as_str()
            ))),
        );
    };

    match audit_distribution(experiment, request.sample_size()) {
        Ok(report) => (
            StatusCode::OK,
            Json(AuditResponse::success(report, request.tolerance_bp())),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(AuditResponse::error(format!("Audit failed: {}", e))),
        ),
    }
}

/// List stored assignments.
pub async fn assignments_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.read().await;
    let assignments = session.assignments();

    let response = AssignmentsResponse {
        count: assignments.len(),
        assignments,
    };

    (StatusCode::OK, Json(response))
}

/// Remove every stored assignment.
pub async fn clear_assignments_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut session = state.session.write().await;
    match session.clear_assignments() {
        Ok(removed) => (StatusCode::OK, Json(ClearResponse::success(removed))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ClearResponse::error(format!("Clear failed: {}", e))),
        ),
    }
}

/// Export the assignment ledger in canonical format.
pub async fn export_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.read().await;
    let assignments = session.assignments();

    match export_ledger(&assignments) {
        Ok(data) => {
            let checksum = ledger_checksum(&assignments);
            (
                StatusCode::OK,
                Json(ExportResponse::success(data, checksum, assignments.len())),
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ExportResponse::error(format!("Export failed: {}", e))),
        ),
    }
}
