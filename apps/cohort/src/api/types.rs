//! # API Request/Response Types
//!
//! JSON structures for the HTTP API, plus the boundary validation that
//! keeps oversized payloads out of the core. Length limits are enforced
//! here, before a request ever touches the session.

use cohort_core::{
    Assignment, CohortError, ConversionEvent, DEFAULT_SAMPLE_SIZE, DEFAULT_TOLERANCE_BP,
    DeviceSignals, DistributionReport, Experiment, ExperimentId, Identifier,
    primitives::{MAX_GOAL_LENGTH, MAX_IDENTIFIER_LENGTH, MAX_NAMESPACE_LENGTH},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// BOUNDARY VALIDATION
// =============================================================================

fn validate_namespace(namespace: &str) -> Result<ExperimentId, CohortError> {
    if namespace.is_empty() {
        return Err(CohortError::InvalidConfiguration(
            "namespace is empty".to_string(),
        ));
    }
    if namespace.len() > MAX_NAMESPACE_LENGTH {
        return Err(CohortError::InvalidConfiguration(format!(
            "namespace length {} exceeds maximum {} bytes",
            namespace.len(),
            MAX_NAMESPACE_LENGTH
        )));
    }
    Ok(ExperimentId::new(namespace))
}

fn validate_identifier(identifier: &str) -> Result<Identifier, CohortError> {
    if identifier.is_empty() {
        return Err(CohortError::InvalidConfiguration(
            "identifier is empty".to_string(),
        ));
    }
    if identifier.len() > MAX_IDENTIFIER_LENGTH {
        return Err(CohortError::InvalidConfiguration(format!(
            "identifier length {} exceeds maximum {} bytes",
            identifier.len(),
            MAX_IDENTIFIER_LENGTH
        )));
    }
    Ok(Identifier::new(identifier))
}

/// Resolve the subject a request names: an explicit identifier when
/// present, a device fingerprint otherwise.
fn subject_of(
    identifier: Option<&String>,
    signals: Option<&DeviceSignals>,
) -> Result<Identifier, CohortError> {
    if let Some(identifier) = identifier {
        return validate_identifier(identifier);
    }
    if let Some(signals) = signals {
        return Ok(signals.identifier());
    }
    Err(CohortError::InvalidConfiguration(
        "request names no subject: provide identifier or signals".to_string(),
    ))
}

// =============================================================================
// HEALTH
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS
// =============================================================================

/// Session status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub backend: String,
    pub persistent: bool,
    pub experiment_count: usize,
    pub running_count: usize,
    pub assignment_count: usize,
    pub buffered_events: usize,
}

// =============================================================================
// EXPERIMENTS
// =============================================================================

/// One experiment in the catalog listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub running: bool,
    pub variant_count: usize,
    pub total_weight: u64,
    pub audience_percent: Option<u8>,
}

impl ExperimentSummary {
    /// Summarize an experiment against the given clock reading.
    #[must_use]
    pub fn from_experiment(experiment: &Experiment, now_epoch_millis: u64) -> Self {
        Self {
            id: experiment.id.as_str().to_string(),
            name: experiment.name.clone(),
            enabled: experiment.enabled,
            running: experiment.is_running(now_epoch_millis),
            variant_count: experiment.variants.len(),
            total_weight: experiment.total_weight(),
            audience_percent: experiment.audience.as_ref().map(|rule| rule.percentage),
        }
    }
}

/// Catalog listing response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentsResponse {
    pub count: usize,
    pub experiments: Vec<ExperimentSummary>,
}

// =============================================================================
// RESOLVE
// =============================================================================

/// Variant resolution request.
///
/// A subject is named either by an explicit `identifier` or by a set of
/// device `signals` the server fingerprints into one. The explicit
/// identifier wins when both are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub namespace: String,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub signals: Option<DeviceSignals>,
}

impl ResolveRequest {
    /// Validate and extract the experiment namespace.
    pub fn namespace(&self) -> Result<ExperimentId, CohortError> {
        validate_namespace(&self.namespace)
    }

    /// Validate and extract the subject identifier.
    pub fn subject(&self) -> Result<Identifier, CohortError> {
        subject_of(self.identifier.as_ref(), self.signals.as_ref())
    }
}

/// Variant resolution response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub success: bool,
    /// One of `assigned`, `inactive`, `out_of_audience`, or `error`.
    pub outcome: String,
    pub variant_id: Option<String>,
    /// True when this call minted the assignment; false on replay.
    pub fresh: Option<bool>,
    /// Why an inactive experiment refused, when one did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// The full stored record, in ledger shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment: Option<Assignment>,
    /// The winning arm's config payload, verbatim from the catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<BTreeMap<String, serde_json::Value>>,
    pub error: Option<String>,
}

impl ResolveResponse {
    pub fn assigned(
        assignment: Assignment,
        fresh: bool,
        config: Option<BTreeMap<String, serde_json::Value>>,
    ) -> Self {
        Self {
            success: true,
            outcome: "assigned".to_string(),
            variant_id: Some(assignment.variant_id.as_str().to_string()),
            fresh: Some(fresh),
            reason: None,
            assignment: Some(assignment),
            config,
            error: None,
        }
    }

    pub fn inactive(reason: &str) -> Self {
        Self {
            success: true,
            outcome: "inactive".to_string(),
            variant_id: None,
            fresh: None,
            reason: Some(reason.to_string()),
            assignment: None,
            config: None,
            error: None,
        }
    }

    pub fn out_of_audience() -> Self {
        Self {
            success: true,
            outcome: "out_of_audience".to_string(),
            variant_id: None,
            fresh: None,
            reason: None,
            assignment: None,
            config: None,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            outcome: "error".to_string(),
            variant_id: None,
            fresh: None,
            reason: None,
            assignment: None,
            config: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// CONVERT
// =============================================================================

/// Conversion tracking request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertRequest {
    pub namespace: String,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub signals: Option<DeviceSignals>,
    /// Goal label, e.g. `signup` or `checkout`.
    pub goal: String,
    /// Goal value in the caller's unit. Defaults to 1 when absent.
    #[serde(default)]
    pub value: Option<i64>,
}

impl ConvertRequest {
    /// Validate and extract the experiment namespace.
    pub fn namespace(&self) -> Result<ExperimentId, CohortError> {
        validate_namespace(&self.namespace)
    }

    /// Validate and extract the subject identifier.
    pub fn subject(&self) -> Result<Identifier, CohortError> {
        subject_of(self.identifier.as_ref(), self.signals.as_ref())
    }

    /// Validate and extract the goal label.
    pub fn goal(&self) -> Result<&str, CohortError> {
        if self.goal.is_empty() {
            return Err(CohortError::InvalidConfiguration(
                "goal is empty".to_string(),
            ));
        }
        if self.goal.len() > MAX_GOAL_LENGTH {
            return Err(CohortError::InvalidConfiguration(format!(
                "goal length {} exceeds maximum {} bytes",
                self.goal.len(),
                MAX_GOAL_LENGTH
            )));
        }
        Ok(&self.goal)
    }
}

/// Conversion tracking response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertResponse {
    pub success: bool,
    /// False when the subject holds no variant to convert against.
    pub converted: bool,
    pub variant_id: Option<String>,
    pub goal: Option<String>,
    pub value: Option<i64>,
    pub error: Option<String>,
}

impl ConvertResponse {
    pub fn converted(event: &ConversionEvent) -> Self {
        Self {
            success: true,
            converted: true,
            variant_id: Some(event.variant_id.as_str().to_string()),
            goal: Some(event.goal.clone()),
            value: Some(event.value),
            error: None,
        }
    }

    pub fn skipped() -> Self {
        Self {
            success: true,
            converted: false,
            variant_id: None,
            goal: None,
            value: None,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            converted: false,
            variant_id: None,
            goal: None,
            value: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// AUDIT
// =============================================================================

/// Distribution audit request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRequest {
    pub namespace: String,
    /// Synthetic population size. Defaults to 10,000.
    #[serde(default)]
    pub sample_size: Option<u32>,
    /// Tolerated per-arm drift in basis points. Defaults to 500 (5%).
    #[serde(default)]
    pub tolerance_bp: Option<u32>,
}

impl AuditRequest {
    /// Validate and extract the experiment namespace.
    pub fn namespace(&self) -> Result<ExperimentId, CohortError> {
        validate_namespace(&self.namespace)
    }

    #[must_use]
    pub fn sample_size(&self) -> u32 {
        self.sample_size.unwrap_or(DEFAULT_SAMPLE_SIZE)
    }

    #[must_use]
    pub fn tolerance_bp(&self) -> u32 {
        self.tolerance_bp.unwrap_or(DEFAULT_TOLERANCE_BP)
    }
}

/// Distribution audit response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<DistributionReport>,
    pub within_tolerance: Option<bool>,
    pub error: Option<String>,
}

impl AuditResponse {
    pub fn success(report: DistributionReport, tolerance_bp: u32) -> Self {
        let within = report.within_tolerance(tolerance_bp);
        Self {
            success: true,
            report: Some(report),
            within_tolerance: Some(within),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            report: None,
            within_tolerance: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// ASSIGNMENTS
// =============================================================================

/// Stored assignment listing response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentsResponse {
    pub count: usize,
    pub assignments: Vec<Assignment>,
}

/// Assignment clearing response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearResponse {
    pub success: bool,
    pub removed: Option<usize>,
    pub error: Option<String>,
}

impl ClearResponse {
    pub fn success(removed: usize) -> Self {
        Self {
            success: true,
            removed: Some(removed),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            removed: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// EXPORT
// =============================================================================

/// Ledger export response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub success: bool,
    /// Canonical ledger bytes, Base64 encoded.
    pub data: Option<String>,
    /// Integrity checksum over the exported records.
    pub checksum: Option<u64>,
    pub record_count: Option<usize>,
    pub error: Option<String>,
}

impl ExportResponse {
    pub fn success(data: Vec<u8>, checksum: u64, record_count: usize) -> Self {
        Self {
            success: true,
            data: Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                &data,
            )),
            checksum: Some(checksum),
            record_count: Some(record_count),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            checksum: None,
            record_count: None,
            error: Some(msg.into()),
        }
    }
}
