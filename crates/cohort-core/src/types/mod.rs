//! # Core Types Module
//!
//! The primitive vocabulary of Cohort: identifiers, weights, the
//! persisted assignment record, and the error taxonomy.
//!
//! Everything here is deliberately small. Newtypes keep namespaces,
//! variant ids, and subject identifiers from being confused for one
//! another at call sites; the engine never passes bare strings around.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// IDENTIFIER NEWTYPES
// =============================================================================

/// The namespace naming one experiment.
///
/// Combined with an [`Identifier`] to form the hash seed, and used as
/// the storage key for the experiment's assignment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExperimentId(String);

impl ExperimentId {
    /// Create a new experiment id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The id of one variant arm, returned to callers on assignment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariantId(String);

impl VariantId {
    /// Create a new variant id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An opaque subject identifier.
///
/// Best-effort and non-cryptographic: it exists to keep bucketing
/// stable, not to authenticate anyone. Collisions are acceptable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identifier(String);

impl Identifier {
    /// Create a new identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// WEIGHT
// =============================================================================

/// The weight of one variant arm in the table walk.
///
/// Weights are relative shares, not percentages; only the ratio between
/// arms matters. A zero weight is legal and makes the arm unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Weight(u32);

impl Weight {
    /// Create a new weight.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// The raw weight value.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Whether this arm occupies a zero-width interval.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

// =============================================================================
// ASSIGNMENT RECORD
// =============================================================================

/// One persisted variant assignment.
///
/// Stored as JSON keyed by namespace; the camelCase field names are the
/// on-disk record format and must not drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    /// The experiment this assignment belongs to.
    pub namespace: ExperimentId,

    /// The variant the subject holds.
    pub variant_id: VariantId,

    /// When the assignment was created, in epoch milliseconds.
    pub assigned_at_epoch_millis: u64,

    /// The subject the assignment was computed for.
    pub identifier: Identifier,
}

impl Assignment {
    /// Create a new assignment record.
    #[must_use]
    pub fn new(
        namespace: ExperimentId,
        variant_id: VariantId,
        assigned_at_epoch_millis: u64,
        identifier: Identifier,
    ) -> Self {
        Self {
            namespace,
            variant_id,
            assigned_at_epoch_millis,
            identifier,
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Errors produced by the Cohort engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CohortError {
    /// An experiment definition cannot produce a valid bucketing.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The requested experiment is not in the catalog.
    #[error("Experiment not found: {0}")]
    ExperimentNotFound(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn weight_zero_is_zero() {
        assert!(Weight::new(0).is_zero());
        assert!(!Weight::new(1).is_zero());
    }

    #[test]
    fn newtypes_round_trip_as_str() {
        assert_eq!(ExperimentId::new("homepage_cta_test").as_str(), "homepage_cta_test");
        assert_eq!(VariantId::new("control").as_str(), "control");
        assert_eq!(Identifier::new("abc123").as_str(), "abc123");
    }

    #[test]
    fn assignment_serializes_with_record_field_names() {
        let assignment = Assignment::new(
            ExperimentId::new("homepage_cta_test"),
            VariantId::new("control"),
            1_700_000_000_000,
            Identifier::new("abc123"),
        );

        let json = serde_json::to_string(&assignment).expect("serialize");
        assert!(json.contains("\"namespace\":\"homepage_cta_test\""));
        assert!(json.contains("\"variantId\":\"control\""));
        assert!(json.contains("\"assignedAtEpochMillis\":1700000000000"));
        assert!(json.contains("\"identifier\":\"abc123\""));
    }

    #[test]
    fn assignment_json_round_trip() {
        let original = Assignment::new(
            ExperimentId::new("ns"),
            VariantId::new("variant_a"),
            42,
            Identifier::new("subject"),
        );

        let json = serde_json::to_string(&original).expect("serialize");
        let parsed: Assignment = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, original);
    }

    #[test]
    fn error_messages_name_the_problem() {
        let err = CohortError::InvalidConfiguration("total weight is zero".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: total weight is zero");

        let err = CohortError::ExperimentNotFound("gone".to_string());
        assert_eq!(err.to_string(), "Experiment not found: gone");
    }

    #[test]
    fn identifier_ordering_is_deterministic() {
        let mut ids = [
            Identifier::new("charlie"),
            Identifier::new("alpha"),
            Identifier::new("bravo"),
        ];
        ids.sort();
        assert_eq!(ids[0].as_str(), "alpha");
        assert_eq!(ids[2].as_str(), "charlie");
    }
}
