//! # Audit Module
//!
//! Empirical distribution checks for weight tables.
//!
//! The hash is cheap, not cryptographic, and its uniformity over a
//! concrete weight table is something to measure rather than assume.
//! The audit buckets a synthetic population through the real assignment
//! path and reports how far each arm's observed share drifts from its
//! weight.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::bucket::assign;
use crate::experiment::Experiment;
use crate::types::{CohortError, Identifier, VariantId};

/// Default synthetic population size.
pub const DEFAULT_SAMPLE_SIZE: u32 = 10_000;

/// Default acceptable drift, in basis points of the population.
pub const DEFAULT_TOLERANCE_BP: u32 = 500;

// =============================================================================
// REPORT TYPES
// =============================================================================

/// Observed versus expected share for one arm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmSplit {
    /// The arm under measurement.
    pub variant_id: VariantId,
    /// Subjects the arm actually received.
    pub observed: u64,
    /// Subjects the arm's weight entitles it to.
    pub expected: u64,
    /// Absolute drift as basis points of the population.
    pub deviation_bp: u32,
}

/// Distribution audit result for one experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionReport {
    /// Audited namespace.
    pub namespace: String,
    /// Size of the synthetic population.
    pub sample_size: u32,
    /// Per-arm splits, in weight table order.
    pub splits: Vec<ArmSplit>,
    /// Largest per-arm drift observed.
    pub max_deviation_bp: u32,
}

impl DistributionReport {
    /// Whether every arm stayed within the given drift budget.
    #[must_use]
    pub fn within_tolerance(&self, tolerance_bp: u32) -> bool {
        self.max_deviation_bp <= tolerance_bp
    }
}

// =============================================================================
// AUDIT
// =============================================================================

/// Bucket a synthetic population through an experiment's weight table.
///
/// Subjects are named `subject-0` through `subject-N-1`; the audit is
/// as deterministic as the assignment it measures, so a report can be
/// reproduced anywhere from the experiment definition alone.
pub fn audit_distribution(
    experiment: &Experiment,
    sample_size: u32,
) -> Result<DistributionReport, CohortError> {
    if sample_size == 0 {
        return Err(CohortError::InvalidConfiguration(
            "sample size is zero".to_string(),
        ));
    }

    let mut counts: BTreeMap<VariantId, u64> = experiment
        .variants
        .iter()
        .map(|arm| (arm.id.clone(), 0))
        .collect();

    for i in 0..sample_size {
        let identifier = Identifier::new(format!("subject-{}", i));
        let variant = assign(&identifier, &experiment.id, &experiment.variants)?;
        if let Some(count) = counts.get_mut(&variant) {
            *count = count.saturating_add(1);
        }
    }

    // assign() rejects a zero-total table before the loop runs, so the
    // division below is safe.
    let total_weight = experiment.total_weight();
    let mut splits = Vec::with_capacity(experiment.variants.len());
    let mut max_deviation_bp: u32 = 0;

    // Walk the table rather than the count map so the report reads in
    // the same order as the experiment definition.
    for arm in &experiment.variants {
        let observed = counts.get(&arm.id).copied().unwrap_or(0);
        let expected = u64::from(sample_size)
            .saturating_mul(u64::from(arm.weight.value()))
            / total_weight;

        let drift = observed.abs_diff(expected).saturating_mul(10_000) / u64::from(sample_size);
        let deviation_bp = u32::try_from(drift).unwrap_or(u32::MAX);
        max_deviation_bp = max_deviation_bp.max(deviation_bp);

        splits.push(ArmSplit {
            variant_id: arm.id.clone(),
            observed,
            expected,
            deviation_bp,
        });
    }

    Ok(DistributionReport {
        namespace: experiment.id.as_str().to_string(),
        sample_size,
        splits,
        max_deviation_bp,
    })
}

// =============================================================================
// TESTS
// =============================================================================
