//! # Experiment Module
//!
//! Experiment definitions and the validated catalog.
//!
//! - An experiment is a namespace, a schedule window, a weight table,
//!   and an optional audience gate
//! - Validation is eager: a definition is checked once, on insert, and
//!   the resolver trusts the catalog from then on
//! - The catalog is an explicit value injected into a session; there is
//!   no process-global registry

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::primitives::{
    MAX_CATALOG_EXPERIMENTS, MAX_NAMESPACE_LENGTH, MAX_VARIANT_ID_LENGTH,
    MAX_VARIANTS_PER_EXPERIMENT,
};
use crate::types::{CohortError, ExperimentId, VariantId, Weight};

// =============================================================================
// VARIANT ARMS
// =============================================================================

/// One arm of an experiment's weight table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantArm {
    /// Variant id returned to callers on assignment.
    pub id: VariantId,

    /// Human-readable label for dashboards and logs.
    pub name: String,

    /// Share of the weight table. Zero-width arms can never win.
    pub weight: Weight,

    /// Opaque payload handed back verbatim with the winning arm.
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
}

impl VariantArm {
    /// Create an arm with an empty config payload.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, weight: u32) -> Self {
        Self {
            id: VariantId::new(id),
            name: name.into(),
            weight: Weight::new(weight),
            config: BTreeMap::new(),
        }
    }

    /// Attach a config payload.
    #[must_use]
    pub fn with_config(mut self, config: BTreeMap<String, serde_json::Value>) -> Self {
        self.config = config;
        self
    }
}

// =============================================================================
// AUDIENCE
// =============================================================================

/// Percentage gate restricting who may enter an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudienceRule {
    /// Share of subjects admitted, 0 to 100.
    pub percentage: u8,

    /// Informational targeting notes. Not evaluated by the engine; the
    /// embedding application decides what, if anything, they mean.
    #[serde(default)]
    pub conditions: BTreeMap<String, serde_json::Value>,
}

impl AudienceRule {
    /// A bare percentage rule with no conditions.
    #[must_use]
    pub fn percent(percentage: u8) -> Self {
        Self {
            percentage,
            conditions: BTreeMap::new(),
        }
    }
}

// =============================================================================
// EXPERIMENT
// =============================================================================

/// A complete experiment definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    /// Namespace. Doubles as the storage key for assignments, so it is
    /// immutable for the lifetime of the experiment.
    pub id: ExperimentId,

    /// Human-readable name.
    pub name: String,

    /// Free-form description.
    #[serde(default)]
    pub description: String,

    /// Disabled experiments resolve to nothing, stored assignments
    /// included.
    pub enabled: bool,

    /// Window start in epoch milliseconds, inclusive.
    pub starts_at_epoch_millis: u64,

    /// Window end in epoch milliseconds, inclusive. Open-ended when
    /// absent.
    #[serde(default)]
    pub ends_at_epoch_millis: Option<u64>,

    /// The ordered weight table.
    pub variants: Vec<VariantArm>,

    /// Optional audience gate. Absent means everyone is admitted.
    #[serde(default)]
    pub audience: Option<AudienceRule>,
}

impl Experiment {
    /// Validate this definition.
    ///
    /// Rejections here are `InvalidConfiguration`: a misconfigured
    /// experiment must not run at all rather than bucket strangely.
    pub fn validate(&self) -> Result<(), CohortError> {
        let id = self.id.as_str();
        if id.is_empty() {
            return Err(CohortError::InvalidConfiguration(
                "experiment id is empty".to_string(),
            ));
        }
        if id.len() > MAX_NAMESPACE_LENGTH {
            return Err(CohortError::InvalidConfiguration(format!(
                "experiment id exceeds {} bytes",
                MAX_NAMESPACE_LENGTH
            )));
        }

        if self.variants.is_empty() {
            return Err(CohortError::InvalidConfiguration(format!(
                "experiment {} has no variants",
                id
            )));
        }
        if self.variants.len() > MAX_VARIANTS_PER_EXPERIMENT {
            return Err(CohortError::InvalidConfiguration(format!(
                "experiment {} exceeds {} variants",
                id, MAX_VARIANTS_PER_EXPERIMENT
            )));
        }

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for arm in &self.variants {
            let variant = arm.id.as_str();
            if variant.is_empty() {
                return Err(CohortError::InvalidConfiguration(format!(
                    "experiment {} has a variant with an empty id",
                    id
                )));
            }
            if variant.len() > MAX_VARIANT_ID_LENGTH {
                return Err(CohortError::InvalidConfiguration(format!(
                    "variant id in experiment {} exceeds {} bytes",
                    id, MAX_VARIANT_ID_LENGTH
                )));
            }
            if !seen.insert(variant) {
                return Err(CohortError::InvalidConfiguration(format!(
                    "duplicate variant id {} in experiment {}",
                    variant, id
                )));
            }
        }

        if self.total_weight() == 0 {
            return Err(CohortError::InvalidConfiguration(format!(
                "total weight of experiment {} is zero",
                id
            )));
        }

        if let Some(rule) = &self.audience {
            if rule.percentage > 100 {
                return Err(CohortError::InvalidConfiguration(format!(
                    "audience percentage of experiment {} is above 100",
                    id
                )));
            }
        }

        if let Some(end) = self.ends_at_epoch_millis {
            if end < self.starts_at_epoch_millis {
                return Err(CohortError::InvalidConfiguration(format!(
                    "window of experiment {} ends before it starts",
                    id
                )));
            }
        }

        Ok(())
    }

    /// Sum of all arm weights.
    #[must_use]
    pub fn total_weight(&self) -> u64 {
        self.variants
            .iter()
            .map(|arm| u64::from(arm.weight.value()))
            .sum()
    }

    /// Whether this experiment serves variants at the given time.
    #[must_use]
    pub fn is_running(&self, now_epoch_millis: u64) -> bool {
        self.enabled
            && now_epoch_millis >= self.starts_at_epoch_millis
            && self
                .ends_at_epoch_millis
                .is_none_or(|end| now_epoch_millis <= end)
    }

    /// Look up an arm by variant id.
    #[must_use]
    pub fn arm(&self, variant_id: &VariantId) -> Option<&VariantArm> {
        self.variants.iter().find(|arm| &arm.id == variant_id)
    }
}

// =============================================================================
// CATALOG
// =============================================================================

/// A validated collection of experiments, keyed by namespace.
///
/// Ordering is deterministic by id. Re-inserting an existing id
/// replaces the definition; stored assignments are untouched by catalog
/// changes.
#[derive(Debug, Clone, Default)]
pub struct ExperimentCatalog {
    experiments: BTreeMap<ExperimentId, Experiment>,
}

impl ExperimentCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a sequence of definitions.
    ///
    /// Fails on the first invalid definition; a partially valid catalog
    /// is not a catalog.
    pub fn from_experiments(
        experiments: impl IntoIterator<Item = Experiment>,
    ) -> Result<Self, CohortError> {
        let mut catalog = Self::new();
        for experiment in experiments {
            catalog.insert(experiment)?;
        }
        Ok(catalog)
    }

    /// Validate and insert one experiment.
    pub fn insert(&mut self, experiment: Experiment) -> Result<(), CohortError> {
        experiment.validate()?;

        if self.experiments.len() >= MAX_CATALOG_EXPERIMENTS
            && !self.experiments.contains_key(&experiment.id)
        {
            return Err(CohortError::InvalidConfiguration(format!(
                "catalog is full ({} experiments)",
                MAX_CATALOG_EXPERIMENTS
            )));
        }

        self.experiments.insert(experiment.id.clone(), experiment);
        Ok(())
    }

    /// Look up an experiment by id.
    #[must_use]
    pub fn get(&self, id: &ExperimentId) -> Option<&Experiment> {
        self.experiments.get(id)
    }

    /// Whether an experiment id is present.
    #[must_use]
    pub fn contains(&self, id: &ExperimentId) -> bool {
        self.experiments.contains_key(id)
    }

    /// Number of experiments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    /// Iterate over all experiments in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Experiment> {
        self.experiments.values()
    }

    /// Experiments serving variants at the given time, in id order.
    #[must_use]
    pub fn running(&self, now_epoch_millis: u64) -> Vec<&Experiment> {
        self.experiments
            .values()
            .filter(|experiment| experiment.is_running(now_epoch_millis))
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn two_arm_experiment(id: &str) -> Experiment {
        Experiment {
            id: ExperimentId::new(id),
            name: "Two arms".to_string(),
            description: String::new(),
            enabled: true,
            starts_at_epoch_millis: 0,
            ends_at_epoch_millis: None,
            variants: vec![
                VariantArm::new("control", "Control", 50),
                VariantArm::new("variant_a", "Variant A", 50),
            ],
            audience: None,
        }
    }

    #[test]
    fn valid_experiment_passes() {
        assert!(two_arm_experiment("homepage_cta_test").validate().is_ok());
    }

    #[test]
    fn empty_variant_list_is_rejected() {
        let mut experiment = two_arm_experiment("empty");
        experiment.variants.clear();

        let err = experiment.validate().unwrap_err();
        assert!(matches!(err, CohortError::InvalidConfiguration(_)));
    }

    #[test]
    fn zero_total_weight_is_rejected() {
        let mut experiment = two_arm_experiment("zero");
        for arm in &mut experiment.variants {
            arm.weight = Weight::new(0);
        }

        let err = experiment.validate().unwrap_err();
        assert!(err.to_string().contains("total weight"));
    }

    #[test]
    fn duplicate_variant_ids_are_rejected() {
        let mut experiment = two_arm_experiment("dup");
        experiment.variants.push(VariantArm::new("control", "Again", 10));

        let err = experiment.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate variant id"));
    }

    #[test]
    fn audience_above_100_is_rejected() {
        let mut experiment = two_arm_experiment("audience");
        experiment.audience = Some(AudienceRule::percent(101));

        assert!(experiment.validate().is_err());
    }

    #[test]
    fn inverted_window_is_rejected() {
        let mut experiment = two_arm_experiment("window");
        experiment.starts_at_epoch_millis = 2_000;
        experiment.ends_at_epoch_millis = Some(1_000);

        assert!(experiment.validate().is_err());
    }

    #[test]
    fn empty_id_is_rejected() {
        let experiment = two_arm_experiment("");
        assert!(experiment.validate().is_err());
    }

    #[test]
    fn is_running_respects_window_and_flag() {
        let mut experiment = two_arm_experiment("window");
        experiment.starts_at_epoch_millis = 1_000;
        experiment.ends_at_epoch_millis = Some(2_000);

        assert!(!experiment.is_running(999));
        assert!(experiment.is_running(1_000));
        assert!(experiment.is_running(1_500));
        assert!(experiment.is_running(2_000));
        assert!(!experiment.is_running(2_001));

        experiment.enabled = false;
        assert!(!experiment.is_running(1_500));
    }

    #[test]
    fn open_ended_window_never_ends() {
        let experiment = two_arm_experiment("open");
        assert!(experiment.is_running(u64::MAX));
    }

    #[test]
    fn zero_weight_arms_do_not_affect_total() {
        let mut experiment = two_arm_experiment("partial");
        experiment.variants.push(VariantArm::new("dormant", "Dormant", 0));

        assert!(experiment.validate().is_ok());
        assert_eq!(experiment.total_weight(), 100);
    }

    #[test]
    fn catalog_insert_and_lookup() {
        let mut catalog = ExperimentCatalog::new();
        catalog.insert(two_arm_experiment("a")).expect("insert");
        catalog.insert(two_arm_experiment("b")).expect("insert");

        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains(&ExperimentId::new("a")));
        assert!(catalog.get(&ExperimentId::new("b")).is_some());
        assert!(catalog.get(&ExperimentId::new("c")).is_none());
    }

    #[test]
    fn catalog_rejects_invalid_definitions() {
        let mut catalog = ExperimentCatalog::new();
        let mut broken = two_arm_experiment("broken");
        broken.variants.clear();

        assert!(catalog.insert(broken).is_err());
        assert!(catalog.is_empty());
    }

    #[test]
    fn catalog_replaces_on_reinsert() {
        let mut catalog = ExperimentCatalog::new();
        catalog.insert(two_arm_experiment("a")).expect("insert");

        let mut updated = two_arm_experiment("a");
        updated.name = "Renamed".to_string();
        catalog.insert(updated).expect("reinsert");

        assert_eq!(catalog.len(), 1);
        let stored = catalog.get(&ExperimentId::new("a")).expect("present");
        assert_eq!(stored.name, "Renamed");
    }

    #[test]
    fn running_filters_by_window() {
        let mut catalog = ExperimentCatalog::new();

        let mut past = two_arm_experiment("past");
        past.starts_at_epoch_millis = 0;
        past.ends_at_epoch_millis = Some(100);
        catalog.insert(past).expect("insert");

        let mut live = two_arm_experiment("live");
        live.starts_at_epoch_millis = 0;
        catalog.insert(live).expect("insert");

        let mut off = two_arm_experiment("off");
        off.enabled = false;
        catalog.insert(off).expect("insert");

        let running = catalog.running(500);
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id.as_str(), "live");
    }

    #[test]
    fn arm_lookup_by_variant_id() {
        let experiment = two_arm_experiment("lookup");
        let arm = experiment.arm(&VariantId::new("variant_a")).expect("arm");
        assert_eq!(arm.name, "Variant A");
        assert!(experiment.arm(&VariantId::new("missing")).is_none());
    }
}
