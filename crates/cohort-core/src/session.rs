//! # Session Module
//!
//! Session management combining a catalog, an assignment store, and an
//! event buffer.
//!
//! `resolve` is the one entry point embedders call per experiment, and
//! its steps run in a fixed order:
//! 1. Liveness: unknown, disabled, or out-of-window experiments resolve
//!    to `Inactive` before anything else is consulted
//! 2. Sticky replay: a stored assignment is returned as-is, without
//!    re-checking the audience gate
//! 3. Fresh assignment: the audience gate, then the weighted walk, then
//!    persist and record an exposure event
//!
//! The order is observable. A subject assigned before an audience
//! percentage was lowered keeps their variant, and a window that closes
//! stops serving even subjects with stored assignments.
//!
//! ## Store Backends
//!
//! Session supports two assignment stores:
//! - `Memory`: volatile `MemoryStore` (tests, embedders that persist elsewhere)
//! - `Persistent`: `RedbStore` for disk-backed ACID storage

use std::collections::BTreeMap;
use std::path::Path;

use crate::bucket::{assign, in_audience};
use crate::events::{ConversionEvent, Event, EventLog, ExposureEvent};
use crate::experiment::{Experiment, ExperimentCatalog};
use crate::storage::RedbStore;
use crate::store::{AssignmentStore, MemoryStore};
use crate::types::{Assignment, CohortError, ExperimentId, Identifier, VariantId};

// =============================================================================
// ERROR LOGGING HELPERS
// =============================================================================

/// Log a store error and convert Result to a default value.
///
/// Failed reads must not fail a resolution: a subject we cannot look up
/// is treated as a subject with no prior assignment, and the rebucket
/// lands on the same variant anyway. The error is logged first so the
/// failure is never silent.
///
/// Uses stderr logging for the core crate (no tracing dependency here).
/// The app layer redirects stderr through its own subscriber if needed.
#[inline]
fn log_and_default<T: Default>(result: Result<T, CohortError>, context: &str) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            eprintln!(
                "{{\"level\":\"warn\",\"target\":\"cohort_core::session\",\"message\":\"store error in {}: {}\"}}",
                context, e
            );
            T::default()
        }
    }
}

// =============================================================================
// RESOLUTION OUTCOMES
// =============================================================================

/// Why an experiment resolved to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactiveReason {
    /// The namespace is not in the catalog.
    UnknownExperiment,
    /// The experiment exists but is switched off.
    Disabled,
    /// The window has not opened yet.
    NotStarted,
    /// The window has closed.
    Ended,
}

impl InactiveReason {
    /// Stable label for logs and API payloads.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownExperiment => "unknown_experiment",
            Self::Disabled => "disabled",
            Self::NotStarted => "not_started",
            Self::Ended => "ended",
        }
    }
}

/// Outcome of resolving one experiment for one subject.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The subject has a variant.
    Assigned {
        /// The stored or newly created record.
        assignment: Assignment,
        /// True when this resolution created the record.
        fresh: bool,
    },
    /// The experiment is not serving variants right now.
    Inactive(InactiveReason),
    /// The subject fell outside the audience gate.
    OutOfAudience,
}

impl Resolution {
    /// The assigned variant, when there is one.
    #[must_use]
    pub fn variant_id(&self) -> Option<&VariantId> {
        match self {
            Self::Assigned { assignment, .. } => Some(&assignment.variant_id),
            Self::Inactive(_) | Self::OutOfAudience => None,
        }
    }
}

// =============================================================================
// STORE BACKEND
// =============================================================================

/// Assignment store backend for a Session.
#[derive(Debug)]
pub enum StoreBackend {
    /// In-memory store (fast, volatile).
    Memory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StoreBackend {
    fn default() -> Self {
        Self::Memory(MemoryStore::new())
    }
}

// NOTE: StoreBackend does NOT implement Clone.
// RedbStore holds an exclusive database handle that cannot be safely cloned.

/// Borrow the active store. Free functions rather than methods so the
/// borrow covers only the backend field and a catalog borrow can stay
/// live across the call.
fn store_of(backend: &StoreBackend) -> &dyn AssignmentStore {
    match backend {
        StoreBackend::Memory(store) => store,
        StoreBackend::Persistent(store) => store,
    }
}

fn store_of_mut(backend: &mut StoreBackend) -> &mut dyn AssignmentStore {
    match backend {
        StoreBackend::Memory(store) => store,
        StoreBackend::Persistent(store) => store,
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// A Session binds an experiment catalog to an assignment store and an
/// event buffer.
///
/// The session never reads a clock; callers pass the current time into
/// every operation that needs one. Two sessions fed the same catalog,
/// subjects, and timestamps behave identically.
#[derive(Debug, Default)]
pub struct Session {
    /// The assignment store backend (in-memory or persistent).
    backend: StoreBackend,
    /// The validated experiment catalog.
    catalog: ExperimentCatalog,
    /// Buffered exposure and conversion events.
    events: EventLog,
}

impl Session {
    /// Create an empty session with in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an in-memory session with a catalog.
    #[must_use]
    pub fn with_catalog(catalog: ExperimentCatalog) -> Self {
        Self {
            backend: StoreBackend::default(),
            catalog,
            events: EventLog::new(),
        }
    }

    /// Create a session with persistent redb storage.
    ///
    /// Opens or creates an assignment database at the given path.
    /// Assignments written through this session survive restarts.
    pub fn open(path: impl AsRef<Path>, catalog: ExperimentCatalog) -> Result<Self, CohortError> {
        let store = RedbStore::open(path)?;
        Ok(Self {
            backend: StoreBackend::Persistent(store),
            catalog,
            events: EventLog::new(),
        })
    }

    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StoreBackend::Persistent(_))
    }

    /// Get a reference to the catalog.
    #[must_use]
    pub fn catalog(&self) -> &ExperimentCatalog {
        &self.catalog
    }

    /// Replace the catalog.
    ///
    /// Stored assignments are untouched; subjects assigned under the
    /// old catalog keep their variants as long as the experiment stays
    /// live.
    pub fn set_catalog(&mut self, catalog: ExperimentCatalog) {
        self.catalog = catalog;
    }

    // =========================================================================
    // RESOLUTION
    // =========================================================================

    /// Resolve one experiment for one subject.
    ///
    /// # Errors
    ///
    /// Propagates store write failures. A failed read is downgraded to
    /// "no prior assignment" and logged.
    pub fn resolve(
        &mut self,
        identifier: &Identifier,
        namespace: &ExperimentId,
        now_epoch_millis: u64,
    ) -> Result<Resolution, CohortError> {
        let Some(experiment) = self.catalog.get(namespace) else {
            return Ok(Resolution::Inactive(InactiveReason::UnknownExperiment));
        };

        if !experiment.enabled {
            return Ok(Resolution::Inactive(InactiveReason::Disabled));
        }
        if now_epoch_millis < experiment.starts_at_epoch_millis {
            return Ok(Resolution::Inactive(InactiveReason::NotStarted));
        }
        if experiment
            .ends_at_epoch_millis
            .is_some_and(|end| now_epoch_millis > end)
        {
            return Ok(Resolution::Inactive(InactiveReason::Ended));
        }

        // Sticky replay. A stored assignment wins over everything
        // below, the audience gate included.
        let stored = log_and_default(store_of(&self.backend).get(namespace), "resolve");
        if let Some(assignment) = stored {
            return Ok(Resolution::Assigned {
                assignment,
                fresh: false,
            });
        }

        if !in_audience(identifier, namespace.as_str(), experiment.audience.as_ref()) {
            return Ok(Resolution::OutOfAudience);
        }

        let variant_id = assign(identifier, namespace, &experiment.variants)?;
        let assignment = Assignment::new(
            namespace.clone(),
            variant_id.clone(),
            now_epoch_millis,
            identifier.clone(),
        );

        store_of_mut(&mut self.backend).put(assignment.clone())?;
        self.events.record(Event::Exposure(ExposureEvent {
            namespace: namespace.clone(),
            variant_id,
            identifier: identifier.clone(),
            at_epoch_millis: now_epoch_millis,
        }));

        Ok(Resolution::Assigned {
            assignment,
            fresh: true,
        })
    }

    /// Record a goal completion against the subject's assignment.
    ///
    /// Resolves first, so a conversion can assign a previously unseen
    /// subject. Returns `None` when the subject has no variant (the
    /// experiment is inactive or the subject is out of audience).
    ///
    /// An omitted value counts as one unit; an explicit zero is kept.
    pub fn convert(
        &mut self,
        identifier: &Identifier,
        namespace: &ExperimentId,
        goal: &str,
        value: Option<i64>,
        now_epoch_millis: u64,
    ) -> Result<Option<ConversionEvent>, CohortError> {
        let resolution = self.resolve(identifier, namespace, now_epoch_millis)?;
        let Resolution::Assigned { assignment, .. } = resolution else {
            return Ok(None);
        };

        let event = ConversionEvent {
            namespace: assignment.namespace,
            variant_id: assignment.variant_id,
            identifier: identifier.clone(),
            goal: goal.to_string(),
            value: value.unwrap_or(1),
            at_epoch_millis: now_epoch_millis,
        };
        self.events.record(Event::Conversion(event.clone()));
        Ok(Some(event))
    }

    /// The config payload of the subject's variant, when they have one.
    pub fn variant_config(
        &mut self,
        identifier: &Identifier,
        namespace: &ExperimentId,
        now_epoch_millis: u64,
    ) -> Result<Option<BTreeMap<String, serde_json::Value>>, CohortError> {
        let resolution = self.resolve(identifier, namespace, now_epoch_millis)?;
        let Some(variant_id) = resolution.variant_id() else {
            return Ok(None);
        };

        Ok(self
            .catalog
            .get(namespace)
            .and_then(|experiment| experiment.arm(variant_id))
            .map(|arm| arm.config.clone()))
    }

    // =========================================================================
    // ASSIGNMENT MANAGEMENT
    // =========================================================================

    /// All stored assignments, in namespace order.
    #[must_use]
    pub fn assignments(&self) -> Vec<Assignment> {
        log_and_default(store_of(&self.backend).all(), "assignments")
    }

    /// Number of stored assignments.
    #[must_use]
    pub fn assignment_count(&self) -> usize {
        log_and_default(store_of(&self.backend).len(), "assignment_count")
    }

    /// Store a batch of assignment records, replacing per namespace.
    ///
    /// This is the landing side of a ledger import: records written
    /// here replay on the next resolution exactly like assignments the
    /// session made itself.
    pub fn import_assignments(
        &mut self,
        assignments: Vec<Assignment>,
    ) -> Result<usize, CohortError> {
        let store = store_of_mut(&mut self.backend);
        let count = assignments.len();
        for assignment in assignments {
            store.put(assignment)?;
        }
        Ok(count)
    }

    /// Remove every stored assignment, returning how many were removed.
    ///
    /// Affected subjects are rebucketed on their next resolution; with
    /// an unchanged weight table they land on the same variant.
    pub fn clear_assignments(&mut self) -> Result<usize, CohortError> {
        let store = store_of_mut(&mut self.backend);
        let removed = store.len()?;
        store.clear()?;
        Ok(removed)
    }

    /// Experiments serving variants at the given time, in id order.
    #[must_use]
    pub fn running_experiments(&self, now_epoch_millis: u64) -> Vec<&Experiment> {
        self.catalog.running(now_epoch_millis)
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    /// Get a reference to the buffered events.
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Take every buffered event, leaving the buffer empty.
    #[must_use]
    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::experiment::{AudienceRule, VariantArm};
    use tempfile::tempdir;

    fn cta_experiment() -> Experiment {
        Experiment {
            id: ExperimentId::new("homepage_cta_test"),
            name: "Homepage CTA".to_string(),
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

    fn session_with(experiment: Experiment) -> Session {
        let catalog = ExperimentCatalog::from_experiments([experiment]).expect("catalog");
        Session::with_catalog(catalog)
    }

    fn subject() -> Identifier {
        Identifier::new("abc123")
    }

    fn namespace() -> ExperimentId {
        ExperimentId::new("homepage_cta_test")
    }

    #[test]
    fn unknown_namespace_is_inactive() {
        let mut session = Session::new();
        let resolution = session
            .resolve(&subject(), &namespace(), 1_000)
            .expect("resolve");
        assert_eq!(
            resolution,
            Resolution::Inactive(InactiveReason::UnknownExperiment)
        );
    }

    #[test]
    fn disabled_experiment_is_inactive() {
        let mut experiment = cta_experiment();
        experiment.enabled = false;
        let mut session = session_with(experiment);

        let resolution = session
            .resolve(&subject(), &namespace(), 1_000)
            .expect("resolve");
        assert_eq!(resolution, Resolution::Inactive(InactiveReason::Disabled));
        assert_eq!(session.assignment_count(), 0);
    }

    #[test]
    fn early_resolution_is_inactive() {
        let mut experiment = cta_experiment();
        experiment.starts_at_epoch_millis = 5_000;
        let mut session = session_with(experiment);

        let resolution = session
            .resolve(&subject(), &namespace(), 1_000)
            .expect("resolve");
        assert_eq!(resolution, Resolution::Inactive(InactiveReason::NotStarted));
    }

    #[test]
    fn late_resolution_is_inactive() {
        let mut experiment = cta_experiment();
        experiment.ends_at_epoch_millis = Some(2_000);
        let mut session = session_with(experiment);

        let resolution = session
            .resolve(&subject(), &namespace(), 3_000)
            .expect("resolve");
        assert_eq!(resolution, Resolution::Inactive(InactiveReason::Ended));
    }

    #[test]
    fn known_subject_resolves_to_control() {
        let mut session = session_with(cta_experiment());

        let resolution = session
            .resolve(&subject(), &namespace(), 1_000)
            .expect("resolve");
        assert_eq!(
            resolution.variant_id().map(VariantId::as_str),
            Some("control")
        );
    }

    #[test]
    fn first_resolution_assigns_and_sticks() {
        let mut session = session_with(cta_experiment());

        let first = session
            .resolve(&subject(), &namespace(), 1_000)
            .expect("resolve");
        let Resolution::Assigned { assignment, fresh } = first else {
            panic!("expected assignment");
        };
        assert!(fresh);
        assert_eq!(assignment.assigned_at_epoch_millis, 1_000);

        let second = session
            .resolve(&subject(), &namespace(), 9_000)
            .expect("resolve");
        let Resolution::Assigned { assignment: replay, fresh } = second else {
            panic!("expected assignment");
        };
        assert!(!fresh);
        assert_eq!(replay.variant_id, assignment.variant_id);
        // The replayed record keeps the original timestamp.
        assert_eq!(replay.assigned_at_epoch_millis, 1_000);
    }

    #[test]
    fn stored_assignment_survives_weight_changes() {
        let mut session = session_with(cta_experiment());
        let first = session
            .resolve(&subject(), &namespace(), 1_000)
            .expect("resolve");
        assert_eq!(first.variant_id().map(VariantId::as_str), Some("control"));

        // Reweight so a fresh bucket would land on variant_a.
        let mut reweighted = cta_experiment();
        reweighted.variants = vec![
            VariantArm::new("control", "Control", 0),
            VariantArm::new("variant_a", "Variant A", 100),
        ];
        session.set_catalog(ExperimentCatalog::from_experiments([reweighted]).expect("catalog"));

        let replay = session
            .resolve(&subject(), &namespace(), 2_000)
            .expect("resolve");
        assert_eq!(replay.variant_id().map(VariantId::as_str), Some("control"));
    }

    #[test]
    fn closed_window_stops_serving_stored_assignments() {
        let mut experiment = cta_experiment();
        experiment.ends_at_epoch_millis = Some(2_000);
        let mut session = session_with(experiment);

        let during = session
            .resolve(&subject(), &namespace(), 1_000)
            .expect("resolve");
        assert!(during.variant_id().is_some());

        let after = session
            .resolve(&subject(), &namespace(), 3_000)
            .expect("resolve");
        assert_eq!(after, Resolution::Inactive(InactiveReason::Ended));
    }

    #[test]
    fn zero_percent_audience_excludes_everyone() {
        let mut experiment = cta_experiment();
        experiment.audience = Some(AudienceRule::percent(0));
        let mut session = session_with(experiment);

        for i in 0..50 {
            let identifier = Identifier::new(format!("subject-{}", i));
            let resolution = session
                .resolve(&identifier, &namespace(), 1_000)
                .expect("resolve");
            assert_eq!(resolution, Resolution::OutOfAudience);
        }
        assert_eq!(session.assignment_count(), 0);
        assert!(session.events().is_empty());
    }

    #[test]
    fn full_audience_admits_everyone() {
        let mut experiment = cta_experiment();
        experiment.audience = Some(AudienceRule::percent(100));
        let mut session = session_with(experiment);

        for i in 0..50 {
            let identifier = Identifier::new(format!("subject-{}", i));
            let resolution = session
                .resolve(&identifier, &namespace(), 1_000)
                .expect("resolve");
            assert!(resolution.variant_id().is_some());
        }
        assert_eq!(session.assignment_count(), 50);
    }

    #[test]
    fn audience_is_not_rechecked_once_assigned() {
        let mut session = session_with(cta_experiment());
        session
            .resolve(&subject(), &namespace(), 1_000)
            .expect("resolve");

        // Tighten the audience to nobody after the fact.
        let mut gated = cta_experiment();
        gated.audience = Some(AudienceRule::percent(0));
        session.set_catalog(ExperimentCatalog::from_experiments([gated]).expect("catalog"));

        let replay = session
            .resolve(&subject(), &namespace(), 2_000)
            .expect("resolve");
        let Resolution::Assigned { fresh, .. } = replay else {
            panic!("expected replay");
        };
        assert!(!fresh);
    }

    #[test]
    fn exposure_is_recorded_once_per_subject() {
        let mut session = session_with(cta_experiment());

        session
            .resolve(&subject(), &namespace(), 1_000)
            .expect("resolve");
        session
            .resolve(&subject(), &namespace(), 2_000)
            .expect("resolve");

        assert_eq!(session.events().len(), 1);
        let drained = session.drain_events();
        assert!(matches!(drained[0], Event::Exposure(_)));
        assert!(session.events().is_empty());
    }

    #[test]
    fn conversion_defaults_to_one_unit() {
        let mut session = session_with(cta_experiment());

        let event = session
            .convert(&subject(), &namespace(), "signup", None, 1_000)
            .expect("convert")
            .expect("assigned");
        assert_eq!(event.value, 1);
        assert_eq!(event.goal, "signup");

        // One exposure (from the implicit resolve) plus one conversion.
        assert_eq!(session.events().len(), 2);
    }

    #[test]
    fn explicit_zero_conversion_value_is_kept() {
        let mut session = session_with(cta_experiment());

        let event = session
            .convert(&subject(), &namespace(), "browse", Some(0), 1_000)
            .expect("convert")
            .expect("assigned");
        assert_eq!(event.value, 0);
    }

    #[test]
    fn conversion_without_assignment_yields_none() {
        let mut experiment = cta_experiment();
        experiment.audience = Some(AudienceRule::percent(0));
        let mut session = session_with(experiment);

        let event = session
            .convert(&subject(), &namespace(), "signup", None, 1_000)
            .expect("convert");
        assert!(event.is_none());
        assert!(session.events().is_empty());
    }

    #[test]
    fn variant_config_returns_the_arm_payload() {
        let mut experiment = cta_experiment();
        let mut payload = BTreeMap::new();
        payload.insert(
            "button_color".to_string(),
            serde_json::Value::String("green".to_string()),
        );
        experiment.variants[0] =
            VariantArm::new("control", "Control", 50).with_config(payload.clone());
        let mut session = session_with(experiment);

        let config = session
            .variant_config(&subject(), &namespace(), 1_000)
            .expect("resolve")
            .expect("assigned");
        assert_eq!(config, payload);
    }

    #[test]
    fn clear_then_resolve_rebuckets_to_the_same_variant() {
        let mut session = session_with(cta_experiment());

        let before = session
            .resolve(&subject(), &namespace(), 1_000)
            .expect("resolve");
        assert_eq!(session.clear_assignments().expect("clear"), 1);
        assert_eq!(session.assignment_count(), 0);

        let after = session
            .resolve(&subject(), &namespace(), 2_000)
            .expect("resolve");
        let Resolution::Assigned { assignment, fresh } = after else {
            panic!("expected assignment");
        };
        assert!(fresh);
        assert_eq!(Some(&assignment.variant_id), before.variant_id());
    }

    #[test]
    fn running_experiments_reports_live_ones() {
        let mut session = session_with(cta_experiment());
        assert_eq!(session.running_experiments(1_000).len(), 1);

        let mut off = cta_experiment();
        off.enabled = false;
        session.set_catalog(ExperimentCatalog::from_experiments([off]).expect("catalog"));
        assert!(session.running_experiments(1_000).is_empty());
    }

    #[test]
    fn persistent_session_replays_across_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("assignments.redb");

        let assigned_variant;
        {
            let catalog =
                ExperimentCatalog::from_experiments([cta_experiment()]).expect("catalog");
            let mut session = Session::open(&db_path, catalog).expect("open");
            assert!(session.is_persistent());

            let resolution = session
                .resolve(&subject(), &namespace(), 1_000)
                .expect("resolve");
            let Resolution::Assigned { assignment, fresh } = resolution else {
                panic!("expected assignment");
            };
            assert!(fresh);
            assigned_variant = assignment.variant_id;
        }

        {
            let catalog =
                ExperimentCatalog::from_experiments([cta_experiment()]).expect("catalog");
            let mut session = Session::open(&db_path, catalog).expect("reopen");

            let resolution = session
                .resolve(&subject(), &namespace(), 9_000)
                .expect("resolve");
            let Resolution::Assigned { assignment, fresh } = resolution else {
                panic!("expected assignment");
            };
            assert!(!fresh);
            assert_eq!(assignment.variant_id, assigned_variant);
        }
    }
}
