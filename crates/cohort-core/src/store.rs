//! # Store Module
//!
//! The assignment persistence seam and its in-memory implementation.
//!
//! Assignments are keyed by namespace: one record per experiment per
//! store. `put` replaces silently; in practice assignments are
//! immutable because a rerun of an experiment takes a new namespace.

use std::collections::BTreeMap;

use crate::types::{Assignment, CohortError, ExperimentId};

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Keyed storage for assignment records.
///
/// Implementations report failures through `Result`; the session layer
/// decides what a failed read means (it treats one as "no prior
/// assignment" and rebuckets deterministically).
pub trait AssignmentStore {
    /// Fetch the stored assignment for a namespace, if any.
    fn get(&self, namespace: &ExperimentId) -> Result<Option<Assignment>, CohortError>;

    /// Store an assignment under its namespace, replacing any previous
    /// record.
    fn put(&mut self, assignment: Assignment) -> Result<(), CohortError>;

    /// Remove the assignment for a namespace, returning it if present.
    fn remove(&mut self, namespace: &ExperimentId) -> Result<Option<Assignment>, CohortError>;

    /// All stored assignments, in namespace order.
    fn all(&self) -> Result<Vec<Assignment>, CohortError>;

    /// Remove every stored assignment.
    fn clear(&mut self) -> Result<(), CohortError>;

    /// Number of stored assignments.
    fn len(&self) -> Result<usize, CohortError>;

    /// Whether the store holds no assignments.
    fn is_empty(&self) -> Result<bool, CohortError> {
        Ok(self.len()? == 0)
    }
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// Volatile in-process store. The default backend for tests and for
/// embedders that persist elsewhere.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    assignments: BTreeMap<ExperimentId, Assignment>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssignmentStore for MemoryStore {
    fn get(&self, namespace: &ExperimentId) -> Result<Option<Assignment>, CohortError> {
        Ok(self.assignments.get(namespace).cloned())
    }

    fn put(&mut self, assignment: Assignment) -> Result<(), CohortError> {
        self.assignments
            .insert(assignment.namespace.clone(), assignment);
        Ok(())
    }

    fn remove(&mut self, namespace: &ExperimentId) -> Result<Option<Assignment>, CohortError> {
        Ok(self.assignments.remove(namespace))
    }

    fn all(&self) -> Result<Vec<Assignment>, CohortError> {
        Ok(self.assignments.values().cloned().collect())
    }

    fn clear(&mut self) -> Result<(), CohortError> {
        self.assignments.clear();
        Ok(())
    }

    fn len(&self) -> Result<usize, CohortError> {
        Ok(self.assignments.len())
    }
}

// =============================================================================
// TESTS
// =============================================================================
