//! # redb-backed Assignment Storage
//!
//! A disk-backed assignment store using redb embedded database.
//!
//! Records survive process restarts with ACID guarantees and no
//! configuration: stickiness holds across crashes without a WAL or
//! recovery pass of our own.
//!
//! Values are stored as JSON bytes, so the on-disk format is the same
//! record format web clients keep in their local storage. A row pulled
//! out of the database with external tooling reads as a plain
//! `Assignment` document.
//!
//! ## Integration with Session
//!
//! `RedbStore` plugs into a session as the persistent backend. Unlike
//! `MemoryStore`, assignments written here are visible to the next
//! process that opens the same path.

use std::collections::BTreeMap;
use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::store::AssignmentStore;
use crate::types::{Assignment, CohortError, ExperimentId};

/// Table for assignments: namespace -> serialized Assignment JSON
const ASSIGNMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("assignments");

/// A disk-backed assignment store using redb.
///
/// Keeps a full in-memory copy of the table. Assignment sets are small
/// (one record per experiment), so reads never touch disk and the
/// database is only consulted on writes and at open.
pub struct RedbStore {
    /// The redb database handle.
    db: Database,
    /// In-memory mirror of the assignments table.
    cache: BTreeMap<ExperimentId, Assignment>,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("cached_assignments", &self.cache.len())
            .finish_non_exhaustive()
    }
}

fn encode_assignment(assignment: &Assignment) -> Result<Vec<u8>, CohortError> {
    serde_json::to_vec(assignment).map_err(|e| CohortError::SerializationError(e.to_string()))
}

fn decode_assignment(bytes: &[u8]) -> Result<Assignment, CohortError> {
    serde_json::from_slice(bytes).map_err(|e| CohortError::DeserializationError(e.to_string()))
}

impl RedbStore {
    /// Open or create an assignment database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CohortError> {
        let db =
            Database::create(path.as_ref()).map_err(|e| CohortError::IoError(e.to_string()))?;

        // Initialize the table if it doesn't exist
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| CohortError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(ASSIGNMENTS)
                .map_err(|e| CohortError::IoError(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| CohortError::IoError(e.to_string()))?;
        }

        // Load the cache
        let cache = {
            let read_txn = db
                .begin_read()
                .map_err(|e| CohortError::IoError(e.to_string()))?;
            let table = read_txn
                .open_table(ASSIGNMENTS)
                .map_err(|e| CohortError::IoError(e.to_string()))?;

            let mut cache = BTreeMap::new();
            for entry in table
                .iter()
                .map_err(|e| CohortError::IoError(e.to_string()))?
            {
                let (key, value) = entry.map_err(|e| CohortError::IoError(e.to_string()))?;
                let assignment = decode_assignment(value.value())?;
                cache.insert(ExperimentId::new(key.value()), assignment);
            }
            cache
        };

        Ok(Self { db, cache })
    }

    /// Compact the database (optional optimization).
    pub fn compact(&mut self) -> Result<(), CohortError> {
        self.db
            .compact()
            .map_err(|e| CohortError::IoError(e.to_string()))?;
        Ok(())
    }
}

impl AssignmentStore for RedbStore {
    fn get(&self, namespace: &ExperimentId) -> Result<Option<Assignment>, CohortError> {
        Ok(self.cache.get(namespace).cloned())
    }

    fn put(&mut self, assignment: Assignment) -> Result<(), CohortError> {
        let bytes = encode_assignment(&assignment)?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| CohortError::IoError(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(ASSIGNMENTS)
                .map_err(|e| CohortError::IoError(e.to_string()))?;
            table
                .insert(assignment.namespace.as_str(), bytes.as_slice())
                .map_err(|e| CohortError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| CohortError::IoError(e.to_string()))?;

        // Update the cache only after a successful commit.
        self.cache.insert(assignment.namespace.clone(), assignment);
        Ok(())
    }

    fn remove(&mut self, namespace: &ExperimentId) -> Result<Option<Assignment>, CohortError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| CohortError::IoError(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(ASSIGNMENTS)
                .map_err(|e| CohortError::IoError(e.to_string()))?;
            table
                .remove(namespace.as_str())
                .map_err(|e| CohortError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| CohortError::IoError(e.to_string()))?;

        Ok(self.cache.remove(namespace))
    }

    fn all(&self) -> Result<Vec<Assignment>, CohortError> {
        Ok(self.cache.values().cloned().collect())
    }

    fn clear(&mut self) -> Result<(), CohortError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| CohortError::IoError(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(ASSIGNMENTS)
                .map_err(|e| CohortError::IoError(e.to_string()))?;
            for namespace in self.cache.keys() {
                table
                    .remove(namespace.as_str())
                    .map_err(|e| CohortError::IoError(e.to_string()))?;
            }
        }
        write_txn
            .commit()
            .map_err(|e| CohortError::IoError(e.to_string()))?;

        self.cache.clear();
        Ok(())
    }

    fn len(&self) -> Result<usize, CohortError> {
        Ok(self.cache.len())
    }
}
