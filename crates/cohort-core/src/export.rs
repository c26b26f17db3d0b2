//! # Export Module
//!
//! Canonical assignment ledger serialization.
//!
//! The ledger moves assignment sets between machines: migrating a
//! device's local records to a server-side store, seeding a test
//! fixture, or archiving an experiment before its namespace is retired.
//!
//! ## Format
//!
//! ```text
//! [header_len: u32 LE][postcard header][postcard records]
//! ```
//!
//! The header carries magic bytes, a format version, the record count,
//! and a checksum over the records. Records are sorted before export,
//! so the same assignment set always produces the same bytes.
//!
//! The checksum detects corruption, not tampering. Callers that need an
//! integrity proof pair the ledger with [`ledger_crypto_hash`] from the
//! `crypto-hash` feature.

use serde::{Deserialize, Serialize};

use crate::types::{Assignment, CohortError, ExperimentId, Identifier, VariantId};

/// Magic bytes identifying a canonical ledger.
pub const CANONICAL_MAGIC: [u8; 4] = *b"COHX";

/// Current canonical format version.
pub const CANONICAL_VERSION: u32 = 1;

/// Upper bound on records accepted by import.
pub const MAX_IMPORT_RECORD_COUNT: u64 = 1_000_000;

// =============================================================================
// HEADER
// =============================================================================

/// Ledger file header.
///
/// Validation errors use generic messages. Import runs on untrusted
/// bytes, and detailed parse diagnostics would describe the format to
/// whoever is probing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalHeader {
    /// Magic bytes, always [`CANONICAL_MAGIC`].
    pub magic: [u8; 4],
    /// Format version.
    pub version: u32,
    /// Number of records in the payload.
    pub record_count: u64,
    /// Checksum over the sorted records.
    pub checksum: u64,
}

impl CanonicalHeader {
    /// Build a header for the current format version.
    #[must_use]
    pub fn new(record_count: u64, checksum: u64) -> Self {
        Self {
            magic: CANONICAL_MAGIC,
            version: CANONICAL_VERSION,
            record_count,
            checksum,
        }
    }

    /// Check magic and version.
    pub fn validate(&self) -> Result<(), CohortError> {
        if self.magic != CANONICAL_MAGIC {
            return Err(CohortError::DeserializationError(
                "Invalid file format".to_string(),
            ));
        }
        if self.version > CANONICAL_VERSION {
            return Err(CohortError::DeserializationError(
                "Unsupported file version".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// One assignment in canonical form.
///
/// Plain strings rather than newtypes: the canonical format is a wire
/// contract, and its field layout should not shift if the in-memory
/// types grow.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Experiment namespace.
    pub namespace: String,
    /// Assigned variant.
    pub variant_id: String,
    /// When the assignment was made, epoch milliseconds.
    pub assigned_at_epoch_millis: u64,
    /// Subject the assignment belongs to.
    pub identifier: String,
}

impl From<&Assignment> for CanonicalRecord {
    fn from(assignment: &Assignment) -> Self {
        Self {
            namespace: assignment.namespace.as_str().to_string(),
            variant_id: assignment.variant_id.as_str().to_string(),
            assigned_at_epoch_millis: assignment.assigned_at_epoch_millis,
            identifier: assignment.identifier.as_str().to_string(),
        }
    }
}

impl From<CanonicalRecord> for Assignment {
    fn from(record: CanonicalRecord) -> Self {
        Assignment::new(
            ExperimentId::new(record.namespace),
            VariantId::new(record.variant_id),
            record.assigned_at_epoch_millis,
            Identifier::new(record.identifier),
        )
    }
}

/// The sorted record set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalLedger {
    /// Records in canonical order.
    pub records: Vec<CanonicalRecord>,
}

impl CanonicalLedger {
    /// Build a ledger from assignments, sorting into canonical order.
    #[must_use]
    pub fn from_assignments(assignments: &[Assignment]) -> Self {
        let mut records: Vec<CanonicalRecord> =
            assignments.iter().map(CanonicalRecord::from).collect();
        records.sort();
        Self { records }
    }

    /// Order-sensitive checksum over every record field.
    #[must_use]
    pub fn checksum(&self) -> u64 {
        compute_checksum(&self.records)
    }
}

fn compute_checksum(records: &[CanonicalRecord]) -> u64 {
    let mut hash: u64 = 0;
    let mut mix = |value: u64| {
        hash = hash.rotate_left(5) ^ value;
    };

    for record in records {
        for field in [&record.namespace, &record.variant_id, &record.identifier] {
            mix(field.len() as u64);
            for byte in field.bytes() {
                mix(u64::from(byte));
            }
        }
        mix(record.assigned_at_epoch_millis);
    }
    hash
}

// =============================================================================
// EXPORT / IMPORT
// =============================================================================

/// Serialize assignments into canonical ledger bytes.
///
/// The same assignment set produces bit-identical output regardless of
/// input order.
pub fn export_ledger(assignments: &[Assignment]) -> Result<Vec<u8>, CohortError> {
    let ledger = CanonicalLedger::from_assignments(assignments);
    let header = CanonicalHeader::new(ledger.records.len() as u64, ledger.checksum());

    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| CohortError::SerializationError(format!("Header: {}", e)))?;
    let data_bytes = postcard::to_allocvec(&ledger)
        .map_err(|e| CohortError::SerializationError(format!("Data: {}", e)))?;

    let header_len = u32::try_from(header_bytes.len())
        .map_err(|_| CohortError::SerializationError("Header too large".to_string()))?;

    let mut out = Vec::with_capacity(4 + header_bytes.len() + data_bytes.len());
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&data_bytes);
    Ok(out)
}

/// Parse canonical ledger bytes back into assignments.
///
/// Every structural claim the header makes is verified against the
/// payload before any record is returned.
pub fn import_ledger(data: &[u8]) -> Result<Vec<Assignment>, CohortError> {
    if data.len() < 4 {
        return Err(CohortError::DeserializationError(
            "Data too short".to_string(),
        ));
    }

    let (len_bytes, rest) = data.split_at(4);
    let len_array: [u8; 4] = len_bytes
        .try_into()
        .map_err(|_| CohortError::DeserializationError("Data too short".to_string()))?;
    let header_len = u32::from_le_bytes(len_array) as usize;

    if header_len > rest.len() {
        return Err(CohortError::DeserializationError(
            "Invalid header length".to_string(),
        ));
    }
    let (header_bytes, data_bytes) = rest.split_at(header_len);

    let header: CanonicalHeader = postcard::from_bytes(header_bytes)
        .map_err(|_| CohortError::DeserializationError("Invalid file format".to_string()))?;
    header.validate()?;

    if header.record_count > MAX_IMPORT_RECORD_COUNT {
        return Err(CohortError::DeserializationError(format!(
            "Record count {} exceeds maximum {}",
            header.record_count, MAX_IMPORT_RECORD_COUNT
        )));
    }

    let ledger: CanonicalLedger = postcard::from_bytes(data_bytes)
        .map_err(|_| CohortError::DeserializationError("Invalid file format".to_string()))?;

    if ledger.records.len() as u64 != header.record_count {
        return Err(CohortError::DeserializationError(
            "Record count mismatch".to_string(),
        ));
    }
    if ledger.checksum() != header.checksum {
        return Err(CohortError::DeserializationError(
            "Checksum mismatch".to_string(),
        ));
    }

    Ok(ledger.records.into_iter().map(Assignment::from).collect())
}

/// Checksum of an assignment set without serializing it.
#[must_use]
pub fn ledger_checksum(assignments: &[Assignment]) -> u64 {
    CanonicalLedger::from_assignments(assignments).checksum()
}

/// BLAKE3 hex digest of the canonical ledger bytes.
///
/// Unlike the built-in checksum this is collision-resistant, suitable
/// for proving two ledgers are the same set.
#[cfg(feature = "crypto-hash")]
pub fn ledger_crypto_hash(assignments: &[Assignment]) -> Result<String, CohortError> {
    let bytes = export_ledger(assignments)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

// =============================================================================
// TESTS
// =============================================================================
