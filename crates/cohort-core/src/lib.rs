//! # cohort-core
//!
//! The deterministic bucketing engine for Cohort - THE LOGIC.
//!
//! This crate implements the assignment core: a pure function from
//! subject identifier, experiment namespace, and weight table to a
//! variant, plus the session machinery that makes assignments sticky.
//!
//! ```text
//! identifier + namespace --hash--> slot --weighted walk--> variant
//!                                                             |
//!                                              store (sticky replay)
//! ```
//!
//! ## Architectural Constraints
//!
//! The CORE:
//! - Is deterministic: same inputs, same variant, on every machine
//! - Never reads a clock; callers pass epoch-millisecond timestamps in
//! - Has NO async, NO network dependencies (pure Rust)
//! - Hashes UTF-16 code units, matching what web clients compute, so a
//!   subject bucketed in a browser and on a server agree

// =============================================================================
// MODULES
// =============================================================================

pub mod audit;
pub mod bucket;
pub mod events;
pub mod experiment;
pub mod export;
pub mod fingerprint;
pub mod hash;
pub mod primitives;
pub mod session;
pub mod storage;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{Assignment, CohortError, ExperimentId, Identifier, VariantId, Weight};

// =============================================================================
// RE-EXPORTS: Bucketing Engine
// =============================================================================

pub use bucket::{assign, audience_slot, in_audience, in_rollout, seed_for};
pub use experiment::{AudienceRule, Experiment, ExperimentCatalog, VariantArm};
pub use fingerprint::DeviceSignals;
pub use hash::{hash_seed, to_base36};

// =============================================================================
// RE-EXPORTS: Sessions & Storage
// =============================================================================

pub use events::{ConversionEvent, Event, EventLog, ExposureEvent};
pub use session::{InactiveReason, Resolution, Session, StoreBackend};
pub use storage::RedbStore;
pub use store::{AssignmentStore, MemoryStore};

// =============================================================================
// RE-EXPORTS: Tools
// =============================================================================

pub use audit::{
    DEFAULT_SAMPLE_SIZE, DEFAULT_TOLERANCE_BP, DistributionReport, audit_distribution,
};
pub use export::{
    CanonicalHeader, CanonicalLedger, export_ledger, import_ledger, ledger_checksum,
};
