//! # Primitives Module
//!
//! Boundary constants for Cohort CORE.
//!
//! Every input is validated against these limits before it reaches the
//! engine. Keeping them in one place keeps the catalog, the session,
//! and the app surface in agreement about what "too big" means.

/// Number of slots in the audience and rollout percentage space.
///
/// Audience slots run 1 to `AUDIENCE_SLOTS` inclusive; a rule with
/// `percentage = p` admits slots 1 through `p`.
pub const AUDIENCE_SLOTS: u32 = 100;

/// Maximum length of an experiment namespace in bytes.
///
/// Namespaces double as storage keys, so oversized ones are rejected
/// at catalog validation time.
pub const MAX_NAMESPACE_LENGTH: usize = 256;

/// Maximum length of a subject identifier in bytes.
///
/// Identifiers arrive from untrusted callers; anything longer is
/// rejected at the app boundary before hashing.
pub const MAX_IDENTIFIER_LENGTH: usize = 256;

/// Maximum length of a variant id in bytes.
pub const MAX_VARIANT_ID_LENGTH: usize = 128;

/// Maximum length of a conversion goal label in bytes.
pub const MAX_GOAL_LENGTH: usize = 128;

/// Maximum number of arms in one experiment's weight table.
///
/// The table walk is linear; this bound keeps resolution O(small).
pub const MAX_VARIANTS_PER_EXPERIMENT: usize = 64;

/// Maximum number of experiments one catalog will accept.
pub const MAX_CATALOG_EXPERIMENTS: usize = 1_024;

/// Maximum number of buffered events per session.
///
/// Past this the oldest event is dropped; an undrained session must
/// not grow without limit.
pub const MAX_EVENT_BUFFER: usize = 10_000;
