//! # Events Module
//!
//! Exposure and conversion events, buffered in memory until the
//! embedding application drains them to its analytics pipeline.
//!
//! The buffer is bounded. When full it drops the oldest event: losing
//! old telemetry beats growing without limit inside a long-lived host.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::primitives::MAX_EVENT_BUFFER;
use crate::types::{ExperimentId, Identifier, VariantId};

// =============================================================================
// EVENT KINDS
// =============================================================================

/// A subject saw a variant for the first time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureEvent {
    /// Experiment namespace.
    pub namespace: ExperimentId,
    /// Variant the subject was assigned.
    pub variant_id: VariantId,
    /// Subject the event belongs to.
    pub identifier: Identifier,
    /// When the exposure happened, epoch milliseconds.
    pub at_epoch_millis: u64,
}

/// A subject completed a goal while assigned to a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionEvent {
    /// Experiment namespace.
    pub namespace: ExperimentId,
    /// Variant the subject was assigned.
    pub variant_id: VariantId,
    /// Subject the event belongs to.
    pub identifier: Identifier,
    /// Which goal converted, e.g. `signup` or `checkout`.
    pub goal: String,
    /// Value attributed to the conversion. Defaults to 1 upstream when
    /// the caller supplies none.
    pub value: i64,
    /// When the conversion happened, epoch milliseconds.
    pub at_epoch_millis: u64,
}

/// Anything the engine can emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// First resolution of a running experiment for a subject.
    Exposure(ExposureEvent),
    /// Goal completion recorded against an assignment.
    Conversion(ConversionEvent),
}

// =============================================================================
// EVENT LOG
// =============================================================================

/// Bounded in-memory event buffer.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: VecDeque<Event>,
}

impl EventLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, evicting the oldest when the buffer is full.
    pub fn record(&mut self, event: Event) {
        if self.events.len() >= MAX_EVENT_BUFFER {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Take every buffered event, leaving the log empty.
    #[must_use]
    pub fn drain(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    /// Number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate over buffered events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Discard every buffered event.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================
