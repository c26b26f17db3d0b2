//! # Fingerprint Module
//!
//! Stable identifiers derived from device signals, for callers with no
//! login or cookie to hand us.

use serde::{Deserialize, Serialize};

use crate::hash::{hash_seed, to_base36};
use crate::types::Identifier;

/// Observable device traits used to derive an anonymous identifier.
///
/// All fields are reported by the client as-is. The derived identifier
/// is only as stable as the signals: a browser update or a monitor
/// swap produces a new subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSignals {
    /// Browser or client user-agent string.
    pub user_agent: String,

    /// Preferred language tag, e.g. `en-US`.
    pub language: String,

    /// Screen width in pixels.
    pub screen_width: u32,

    /// Screen height in pixels.
    pub screen_height: u32,

    /// Offset from UTC in minutes, as the client reports it.
    pub timezone_offset_minutes: i32,
}

impl DeviceSignals {
    /// Derive the anonymous identifier for these signals.
    ///
    /// The signals are joined with `|` in field order and hashed, and
    /// the hash is rendered in base 36. The join order is part of the
    /// contract with existing stored assignments; reordering would
    /// rebucket every subject.
    #[must_use]
    pub fn identifier(&self) -> Identifier {
        let width = self.screen_width.to_string();
        let height = self.screen_height.to_string();
        let offset = self.timezone_offset_minutes.to_string();

        let joined = [
            self.user_agent.as_str(),
            self.language.as_str(),
            width.as_str(),
            height.as_str(),
            offset.as_str(),
        ]
        .join("|");

        Identifier::new(to_base36(hash_seed(&joined)))
    }
}

// =============================================================================
// TESTS
// =============================================================================
