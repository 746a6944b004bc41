//! The closed, ordered phase taxonomy executed once per tick.
//!
//! There is exactly one authoritative ordering. Phases cannot be registered
//! at runtime; domain systems attach handlers to the phases that exist.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One named stage of work in the per-tick cascade.
///
/// Variants are declared in canonical execution order, so the derived
/// `Ord` matches [`Phase::ordered`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Environment and bookkeeping updates that other phases observe.
    WorldWake,
    /// Systems build their view of the world.
    Perception,
    /// Systems choose what to do.
    Decision,
    /// Chosen actions are applied to world state.
    Resolution,
    /// Results are flushed to journals, stores, or outboxes.
    Persist,
    /// Post-tick analysis.
    Reflection,
}

/// Canonical execution order.
const ORDERED: [Phase; Phase::COUNT] = [
    Phase::WorldWake,
    Phase::Perception,
    Phase::Decision,
    Phase::Resolution,
    Phase::Persist,
    Phase::Reflection,
];

impl Phase {
    /// Number of phases in the cascade.
    pub const COUNT: usize = 6;

    /// Return every phase in canonical execution order.
    pub const fn ordered() -> &'static [Self] {
        &ORDERED
    }

    /// Return the zero-based position of this phase in the cascade.
    pub const fn index(self) -> usize {
        match self {
            Self::WorldWake => 0,
            Self::Perception => 1,
            Self::Decision => 2,
            Self::Resolution => 3,
            Self::Persist => 4,
            Self::Reflection => 5,
        }
    }

    /// Return the `snake_case` name used in logs and configuration.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WorldWake => "world_wake",
            Self::Perception => "perception",
            Self::Decision => "decision",
            Self::Resolution => "resolution",
            Self::Persist => "persist",
            Self::Reflection => "reflection",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
