//! Deterministic state serialization and snapshot history for the Strata
//! simulation kernel.
//!
//! World state is rendered into a canonical [`serde_json::Value`] tree whose
//! mappings are key-sorted at every depth. Consecutive trees are diffed into
//! [`TickJournal`]s, and the [`SnapshotManager`] interleaves those journals
//! with periodic full [`Snapshot`]s so any captured tick can be rebuilt.
//!
//! # Modules
//!
//! - [`canonical`] -- Canonical trees, canonical JSON, and state signatures
//! - [`journal`] -- Structural diffs and journal replay
//! - [`manager`] -- The [`SnapshotManager`] capture cadence and history
//! - [`error`] -- [`SnapshotError`]

pub mod canonical;
pub mod error;
pub mod journal;
pub mod manager;

pub use canonical::{CanonicalSet, canonical_json, serialize_state, sorted_set, state_signature};
pub use error::SnapshotError;
pub use journal::{TickJournal, TickJournalEntry, apply_journal, diff_states};
pub use manager::{
    Capture, DEFAULT_FULL_INTERVAL, DEFAULT_RETAINED_FULL_SNAPSHOTS, DeltaSnapshot, Snapshot,
    SnapshotManager,
};
