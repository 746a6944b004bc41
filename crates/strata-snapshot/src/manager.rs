//! Periodic full snapshots interleaved with per-tick journals.
//!
//! The manager starts unprimed. The first [`SnapshotManager::prime`] or
//! [`SnapshotManager::capture_tick`] stores a full baseline; every later
//! capture diffs the new tree against the previous one. Every
//! `full_interval`-th capture after the baseline re-primes and returns a
//! full snapshot instead of a delta.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::canonical::{serialize_state, state_signature};
use crate::error::SnapshotError;
use crate::journal::{TickJournal, apply_journal, diff_states};

/// Captures between full snapshots when none is configured.
pub const DEFAULT_FULL_INTERVAL: u64 = 250;

/// Full snapshots kept in history when none is configured.
pub const DEFAULT_RETAINED_FULL_SNAPSHOTS: usize = 4;

/// A complete canonical state tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Tick the state was captured on.
    pub tick: u64,
    /// Canonical state tree.
    pub state: Value,
}

/// Changes for one tick relative to the current baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaSnapshot {
    /// Tick of the full snapshot this delta builds on.
    pub base_tick: u64,
    /// Changes since the previous capture.
    pub journal: TickJournal,
}

/// What a capture produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Capture {
    /// A new baseline.
    Full(Snapshot),
    /// A journal against the existing baseline.
    Delta(DeltaSnapshot),
}

impl Capture {
    /// Whether this capture is a full snapshot.
    pub const fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    /// Tick the capture describes.
    pub const fn tick(&self) -> u64 {
        match self {
            Self::Full(snapshot) => snapshot.tick,
            Self::Delta(delta) => delta.journal.tick,
        }
    }
}

/// Owner of the snapshot and journal history.
#[derive(Debug, Clone)]
pub struct SnapshotManager {
    full_interval: u64,
    retained_full_snapshots: usize,
    snapshots: VecDeque<Snapshot>,
    last_state: Option<Value>,
    journals: Vec<TickJournal>,
    pending_ticks: u64,
}

impl Default for SnapshotManager {
    fn default() -> Self {
        Self {
            full_interval: DEFAULT_FULL_INTERVAL,
            retained_full_snapshots: DEFAULT_RETAINED_FULL_SNAPSHOTS,
            snapshots: VecDeque::new(),
            last_state: None,
            journals: Vec::new(),
            pending_ticks: 0,
        }
    }
}

impl SnapshotManager {
    /// Create an unprimed manager.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::InvalidInterval`] when `full_interval` is 0
    /// and [`SnapshotError::InvalidRetention`] when
    /// `retained_full_snapshots` is 0.
    pub const fn new(
        full_interval: u64,
        retained_full_snapshots: usize,
    ) -> Result<Self, SnapshotError> {
        if full_interval == 0 {
            return Err(SnapshotError::InvalidInterval { full_interval });
        }
        if retained_full_snapshots == 0 {
            return Err(SnapshotError::InvalidRetention {
                retained: retained_full_snapshots,
            });
        }
        Ok(Self {
            full_interval,
            retained_full_snapshots,
            snapshots: VecDeque::new(),
            last_state: None,
            journals: Vec::new(),
            pending_ticks: 0,
        })
    }

    /// Store `state` as the new baseline and reset the journal history.
    pub fn prime<T: Serialize + ?Sized>(
        &mut self,
        state: &T,
        tick: u64,
    ) -> Result<Snapshot, SnapshotError> {
        let tree = serialize_state(state)?;
        Ok(self.prime_tree(tree, tick))
    }

    /// Record `state` for `tick`.
    ///
    /// The first capture primes and returns an empty journal with a full
    /// snapshot. Later captures return the journal since the previous
    /// capture, paired with a delta or, on every `full_interval`-th capture,
    /// a fresh full snapshot.
    pub fn capture_tick<T: Serialize + ?Sized>(
        &mut self,
        state: &T,
        tick: u64,
    ) -> Result<(TickJournal, Capture), SnapshotError> {
        let tree = serialize_state(state)?;

        let Some(previous) = self.last_state.as_ref() else {
            let snapshot = self.prime_tree(tree, tick);
            return Ok((TickJournal::empty(tick), Capture::Full(snapshot)));
        };

        let journal = TickJournal::new(tick, diff_states(previous, &tree));
        self.pending_ticks = self.pending_ticks.saturating_add(1);

        if self.pending_ticks >= self.full_interval {
            let snapshot = self.prime_tree(tree, tick);
            return Ok((journal, Capture::Full(snapshot)));
        }

        debug!(tick, changes = journal.len(), "tick journal captured");
        self.last_state = Some(tree);
        self.journals.push(journal.clone());
        let delta = DeltaSnapshot {
            base_tick: self.baseline().map_or(tick, |snapshot| snapshot.tick),
            journal: journal.clone(),
        };
        Ok((journal, Capture::Delta(delta)))
    }

    /// Rebuild the last captured state from the baseline and journals.
    pub fn reconstruct(&self) -> Result<Value, SnapshotError> {
        let baseline = self.baseline().ok_or(SnapshotError::Unprimed)?;
        let mut state = baseline.state.clone();
        for journal in &self.journals {
            apply_journal(&mut state, journal)?;
        }
        Ok(state)
    }

    /// Signature of the last captured state.
    pub fn signature(&self) -> Result<String, SnapshotError> {
        let state = self.last_state.as_ref().ok_or(SnapshotError::Unprimed)?;
        state_signature(state)
    }

    /// Journals recorded since the current baseline, oldest first.
    pub fn journals(&self) -> &[TickJournal] {
        &self.journals
    }

    /// The current baseline full snapshot.
    pub fn baseline(&self) -> Option<&Snapshot> {
        self.snapshots.back()
    }

    /// Retained full snapshots, oldest first.
    pub const fn snapshots(&self) -> &VecDeque<Snapshot> {
        &self.snapshots
    }

    /// The last captured canonical tree.
    pub const fn last_state(&self) -> Option<&Value> {
        self.last_state.as_ref()
    }

    /// Whether a baseline has been stored.
    pub const fn is_primed(&self) -> bool {
        self.last_state.is_some()
    }

    /// Captures since the current baseline.
    pub const fn pending_ticks(&self) -> u64 {
        self.pending_ticks
    }

    /// Captures between full snapshots.
    pub const fn full_interval(&self) -> u64 {
        self.full_interval
    }

    fn prime_tree(&mut self, tree: Value, tick: u64) -> Snapshot {
        let snapshot = Snapshot {
            tick,
            state: tree.clone(),
        };
        self.snapshots.push_back(snapshot.clone());
        while self.snapshots.len() > self.retained_full_snapshots {
            self.snapshots.pop_front();
        }
        self.last_state = Some(tree);
        self.journals.clear();
        self.pending_ticks = 0;

        info!(
            tick,
            retained = self.snapshots.len(),
            "full snapshot captured"
        );
        snapshot
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn zero_interval_is_rejected() {
        assert!(matches!(
            SnapshotManager::new(0, 1),
            Err(SnapshotError::InvalidInterval { full_interval: 0 })
        ));
        assert!(matches!(
            SnapshotManager::new(1, 0),
            Err(SnapshotError::InvalidRetention { retained: 0 })
        ));
    }

    #[test]
    fn first_capture_primes_with_empty_journal() {
        let mut manager = SnapshotManager::default();
        assert!(!manager.is_primed());

        let (journal, capture) = manager.capture_tick(&json!({ "a": 1 }), 0).unwrap();
        assert!(journal.is_empty());
        assert!(capture.is_full());
        assert!(manager.is_primed());
        assert_eq!(manager.pending_ticks(), 0);
    }

    #[test]
    fn interval_two_alternates_full_and_delta() {
        let mut manager = SnapshotManager::new(2, 4).unwrap();
        let kinds: Vec<bool> = (0..4_u64)
            .map(|tick| {
                let (_, capture) = manager.capture_tick(&json!({ "tick": tick }), tick).unwrap();
                capture.is_full()
            })
            .collect();
        assert_eq!(kinds, [true, false, true, false]);
    }

    #[test]
    fn full_snapshot_fires_exactly_on_the_interval() {
        let mut manager = SnapshotManager::new(5, 8).unwrap();
        let full_ticks: Vec<u64> = (0..16_u64)
            .filter_map(|tick| {
                let (_, capture) = manager.capture_tick(&json!({ "n": tick }), tick).unwrap();
                capture.is_full().then_some(tick)
            })
            .collect();
        assert_eq!(full_ticks, [0, 5, 10, 15]);
    }

    #[test]
    fn unchanged_state_yields_empty_delta() {
        let mut manager = SnapshotManager::default();
        let state = json!({ "a": { "b": [1, 2] } });
        manager.capture_tick(&state, 0).unwrap();
        let (journal, capture) = manager.capture_tick(&state, 1).unwrap();
        assert!(journal.is_empty());
        assert!(matches!(
            capture,
            Capture::Delta(DeltaSnapshot { base_tick: 0, ref journal }) if journal.is_empty()
        ));
    }

    #[test]
    fn periodic_full_still_returns_the_changes() {
        let mut manager = SnapshotManager::new(1, 2).unwrap();
        manager.capture_tick(&json!({ "a": 1 }), 0).unwrap();
        let (journal, capture) = manager.capture_tick(&json!({ "a": 2 }), 1).unwrap();
        assert_eq!(journal.len(), 1);
        assert!(capture.is_full());
        assert!(manager.journals().is_empty());
    }

    #[test]
    fn reconstruct_matches_last_capture() {
        let mut manager = SnapshotManager::default();
        let mut state = json!({ "stock": { "grain": 10 }, "log": [] });
        manager.capture_tick(&state, 0).unwrap();
        for tick in 1..6_u64 {
            *state.pointer_mut("/stock/grain").unwrap() = json!(10_u64.saturating_sub(tick));
            *state.pointer_mut("/log").unwrap() = json!((0..tick).collect::<Vec<_>>());
            manager.capture_tick(&state, tick).unwrap();
        }
        assert_eq!(manager.journals().len(), 5);
        assert_eq!(manager.reconstruct().unwrap(), state);
        assert_eq!(manager.last_state(), Some(&state));
    }

    #[test]
    fn prime_resets_history() {
        let mut manager = SnapshotManager::default();
        manager.capture_tick(&json!({ "a": 1 }), 0).unwrap();
        manager.capture_tick(&json!({ "a": 2 }), 1).unwrap();
        assert_eq!(manager.pending_ticks(), 1);

        let snapshot = manager.prime(&json!({ "a": 3 }), 2).unwrap();
        assert_eq!(snapshot.tick, 2);
        assert_eq!(manager.pending_ticks(), 0);
        assert!(manager.journals().is_empty());
        assert_eq!(manager.baseline().unwrap().tick, 2);
    }

    #[test]
    fn old_full_snapshots_are_evicted() {
        let mut manager = SnapshotManager::new(1, 2).unwrap();
        for tick in 0..5_u64 {
            manager.capture_tick(&json!({ "t": tick }), tick).unwrap();
        }
        let ticks: Vec<u64> = manager.snapshots().iter().map(|s| s.tick).collect();
        assert_eq!(ticks, [3, 4]);
    }

    #[test]
    fn unprimed_manager_cannot_reconstruct() {
        let manager = SnapshotManager::default();
        assert!(matches!(manager.reconstruct(), Err(SnapshotError::Unprimed)));
        assert!(matches!(manager.signature(), Err(SnapshotError::Unprimed)));
    }
}
