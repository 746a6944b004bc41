//! Telemetry snapshots aggregated by the bus.
//!
//! The orchestrator builds a [`TelemetrySnapshot`] for the current tick,
//! optionally attaches its own latencies and counters, and hands it to
//! [`EventBus::emit_telemetry`](crate::EventBus::emit_telemetry), which fills
//! the bus-owned maps before logging and broadcasting it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-tick counters captured by the bus on each emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Tick the snapshot describes.
    pub tick: u64,
    /// Wall-clock time the snapshot was created.
    pub captured_at: DateTime<Utc>,
    /// Live queued-event count per event type at emit time.
    pub queue_depth: BTreeMap<String, u64>,
    /// Events dropped for TTL expiry since the previous emit, per type.
    pub expired_counts: BTreeMap<String, u64>,
    /// Reserved drop counter per type. The bus never increments it.
    pub dropped_counts: BTreeMap<String, u64>,
    /// Named latencies in milliseconds.
    pub latencies_ms: BTreeMap<String, f64>,
    /// Named monotonic counters.
    pub counters: BTreeMap<String, u64>,
}

impl TelemetrySnapshot {
    /// Create an empty snapshot for `tick`.
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            captured_at: Utc::now(),
            queue_depth: BTreeMap::new(),
            expired_counts: BTreeMap::new(),
            dropped_counts: BTreeMap::new(),
            latencies_ms: BTreeMap::new(),
            counters: BTreeMap::new(),
        }
    }

    /// Attach a latency measurement.
    #[must_use]
    pub fn with_latency(mut self, name: impl Into<String>, millis: f64) -> Self {
        self.latencies_ms.insert(name.into(), millis);
        self
    }

    /// Attach a counter value.
    #[must_use]
    pub fn with_counter(mut self, name: impl Into<String>, value: u64) -> Self {
        self.counters.insert(name.into(), value);
        self
    }

    /// Sum of all expired counts in this snapshot.
    pub fn total_expired(&self) -> u64 {
        self.expired_counts
            .values()
            .fold(0_u64, |acc, n| acc.saturating_add(*n))
    }

    /// Sum of all queue depths in this snapshot.
    pub fn total_queue_depth(&self) -> u64 {
        self.queue_depth
            .values()
            .fold(0_u64, |acc, n| acc.saturating_add(*n))
    }
}
