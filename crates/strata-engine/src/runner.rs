//! The orchestrator loop.
//!
//! Each iteration runs one scheduler tick, dispatches the bus, captures a
//! snapshot journal, and emits telemetry on a fixed tick cadence. The loop
//! stops when the tick budget is spent or a stop is requested.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use strata_core::config::RunConfig;
use strata_core::{Clock, KernelConfig, Scheduler, TickReport};
use strata_events::TelemetrySnapshot;
use strata_snapshot::{Capture, SnapshotManager};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::harness::{self, HarnessWorld};

/// Latency key for the scheduler tick in emitted telemetry.
pub const TICK_LATENCY_KEY: &str = "scheduler.tick";

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEndReason {
    /// The configured tick budget was spent.
    MaxTicksReached,
    /// A stop was requested (Ctrl-C).
    Interrupted,
}

/// Outcome of a complete run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Why the loop stopped.
    pub end_reason: RunEndReason,
    /// Ticks executed.
    pub total_ticks: u64,
    /// Handler failures collected under the aggregate policy.
    pub failures: usize,
    /// Full snapshots captured.
    pub full_snapshots: u64,
    /// Signature of the last captured state.
    pub signature: Option<String>,
}

/// What one [`Kernel::step`] did.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// The scheduler's report for the tick.
    pub report: TickReport,
    /// Events delivered after the tick.
    pub delivered: usize,
    /// Whether the capture was a full snapshot.
    pub full_snapshot: bool,
    /// Telemetry emitted on this tick, if the cadence fired.
    pub telemetry: Option<TelemetrySnapshot>,
}

/// Scheduler, snapshot history, and harness world wired together.
#[derive(Debug)]
pub struct Kernel {
    scheduler: Scheduler<HarnessWorld>,
    snapshots: SnapshotManager,
    world: HarnessWorld,
    telemetry_interval_ticks: u64,
}

impl Kernel {
    /// Build the kernel from validated configuration.
    pub fn build(config: &KernelConfig) -> Result<Self, EngineError> {
        let clock = Clock::new(&config.clock)?;
        let mut scheduler = Scheduler::with_config(clock, &config.scheduler)?;
        harness::install(&mut scheduler);

        let snapshots = SnapshotManager::new(
            config.snapshot.full_interval,
            config.snapshot.retained_full_snapshots,
        )?;

        let mut world = HarnessWorld::default();
        harness::subscribe_logging(&mut world);

        info!(
            failure_policy = ?scheduler.failure_policy(),
            dilations = scheduler.time_dilations().len(),
            full_interval = config.snapshot.full_interval,
            "Kernel assembled"
        );

        Ok(Self {
            scheduler,
            snapshots,
            world,
            telemetry_interval_ticks: config.run.telemetry_interval_ticks,
        })
    }

    /// Run one tick and its post-tick work.
    pub fn step(&mut self) -> Result<StepOutcome, EngineError> {
        let started = Instant::now();
        let report = self.scheduler.run_tick(&mut self.world)?;
        let tick_ms = started.elapsed().as_secs_f64() * 1000.0;

        for failure in &report.failures {
            warn!(%failure, "Handler failure recorded");
        }

        let delivered = self.world.bus.dispatch().len();
        let (journal, capture) = self.snapshots.capture_tick(&self.world, report.tick)?;
        let full_snapshot = matches!(capture, Capture::Full(_));
        debug!(
            tick = report.tick,
            delivered,
            changes = journal.len(),
            full_snapshot,
            "Post-tick work complete"
        );

        let telemetry = if report.tick.checked_rem(self.telemetry_interval_ticks) == Some(0) {
            let snapshot = TelemetrySnapshot::new(report.tick)
                .with_latency(TICK_LATENCY_KEY, tick_ms)
                .with_counter("scheduler.handlers_run", count(report.handlers_run))
                .with_counter("scheduler.delayed_fired", count(report.delayed_fired))
                .with_counter(
                    "scheduler.pending_events",
                    count(self.scheduler.pending_events()),
                );
            Some(self.world.bus.emit_telemetry(snapshot))
        } else {
            None
        };

        Ok(StepOutcome {
            report,
            delivered,
            full_snapshot,
            telemetry,
        })
    }

    /// The harness world.
    pub const fn world(&self) -> &HarnessWorld {
        &self.world
    }

    /// The snapshot history.
    pub const fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    /// The scheduler.
    pub const fn scheduler(&self) -> &Scheduler<HarnessWorld> {
        &self.scheduler
    }
}

fn count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

/// Run the kernel until the tick budget is spent or `stop` is set.
pub async fn run(
    kernel: &mut Kernel,
    run: &RunConfig,
    stop: Arc<AtomicBool>,
) -> Result<RunSummary, EngineError> {
    let mut total_ticks: u64 = 0;
    let mut failures: usize = 0;
    let mut full_snapshots: u64 = 0;

    let end_reason = loop {
        if stop.load(Ordering::Relaxed) {
            info!(total_ticks, "Stop requested");
            break RunEndReason::Interrupted;
        }
        if total_ticks >= run.max_ticks {
            info!(max_ticks = run.max_ticks, "Tick limit reached");
            break RunEndReason::MaxTicksReached;
        }

        let outcome = kernel.step()?;
        debug!(
            tick = outcome.report.tick,
            delivered = outcome.delivered,
            "Tick finished"
        );
        total_ticks = total_ticks.saturating_add(1);
        failures = failures.saturating_add(outcome.report.failures.len());
        if outcome.full_snapshot {
            full_snapshots = full_snapshots.saturating_add(1);
        }
        if let Some(ref telemetry) = outcome.telemetry {
            info!(
                tick = telemetry.tick,
                queue_depth = telemetry.total_queue_depth(),
                expired = telemetry.total_expired(),
                "Telemetry emitted"
            );
        }

        if run.tick_interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(run.tick_interval_ms)).await;
        } else {
            tokio::task::yield_now().await;
        }
    };

    let signature = kernel.snapshots().signature().ok();
    Ok(RunSummary {
        end_reason,
        total_ticks,
        failures,
        full_snapshots,
        signature,
    })
}

/// Log the end-of-run summary.
pub fn log_run_end(summary: &RunSummary) {
    info!(
        reason = ?summary.end_reason,
        total_ticks = summary.total_ticks,
        failures = summary.failures,
        full_snapshots = summary.full_snapshots,
        signature = summary.signature.as_deref().unwrap_or("none"),
        "Run ended"
    );
    if summary.total_ticks == 0 {
        warn!("Run ended with no ticks executed");
    }
}
