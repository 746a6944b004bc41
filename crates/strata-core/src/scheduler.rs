//! Tick scheduler: the deterministic per-tick cascade.
//!
//! Each call to [`Scheduler::run_tick`] moves through the same steps:
//!
//! 1. **Advance** -- the clock moves from tick N to N+1 and a copy is taken
//!    for handlers to read.
//! 2. **Delayed events** -- every heap entry with `run_tick <= tick` fires in
//!    ascending `(run_tick, priority, sequence)` order.
//! 3. **Cascade** -- for each [`Phase`] in canonical order, every handler
//!    registered to that phase runs in registration order.
//!
//! The world state is owned by the caller and passed by unique reference
//! into every handler call. Nothing runs concurrently and nothing yields
//! mid-handler, so the order above is the whole ordering story.
//!
//! Handlers may defer work through their [`TickContext`]. Deferred events
//! enter the heap as soon as the scheduling handler returns, so a zero-delay
//! event scheduled during the cascade fires on the next tick.
//!
//! Delayed events are different: the heap is drained until nothing due
//! remains, so zero-delay work deferred by a delayed event fires in the same
//! tick, before the cascade. A delayed event that keeps rescheduling itself
//! at delay 0 never lets [`Scheduler::run_tick`] return.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;

use tracing::{debug, warn};

use crate::clock::{Clock, ClockError};
use crate::config::SchedulerConfig;
use crate::handler::{
    FailurePolicy, FnHandler, HandlerError, HandlerFailure, HandlerResult, PhaseHandler,
};
use crate::phase::Phase;

/// Coefficient reported for scopes with no registered dilation.
pub const DEFAULT_TIME_DILATION: f64 = 1.0;

/// Errors raised synchronously by scheduler calls.
///
/// State is never modified when one of these is returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchedulerError {
    /// A delayed event was scheduled with a negative delay.
    #[error("delay must be non-negative (got {delay_ticks})")]
    NegativeDelay {
        /// The rejected delay.
        delay_ticks: i64,
    },

    /// `current_tick + delay_ticks` does not fit in a `u64`.
    #[error("scheduled tick overflows: {current_tick} + {delay_ticks}")]
    TickOverflow {
        /// The tick the delay was measured from.
        current_tick: u64,
        /// The requested delay.
        delay_ticks: i64,
    },

    /// A time dilation coefficient was zero, negative, or not finite.
    #[error("time dilation for '{scope}' must be positive (got {coefficient})")]
    InvalidDilation {
        /// The scope being configured.
        scope: String,
        /// The rejected coefficient.
        coefficient: f64,
    },
}

/// Errors that abort a tick.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// The clock could not advance.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// A handler failed under [`FailurePolicy::FailFast`].
    #[error("{failure}")]
    Handler {
        /// Where and when the failure happened.
        failure: HandlerFailure,
        /// The error returned by the handler.
        #[source]
        source: HandlerError,
    },
}

/// Receipt for a scheduled delayed event.
///
/// Scheduled events cannot be cancelled; a handler that may go stale must
/// check its own preconditions when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScheduledEvent {
    /// Tick during which the event fires.
    pub run_tick: u64,
    /// Tie-break among events due on the same tick (lower fires first).
    pub priority: i32,
    /// Insertion sequence, the final tie-break.
    pub sequence: u64,
}

/// Summary of a single tick's execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The tick number that was executed.
    pub tick: u64,
    /// Delayed events fired before the cascade.
    pub delayed_fired: usize,
    /// Phase handlers invoked during the cascade.
    pub handlers_run: usize,
    /// Failures collected under [`FailurePolicy::Aggregate`].
    pub failures: Vec<HandlerFailure>,
}

/// One-shot delayed handler.
pub type DelayedHandler<W> = Box<dyn FnOnce(&mut W, &mut TickContext<W>) -> HandlerResult>;

/// Delayed event validated by a handler, waiting for a sequence number.
struct Deferred<W> {
    run_tick: u64,
    priority: i32,
    label: &'static str,
    handler: DelayedHandler<W>,
}

/// Heap entry ordered by `(run_tick, priority, sequence)`.
struct DelayedEvent<W> {
    key: ScheduledEvent,
    label: &'static str,
    handler: DelayedHandler<W>,
}

impl<W> PartialEq for DelayedEvent<W> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<W> Eq for DelayedEvent<W> {}

impl<W> PartialOrd for DelayedEvent<W> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<W> Ord for DelayedEvent<W> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

/// Per-tick view handed to every handler.
///
/// Holds a copy of the clock, the time dilation coefficients as they stood
/// when the tick began, and a queue of delayed events the handler wants to
/// schedule.
pub struct TickContext<W> {
    clock: Clock,
    time_dilation: BTreeMap<String, f64>,
    deferred: Vec<Deferred<W>>,
}

impl<W> TickContext<W> {
    const fn new(clock: Clock, time_dilation: BTreeMap<String, f64>) -> Self {
        Self {
            clock,
            time_dilation,
            deferred: Vec::new(),
        }
    }

    /// Return the clock copy for this tick.
    pub const fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Return the current tick number.
    pub const fn tick(&self) -> u64 {
        self.clock.current_tick()
    }

    /// Return the dilation coefficient for `scope` (1.0 when unset).
    pub fn time_dilation(&self, scope: &str) -> f64 {
        self.time_dilation
            .get(scope)
            .copied()
            .unwrap_or(DEFAULT_TIME_DILATION)
    }

    /// Schedule a delayed event with priority 0. Returns its run tick.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NegativeDelay`] for a negative delay, or
    /// [`SchedulerError::TickOverflow`] if the run tick overflows.
    pub fn schedule_event<F>(&mut self, delay_ticks: i64, handler: F) -> Result<u64, SchedulerError>
    where
        F: FnOnce(&mut W, &mut Self) -> HandlerResult + 'static,
    {
        self.schedule_event_with_priority(delay_ticks, 0, handler)
    }

    /// Schedule a delayed event with an explicit priority. Returns its run
    /// tick.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NegativeDelay`] for a negative delay, or
    /// [`SchedulerError::TickOverflow`] if the run tick overflows.
    pub fn schedule_event_with_priority<F>(
        &mut self,
        delay_ticks: i64,
        priority: i32,
        handler: F,
    ) -> Result<u64, SchedulerError>
    where
        F: FnOnce(&mut W, &mut Self) -> HandlerResult + 'static,
    {
        let run_tick = resolve_run_tick(self.clock.current_tick(), delay_ticks)?;
        self.deferred.push(Deferred {
            run_tick,
            priority,
            label: std::any::type_name::<F>(),
            handler: Box::new(handler),
        });
        Ok(run_tick)
    }
}

impl<W> fmt::Debug for TickContext<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickContext")
            .field("clock", &self.clock)
            .field("time_dilation", &self.time_dilation)
            .field("deferred", &self.deferred.len())
            .finish()
    }
}

/// Owns the clock, the phase handler registry, and the delayed-event heap.
pub struct Scheduler<W> {
    clock: Clock,
    handlers: BTreeMap<Phase, Vec<Box<dyn PhaseHandler<W>>>>,
    delayed: BinaryHeap<Reverse<DelayedEvent<W>>>,
    next_sequence: u64,
    time_dilation: BTreeMap<String, f64>,
    failure_policy: FailurePolicy,
}

impl<W> Scheduler<W> {
    /// Create a fail-fast scheduler around an existing clock.
    pub const fn new(clock: Clock) -> Self {
        Self {
            clock,
            handlers: BTreeMap::new(),
            delayed: BinaryHeap::new(),
            next_sequence: 0,
            time_dilation: BTreeMap::new(),
            failure_policy: FailurePolicy::FailFast,
        }
    }

    /// Create a scheduler with the failure policy and initial time
    /// dilation coefficients from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidDilation`] if any configured
    /// coefficient is not positive.
    pub fn with_config(clock: Clock, config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        let mut scheduler = Self::new(clock);
        scheduler.failure_policy = config.failure_policy;
        for (scope, coefficient) in &config.time_dilation {
            scheduler.set_time_dilation(scope.clone(), *coefficient)?;
        }
        Ok(scheduler)
    }

    /// Return the scheduler-owned clock.
    pub const fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Return the active failure policy.
    pub const fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Change the failure policy for subsequent ticks.
    pub const fn set_failure_policy(&mut self, policy: FailurePolicy) {
        self.failure_policy = policy;
    }

    /// Register a handler for a phase.
    ///
    /// Handlers run in registration order within their phase. There is no
    /// de-duplication: registering the same logic twice runs it twice.
    pub fn register_handler<H>(&mut self, phase: Phase, handler: H)
    where
        H: PhaseHandler<W> + 'static,
    {
        debug!(%phase, handler = handler.name(), "Registered phase handler");
        self.handlers.entry(phase).or_default().push(Box::new(handler));
    }

    /// Register a named closure for a phase.
    pub fn register_fn<F>(&mut self, phase: Phase, name: impl Into<String>, f: F)
    where
        F: FnMut(&mut W, &mut TickContext<W>) -> HandlerResult + 'static,
    {
        self.register_handler(phase, FnHandler::new(name, f));
    }

    /// Return the number of handlers registered to `phase`.
    pub fn phase_handler_count(&self, phase: Phase) -> usize {
        self.handlers.get(&phase).map_or(0, Vec::len)
    }

    /// Schedule `handler` to fire `delay_ticks` from now with priority 0.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NegativeDelay`] for a negative delay, or
    /// [`SchedulerError::TickOverflow`] if the run tick overflows.
    pub fn schedule_event<F>(
        &mut self,
        delay_ticks: i64,
        handler: F,
    ) -> Result<ScheduledEvent, SchedulerError>
    where
        F: FnOnce(&mut W, &mut TickContext<W>) -> HandlerResult + 'static,
    {
        self.schedule_event_with_priority(delay_ticks, 0, handler)
    }

    /// Schedule `handler` to fire `delay_ticks` from now.
    ///
    /// Among events due on the same tick, lower `priority` fires first;
    /// equal priorities fire in scheduling order.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NegativeDelay`] for a negative delay, or
    /// [`SchedulerError::TickOverflow`] if the run tick overflows.
    pub fn schedule_event_with_priority<F>(
        &mut self,
        delay_ticks: i64,
        priority: i32,
        handler: F,
    ) -> Result<ScheduledEvent, SchedulerError>
    where
        F: FnOnce(&mut W, &mut TickContext<W>) -> HandlerResult + 'static,
    {
        let run_tick = resolve_run_tick(self.clock.current_tick(), delay_ticks)?;
        let key = push_delayed(
            &mut self.delayed,
            &mut self.next_sequence,
            Deferred {
                run_tick,
                priority,
                label: std::any::type_name::<F>(),
                handler: Box::new(handler),
            },
        );
        debug!(run_tick, priority, sequence = key.sequence, "Scheduled delayed event");
        Ok(key)
    }

    /// Return the number of delayed events not yet fired.
    pub fn pending_events(&self) -> usize {
        self.delayed.len()
    }

    /// Set the advisory dilation coefficient for `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidDilation`] if `coefficient` is not a
    /// positive finite number.
    pub fn set_time_dilation(
        &mut self,
        scope: impl Into<String>,
        coefficient: f64,
    ) -> Result<(), SchedulerError> {
        let scope = scope.into();
        if !coefficient.is_finite() || coefficient <= 0.0 {
            return Err(SchedulerError::InvalidDilation { scope, coefficient });
        }
        self.time_dilation.insert(scope, coefficient);
        Ok(())
    }

    /// Return the dilation coefficient for `scope` (1.0 when unset).
    pub fn get_time_dilation(&self, scope: &str) -> f64 {
        self.time_dilation
            .get(scope)
            .copied()
            .unwrap_or(DEFAULT_TIME_DILATION)
    }

    /// Return every registered dilation coefficient.
    pub const fn time_dilations(&self) -> &BTreeMap<String, f64> {
        &self.time_dilation
    }

    /// Execute one complete tick.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::Clock`] if the clock cannot advance, or
    /// [`TickError::Handler`] for the first handler failure under
    /// [`FailurePolicy::FailFast`]. The clock stays advanced and the rest of
    /// the cascade is skipped.
    pub fn run_tick(&mut self, world: &mut W) -> Result<TickReport, TickError> {
        let tick = self.clock.advance(1)?;
        let policy = self.failure_policy;
        let mut ctx = TickContext::new(self.clock.copy(), self.time_dilation.clone());
        let mut report = TickReport {
            tick,
            ..TickReport::default()
        };

        debug!(
            tick,
            turn = self.clock.current_turn(),
            pending = self.delayed.len(),
            "Tick started"
        );

        // --- Delayed events ---
        while self
            .delayed
            .peek()
            .is_some_and(|Reverse(next)| next.key.run_tick <= tick)
        {
            let Some(Reverse(event)) = self.delayed.pop() else {
                break;
            };
            let outcome = (event.handler)(world, &mut ctx);
            absorb_deferred(&mut self.delayed, &mut self.next_sequence, &mut ctx);
            report.delayed_fired = report.delayed_fired.saturating_add(1);
            settle(outcome, policy, tick, None, event.label, &mut report)?;
        }

        // --- Phase cascade ---
        for &phase in Phase::ordered() {
            let Some(handlers) = self.handlers.get_mut(&phase) else {
                continue;
            };
            for handler in handlers.iter_mut() {
                let outcome = handler.run(world, &mut ctx);
                absorb_deferred(&mut self.delayed, &mut self.next_sequence, &mut ctx);
                report.handlers_run = report.handlers_run.saturating_add(1);
                settle(outcome, policy, tick, Some(phase), handler.name(), &mut report)?;
            }
        }

        debug!(
            tick,
            delayed_fired = report.delayed_fired,
            handlers_run = report.handlers_run,
            failures = report.failures.len(),
            "Tick completed"
        );
        Ok(report)
    }

    /// Run `ticks` ticks back to back, returning each tick's report.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first [`TickError`].
    pub fn run(&mut self, world: &mut W, ticks: u64) -> Result<Vec<TickReport>, TickError> {
        let mut reports = Vec::new();
        for _ in 0..ticks {
            reports.push(self.run_tick(world)?);
        }
        Ok(reports)
    }
}

impl<W> fmt::Debug for Scheduler<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handler_counts: BTreeMap<Phase, usize> = self
            .handlers
            .iter()
            .map(|(phase, handlers)| (*phase, handlers.len()))
            .collect();
        f.debug_struct("Scheduler")
            .field("clock", &self.clock)
            .field("handlers", &handler_counts)
            .field("pending_events", &self.delayed.len())
            .field("time_dilation", &self.time_dilation)
            .field("failure_policy", &self.failure_policy)
            .finish()
    }
}

/// Validate a delay and compute its absolute run tick.
fn resolve_run_tick(current_tick: u64, delay_ticks: i64) -> Result<u64, SchedulerError> {
    let delay = u64::try_from(delay_ticks)
        .map_err(|_err| SchedulerError::NegativeDelay { delay_ticks })?;
    current_tick
        .checked_add(delay)
        .ok_or(SchedulerError::TickOverflow {
            current_tick,
            delay_ticks,
        })
}

/// Assign the next sequence number and push onto the heap.
fn push_delayed<W>(
    heap: &mut BinaryHeap<Reverse<DelayedEvent<W>>>,
    next_sequence: &mut u64,
    deferred: Deferred<W>,
) -> ScheduledEvent {
    let key = ScheduledEvent {
        run_tick: deferred.run_tick,
        priority: deferred.priority,
        sequence: *next_sequence,
    };
    *next_sequence = next_sequence.saturating_add(1);
    heap.push(Reverse(DelayedEvent {
        key,
        label: deferred.label,
        handler: deferred.handler,
    }));
    key
}

/// Move events deferred by the last handler onto the heap, in the order the
/// handler scheduled them.
fn absorb_deferred<W>(
    heap: &mut BinaryHeap<Reverse<DelayedEvent<W>>>,
    next_sequence: &mut u64,
    ctx: &mut TickContext<W>,
) {
    for deferred in ctx.deferred.drain(..) {
        push_delayed(heap, next_sequence, deferred);
    }
}

/// Error boundary: turn a handler outcome into a failure record and apply
/// the failure policy.
fn settle(
    outcome: HandlerResult,
    policy: FailurePolicy,
    tick: u64,
    phase: Option<Phase>,
    handler: &str,
    report: &mut TickReport,
) -> Result<(), TickError> {
    let Err(source) = outcome else {
        return Ok(());
    };
    let failure = HandlerFailure {
        tick,
        phase,
        handler: handler.to_owned(),
        message: source.to_string(),
    };
    match policy {
        FailurePolicy::FailFast => Err(TickError::Handler { failure, source }),
        FailurePolicy::Aggregate => {
            warn!(
                tick,
                phase = phase.map(Phase::as_str),
                handler,
                error = %source,
                "Handler failed, continuing tick"
            );
            report.failures.push(failure);
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::config::ClockConfig;

    /// Test world: an append-only log of what ran.
    type Log = Vec<String>;

    fn clock_at(tick: u64) -> Clock {
        Clock::from_parts(tick, &ClockConfig::default()).unwrap()
    }

    fn scheduler() -> Scheduler<Log> {
        Scheduler::new(clock_at(0))
    }

    fn record(
        entry: &'static str,
    ) -> impl FnMut(&mut Log, &mut TickContext<Log>) -> HandlerResult + 'static {
        move |log: &mut Log, ctx: &mut TickContext<Log>| {
            log.push(format!("{entry}@{}", ctx.tick()));
            Ok(())
        }
    }

    #[test]
    fn run_tick_advances_clock() {
        let mut sched = scheduler();
        let mut log = Log::new();
        let report = sched.run_tick(&mut log).unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(sched.clock().current_tick(), 1);
    }

    #[test]
    fn phases_run_in_canonical_order() {
        let mut sched = scheduler();
        // Register in reverse to prove order comes from the taxonomy.
        sched.register_fn(Phase::Reflection, "reflect", record("reflection"));
        sched.register_fn(Phase::Resolution, "resolve", record("resolution"));
        sched.register_fn(Phase::WorldWake, "wake", record("world_wake"));
        sched.register_fn(Phase::Decision, "decide", record("decision"));

        let mut log = Log::new();
        let report = sched.run_tick(&mut log).unwrap();

        assert_eq!(
            log,
            vec!["world_wake@1", "decision@1", "resolution@1", "reflection@1"]
        );
        assert_eq!(report.handlers_run, 4);
    }

    #[test]
    fn handlers_within_a_phase_run_in_registration_order() {
        let mut sched = scheduler();
        sched.register_fn(Phase::Decision, "first", record("first"));
        sched.register_fn(Phase::Decision, "second", record("second"));
        sched.register_fn(Phase::Decision, "third", record("third"));

        let mut log = Log::new();
        sched.run_tick(&mut log).unwrap();
        assert_eq!(log, vec!["first@1", "second@1", "third@1"]);
        assert_eq!(sched.phase_handler_count(Phase::Decision), 3);
    }

    #[test]
    fn double_registration_runs_twice() {
        let mut sched = scheduler();
        sched.register_fn(Phase::Persist, "dup", record("dup"));
        sched.register_fn(Phase::Persist, "dup", record("dup"));

        let mut log = Log::new();
        sched.run_tick(&mut log).unwrap();
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn delayed_event_fires_exactly_once_on_its_tick() {
        let mut sched = Scheduler::new(clock_at(10));
        let receipt = sched.schedule_event(3, record("delayed")).unwrap();
        assert_eq!(receipt.run_tick, 13);

        let mut log = Log::new();
        sched.run(&mut log, 2).unwrap();
        assert!(log.is_empty(), "fired early: {log:?}");

        let report = sched.run_tick(&mut log).unwrap();
        assert_eq!(report.tick, 13);
        assert_eq!(report.delayed_fired, 1);
        assert_eq!(log, vec!["delayed@13"]);

        sched.run(&mut log, 5).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(sched.pending_events(), 0);
    }

    #[test]
    fn zero_delay_fires_on_the_next_tick() {
        let mut sched = scheduler();
        sched.schedule_event(0, record("now")).unwrap();

        let mut log = Log::new();
        sched.run_tick(&mut log).unwrap();
        assert_eq!(log, vec!["now@1"]);
    }

    #[test]
    fn delayed_events_fire_before_phase_handlers() {
        let mut sched = scheduler();
        sched.register_fn(Phase::WorldWake, "wake", record("wake"));
        sched.schedule_event(1, record("delayed")).unwrap();

        let mut log = Log::new();
        sched.run_tick(&mut log).unwrap();
        assert_eq!(log, vec!["delayed@1", "wake@1"]);
    }

    #[test]
    fn delayed_events_order_by_tick_then_priority_then_sequence() {
        let mut sched = scheduler();
        sched.schedule_event_with_priority(2, 0, record("late")).unwrap();
        sched.schedule_event_with_priority(1, 5, record("low-a")).unwrap();
        sched.schedule_event_with_priority(1, -1, record("urgent")).unwrap();
        sched.schedule_event_with_priority(1, 5, record("low-b")).unwrap();

        // Jump two ticks at once so both due ticks drain in one pass.
        let mut sched = Scheduler {
            clock: clock_at(1),
            ..sched
        };

        let mut log = Log::new();
        let report = sched.run_tick(&mut log).unwrap();
        assert_eq!(report.delayed_fired, 4);
        assert_eq!(log, vec!["urgent@2", "low-a@2", "low-b@2", "late@2"]);
    }

    #[test]
    fn negative_delay_is_rejected_without_side_effects() {
        let mut sched = scheduler();
        let result = sched.schedule_event(-1, record("never"));
        assert_eq!(
            result.unwrap_err(),
            SchedulerError::NegativeDelay { delay_ticks: -1 }
        );
        assert_eq!(sched.pending_events(), 0);

        // The sequence counter was not consumed either.
        let receipt = sched.schedule_event(0, record("ok")).unwrap();
        assert_eq!(receipt.sequence, 0);
    }

    #[test]
    fn handlers_can_defer_work_through_the_context() {
        let mut sched = scheduler();
        sched.register_fn(
            Phase::Decision,
            "planner",
            |log: &mut Log, ctx: &mut TickContext<Log>| {
                if ctx.tick() == 1 {
                    ctx.schedule_event(2, |log: &mut Log, ctx: &mut TickContext<Log>| {
                        log.push(format!("follow-up@{}", ctx.tick()));
                        Ok(())
                    })?;
                }
                log.push(format!("plan@{}", ctx.tick()));
                Ok(())
            },
        );

        let mut log = Log::new();
        sched.run(&mut log, 4).unwrap();
        assert_eq!(
            log,
            vec!["plan@1", "plan@2", "follow-up@3", "plan@3", "plan@4"]
        );
    }

    #[test]
    fn zero_delay_deferred_during_cascade_waits_for_next_tick() {
        let mut sched = scheduler();
        sched.register_fn(
            Phase::WorldWake,
            "spawner",
            |_log: &mut Log, ctx: &mut TickContext<Log>| {
                if ctx.tick() == 1 {
                    ctx.schedule_event(0, |log: &mut Log, ctx: &mut TickContext<Log>| {
                        log.push(format!("spawned@{}", ctx.tick()));
                        Ok(())
                    })?;
                }
                Ok(())
            },
        );

        let mut log = Log::new();
        sched.run_tick(&mut log).unwrap();
        assert!(log.is_empty());
        sched.run_tick(&mut log).unwrap();
        assert_eq!(log, vec!["spawned@2"]);
    }

    #[test]
    fn zero_delay_deferred_by_a_delayed_event_fires_in_the_same_tick() {
        let mut sched = scheduler();
        sched.register_fn(Phase::WorldWake, "wake", record("wake"));
        sched
            .schedule_event(1, |log: &mut Log, ctx: &mut TickContext<Log>| {
                log.push(format!("first@{}", ctx.tick()));
                ctx.schedule_event(0, |log: &mut Log, ctx: &mut TickContext<Log>| {
                    log.push(format!("chained@{}", ctx.tick()));
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap();

        let mut log = Log::new();
        let report = sched.run_tick(&mut log).unwrap();
        assert_eq!(log, vec!["first@1", "chained@1", "wake@1"]);
        assert_eq!(report.delayed_fired, 2);
        assert_eq!(sched.pending_events(), 0);
    }

    #[test]
    fn context_rejects_negative_delay() {
        let mut sched = scheduler();
        sched.register_fn(
            Phase::Decision,
            "bad",
            |_log: &mut Log, ctx: &mut TickContext<Log>| {
                ctx.schedule_event(-5, |_: &mut Log, _: &mut TickContext<Log>| Ok(()))?;
                Ok(())
            },
        );

        let mut log = Log::new();
        let err = sched.run_tick(&mut log).unwrap_err();
        assert!(matches!(err, TickError::Handler { .. }));
        assert_eq!(sched.pending_events(), 0);
    }

    #[test]
    fn fail_fast_aborts_the_rest_of_the_tick() {
        let mut sched = scheduler();
        sched.register_fn(Phase::WorldWake, "wake", record("wake"));
        sched.register_fn(
            Phase::Decision,
            "broken",
            |_log: &mut Log, _ctx: &mut TickContext<Log>| Err("decision exploded".into()),
        );
        sched.register_fn(Phase::Resolution, "resolve", record("resolve"));

        let mut log = Log::new();
        let err = sched.run_tick(&mut log).unwrap_err();

        let TickError::Handler { failure, .. } = err else {
            panic!("expected handler failure");
        };
        assert_eq!(failure.tick, 1);
        assert_eq!(failure.phase, Some(Phase::Decision));
        assert_eq!(failure.handler, "broken");
        assert_eq!(failure.message, "decision exploded");
        assert_eq!(log, vec!["wake@1"]);
        // The clock stays advanced.
        assert_eq!(sched.clock().current_tick(), 1);
    }

    #[test]
    fn aggregate_policy_collects_failures_and_continues() {
        let mut sched = scheduler();
        sched.set_failure_policy(FailurePolicy::Aggregate);
        sched.schedule_event(1, |_: &mut Log, _: &mut TickContext<Log>| Err("stale".into()))
            .unwrap();
        sched.register_fn(
            Phase::Decision,
            "broken",
            |_log: &mut Log, _ctx: &mut TickContext<Log>| Err("decision exploded".into()),
        );
        sched.register_fn(Phase::Resolution, "resolve", record("resolve"));

        let mut log = Log::new();
        let report = sched.run_tick(&mut log).unwrap();

        assert_eq!(log, vec!["resolve@1"]);
        assert_eq!(report.failures.len(), 2);
        let delayed = report.failures.first().unwrap();
        assert_eq!(delayed.phase, None);
        assert_eq!(delayed.message, "stale");
        let phase = report.failures.get(1).unwrap();
        assert_eq!(phase.phase, Some(Phase::Decision));
    }

    #[test]
    fn time_dilation_defaults_to_one() {
        let sched = scheduler();
        assert!((sched.get_time_dilation("economy") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn time_dilation_is_stored_and_visible_to_handlers() {
        let mut sched = scheduler();
        sched.set_time_dilation("economy", 0.25).unwrap();
        assert!((sched.get_time_dilation("economy") - 0.25).abs() < f64::EPSILON);

        sched.register_fn(
            Phase::Perception,
            "observer",
            |log: &mut Log, ctx: &mut TickContext<Log>| {
                log.push(format!("{}", ctx.time_dilation("economy")));
                log.push(format!("{}", ctx.time_dilation("unknown")));
                Ok(())
            },
        );
        let mut log = Log::new();
        sched.run_tick(&mut log).unwrap();
        assert_eq!(log, vec!["0.25", "1"]);
    }

    #[test]
    fn non_positive_dilation_is_rejected_without_side_effects() {
        let mut sched = scheduler();
        sched.set_time_dilation("economy", 2.0).unwrap();

        for coefficient in [0.0, -1.0, f64::NAN] {
            let result = sched.set_time_dilation("economy", coefficient);
            assert!(matches!(result, Err(SchedulerError::InvalidDilation { .. })));
        }
        assert!((sched.get_time_dilation("economy") - 2.0).abs() < f64::EPSILON);
        assert_eq!(sched.time_dilations().len(), 1);
    }

    #[test]
    fn with_config_applies_policy_and_dilation() {
        let mut time_dilation = BTreeMap::new();
        time_dilation.insert("rumor".to_owned(), 3.0);
        let config = SchedulerConfig {
            failure_policy: FailurePolicy::Aggregate,
            time_dilation,
        };
        let sched: Scheduler<Log> = Scheduler::with_config(clock_at(0), &config).unwrap();
        assert_eq!(sched.failure_policy(), FailurePolicy::Aggregate);
        assert!((sched.get_time_dilation("rumor") - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn run_returns_one_report_per_tick() {
        let mut sched = scheduler();
        let mut log = Log::new();
        let reports = sched.run(&mut log, 5).unwrap();
        let ticks: Vec<u64> = reports.iter().map(|r| r.tick).collect();
        assert_eq!(ticks, vec![1, 2, 3, 4, 5]);
    }
}
