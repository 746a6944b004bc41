//! Phase handler trait and the per-invocation error boundary.
//!
//! Domain systems plug into the tick cascade by registering a
//! [`PhaseHandler`] against a [`Phase`]. Handlers return a
//! [`HandlerResult`]; the scheduler converts a returned error into a typed
//! [`HandlerFailure`] and applies the configured [`FailurePolicy`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::phase::Phase;
use crate::scheduler::TickContext;

/// Error type returned by handler bodies.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by handler bodies.
pub type HandlerResult = Result<(), HandlerError>;

/// A unit of domain work executed once per tick in a given phase.
///
/// The world state is passed by unique reference for the duration of the
/// call only. The [`TickContext`] carries the tick's clock copy, the time
/// dilation coefficients, and a deferral queue for delayed events.
pub trait PhaseHandler<W> {
    /// Identity reported in [`HandlerFailure`] records and logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Run the handler for the current tick.
    ///
    /// # Errors
    ///
    /// Any error aborts or is recorded according to the scheduler's
    /// [`FailurePolicy`].
    fn run(&mut self, world: &mut W, ctx: &mut TickContext<W>) -> HandlerResult;
}

/// A named closure adapted to [`PhaseHandler`].
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F> {
    /// Wrap a closure with a handler name.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<W, F> PhaseHandler<W> for FnHandler<F>
where
    F: FnMut(&mut W, &mut TickContext<W>) -> HandlerResult,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, world: &mut W, ctx: &mut TickContext<W>) -> HandlerResult {
        (self.f)(world, ctx)
    }
}

/// What the scheduler does when a handler returns an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the remainder of the tick and return the failure to the caller.
    #[default]
    FailFast,
    /// Keep running the cascade and collect failures in the tick report.
    Aggregate,
}

/// A handler error captured by the scheduler's error boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerFailure {
    /// Tick during which the handler failed.
    pub tick: u64,
    /// Phase of the failing handler, or `None` for a delayed event.
    pub phase: Option<Phase>,
    /// Name of the failing handler or delayed-event label.
    pub handler: String,
    /// Rendered error message.
    pub message: String,
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.phase {
            Some(phase) => write!(
                f,
                "handler '{}' failed in phase {phase} at tick {}: {}",
                self.handler, self.tick, self.message
            ),
            None => write!(
                f,
                "delayed event '{}' failed at tick {}: {}",
                self.handler, self.tick, self.message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter;

    impl PhaseHandler<u32> for Counter {
        fn run(&mut self, world: &mut u32, _ctx: &mut TickContext<u32>) -> HandlerResult {
            *world = world.saturating_add(1);
            Ok(())
        }
    }

    #[test]
    fn default_name_is_the_type_name() {
        assert!(Counter.name().ends_with("Counter"));
    }

    #[test]
    fn fn_handler_reports_its_name() {
        let handler = FnHandler::new("census", |_: &mut u32, _: &mut TickContext<u32>| -> HandlerResult {
            Ok(())
        });
        assert_eq!(PhaseHandler::<u32>::name(&handler), "census");
    }

    #[test]
    fn failure_display_names_the_phase() {
        let failure = HandlerFailure {
            tick: 4,
            phase: Some(Phase::Decision),
            handler: "planner".to_owned(),
            message: "boom".to_owned(),
        };
        assert_eq!(
            failure.to_string(),
            "handler 'planner' failed in phase decision at tick 4: boom"
        );
    }

    #[test]
    fn fail_fast_is_the_default_policy() {
        assert_eq!(FailurePolicy::default(), FailurePolicy::FailFast);
    }
}
