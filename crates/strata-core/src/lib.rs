//! Clock, phase taxonomy, and tick scheduler for the Strata simulation kernel.
//!
//! This crate owns the deterministic tick cascade that every domain system
//! hooks into: the clock advances, due delayed events fire, then every
//! registered phase handler runs in canonical phase order.
//!
//! # Modules
//!
//! - [`clock`] -- Integer tick counter with derived turn, cycle, epoch, and
//!   era units.
//! - [`config`] -- Kernel configuration loaded from `strata-config.yaml`.
//! - [`handler`] -- [`PhaseHandler`] trait, the handler error boundary, and
//!   [`FailurePolicy`].
//! - [`phase`] -- The closed, ordered [`Phase`] taxonomy.
//! - [`scheduler`] -- The [`Scheduler`] tick loop, delayed-event heap, and
//!   time dilation registry.
//!
//! [`PhaseHandler`]: handler::PhaseHandler
//! [`FailurePolicy`]: handler::FailurePolicy
//! [`Phase`]: phase::Phase
//! [`Scheduler`]: scheduler::Scheduler

pub mod clock;
pub mod config;
pub mod handler;
pub mod phase;
pub mod scheduler;

pub use clock::{Clock, ClockError};
pub use config::{
    ClockConfig, ConfigError, KernelConfig, LoggingConfig, RunConfig, SchedulerConfig,
    SnapshotConfig,
};
pub use handler::{
    FailurePolicy, FnHandler, HandlerError, HandlerFailure, HandlerResult, PhaseHandler,
};
pub use phase::Phase;
pub use scheduler::{ScheduledEvent, Scheduler, SchedulerError, TickContext, TickError, TickReport};
