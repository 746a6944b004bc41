//! Priority event bus and telemetry for the Strata simulation kernel.
//!
//! Domain systems publish immutable [`Event`] records during the tick
//! cascade; the orchestrator drains them with [`EventBus::dispatch`] after
//! the tick. Delivery order is total: by [`Priority`] class, then by publish
//! order within a class.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe identifiers for events and subscriptions
//! - [`event`] -- The [`Event`] record and [`Priority`] classes
//! - [`bus`] -- The [`EventBus`] queue, subscription registry, and counters
//! - [`telemetry`] -- [`TelemetrySnapshot`] records emitted by the bus

pub mod bus;
pub mod event;
pub mod ids;
pub mod telemetry;

pub use bus::{EventBus, Subscription};
pub use event::{DEFAULT_TTL, Event, Priority};
pub use ids::{EventId, SubscriptionId};
pub use telemetry::TelemetrySnapshot;
