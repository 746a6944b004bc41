//! The immutable event record and its priority classes.
//!
//! Events are assembled with the `with_*` builder methods and then handed to
//! the bus. Fields are private and only readable afterwards, so a published
//! event cannot change underneath its subscribers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::EventId;

/// Lifetime given to events that do not set one.
pub const DEFAULT_TTL: i64 = 1;

/// Delivery precedence class. Lower classes are served first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Served before everything else.
    Critical,
    /// Served after critical events.
    High,
    /// The default class.
    #[default]
    Normal,
    /// Served last.
    Low,
}

impl Priority {
    /// Return the heap key for this class (0 = served first).
    pub const fn queue_index(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }
}

/// A message published on the bus.
///
/// `ttl` is the absolute remaining lifetime set at creation. The bus never
/// decays it; an event whose `ttl` is negative when it is popped is dropped
/// and counted as expired. Systems that requeue an event across ticks use
/// [`Event::decremented`] to age it explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    event_type: String,
    tick: u64,
    ttl: i64,
    payload: Value,
    priority: Priority,
    emitter: Option<String>,
    actors: Vec<String>,
}

impl Event {
    /// Create a normal-priority event with the default TTL and a null
    /// payload.
    pub fn new(event_type: impl Into<String>, tick: u64) -> Self {
        Self {
            id: EventId::new(),
            event_type: event_type.into(),
            tick,
            ttl: DEFAULT_TTL,
            payload: Value::Null,
            priority: Priority::default(),
            emitter: None,
            actors: Vec::new(),
        }
    }

    /// Replace the generated identifier.
    #[must_use]
    pub const fn with_id(mut self, id: EventId) -> Self {
        self.id = id;
        self
    }

    /// Set the remaining lifetime.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: i64) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the JSON payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set the priority class.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Name the system that emitted the event.
    #[must_use]
    pub fn with_emitter(mut self, emitter: impl Into<String>) -> Self {
        self.emitter = Some(emitter.into());
        self
    }

    /// Set the actors the event concerns.
    #[must_use]
    pub fn with_actors<I, S>(mut self, actors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actors = actors.into_iter().map(Into::into).collect();
        self
    }

    /// Return a copy with one less tick of lifetime and the same identity.
    #[must_use]
    pub fn decremented(&self) -> Self {
        Self {
            ttl: self.ttl.saturating_sub(1),
            ..self.clone()
        }
    }

    /// Whether the bus will drop this event instead of delivering it.
    pub const fn is_expired(&self) -> bool {
        self.ttl < 0
    }

    /// Return the event identifier.
    pub const fn id(&self) -> EventId {
        self.id
    }

    /// Return the event type used for routing and counters.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Return the tick the event was created on.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Return the remaining lifetime.
    pub const fn ttl(&self) -> i64 {
        self.ttl
    }

    /// Return the JSON payload.
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Return the priority class.
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Return the emitting system, if named.
    pub fn emitter(&self) -> Option<&str> {
        self.emitter.as_deref()
    }

    /// Return the actors the event concerns.
    pub fn actors(&self) -> &[String] {
        &self.actors
    }
}
