//! The priority event bus.
//!
//! Publishing appends to an introspection outbox and pushes onto a binary
//! heap keyed `(priority class, publish sequence)`. [`EventBus::dispatch`]
//! drains the heap in one pass, dropping expired events and delivering the
//! rest to every active matching subscription in registration order.
//!
//! The bus is single-threaded. Subscriber callbacks run inline during
//! dispatch and cannot reach back into the bus.

use std::cell::Cell;
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::event::Event;
use crate::ids::SubscriptionId;
use crate::telemetry::TelemetrySnapshot;

/// Latency key the bus writes into emitted telemetry.
pub const DISPATCH_LATENCY_KEY: &str = "bus.dispatch";

/// Counter key for events published since the previous emit.
pub const PUBLISHED_COUNTER_KEY: &str = "bus.published";

/// Counter key for events delivered since the previous emit.
pub const DELIVERED_COUNTER_KEY: &str = "bus.delivered";

type EventCallback = Box<dyn FnMut(&Event)>;
type EventPredicate = Box<dyn Fn(&Event) -> bool>;
type TelemetryCallback = Box<dyn FnMut(&TelemetrySnapshot)>;

/// Caller-side handle to a registered subscription.
///
/// The active flag is shared with the bus registry and is read again for
/// every event, so a toggle takes effect immediately, even from inside a
/// callback during dispatch. Deactivating stops delivery without removing
/// the record; reactivating resumes it.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: SubscriptionId,
    active: Rc<Cell<bool>>,
}

impl Subscription {
    /// Return the registration identifier.
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Whether the subscription currently receives events.
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Toggle delivery.
    pub fn set_active(&self, active: bool) {
        self.active.set(active);
    }

    /// Stop delivery. Equivalent to `set_active(false)`.
    pub fn deactivate(&self) {
        self.set_active(false);
    }
}

struct SubscriptionRecord {
    active: Rc<Cell<bool>>,
    predicate: EventPredicate,
    callback: EventCallback,
}

impl SubscriptionRecord {
    fn accepts(&self, event: &Event) -> bool {
        self.active.get() && (self.predicate)(event)
    }
}

struct QueuedEvent {
    priority_index: u8,
    sequence: u64,
    event: Event,
}

impl QueuedEvent {
    const fn key(&self) -> (u8, u64) {
        (self.priority_index, self.sequence)
    }
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Priority queue, subscription registry, and telemetry aggregator.
#[derive(Default)]
pub struct EventBus {
    queue: BinaryHeap<Reverse<QueuedEvent>>,
    next_sequence: u64,
    outbox: Vec<Event>,
    subscriptions: Vec<SubscriptionRecord>,
    next_subscription: u64,
    telemetry_subscribers: Vec<TelemetryCallback>,
    telemetry_log: Vec<TelemetrySnapshot>,
    queue_depth: BTreeMap<String, u64>,
    expired_counts: BTreeMap<String, u64>,
    dropped_counts: BTreeMap<String, u64>,
    published_since_emit: u64,
    delivered_since_emit: u64,
    last_dispatch_ms: Option<f64>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback that receives every event.
    pub fn subscribe<C>(&mut self, callback: C) -> Subscription
    where
        C: FnMut(&Event) + 'static,
    {
        self.subscribe_filtered(|_| true, callback)
    }

    /// Register a callback that receives events matching `predicate`.
    pub fn subscribe_filtered<P, C>(&mut self, predicate: P, callback: C) -> Subscription
    where
        P: Fn(&Event) -> bool + 'static,
        C: FnMut(&Event) + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription = self.next_subscription.saturating_add(1);
        let active = Rc::new(Cell::new(true));

        self.subscriptions.push(SubscriptionRecord {
            active: Rc::clone(&active),
            predicate: Box::new(predicate),
            callback: Box::new(callback),
        });

        debug!(subscription = %id, "subscription registered");
        Subscription { id, active }
    }

    /// Register a callback for a single event type.
    pub fn subscribe_to<C>(&mut self, event_type: impl Into<String>, callback: C) -> Subscription
    where
        C: FnMut(&Event) + 'static,
    {
        let event_type = event_type.into();
        self.subscribe_filtered(move |event| event.event_type() == event_type, callback)
    }

    /// Number of registered subscriptions, active or not.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Queue an event for the next dispatch.
    pub fn publish(&mut self, event: Event) {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.saturating_add(1);

        let depth = self
            .queue_depth
            .entry(event.event_type().to_owned())
            .or_insert(0);
        *depth = depth.saturating_add(1);
        self.published_since_emit = self.published_since_emit.saturating_add(1);

        self.outbox.push(event.clone());
        self.queue.push(Reverse(QueuedEvent {
            priority_index: event.priority().queue_index(),
            sequence,
            event,
        }));
    }

    /// Drain the queue and deliver every live event.
    ///
    /// Events with a negative TTL are counted as expired and dropped. The
    /// delivered events are returned in delivery order.
    pub fn dispatch(&mut self) -> Vec<Event> {
        let started = Instant::now();
        let mut delivered = Vec::with_capacity(self.queue.len());

        while let Some(Reverse(queued)) = self.queue.pop() {
            let event = queued.event;
            if let Some(depth) = self.queue_depth.get_mut(event.event_type()) {
                *depth = depth.saturating_sub(1);
            }

            if event.is_expired() {
                let expired = self
                    .expired_counts
                    .entry(event.event_type().to_owned())
                    .or_insert(0);
                *expired = expired.saturating_add(1);
                debug!(
                    event_id = %event.id(),
                    event_type = event.event_type(),
                    ttl = event.ttl(),
                    "event expired before delivery"
                );
                continue;
            }

            for subscription in &mut self.subscriptions {
                if subscription.accepts(&event) {
                    (subscription.callback)(&event);
                }
            }
            delivered.push(event);
        }

        let delivered_count = u64::try_from(delivered.len()).unwrap_or(u64::MAX);
        self.delivered_since_emit = self.delivered_since_emit.saturating_add(delivered_count);
        self.last_dispatch_ms = Some(started.elapsed().as_secs_f64() * 1000.0);

        debug!(delivered = delivered.len(), "dispatch complete");
        delivered
    }

    /// Every event published since the last [`clear_outbox`](Self::clear_outbox).
    pub fn outbox(&self) -> &[Event] {
        &self.outbox
    }

    /// Forget the outbox. Queued events are unaffected.
    pub fn clear_outbox(&mut self) {
        self.outbox.clear();
    }

    /// Number of events waiting for dispatch.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Live queued count for `event_type`.
    pub fn queue_depth(&self, event_type: &str) -> u64 {
        self.queue_depth.get(event_type).copied().unwrap_or(0)
    }

    /// Expired count for `event_type` since the previous telemetry emit.
    pub fn expired_count(&self, event_type: &str) -> u64 {
        self.expired_counts.get(event_type).copied().unwrap_or(0)
    }

    /// Reserved drop count for `event_type`. Always zero today.
    pub fn dropped_count(&self, event_type: &str) -> u64 {
        self.dropped_counts.get(event_type).copied().unwrap_or(0)
    }

    /// Register a callback that receives every emitted telemetry snapshot.
    pub fn subscribe_telemetry<C>(&mut self, callback: C)
    where
        C: FnMut(&TelemetrySnapshot) + 'static,
    {
        self.telemetry_subscribers.push(Box::new(callback));
    }

    /// Fill, record, and broadcast a telemetry snapshot.
    ///
    /// Queue depths are copied as live state. Expired and dropped counts are
    /// copied and then reset, so each snapshot covers the interval since the
    /// previous emit. Caller-supplied latencies and counters are kept; the
    /// bus adds its own under the `bus.*` keys when they are absent.
    pub fn emit_telemetry(&mut self, mut snapshot: TelemetrySnapshot) -> TelemetrySnapshot {
        snapshot.queue_depth.clone_from(&self.queue_depth);
        snapshot.expired_counts = std::mem::take(&mut self.expired_counts);
        snapshot.dropped_counts = std::mem::take(&mut self.dropped_counts);

        if let Some(millis) = self.last_dispatch_ms {
            snapshot
                .latencies_ms
                .entry(DISPATCH_LATENCY_KEY.to_owned())
                .or_insert(millis);
        }
        snapshot
            .counters
            .entry(PUBLISHED_COUNTER_KEY.to_owned())
            .or_insert(self.published_since_emit);
        snapshot
            .counters
            .entry(DELIVERED_COUNTER_KEY.to_owned())
            .or_insert(self.delivered_since_emit);
        self.published_since_emit = 0;
        self.delivered_since_emit = 0;

        let expired = snapshot.total_expired();
        if expired > 0 {
            warn!(
                tick = snapshot.tick,
                expired,
                "events expired since previous telemetry"
            );
        }

        self.telemetry_log.push(snapshot.clone());
        for subscriber in &mut self.telemetry_subscribers {
            subscriber(&snapshot);
        }
        snapshot
    }

    /// Every snapshot emitted so far, oldest first.
    pub fn telemetry_log(&self) -> &[TelemetrySnapshot] {
        &self.telemetry_log
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("pending", &self.queue.len())
            .field("outbox", &self.outbox.len())
            .field("subscriptions", &self.subscriptions.len())
            .field("telemetry_subscribers", &self.telemetry_subscribers.len())
            .field("telemetry_log", &self.telemetry_log.len())
            .field("queue_depth", &self.queue_depth)
            .field("expired_counts", &self.expired_counts)
            .finish_non_exhaustive()
    }
}
