//! Integration tests for the event bus across several ticks.
//!
//! These exercise the bus the way an orchestrator drives it: publish during
//! a tick, dispatch after it, requeue survivors with an aged TTL, and emit
//! telemetry at a fixed cadence.

#![allow(clippy::unwrap_used)]

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use strata_events::{Event, EventBus, Priority, TelemetrySnapshot};

#[test]
fn requeued_events_expire_after_their_lifetime() {
    let mut bus = EventBus::new();
    let heard = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&heard);
    bus.subscribe_to("rumor", move |event| sink.borrow_mut().push(event.ttl()));

    bus.publish(
        Event::new("rumor", 0)
            .with_ttl(1)
            .with_payload(json!({ "about": "drought" })),
    );

    // A gossip system re-publishes every delivered rumor with one less tick.
    for tick in 0..4_u64 {
        let delivered = bus.dispatch();
        for event in delivered {
            bus.publish(event.decremented());
        }
        bus.emit_telemetry(TelemetrySnapshot::new(tick));
    }

    assert_eq!(*heard.borrow(), [1, 0]);
    let expired: u64 = bus
        .telemetry_log()
        .iter()
        .map(TelemetrySnapshot::total_expired)
        .sum();
    assert_eq!(expired, 1);
    assert_eq!(bus.pending(), 0);
}

#[test]
fn mixed_priorities_drain_in_one_dispatch() {
    let mut bus = EventBus::new();
    let order = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&order);
    bus.subscribe(move |event| sink.borrow_mut().push(String::from(event.event_type())));

    bus.publish(Event::new("n1", 5));
    bus.publish(Event::new("l1", 5).with_priority(Priority::Low));
    bus.publish(Event::new("h1", 5).with_priority(Priority::High));
    bus.publish(Event::new("n2", 5));
    bus.publish(Event::new("c1", 5).with_priority(Priority::Critical));
    bus.publish(Event::new("h2", 5).with_priority(Priority::High));

    let delivered = bus.dispatch();
    assert_eq!(delivered.len(), 6);
    assert_eq!(*order.borrow(), ["c1", "h1", "h2", "n1", "n2", "l1"]);
    assert_eq!(bus.outbox().len(), 6);
}

#[test]
fn telemetry_subscribers_see_the_filled_snapshot() {
    let mut bus = EventBus::new();
    let depths = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&depths);
    bus.subscribe_telemetry(move |snapshot| sink.borrow_mut().push(snapshot.total_queue_depth()));

    bus.publish(Event::new("build", 1).with_actors(["mason"]));
    bus.emit_telemetry(TelemetrySnapshot::new(1));
    bus.dispatch();
    bus.emit_telemetry(TelemetrySnapshot::new(2));

    assert_eq!(*depths.borrow(), [1, 0]);
    let log = bus.telemetry_log();
    assert_eq!(log.first().unwrap().tick, 1);
    assert_eq!(log.get(1).unwrap().tick, 2);
}
