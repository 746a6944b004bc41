//! Instrumentation world driven by the engine binary.
//!
//! A granary that drains every tick and refills on a delayed harvest, plus
//! per-phase run counters and the event bus.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::json;
use strata_core::{HandlerResult, Phase, PhaseHandler, Scheduler, TickContext};
use strata_events::{Event, EventBus, Priority};
use tracing::info;

/// Event type published on every turn boundary.
pub const HEARTBEAT_EVENT: &str = "turn.heartbeat";

/// Event type published when a delayed harvest lands.
pub const HARVEST_EVENT: &str = "granary.harvest";

/// Event type published while the granary is nearly empty.
pub const SHORTAGE_EVENT: &str = "granary.shortage";

/// Ticks between a turn boundary and the harvest it schedules.
pub const HARVEST_DELAY_TICKS: i64 = 3;

/// Grain added by one harvest.
pub const HARVEST_YIELD: u64 = 30;

/// Grain level at or below which a shortage is reported.
pub const SHORTAGE_THRESHOLD: u64 = 5;

const INITIAL_GRAIN: u64 = 50;

/// Root state passed into every handler.
#[derive(Debug, Serialize)]
pub struct HarnessWorld {
    /// Completed handler runs per phase.
    pub phase_runs: BTreeMap<Phase, u64>,
    /// Grain in the granary.
    pub grain: u64,
    /// Harvests that have landed.
    pub harvests: u64,
    /// Turn numbers that emitted a heartbeat.
    pub heartbeats: Vec<u64>,
    /// Weather dilation observed on the latest tick.
    pub weather_dilation: f64,
    /// Event bus owned by the world so handlers can publish.
    #[serde(skip)]
    pub bus: EventBus,
}

impl Default for HarnessWorld {
    fn default() -> Self {
        Self {
            phase_runs: BTreeMap::new(),
            grain: INITIAL_GRAIN,
            harvests: 0,
            heartbeats: Vec::new(),
            weather_dilation: 1.0,
            bus: EventBus::new(),
        }
    }
}

/// Counts every run of the phase it is registered to.
#[derive(Debug, Clone, Copy)]
pub struct PhaseCounter {
    phase: Phase,
}

impl PhaseCounter {
    /// Create a counter for `phase`.
    pub const fn new(phase: Phase) -> Self {
        Self { phase }
    }
}

impl PhaseHandler<HarnessWorld> for PhaseCounter {
    fn name(&self) -> &str {
        self.phase.as_str()
    }

    fn run(
        &mut self,
        world: &mut HarnessWorld,
        _ctx: &mut TickContext<HarnessWorld>,
    ) -> HandlerResult {
        let runs = world.phase_runs.entry(self.phase).or_insert(0);
        *runs = runs.saturating_add(1);
        Ok(())
    }
}

/// Register the instrumentation handlers on `scheduler`.
pub fn install(scheduler: &mut Scheduler<HarnessWorld>) {
    for &phase in Phase::ordered() {
        scheduler.register_handler(phase, PhaseCounter::new(phase));
    }
    scheduler.register_fn(Phase::WorldWake, "weather", observe_weather);
    scheduler.register_fn(Phase::Decision, "harvest-planner", plan_harvest);
    scheduler.register_fn(Phase::Resolution, "granary", consume_grain);
    scheduler.register_fn(Phase::Resolution, "heartbeat", emit_heartbeat);
}

/// Subscribe logging callbacks to the world's bus.
pub fn subscribe_logging(world: &mut HarnessWorld) {
    world.bus.subscribe_to(HEARTBEAT_EVENT, |event| {
        info!(
            tick = event.tick(),
            payload = %event.payload(),
            "Turn heartbeat"
        );
    });
    world.bus.subscribe_filtered(
        |event| event.priority() == Priority::Critical,
        |event| {
            info!(
                tick = event.tick(),
                event_type = event.event_type(),
                "Critical event delivered"
            );
        },
    );
}

const fn is_turn_boundary(ctx: &TickContext<HarnessWorld>) -> bool {
    let clock = ctx.clock();
    clock.ticks_until_turn_boundary() == clock.ticks_per_turn()
}

fn observe_weather(world: &mut HarnessWorld, ctx: &mut TickContext<HarnessWorld>) -> HandlerResult {
    world.weather_dilation = ctx.time_dilation("weather");
    Ok(())
}

fn plan_harvest(_world: &mut HarnessWorld, ctx: &mut TickContext<HarnessWorld>) -> HandlerResult {
    if !is_turn_boundary(ctx) {
        return Ok(());
    }
    ctx.schedule_event(HARVEST_DELAY_TICKS, land_harvest)?;
    Ok(())
}

fn land_harvest(world: &mut HarnessWorld, ctx: &mut TickContext<HarnessWorld>) -> HandlerResult {
    world.grain = world.grain.saturating_add(HARVEST_YIELD);
    world.harvests = world.harvests.saturating_add(1);
    world.bus.publish(
        Event::new(HARVEST_EVENT, ctx.tick())
            .with_emitter("harvest-planner")
            .with_payload(json!({ "grain": world.grain })),
    );
    Ok(())
}

fn consume_grain(world: &mut HarnessWorld, ctx: &mut TickContext<HarnessWorld>) -> HandlerResult {
    world.grain = world.grain.saturating_sub(1);
    if world.grain <= SHORTAGE_THRESHOLD {
        world.bus.publish(
            Event::new(SHORTAGE_EVENT, ctx.tick())
                .with_priority(Priority::Critical)
                .with_ttl(0)
                .with_emitter("granary")
                .with_payload(json!({ "grain": world.grain })),
        );
    }
    Ok(())
}

fn emit_heartbeat(world: &mut HarnessWorld, ctx: &mut TickContext<HarnessWorld>) -> HandlerResult {
    if !is_turn_boundary(ctx) {
        return Ok(());
    }
    let turn = ctx.clock().current_turn();
    world.heartbeats.push(turn);
    world.bus.publish(
        Event::new(HEARTBEAT_EVENT, ctx.tick())
            .with_priority(Priority::High)
            .with_emitter("heartbeat")
            .with_payload(json!({ "turn": turn })),
    );
    Ok(())
}
