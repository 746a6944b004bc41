//! Simulation clock for the Strata kernel.
//!
//! The clock is a pure integer tick counter. Every coarser unit (turn,
//! cycle, epoch, era) is derived from the tick by fixed integer ratios and
//! is never stored independently. The tick number is the source of truth.
//!
//! # Design Principles
//!
//! - The tick counter never decreases. Negative advances are rejected.
//! - All derivations use checked arithmetic (no silent overflow).
//! - The clock is a plain `Copy` value, so handing a copy to a handler can
//!   never mutate the scheduler-owned clock.

use serde::Serialize;

use crate::config::ClockConfig;

/// Errors that can occur during clock operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// A negative tick count was passed to [`Clock::advance`].
    #[error("cannot advance the clock by a negative tick count ({ticks})")]
    NegativeAdvance {
        /// The rejected tick count.
        ticks: i64,
    },

    /// Tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,

    /// Invalid clock configuration (e.g. zero ticks per turn).
    #[error("invalid clock configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

/// Integer tick clock with nested derived time units.
///
/// `current_turn = tick / ticks_per_turn` and
/// `current_cycle = tick / ticks_per_cycle`; epochs are counted in cycles
/// and eras in epochs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Clock {
    /// Current tick number (starts at 0, incremented once per scheduler tick).
    current_tick: u64,

    /// Simulated seconds represented by one tick.
    tick_length_seconds: f64,

    /// Ticks in one turn.
    ticks_per_turn: u64,

    /// Ticks in one cycle.
    ticks_per_cycle: u64,

    /// Cycles in one epoch.
    cycles_per_epoch: u64,

    /// Epochs in one era.
    epochs_per_era: u64,
}

impl Clock {
    /// Create a new clock at tick 0 from a clock configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if any ratio is zero or the tick
    /// length is not a positive finite number.
    pub fn new(config: &ClockConfig) -> Result<Self, ClockError> {
        Self::from_parts(0, config)
    }

    /// Create a clock at an explicit tick (useful for tests and state
    /// restoration).
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if the configuration is invalid.
    pub fn from_parts(current_tick: u64, config: &ClockConfig) -> Result<Self, ClockError> {
        validate(config)?;
        Ok(Self {
            current_tick,
            tick_length_seconds: config.tick_length_seconds,
            ticks_per_turn: config.ticks_per_turn,
            ticks_per_cycle: config.ticks_per_cycle,
            cycles_per_epoch: config.cycles_per_epoch,
            epochs_per_era: config.epochs_per_era,
        })
    }

    /// Advance the clock by `ticks`. Returns the new tick number.
    ///
    /// The clock is left untouched when the call fails.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::NegativeAdvance`] if `ticks < 0`, or
    /// [`ClockError::TickOverflow`] if the counter would exceed `u64::MAX`.
    pub fn advance(&mut self, ticks: i64) -> Result<u64, ClockError> {
        let delta = u64::try_from(ticks).map_err(|_err| ClockError::NegativeAdvance { ticks })?;
        self.current_tick = self
            .current_tick
            .checked_add(delta)
            .ok_or(ClockError::TickOverflow)?;
        Ok(self.current_tick)
    }

    /// Return an independent copy of this clock.
    ///
    /// Handlers receive copies, so nothing they do can move the
    /// scheduler-owned clock.
    pub const fn copy(&self) -> Self {
        *self
    }

    /// Return the current tick number.
    pub const fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Return the number of completed turns.
    pub const fn current_turn(&self) -> u64 {
        div_or_zero(self.current_tick, self.ticks_per_turn)
    }

    /// Return the number of completed cycles.
    pub const fn current_cycle(&self) -> u64 {
        div_or_zero(self.current_tick, self.ticks_per_cycle)
    }

    /// Return the number of completed epochs.
    pub const fn current_epoch(&self) -> u64 {
        div_or_zero(self.current_cycle(), self.cycles_per_epoch)
    }

    /// Return the number of completed eras.
    pub const fn current_era(&self) -> u64 {
        div_or_zero(self.current_epoch(), self.epochs_per_era)
    }

    /// Return the ticks remaining until the next turn boundary.
    ///
    /// Never zero: on the boundary tick itself a full turn remains.
    pub const fn ticks_until_turn_boundary(&self) -> u64 {
        ticks_until_boundary(self.current_tick, self.ticks_per_turn)
    }

    /// Return the ticks remaining until the next cycle boundary.
    pub const fn ticks_until_cycle_boundary(&self) -> u64 {
        ticks_until_boundary(self.current_tick, self.ticks_per_cycle)
    }

    /// Return the simulated seconds elapsed since tick 0.
    #[allow(clippy::cast_precision_loss)]
    pub fn elapsed_seconds(&self) -> f64 {
        // Precision loss only past 2^53 ticks.
        self.current_tick as f64 * self.tick_length_seconds
    }

    /// Return the simulated seconds represented by one tick.
    pub const fn tick_length_seconds(&self) -> f64 {
        self.tick_length_seconds
    }

    /// Return the configured ticks per turn.
    pub const fn ticks_per_turn(&self) -> u64 {
        self.ticks_per_turn
    }

    /// Return the configured ticks per cycle.
    pub const fn ticks_per_cycle(&self) -> u64 {
        self.ticks_per_cycle
    }

    /// Return the configured cycles per epoch.
    pub const fn cycles_per_epoch(&self) -> u64 {
        self.cycles_per_epoch
    }

    /// Return the configured epochs per era.
    pub const fn epochs_per_era(&self) -> u64 {
        self.epochs_per_era
    }
}

/// Check every ratio is at least 1 and the tick length is positive.
fn validate(config: &ClockConfig) -> Result<(), ClockError> {
    let ratios = [
        ("ticks_per_turn", config.ticks_per_turn),
        ("ticks_per_cycle", config.ticks_per_cycle),
        ("cycles_per_epoch", config.cycles_per_epoch),
        ("epochs_per_era", config.epochs_per_era),
    ];
    for (name, value) in ratios {
        if value == 0 {
            return Err(ClockError::InvalidConfig {
                reason: format!("{name} must be at least 1"),
            });
        }
    }
    if !config.tick_length_seconds.is_finite() || config.tick_length_seconds <= 0.0 {
        return Err(ClockError::InvalidConfig {
            reason: format!(
                "tick_length_seconds must be positive and finite (got {})",
                config.tick_length_seconds
            ),
        });
    }
    Ok(())
}

/// Integer division that yields 0 for a zero divisor.
const fn div_or_zero(value: u64, divisor: u64) -> u64 {
    match value.checked_div(divisor) {
        Some(quotient) => quotient,
        None => 0,
    }
}

/// Ticks left until `tick` reaches the next multiple of `period`.
const fn ticks_until_boundary(tick: u64, period: u64) -> u64 {
    let within = match tick.checked_rem(period) {
        Some(rem) => rem,
        None => 0,
    };
    period.saturating_sub(within)
}
