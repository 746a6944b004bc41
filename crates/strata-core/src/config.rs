//! Configuration loading and typed config structures for the Strata kernel.
//!
//! The canonical configuration lives in `strata-config.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure and a loader that reads and validates the file. Every field has
//! a default, so a partial (or missing) file is always usable.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::clock::{Clock, ClockError};
use crate::handler::FailurePolicy;

/// Environment variable that overrides `logging.level`.
pub const LOG_LEVEL_ENV: &str = "STRATA_LOG_LEVEL";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed correctly but is out of range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

impl From<ClockError> for ConfigError {
    fn from(source: ClockError) -> Self {
        Self::Invalid {
            reason: source.to_string(),
        }
    }
}

/// Top-level kernel configuration.
///
/// Mirrors the structure of `strata-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct KernelConfig {
    /// Clock ratios and tick length.
    #[serde(default)]
    pub clock: ClockConfig,

    /// Scheduler behavior.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Snapshot cadence and retention.
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Orchestrator run bounds.
    #[serde(default)]
    pub run: RunConfig,
}

impl KernelConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `STRATA_LOG_LEVEL` overrides `logging.level`. The result is
    /// validated before it is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.logging.apply_env_overrides();
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section for out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Clock::new(&self.clock)?;

        for (scope, coefficient) in &self.scheduler.time_dilation {
            if !coefficient.is_finite() || *coefficient <= 0.0 {
                return Err(ConfigError::Invalid {
                    reason: format!(
                        "time dilation for '{scope}' must be positive (got {coefficient})"
                    ),
                });
            }
        }

        if self.snapshot.full_interval == 0 {
            return Err(ConfigError::Invalid {
                reason: "snapshot.full_interval must be at least 1".to_owned(),
            });
        }
        if self.snapshot.retained_full_snapshots == 0 {
            return Err(ConfigError::Invalid {
                reason: "snapshot.retained_full_snapshots must be at least 1".to_owned(),
            });
        }
        if self.run.telemetry_interval_ticks == 0 {
            return Err(ConfigError::Invalid {
                reason: "run.telemetry_interval_ticks must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

/// Clock configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClockConfig {
    /// Simulated seconds per tick.
    #[serde(default = "default_tick_length_seconds")]
    pub tick_length_seconds: f64,

    /// Ticks in one turn.
    #[serde(default = "default_ticks_per_turn")]
    pub ticks_per_turn: u64,

    /// Ticks in one cycle.
    #[serde(default = "default_ticks_per_cycle")]
    pub ticks_per_cycle: u64,

    /// Cycles in one epoch.
    #[serde(default = "default_cycles_per_epoch")]
    pub cycles_per_epoch: u64,

    /// Epochs in one era.
    #[serde(default = "default_epochs_per_era")]
    pub epochs_per_era: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_length_seconds: default_tick_length_seconds(),
            ticks_per_turn: default_ticks_per_turn(),
            ticks_per_cycle: default_ticks_per_cycle(),
            cycles_per_epoch: default_cycles_per_epoch(),
            epochs_per_era: default_epochs_per_era(),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SchedulerConfig {
    /// Behavior when a handler returns an error.
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Initial time dilation coefficients by scope.
    #[serde(default)]
    pub time_dilation: BTreeMap<String, f64>,
}

/// Snapshot cadence and retention.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SnapshotConfig {
    /// A full snapshot replaces the delta every this many captures.
    #[serde(default = "default_full_interval")]
    pub full_interval: u64,

    /// Number of full snapshots kept in history.
    #[serde(default = "default_retained_full_snapshots")]
    pub retained_full_snapshots: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            full_interval: default_full_interval(),
            retained_full_snapshots: default_retained_full_snapshots(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl LoggingConfig {
    /// Apply `STRATA_LOG_LEVEL` if it is set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            self.level = level;
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Orchestrator run bounds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunConfig {
    /// Number of ticks to run before stopping.
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,

    /// Real-time milliseconds between ticks (0 = as fast as possible).
    #[serde(default)]
    pub tick_interval_ms: u64,

    /// Emit a telemetry snapshot every this many ticks.
    #[serde(default = "default_telemetry_interval_ticks")]
    pub telemetry_interval_ticks: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_ticks: default_max_ticks(),
            tick_interval_ms: 0,
            telemetry_interval_ticks: default_telemetry_interval_ticks(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_tick_length_seconds() -> f64 {
    1.0
}

const fn default_ticks_per_turn() -> u64 {
    24
}

const fn default_ticks_per_cycle() -> u64 {
    720
}

const fn default_cycles_per_epoch() -> u64 {
    12
}

const fn default_epochs_per_era() -> u64 {
    10
}

const fn default_full_interval() -> u64 {
    250
}

const fn default_retained_full_snapshots() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_max_ticks() -> u64 {
    1_000
}

const fn default_telemetry_interval_ticks() -> u64 {
    24
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = KernelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.clock.ticks_per_turn, 24);
        assert_eq!(config.snapshot.full_interval, 250);
        assert_eq!(config.scheduler.failure_policy, FailurePolicy::FailFast);
        assert!(config.scheduler.time_dilation.is_empty());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
clock:
  tick_length_seconds: 3600.0
  ticks_per_turn: 100
  ticks_per_cycle: 1000
  cycles_per_epoch: 4
  epochs_per_era: 2

scheduler:
  failure_policy: aggregate
  time_dilation:
    economy: 0.5
    rumor: 2.0

snapshot:
  full_interval: 10
  retained_full_snapshots: 2

logging:
  level: "debug"
  json: true

run:
  max_ticks: 500
  tick_interval_ms: 50
  telemetry_interval_ticks: 100
"#;

        let config = KernelConfig::parse(yaml).unwrap();
        assert_eq!(config.clock.ticks_per_turn, 100);
        assert_eq!(config.scheduler.failure_policy, FailurePolicy::Aggregate);
        assert_eq!(config.scheduler.time_dilation.len(), 2);
        assert_eq!(config.snapshot.full_interval, 10);
        assert_eq!(config.snapshot.retained_full_snapshots, 2);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert_eq!(config.run.max_ticks, 500);
        assert_eq!(config.run.tick_interval_ms, 50);
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = KernelConfig::parse("run:\n  max_ticks: 7\n").unwrap();
        assert_eq!(config.run.max_ticks, 7);
        // Everything else uses defaults
        assert_eq!(config.clock, ClockConfig::default());
        assert_eq!(config.snapshot, SnapshotConfig::default());
    }

    #[test]
    fn zero_clock_ratio_is_rejected() {
        let result = KernelConfig::parse("clock:\n  ticks_per_turn: 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn non_positive_dilation_is_rejected() {
        let result = KernelConfig::parse("scheduler:\n  time_dilation:\n    economy: 0.0\n");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn zero_full_interval_is_rejected() {
        let result = KernelConfig::parse("snapshot:\n  full_interval: 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn unknown_failure_policy_is_a_yaml_error() {
        let result = KernelConfig::parse("scheduler:\n  failure_policy: retry\n");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("strata-config.yaml");
        if path.exists() {
            let config = KernelConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
