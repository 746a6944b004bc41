//! Reference orchestrator binary for the Strata simulation kernel.
//!
//! Loads configuration, assembles the scheduler, event bus, and snapshot
//! manager around a small instrumentation world, and drives the tick loop
//! until the tick budget is spent or Ctrl-C is pressed.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `STRATA_CONFIG` or `strata-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Assemble the kernel
//! 4. Install the Ctrl-C handler
//! 5. Run the tick loop
//! 6. Log the result and the final state signature

mod error;
mod harness;
mod runner;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use strata_core::KernelConfig;
use strata_core::config::LoggingConfig;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::runner::Kernel;

/// Environment variable naming an alternative config file.
const CONFIG_PATH_ENV: &str = "STRATA_CONFIG";

/// Config file looked up in the working directory by default.
const DEFAULT_CONFIG_PATH: &str = "strata-config.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if configuration, kernel assembly, or a tick fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration. Logging is not up yet, so report the source after.
    let (config, source) = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging)?;
    info!(
        source = %source,
        max_ticks = config.run.max_ticks,
        tick_interval_ms = config.run.tick_interval_ms,
        ticks_per_turn = config.clock.ticks_per_turn,
        "strata-engine starting"
    );

    // 3. Assemble the kernel.
    let mut kernel = Kernel::build(&config)?;

    // 4. Ctrl-C requests a stop at the next tick boundary.
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl-C received, stopping after the current tick");
                    stop.store(true, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                }
            }
        });
    }

    // 5. Run.
    let summary = runner::run(&mut kernel, &config.run, stop).await?;

    // 6. Log results.
    runner::log_run_end(&summary);
    info!(
        final_tick = kernel.scheduler().clock().current_tick(),
        grain = kernel.world().grain,
        harvests = kernel.world().harvests,
        "strata-engine shutdown complete"
    );

    Ok(())
}

/// Load the kernel configuration.
///
/// `STRATA_CONFIG` names the file when set and must exist. Otherwise
/// `strata-config.yaml` in the working directory is used if present, and
/// built-in defaults if not.
fn load_config() -> Result<(KernelConfig, String), EngineError> {
    if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(explicit);
        let config = KernelConfig::from_file(&path)?;
        return Ok((config, path.display().to_string()));
    }

    let path = Path::new(DEFAULT_CONFIG_PATH);
    if path.exists() {
        let config = KernelConfig::from_file(path)?;
        Ok((config, path.display().to_string()))
    } else {
        let mut config = KernelConfig::default();
        config.logging.apply_env_overrides();
        Ok((config, String::from("defaults")))
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
fn init_tracing(logging: &LoggingConfig) -> Result<(), EngineError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| EngineError::Logging {
        message: e.to_string(),
    })
}
