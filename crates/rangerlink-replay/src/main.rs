//! Offline replay tool for the RangerLink client.
//!
//! Plays a recorded session script against the in-memory host and a
//! scripted server, persisting snapshots to whichever store the
//! configuration selects. Useful for reproducing a player's report without
//! the game or a live server.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `rangerlink.yaml` (or the path given)
//! 2. Initialize structured logging (tracing)
//! 3. Open the snapshot store
//! 4. Load and play the script
//! 5. Print the final snapshot as JSON

mod error;
mod script;

use std::path::{Path, PathBuf};

use rangerlink_core::{ClientConfig, LoggingConfig};
use rangerlink_store::AnyStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::ReplayError;
use crate::script::Script;

/// Application entry point for the replay tool.
///
/// # Errors
///
/// Returns an error if configuration, the store, the script or a scripted
/// tick fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let script_path = args.next().map(PathBuf::from).ok_or(ReplayError::Usage)?;
    let config_path = args
        .next()
        .map_or_else(|| PathBuf::from("rangerlink.yaml"), PathBuf::from);

    // 1. Load configuration.
    let config = load_config(&config_path)?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!(
        config = %config_path.display(),
        host = %config.connection.host,
        port = config.connection.port,
        slot = %config.connection.slot_name,
        "rangerlink-replay starting"
    );

    // 3. Open the snapshot store.
    let store = AnyStore::open(&config.store).await.map_err(ReplayError::from)?;
    info!(store = ?config.store, "snapshot store opened");

    // 4. Play the script.
    let script = Script::load(&script_path)?;
    info!(steps = script.steps.len(), "script loaded");
    let report = script::play(script, &config, store).await?;

    info!(
        ticks = report.ticks,
        failed_ticks = report.failed_ticks,
        checks = report.session.checks.len(),
        gold = report.host.gold,
        snapshots_written = report.writer.written,
        "rangerlink-replay finished"
    );

    // 5. Print the final snapshot.
    let rendered = serde_json::to_string_pretty(&report.snapshot).map_err(ReplayError::from)?;
    println!("{rendered}");
    Ok(())
}

/// Load configuration, falling back to defaults if the file is absent.
fn load_config(path: &Path) -> Result<ClientConfig, ReplayError> {
    if path.exists() {
        return Ok(ClientConfig::from_file(path)?);
    }
    let mut config = ClientConfig::default();
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}
