//! Main application entry point
//!
//! Usage: `vizdemo [config.json]`

use anyhow::{Context, Result};
use tracing::{info, warn};
use vz_core::{LogContext, VizConfig};

mod demo;

fn load_config() -> Result<VizConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path).with_context(|| format!("Failed to read config {}", path))?;
            VizConfig::from_json_str(&text).with_context(|| format!("Invalid config {}", path))
        }
        None => Ok(VizConfig::default()),
    }
}

fn main() -> Result<()> {
    let config = load_config()?;

    // Initialize tracing
    let installed = LogContext::from_config(&config.log).install_global();

    info!("Starting vizdemo");
    if !installed {
        warn!("A global logger was already installed");
    }

    let run = demo::run(config)?;
    for step in &run.steps {
        info!(
            "{:>8}: {} added, {} changed, {} removed",
            step.name, step.added, step.changed, step.removed
        );
    }
    info!("Restacked {} marks, click consumed: {}", run.restacked, run.click_consumed);

    Ok(())
}
