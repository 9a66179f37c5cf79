//! Air-quality forecast daemon
//!
//! Keeps the forecast table fresh: checks the forecast file on start and
//! then periodically, running the pipeline whenever the file is missing or
//! older than the configured maximum age.

mod scheduler;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use aqf_config::AppConfig;
use aqf_pipeline::Pipeline;

use crate::scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    aqf_obs::init("aqfd");

    let config = AppConfig::load().context("Failed to load configuration")?;
    info!(
        source = %config.source.url,
        data_dir = %config.storage.dir.display(),
        stations = config.forecast.stations.len(),
        "Loaded configuration"
    );

    let pipeline = Pipeline::from_config(&config).context("Failed to build pipeline")?;
    let scheduler = Scheduler::new(
        Arc::new(pipeline),
        config.schedule.check_interval(),
        config.schedule.max_age(),
    );

    info!("Daemon running - press Ctrl+C to stop");

    tokio::select! {
        _ = scheduler.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
        }
    }

    info!("Forecast daemon stopped");
    Ok(())
}
