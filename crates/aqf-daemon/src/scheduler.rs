//! Forecast refresh scheduler

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use aqf_pipeline::{forecast_is_stale, Pipeline, PipelineError, RunSummary};
use tracing::{debug, error, info, warn};

/// What a single check did
#[derive(Debug)]
pub enum CheckOutcome {
    /// Forecast file is recent enough
    Fresh,
    /// A run was already in progress
    Skipped,
    Ran(RunSummary),
    Failed(String),
}

/// Periodically regenerates the forecast once it goes stale
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    forecast_path: PathBuf,
    check_interval: Duration,
    max_age: Duration,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, check_interval: Duration, max_age: Duration) -> Self {
        let forecast_path = pipeline.forecast_store().path().to_path_buf();
        Self {
            pipeline,
            forecast_path,
            check_interval,
            max_age,
        }
    }

    /// Check now, then on every interval tick. Never returns on its own.
    pub async fn run(&self) {
        info!(
            interval_secs = self.check_interval.as_secs(),
            max_age_secs = self.max_age.as_secs(),
            "Scheduler started"
        );

        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.check().await;
        }
    }

    /// Run the pipeline if the forecast file is missing or too old
    pub async fn check(&self) -> CheckOutcome {
        if self.pipeline.is_running() {
            info!("Forecast run already in progress, skipping check");
            return CheckOutcome::Skipped;
        }

        match forecast_is_stale(&self.forecast_path, self.max_age) {
            Ok(false) => {
                debug!(path = %self.forecast_path.display(), "Forecast is fresh");
                return CheckOutcome::Fresh;
            }
            Ok(true) => info!(path = %self.forecast_path.display(), "Forecast is stale, regenerating"),
            Err(e) => warn!("Could not stat forecast file, regenerating: {}", e),
        }

        match self.pipeline.run().await {
            Ok(summary) => CheckOutcome::Ran(summary),
            Err(PipelineError::AlreadyRunning) => CheckOutcome::Skipped,
            Err(e) => {
                error!("Forecast run failed: {}", e);
                CheckOutcome::Failed(e.to_string())
            }
        }
    }
}
