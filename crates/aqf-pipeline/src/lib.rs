//! Forecast pipeline orchestration
//!
//! One run fetches the latest readings, merges them into the raw table,
//! resamples each station, fits and extends a model per station and merges
//! the result into the forecast table.

pub mod freshness;
pub mod runner;

pub use freshness::*;
pub use runner::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Source setup failed: {0}")]
    Ingest(#[from] aqf_ingest::IngestError),

    #[error("Storage error: {0}")]
    Store(#[from] aqf_store::StoreError),

    #[error("Forecast error: {0}")]
    Forecast(#[from] aqf_forecast::ForecastError),

    #[error("Resampling error: {0}")]
    Time(#[from] aqf_core::TimeError),

    #[error("A pipeline run is already in progress")]
    AlreadyRunning,

    #[error("Pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
