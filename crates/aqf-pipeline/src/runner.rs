//! End-to-end pipeline run

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use aqf_config::AppConfig;
use aqf_core::{resample, ForecastRecord, Reading, ReadingSource, ResampledSeries, Station, DEFAULT_BUCKET_SECS};
use aqf_forecast::{forecast_station, AdditiveModel, ModelConfig, SeriesForecaster};
use aqf_ingest::ApiFetcher;
use aqf_store::{ForecastStore, RawStore};
use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::{PipelineError, PipelineResult};

pub const DEFAULT_HORIZON: usize = 48;

/// Row counts from one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Readings returned by the source
    pub fetched: usize,
    /// Rows in the raw table after the merge
    pub raw_rows: usize,
    /// Rows in the forecast table after the merge
    pub forecast_rows: usize,
    /// Rows generated this run, by station label
    pub per_station: BTreeMap<String, usize>,
    pub generated_at: NaiveDateTime,
}

/// Clears the running flag when dropped.
///
/// Owns its flag so it can move onto the blocking pool with the stages and
/// outlive a cancelled caller.
struct RunGuard(Arc<AtomicBool>);

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> PipelineResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PipelineError::AlreadyRunning)?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Everything after the fetch; runs on the blocking pool
#[derive(Clone)]
struct Stages {
    raw: RawStore,
    forecasts: ForecastStore,
    forecaster: Arc<dyn SeriesForecaster>,
    stations: Vec<Station>,
    horizon: usize,
    bucket_secs: i64,
}

impl Stages {
    fn execute(&self, readings: Vec<Reading>) -> PipelineResult<RunSummary> {
        let fetched = readings.len();
        let merged = self.raw.merge(readings)?;

        let series = resample(&merged, self.bucket_secs)?;
        info!(stations = series.len(), "readings resampled");

        let generated_at = Utc::now().naive_utc();
        let mut generated = Vec::new();
        let mut per_station = BTreeMap::new();
        for station in &self.stations {
            let records = self.forecast_one(station, &series, generated_at)?;
            per_station.insert(station.label.clone(), records.len());
            generated.extend(records);
        }

        let table = self.forecasts.merge(generated)?;

        Ok(RunSummary {
            fetched,
            raw_rows: merged.len(),
            forecast_rows: table.len(),
            per_station,
            generated_at,
        })
    }

    fn forecast_one(
        &self,
        station: &Station,
        series: &[ResampledSeries],
        generated_at: NaiveDateTime,
    ) -> PipelineResult<Vec<ForecastRecord>> {
        let empty;
        let station_series = match series.iter().find(|s| s.station == station.code) {
            Some(s) => s,
            None => {
                warn!(station = %station.code, "no readings for station");
                empty = ResampledSeries {
                    station: station.code.clone(),
                    bucket_secs: self.bucket_secs,
                    points: Vec::new(),
                };
                &empty
            }
        };

        let records = forecast_station(
            self.forecaster.as_ref(),
            station_series,
            &station.label,
            self.horizon,
            generated_at,
        )?;
        Ok(records)
    }
}

/// Fetch, persist, resample, forecast, persist
pub struct Pipeline {
    source: Arc<dyn ReadingSource>,
    stages: Stages,
    running: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn ReadingSource>,
        forecaster: Arc<dyn SeriesForecaster>,
        raw: RawStore,
        forecasts: ForecastStore,
    ) -> Self {
        Self {
            source,
            stages: Stages {
                raw,
                forecasts,
                forecaster,
                stations: Station::defaults(),
                horizon: DEFAULT_HORIZON,
                bucket_secs: DEFAULT_BUCKET_SECS,
            },
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Pipeline wired from configuration: HTTP source, Parquet stores and
    /// the additive model.
    pub fn from_config(config: &AppConfig) -> PipelineResult<Self> {
        let source = ApiFetcher::new(config.source.url.clone(), config.source.timeout())?;
        let model = AdditiveModel::new(ModelConfig {
            changepoint_prior_scale: config.forecast.changepoint_prior_scale,
            interval_width: config.forecast.interval_width,
            uncertainty_samples: config.forecast.uncertainty_samples,
            seed: config.forecast.seed,
            ..ModelConfig::default()
        })?;

        Ok(Self::new(
            Arc::new(source),
            Arc::new(model),
            RawStore::new(config.storage.raw_path()),
            ForecastStore::new(config.storage.forecast_path()),
        )
        .with_stations(config.forecast.stations.clone())
        .with_horizon(config.forecast.horizon)
        .with_bucket_secs(config.forecast.bucket_secs()))
    }

    pub fn with_stations(mut self, stations: Vec<Station>) -> Self {
        self.stages.stations = stations;
        self
    }

    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.stages.horizon = horizon;
        self
    }

    pub fn with_bucket_secs(mut self, bucket_secs: i64) -> Self {
        self.stages.bucket_secs = bucket_secs;
        self
    }

    pub fn stations(&self) -> &[Station] {
        &self.stages.stations
    }

    pub fn raw_store(&self) -> &RawStore {
        &self.stages.raw
    }

    pub fn forecast_store(&self) -> &ForecastStore {
        &self.stages.forecasts
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run all stages once.
    ///
    /// Fails with [`PipelineError::AlreadyRunning`] if another run of this
    /// pipeline has not finished.
    #[instrument(skip(self), fields(source = self.source.name()))]
    pub async fn run(&self) -> PipelineResult<RunSummary> {
        let guard = RunGuard::acquire(&self.running)?;

        let readings = self.source.fetch().await;
        debug!(count = readings.len(), "readings fetched");

        let stages = self.stages.clone();
        let summary = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            stages.execute(readings)
        })
        .await??;

        info!(
            fetched = summary.fetched,
            raw_rows = summary.raw_rows,
            forecast_rows = summary.forecast_rows,
            "pipeline run complete"
        );
        Ok(summary)
    }
}
