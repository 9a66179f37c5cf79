//! Per-station forecasting over resampled series

use std::collections::HashMap;

use aqf_core::{ForecastRecord, ResampledSeries};
use chrono::{Duration, NaiveDateTime};
use tracing::{debug, info};

use crate::{ForecastError, ForecastResult, SeriesForecaster};

/// Forecast one station and shape the output as forecast-table rows.
///
/// Rows cover every observed bucket plus `horizon` buckets after the last
/// one. `y` carries the bucket mean where the series has one at `ds`.
pub fn forecast_station(
    forecaster: &dyn SeriesForecaster,
    series: &ResampledSeries,
    label: &str,
    horizon: usize,
    generated_at: NaiveDateTime,
) -> ForecastResult<Vec<ForecastRecord>> {
    let history: Vec<(NaiveDateTime, f64)> = series.observed().collect();
    debug!(
        station = %series.station,
        buckets = series.len(),
        observed = history.len(),
        "forecasting station"
    );

    let step = Duration::seconds(series.bucket_secs);
    let predictions = forecaster
        .forecast(&history, horizon, step)
        .map_err(|source| ForecastError::Station {
            station: series.station.clone(),
            source: Box::new(source),
        })?;

    let observed: HashMap<NaiveDateTime, f64> = history.into_iter().collect();
    let records: Vec<ForecastRecord> = predictions
        .into_iter()
        .map(|p| ForecastRecord {
            ds: p.ds,
            yhat: p.yhat,
            yhat_lower: p.yhat_lower,
            yhat_upper: p.yhat_upper,
            current_time: generated_at,
            y: observed.get(&p.ds).copied(),
            station: label.to_string(),
        })
        .collect();

    info!(station = %series.station, label, rows = records.len(), "station forecast ready");
    Ok(records)
}
