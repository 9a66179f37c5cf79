//! Forecast history table

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use aqf_core::{from_millis, to_millis, ForecastRecord};
use chrono::NaiveDateTime;
use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::{float_column, millis_column, read_frame, text_column, write_frame, StoreResult};

/// Merge forecast generations, keeping the newest row per `(station, ds)`.
///
/// Rows are considered in `current_time` order with ties resolved by input
/// position, so `incoming` wins over `existing` for equal generation times.
/// The result is ordered by station label, then `ds`.
pub fn merge_forecasts(
    existing: Vec<ForecastRecord>,
    incoming: Vec<ForecastRecord>,
) -> Vec<ForecastRecord> {
    let mut latest: BTreeMap<(String, NaiveDateTime), ForecastRecord> = BTreeMap::new();
    for record in existing.into_iter().chain(incoming) {
        let key = (record.station.clone(), record.ds);
        match latest.get(&key) {
            Some(kept) if kept.current_time > record.current_time => {}
            _ => {
                latest.insert(key, record);
            }
        }
    }
    latest.into_values().collect()
}

/// The deduplicated forecast history, one Parquet file
#[derive(Debug, Clone)]
pub struct ForecastStore {
    path: PathBuf,
}

impl ForecastStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> StoreResult<Vec<ForecastRecord>> {
        let Some(df) = read_frame(&self.path)? else {
            debug!(path = %self.path.display(), "no forecast table yet");
            return Ok(Vec::new());
        };

        let ds = millis_column(&df, "ds")?;
        let yhat = float_column(&df, "yhat")?;
        let lower = float_column(&df, "yhat_lower")?;
        let upper = float_column(&df, "yhat_upper")?;
        let generated = millis_column(&df, "current_time")?;
        let y = if df.get_column_names().contains(&"y") {
            float_column(&df, "y")?
        } else {
            vec![None; df.height()]
        };
        let station = text_column(&df, "station")?;

        let mut records = Vec::with_capacity(df.height());
        let mut skipped = 0usize;
        for i in 0..df.height() {
            let (Some(ds_ms), Some(generated_ms), Some(label)) =
                (ds[i], generated[i], station[i].clone())
            else {
                skipped += 1;
                continue;
            };
            records.push(ForecastRecord {
                ds: from_millis(ds_ms)?,
                yhat: yhat[i].unwrap_or(f64::NAN),
                yhat_lower: lower[i].unwrap_or(f64::NAN),
                yhat_upper: upper[i].unwrap_or(f64::NAN),
                current_time: from_millis(generated_ms)?,
                y: y[i].filter(|v| v.is_finite()),
                station: label,
            });
        }
        if skipped > 0 {
            warn!(skipped, "forecast rows without ds, current_time or station ignored");
        }

        debug!(rows = records.len(), "forecast table loaded");
        Ok(records)
    }

    pub fn save(&self, records: &[ForecastRecord]) -> StoreResult<()> {
        let datetime = DataType::Datetime(TimeUnit::Milliseconds, None);
        let ds = Series::new("ds", records.iter().map(|r| to_millis(r.ds)).collect::<Vec<_>>())
            .cast(&datetime)?;
        let current_time = Series::new(
            "current_time",
            records.iter().map(|r| to_millis(r.current_time)).collect::<Vec<_>>(),
        )
        .cast(&datetime)?;

        let mut df = DataFrame::new(vec![
            ds,
            Series::new("yhat", records.iter().map(|r| r.yhat).collect::<Vec<_>>()),
            Series::new("yhat_lower", records.iter().map(|r| r.yhat_lower).collect::<Vec<_>>()),
            Series::new("yhat_upper", records.iter().map(|r| r.yhat_upper).collect::<Vec<_>>()),
            current_time,
            Series::new("y", records.iter().map(|r| r.y).collect::<Vec<_>>()),
            Series::new("station", records.iter().map(|r| r.station.as_str()).collect::<Vec<_>>()),
        ])?;
        write_frame(&self.path, &mut df)
    }

    /// Merge a new generation into the table and write the result.
    ///
    /// Returns the deduplicated table as written.
    pub fn merge(&self, incoming: Vec<ForecastRecord>) -> StoreResult<Vec<ForecastRecord>> {
        let existing = self.load()?;
        let before = existing.len();
        let added = incoming.len();
        let merged = merge_forecasts(existing, incoming);
        self.save(&merged)?;
        info!(
            path = %self.path.display(),
            before,
            added,
            after = merged.len(),
            "forecast table merged"
        );
        Ok(merged)
    }
}
