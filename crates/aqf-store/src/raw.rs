//! Raw readings table

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use aqf_core::Reading;
use polars::prelude::*;
use tracing::{debug, info};

use crate::{read_frame, text_column, write_frame, StoreResult};

/// Concatenate `existing` and `incoming`, dropping exact duplicate rows.
///
/// The later occurrence of a duplicate wins, so surviving rows keep the
/// order of their last occurrence.
pub fn merge_readings(existing: Vec<Reading>, incoming: Vec<Reading>) -> Vec<Reading> {
    let mut seen = HashSet::new();
    let mut merged: Vec<Reading> = existing
        .into_iter()
        .chain(incoming)
        .rev()
        .filter(|r| seen.insert(r.clone()))
        .collect();
    merged.reverse();
    merged
}

/// The accumulated readings, one Parquet file
#[derive(Debug, Clone)]
pub struct RawStore {
    path: PathBuf,
}

impl RawStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored readings, empty when the file does not exist yet
    pub fn load(&self) -> StoreResult<Vec<Reading>> {
        let Some(df) = read_frame(&self.path)? else {
            debug!(path = %self.path.display(), "no raw table yet");
            return Ok(Vec::new());
        };

        let timestamps = text_column(&df, "timestamp")?;
        let stations = text_column(&df, "station_name")?;
        let variables = optional_text_column(&df, "variable_name")?;
        let values = optional_text_column(&df, "valor")?;

        let readings = timestamps
            .into_iter()
            .zip(stations)
            .zip(variables.into_iter().zip(values))
            .map(|((timestamp, station_name), (variable_name, valor))| Reading {
                timestamp: timestamp.unwrap_or_default(),
                station_name: station_name.unwrap_or_default(),
                variable_name,
                valor,
            })
            .collect::<Vec<_>>();

        debug!(rows = readings.len(), "raw table loaded");
        Ok(readings)
    }

    /// Replace the table with `readings`
    pub fn save(&self, readings: &[Reading]) -> StoreResult<()> {
        let mut df = df![
            "timestamp" => readings.iter().map(|r| r.timestamp.as_str()).collect::<Vec<_>>(),
            "station_name" => readings.iter().map(|r| r.station_name.as_str()).collect::<Vec<_>>(),
            "variable_name" => readings.iter().map(|r| r.variable_name.as_deref()).collect::<Vec<_>>(),
            "valor" => readings.iter().map(|r| r.valor.as_deref()).collect::<Vec<_>>(),
        ]?;
        write_frame(&self.path, &mut df)
    }

    /// Merge `incoming` into the stored table and write it back.
    ///
    /// Returns the full merged table.
    pub fn merge(&self, incoming: Vec<Reading>) -> StoreResult<Vec<Reading>> {
        let existing = self.load()?;
        let before = existing.len();
        let added = incoming.len();
        let merged = merge_readings(existing, incoming);
        self.save(&merged)?;
        info!(
            path = %self.path.display(),
            before,
            added,
            after = merged.len(),
            "raw table merged"
        );
        Ok(merged)
    }
}

/// Text column that may be absent from older files
fn optional_text_column(df: &DataFrame, name: &str) -> StoreResult<Vec<Option<String>>> {
    if df.get_column_names().contains(&name) {
        text_column(df, name)
    } else {
        Ok(vec![None; df.height()])
    }
}
