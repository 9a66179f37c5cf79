//! Parquet persistence for raw readings and forecasts
//!
//! Each table lives in a single Parquet file that is rewritten in full on
//! every merge. A missing file is an empty table; a file that cannot be read
//! is an error.

pub mod forecast;
pub mod raw;

pub use forecast::*;
pub use raw::*;

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use polars::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Parquet error: {0}")]
    Polars(#[from] PolarsError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid stored value: {0}")]
    Time(#[from] aqf_core::TimeError),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub const RAW_FILE: &str = "realreg.parquet";
pub const FORECAST_FILE: &str = "fcst_db.parquet";

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Read a whole Parquet file, `None` when it does not exist
fn read_frame(path: &Path) -> StoreResult<Option<DataFrame>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(path)(e)),
    };
    let df = ParquetReader::new(file).finish()?;
    Ok(Some(df))
}

/// Write `df` to a sibling temp file, then move it over `path`
fn write_frame(path: &Path, df: &mut DataFrame) -> StoreResult<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(io_error(dir))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = File::create(&tmp).map_err(io_error(&tmp))?;
    ParquetWriter::new(&mut file).finish(df)?;
    file.sync_all().map_err(io_error(&tmp))?;
    drop(file);
    fs::rename(&tmp, path).map_err(io_error(path))?;
    Ok(())
}

/// Size and modification time of a table file
#[derive(Debug, Clone, PartialEq)]
pub struct FileStatus {
    pub exists: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl FileStatus {
    pub fn of(path: &Path) -> StoreResult<Self> {
        match fs::metadata(path) {
            Ok(meta) => Ok(Self {
                exists: true,
                size: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self {
                exists: false,
                size: 0,
                modified: None,
            }),
            Err(e) => Err(io_error(path)(e)),
        }
    }

    /// Seconds since the last write, `None` if the file is missing
    pub fn age(&self, now: SystemTime) -> Option<std::time::Duration> {
        let modified: SystemTime = self.modified?.into();
        Some(now.duration_since(modified).unwrap_or_default())
    }
}

/// String column as owned values, cast from whatever was stored
fn text_column(df: &DataFrame, name: &str) -> StoreResult<Vec<Option<String>>> {
    let series = df.column(name)?.cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Datetime column as epoch milliseconds, whatever unit was stored
fn millis_column(df: &DataFrame, name: &str) -> StoreResult<Vec<Option<i64>>> {
    let series = df
        .column(name)?
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
        .cast(&DataType::Int64)?;
    Ok(series.i64()?.into_iter().collect())
}

fn float_column(df: &DataFrame, name: &str) -> StoreResult<Vec<Option<f64>>> {
    let series = df.column(name)?.cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}
