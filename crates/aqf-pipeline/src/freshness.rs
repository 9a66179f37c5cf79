//! Forecast file staleness

use std::path::Path;
use std::time::{Duration, SystemTime};

use aqf_store::{FileStatus, StoreResult};

/// A forecast is stale when the file is missing or older than `max_age`
pub fn is_stale(status: &FileStatus, max_age: Duration, now: SystemTime) -> bool {
    match status.age(now) {
        Some(age) => age > max_age,
        None => true,
    }
}

/// Check the forecast file at `path` against `max_age`
pub fn forecast_is_stale(path: &Path, max_age: Duration) -> StoreResult<bool> {
    let status = FileStatus::of(path)?;
    Ok(is_stale(&status, max_age, SystemTime::now()))
}
