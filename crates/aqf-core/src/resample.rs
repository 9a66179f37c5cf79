//! Fixed-width resampling of raw readings into per-station series

use std::collections::BTreeMap;

use chrono::Duration;
use tracing::{debug, warn};

use crate::time::{floor_to_bucket, TimeError};
use crate::types::{Reading, ResampledSeries, SeriesPoint};

/// Default bucket width: 15 minutes
pub const DEFAULT_BUCKET_SECS: i64 = 15 * 60;

/// Running mean over the numeric values of one bucket
#[derive(Debug, Clone, Default)]
pub struct MeanAccumulator {
    sum: f64,
    count: usize,
}

impl MeanAccumulator {
    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn result(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.sum / self.count as f64)
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Group readings by station and resample each group into contiguous
/// buckets of `bucket_secs`.
///
/// Every bucket between a station's first and last observed bucket is
/// present exactly once; buckets with no numeric value carry `None`.
/// Readings whose timestamp cannot be parsed are skipped.
pub fn resample(readings: &[Reading], bucket_secs: i64) -> Result<Vec<ResampledSeries>, TimeError> {
    if bucket_secs <= 0 {
        return Err(TimeError::InvalidBucket(bucket_secs));
    }

    let mut stations: BTreeMap<&str, BTreeMap<chrono::NaiveDateTime, MeanAccumulator>> =
        BTreeMap::new();
    let mut skipped = 0usize;

    for reading in readings {
        let ts = match reading.observed_at() {
            Ok(ts) => ts,
            Err(e) => {
                debug!(error = %e, station = %reading.station_name, "skipping reading");
                skipped += 1;
                continue;
            }
        };
        let bucket = floor_to_bucket(ts, bucket_secs)?;
        let acc = stations
            .entry(reading.station_name.as_str())
            .or_default()
            .entry(bucket)
            .or_default();
        if let Some(value) = reading.value() {
            acc.add(value);
        }
    }

    if skipped > 0 {
        warn!(skipped, "readings with unparseable timestamps were dropped");
    }

    let step = Duration::seconds(bucket_secs);
    let series = stations
        .into_iter()
        .filter_map(|(station, buckets)| {
            let first = *buckets.keys().next()?;
            let last = *buckets.keys().next_back()?;

            let mut points = Vec::new();
            let mut ts = first;
            while ts <= last {
                points.push(SeriesPoint {
                    ts,
                    value: buckets.get(&ts).and_then(MeanAccumulator::result),
                });
                ts += step;
            }

            Some(ResampledSeries {
                station: station.to_string(),
                bucket_secs,
                points,
            })
        })
        .collect();

    Ok(series)
}
