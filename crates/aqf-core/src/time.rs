//! Timestamp parsing and bucket arithmetic
//!
//! All pipeline timestamps are naive wall-clock times. Offsets present in
//! the source data are dropped without shifting the clock time.

use chrono::{DateTime, NaiveDateTime};

/// Timestamp conversion error
#[derive(Debug, thiserror::Error)]
pub enum TimeError {
    #[error("Unrecognised timestamp: {0}")]
    Unparseable(String),

    #[error("Timestamp out of range: {0}ms")]
    OutOfRange(i64),

    #[error("Bucket width must be positive, got {0}s")]
    InvalidBucket(i64),
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse a timestamp as delivered by the measurement API.
///
/// RFC 3339 values keep their local wall-clock time and lose the offset;
/// naive values are taken as-is.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, TimeError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(dt.naive_local());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| TimeError::Unparseable(raw.to_string()))
}

/// Milliseconds since the Unix epoch
pub fn to_millis(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_millis()
}

pub fn from_millis(ms: i64) -> Result<NaiveDateTime, TimeError> {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.naive_utc())
        .ok_or(TimeError::OutOfRange(ms))
}

/// Start of the bucket containing `ts`
pub fn floor_to_bucket(ts: NaiveDateTime, bucket_secs: i64) -> Result<NaiveDateTime, TimeError> {
    if bucket_secs <= 0 {
        return Err(TimeError::InvalidBucket(bucket_secs));
    }
    let secs = ts.and_utc().timestamp();
    let floored = secs.div_euclid(bucket_secs) * bucket_secs;
    from_millis(floored * 1000)
}
