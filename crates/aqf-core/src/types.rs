//! Core data types for air-quality readings and forecasts

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::time::{parse_timestamp, TimeError};

/// Raw sensor reading as delivered by the measurement API
///
/// Rows are compared field by field when the raw table is deduplicated, so
/// values are stored in the exact textual form they arrived in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reading {
    /// Observation time, unparsed
    pub timestamp: String,

    /// Station code (e.g. "E6")
    pub station_name: String,

    /// Pollutant code (e.g. "PM10"), when the API includes it
    #[serde(default, deserialize_with = "lenient_text")]
    pub variable_name: Option<String>,

    /// Measured value; numbers arrive either as JSON numbers or as decimal strings
    #[serde(default, deserialize_with = "lenient_text")]
    pub valor: Option<String>,
}

impl Reading {
    pub fn new(
        timestamp: impl Into<String>,
        station_name: impl Into<String>,
        valor: Option<f64>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            station_name: station_name.into(),
            variable_name: None,
            valor: valor.map(|v| v.to_string()),
        }
    }

    /// Numeric value, or None when the text is not a finite number
    pub fn value(&self) -> Option<f64> {
        self.valor
            .as_deref()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
    }

    pub fn observed_at(&self) -> Result<NaiveDateTime, TimeError> {
        parse_timestamp(&self.timestamp)
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// A monitoring station and the label forecasts are published under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub code: String,
    pub label: String,
}

impl Station {
    pub fn new(code: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            label: label.into(),
        }
    }

    /// The SO2 network monitored by the dashboard
    pub fn defaults() -> Vec<Station> {
        vec![
            Station::new("E6", "Huara"),
            Station::new("E7", "Victoria"),
            Station::new("E8", "Colonia Pintados"),
        ]
    }
}

/// One bucket of a resampled series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub ts: NaiveDateTime,
    pub value: Option<f64>,
}

/// Fixed-width, gap-filled series for one station
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledSeries {
    pub station: String,
    pub bucket_secs: i64,
    pub points: Vec<SeriesPoint>,
}

impl ResampledSeries {
    /// Points carrying a value, in time order
    pub fn observed(&self) -> impl Iterator<Item = (NaiveDateTime, f64)> + '_ {
        self.points
            .iter()
            .filter_map(|p| p.value.map(|v| (p.ts, v)))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A single forecast row as persisted in the forecast table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    /// Forecast timestamp
    pub ds: NaiveDateTime,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,

    /// When this forecast was generated
    pub current_time: NaiveDateTime,

    /// Observed bucket mean at `ds`, absent for future rows
    pub y: Option<f64>,

    /// Station label
    pub station: String,
}
