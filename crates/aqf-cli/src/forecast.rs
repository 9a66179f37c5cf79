//! Shaping the forecast table for the dashboard

use std::collections::BTreeMap;

use aqf_core::ForecastRecord;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One row as served to the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// ISO timestamp, naive UTC
    pub ds: String,
    pub yhat: f64,
    pub y: Option<f64>,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
    pub station: String,
}

impl From<&ForecastRecord> for ForecastPoint {
    fn from(r: &ForecastRecord) -> Self {
        Self {
            ds: r.ds.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            yhat: r.yhat,
            y: r.y,
            yhat_lower: r.yhat_lower,
            yhat_upper: r.yhat_upper,
            station: r.station.clone(),
        }
    }
}

/// Rows with `ds >= since`, keyed by station label.
///
/// Every label in `labels` is present, empty if it has no rows; rows for
/// other labels are dropped.
pub fn group_by_station<'a>(
    records: &[ForecastRecord],
    labels: impl IntoIterator<Item = &'a str>,
    since: NaiveDateTime,
) -> BTreeMap<String, Vec<ForecastPoint>> {
    let mut grouped: BTreeMap<String, Vec<ForecastPoint>> = labels
        .into_iter()
        .map(|label| (label.to_string(), Vec::new()))
        .collect();

    for record in records.iter().filter(|r| r.ds >= since) {
        if let Some(points) = grouped.get_mut(&record.station) {
            points.push(record.into());
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(hours: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::hours(hours)
    }

    fn record(station: &str, ds: NaiveDateTime) -> ForecastRecord {
        ForecastRecord {
            ds,
            yhat: 1.0,
            yhat_lower: 0.5,
            yhat_upper: 1.5,
            current_time: at(0),
            y: None,
            station: station.to_string(),
        }
    }

    #[test]
    fn test_groups_within_window() {
        let records = vec![
            record("Huara", at(-72)),
            record("Huara", at(-1)),
            record("Victoria", at(0)),
            record("Victoria", at(6)),
            record("Elsewhere", at(0)),
        ];
        let grouped = group_by_station(
            &records,
            ["Huara", "Victoria", "Colonia Pintados"],
            at(-48),
        );

        assert_eq!(grouped.len(), 3);
        assert_eq!(grouped["Huara"].len(), 1);
        assert_eq!(grouped["Victoria"].len(), 2);
        assert!(grouped["Colonia Pintados"].is_empty());
    }

    #[test]
    fn test_point_serialisation() {
        let mut r = record("Huara", at(12));
        r.y = Some(3.25);
        let json = serde_json::to_string(&ForecastPoint::from(&r)).unwrap();
        assert_eq!(
            json,
            r#"{"ds":"2024-03-10T12:00:00.000","yhat":1.0,"y":3.25,"yhat_lower":0.5,"yhat_upper":1.5,"station":"Huara"}"#
        );
    }
}
