//! Simulated measurement network for offline runs

use aqf_core::{Reading, ReadingSource};
use chrono::{Duration, NaiveDateTime, Timelike, Utc};

/// Source that synthesises a window of readings for a set of stations,
/// ending at the current time.
pub struct SimulatedSource {
    stations: Vec<String>,
    window: Duration,
    step: Duration,
    variable: String,
}

impl SimulatedSource {
    /// `window` of history per fetch, one reading every `step`
    pub fn new(stations: Vec<String>, window: Duration, step: Duration) -> Self {
        Self {
            stations,
            window,
            step,
            variable: "PM10".to_string(),
        }
    }

    /// Generate the window of readings ending at `now`
    pub fn generate_at(&self, now: NaiveDateTime) -> Vec<Reading> {
        let step_secs = self.step.num_seconds().max(1);
        let count = self.window.num_seconds() / step_secs;
        let mut readings = Vec::with_capacity(self.stations.len() * count as usize);

        for (idx, station) in self.stations.iter().enumerate() {
            let base = 30.0 + 8.0 * idx as f64;
            for i in (0..count).rev() {
                let ts = now - Duration::seconds(i * step_secs);
                let hour = ts.hour() as f64 + ts.minute() as f64 / 60.0;
                // Diurnal swing plus a small deterministic jitter
                let diurnal = 6.0 * (std::f64::consts::TAU * (hour - 8.0) / 24.0).sin();
                let jitter = ((ts.and_utc().timestamp() / 60 + idx as i64) % 7) as f64 * 0.3 - 0.9;
                let value = base + diurnal + jitter;

                readings.push(Reading {
                    timestamp: ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
                    station_name: station.clone(),
                    variable_name: Some(self.variable.clone()),
                    valor: Some(format!("{value:.2}")),
                });
            }
        }
        readings
    }
}

#[async_trait::async_trait]
impl ReadingSource for SimulatedSource {
    fn name(&self) -> &str {
        "simulator"
    }

    async fn fetch(&self) -> Vec<Reading> {
        let now = Utc::now().naive_utc();
        let now = now.with_nanosecond(0).unwrap_or(now);
        let readings = self.generate_at(now);
        tracing::info!(count = readings.len(), "simulated readings");
        readings
    }
}
