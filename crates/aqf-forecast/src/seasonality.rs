//! Fourier seasonal components

use chrono::NaiveDateTime;
use std::f64::consts::PI;

const SECS_PER_DAY: f64 = 86_400.0;

/// A periodic component expressed as a truncated Fourier series
#[derive(Debug, Clone, PartialEq)]
pub struct Seasonality {
    pub name: &'static str,
    pub period_days: f64,
    pub order: usize,
}

pub const YEARLY: Seasonality = Seasonality {
    name: "yearly",
    period_days: 365.25,
    order: 10,
};

pub const WEEKLY: Seasonality = Seasonality {
    name: "weekly",
    period_days: 7.0,
    order: 3,
};

pub const DAILY: Seasonality = Seasonality {
    name: "daily",
    period_days: 1.0,
    order: 4,
};

impl Seasonality {
    /// Number of design-matrix columns this component contributes
    pub fn width(&self) -> usize {
        2 * self.order
    }

    /// Append `sin, cos` pairs for harmonics 1..=order at `t_days`
    pub fn push_features(&self, t_days: f64, out: &mut Vec<f64>) {
        for i in 1..=self.order {
            let x = 2.0 * PI * i as f64 * t_days / self.period_days;
            out.push(x.sin());
            out.push(x.cos());
        }
    }
}

/// Days since the Unix epoch, fractional
pub fn epoch_days(ts: NaiveDateTime) -> f64 {
    ts.and_utc().timestamp_millis() as f64 / 1000.0 / SECS_PER_DAY
}

/// Select components from the span of the history and its finest spacing.
///
/// A component is enabled once the history covers two full periods and is
/// sampled more finely than the period.
pub fn auto_seasonalities(span_days: f64, min_spacing_days: f64) -> Vec<Seasonality> {
    let mut selected = Vec::new();
    if span_days >= 2.0 * YEARLY.period_days.floor() {
        selected.push(YEARLY);
    }
    if span_days >= 2.0 * WEEKLY.period_days && min_spacing_days < WEEKLY.period_days {
        selected.push(WEEKLY);
    }
    if span_days >= 2.0 * DAILY.period_days && min_spacing_days < DAILY.period_days {
        selected.push(DAILY);
    }
    selected
}
