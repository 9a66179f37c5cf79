//! Additive time-series forecasting
//!
//! A univariate model of the form `y(t) = trend(t) + seasonality(t) + noise`:
//! a piecewise-linear trend with sparse changepoints, Fourier seasonal terms
//! chosen from the span of the history, and Monte-Carlo uncertainty
//! intervals. Parameters are fitted by maximum a posteriori estimation.

pub mod model;
pub mod seasonality;
pub mod station;
pub mod trend;
pub mod uncertainty;

pub use model::*;
pub use seasonality::*;
pub use station::*;
pub use trend::*;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("need at least 2 observations to fit, got {0}")]
    InsufficientData(usize),

    #[error("history spans no time")]
    DegenerateHistory,

    #[error("system of normal equations is not positive definite")]
    Singular,

    #[error("invalid model parameter: {0}")]
    InvalidParameter(String),

    #[error("station {station}: {source}")]
    Station {
        station: String,
        #[source]
        source: Box<ForecastError>,
    },
}

pub type ForecastResult<T> = Result<T, ForecastError>;

/// Model hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Scale of the Laplace prior on trend rate changes
    pub changepoint_prior_scale: f64,
    /// Potential changepoints placed in the history
    pub n_changepoints: usize,
    /// Fraction of the history eligible for changepoints
    pub changepoint_range: f64,
    /// Scale of the Normal prior on seasonal coefficients
    pub seasonality_prior_scale: f64,
    /// Coverage of the uncertainty interval
    pub interval_width: f64,
    /// Monte-Carlo draws for the interval; 0 disables it
    pub uncertainty_samples: usize,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            changepoint_prior_scale: 0.01,
            n_changepoints: 25,
            changepoint_range: 0.8,
            seasonality_prior_scale: 10.0,
            interval_width: 0.8,
            uncertainty_samples: 1000,
            seed: 0,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> ForecastResult<()> {
        if !(self.changepoint_prior_scale > 0.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "changepoint_prior_scale must be positive, got {}",
                self.changepoint_prior_scale
            )));
        }
        if !(self.seasonality_prior_scale > 0.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "seasonality_prior_scale must be positive, got {}",
                self.seasonality_prior_scale
            )));
        }
        if !(0.0..=1.0).contains(&self.changepoint_range) {
            return Err(ForecastError::InvalidParameter(format!(
                "changepoint_range must be within [0, 1], got {}",
                self.changepoint_range
            )));
        }
        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "interval_width must be within (0, 1), got {}",
                self.interval_width
            )));
        }
        Ok(())
    }
}

/// Point forecast with its uncertainty interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub ds: NaiveDateTime,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

/// Anything that can extend a series by `horizon` steps of `step`
///
/// Implementations return one prediction per history timestamp followed by
/// `horizon` future predictions.
pub trait SeriesForecaster: Send + Sync {
    fn forecast(
        &self,
        history: &[(NaiveDateTime, f64)],
        horizon: usize,
        step: Duration,
    ) -> ForecastResult<Vec<Prediction>>;
}
