//! Model fitting and prediction

use chrono::{Duration, NaiveDateTime};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::seasonality::{auto_seasonalities, epoch_days, Seasonality};
use crate::trend::{hinge, place_changepoints, PiecewiseLinear};
use crate::uncertainty::Simulation;
use crate::{ForecastError, ForecastResult, ModelConfig, Prediction, SeriesForecaster};

const MAX_ITERATIONS: usize = 200;
const TOLERANCE: f64 = 1e-8;
/// Floor on |δ| when reweighting the Laplace penalty
const MIN_DELTA: f64 = 1e-6;
const MIN_SIGMA: f64 = 1e-4;
/// Normal prior scale on base rate and offset
const TREND_PRIOR_SCALE: f64 = 5.0;
const SECS_PER_DAY: f64 = 86_400.0;

/// Additive trend + seasonality model
#[derive(Debug, Clone)]
pub struct AdditiveModel {
    config: ModelConfig,
}

impl AdditiveModel {
    pub fn new(config: ModelConfig) -> ForecastResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Fit the model to `(timestamp, value)` observations.
    ///
    /// Non-finite values are dropped first; at least two observations at
    /// distinct times must remain.
    pub fn fit(&self, history: &[(NaiveDateTime, f64)]) -> ForecastResult<FittedModel> {
        let mut obs: Vec<(NaiveDateTime, f64)> = history
            .iter()
            .copied()
            .filter(|(_, y)| y.is_finite())
            .collect();
        obs.sort_by_key(|(ts, _)| *ts);

        if obs.len() < 2 {
            return Err(ForecastError::InsufficientData(obs.len()));
        }
        let n = obs.len();
        let start = obs[0].0;
        let end = obs[n - 1].0;
        let t_scale = (end - start).num_milliseconds() as f64 / 1000.0;
        if t_scale <= 0.0 {
            return Err(ForecastError::DegenerateHistory);
        }

        let y_scale = match obs.iter().map(|(_, y)| y.abs()).fold(0.0, f64::max) {
            s if s > 0.0 => s,
            _ => 1.0,
        };

        let t: Vec<f64> = obs
            .iter()
            .map(|(ts, _)| scaled_time(start, t_scale, *ts))
            .collect();
        let y = DVector::from_iterator(n, obs.iter().map(|(_, v)| v / y_scale));

        let changepoints = place_changepoints(
            &t,
            self.config.n_changepoints,
            self.config.changepoint_range,
        );
        let min_spacing_days = obs
            .windows(2)
            .map(|w| (w[1].0 - w[0].0).num_seconds() as f64 / SECS_PER_DAY)
            .fold(f64::INFINITY, f64::min);
        let seasonalities = auto_seasonalities(t_scale / SECS_PER_DAY, min_spacing_days);

        let layout = Layout::new(changepoints.len(), &seasonalities);
        let x = design_matrix(&layout, &t, &changepoints, &seasonalities, obs.iter().map(|(ts, _)| *ts));

        let (beta, sigma) = self.solve_map(&layout, &x, &y)?;

        let trend = PiecewiseLinear {
            m: beta[0],
            k: beta[1],
            deltas: beta.rows(layout.delta_start(), layout.n_changepoints).iter().copied().collect(),
            changepoints,
        };
        let seasonal_beta: Vec<f64> = beta
            .rows(layout.seasonal_start(), layout.seasonal_width)
            .iter()
            .copied()
            .collect();

        debug!(
            observations = n,
            changepoints = trend.changepoints.len(),
            seasonalities = seasonalities.len(),
            sigma,
            "model fitted"
        );

        Ok(FittedModel {
            config: self.config.clone(),
            start,
            t_scale,
            y_scale,
            trend,
            seasonalities,
            seasonal_beta,
            sigma,
            history: obs.into_iter().map(|(ts, _)| ts).collect(),
        })
    }

    /// Maximum a posteriori estimate by iteratively reweighted ridge
    /// regression.
    ///
    /// The Laplace prior on the changepoint deltas is approximated by a
    /// Normal whose precision is re-derived from the previous iterate; the
    /// noise level is re-estimated from the residuals on every pass.
    fn solve_map(
        &self,
        layout: &Layout,
        x: &DMatrix<f64>,
        y: &DVector<f64>,
    ) -> ForecastResult<(DVector<f64>, f64)> {
        let n = y.len() as f64;
        let xt = x.transpose();
        let xtx = &xt * x;
        let xty = &xt * y;

        let mean = y.mean();
        let mut sigma2 = (y.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n)
            .max(MIN_SIGMA * MIN_SIGMA);
        let mut beta = DVector::<f64>::zeros(layout.width());

        for iteration in 0..MAX_ITERATIONS {
            let weights = self.penalties(layout, &beta, sigma2, iteration == 0);
            let system = &xtx + DMatrix::from_diagonal(&weights);
            let next = system
                .cholesky()
                .ok_or(ForecastError::Singular)?
                .solve(&xty);

            let residuals = y - x * &next;
            sigma2 = (residuals.dot(&residuals) / n).max(MIN_SIGMA * MIN_SIGMA);

            let change = (&next - &beta).amax();
            beta = next;
            if iteration > 0 && change < TOLERANCE {
                debug!(iterations = iteration + 1, "MAP estimate converged");
                break;
            }
        }

        Ok((beta, sigma2.sqrt()))
    }

    /// Ridge weights equivalent to the priors, scaled by the noise variance
    fn penalties(
        &self,
        layout: &Layout,
        beta: &DVector<f64>,
        sigma2: f64,
        first_pass: bool,
    ) -> DVector<f64> {
        let tau = self.config.changepoint_prior_scale;
        let mut weights = DVector::<f64>::zeros(layout.width());

        weights[0] = sigma2 / TREND_PRIOR_SCALE.powi(2);
        weights[1] = sigma2 / TREND_PRIOR_SCALE.powi(2);
        for j in layout.delta_start()..layout.seasonal_start() {
            weights[j] = if first_pass {
                // Normal with the Laplace variance 2τ²
                sigma2 / (2.0 * tau * tau)
            } else {
                sigma2 / (tau * beta[j].abs().max(MIN_DELTA))
            };
        }
        for j in layout.seasonal_start()..layout.width() {
            weights[j] = sigma2 / self.config.seasonality_prior_scale.powi(2);
        }
        weights
    }
}

impl SeriesForecaster for AdditiveModel {
    fn forecast(
        &self,
        history: &[(NaiveDateTime, f64)],
        horizon: usize,
        step: Duration,
    ) -> ForecastResult<Vec<Prediction>> {
        let fitted = self.fit(history)?;
        let dates = fitted.make_future_dates(horizon, step);
        Ok(fitted.predict(&dates))
    }
}

/// Column layout: `[m, k, δ_1..δ_S, seasonal...]`
#[derive(Debug, Clone, Copy)]
struct Layout {
    n_changepoints: usize,
    seasonal_width: usize,
}

impl Layout {
    fn new(n_changepoints: usize, seasonalities: &[Seasonality]) -> Self {
        Self {
            n_changepoints,
            seasonal_width: seasonalities.iter().map(Seasonality::width).sum(),
        }
    }

    fn delta_start(&self) -> usize {
        2
    }

    fn seasonal_start(&self) -> usize {
        self.delta_start() + self.n_changepoints
    }

    fn width(&self) -> usize {
        self.seasonal_start() + self.seasonal_width
    }
}

fn design_matrix(
    layout: &Layout,
    t: &[f64],
    changepoints: &[f64],
    seasonalities: &[Seasonality],
    dates: impl Iterator<Item = NaiveDateTime>,
) -> DMatrix<f64> {
    let mut x = DMatrix::<f64>::zeros(t.len(), layout.width());
    let mut features = Vec::with_capacity(layout.seasonal_width);

    for (row, (ti, ts)) in t.iter().zip(dates).enumerate() {
        x[(row, 0)] = 1.0;
        x[(row, 1)] = *ti;
        for (j, s) in changepoints.iter().enumerate() {
            x[(row, layout.delta_start() + j)] = hinge(*ti, *s);
        }

        features.clear();
        let days = epoch_days(ts);
        for seasonality in seasonalities {
            seasonality.push_features(days, &mut features);
        }
        for (j, value) in features.iter().enumerate() {
            x[(row, layout.seasonal_start() + j)] = *value;
        }
    }
    x
}

fn scaled_time(start: NaiveDateTime, t_scale: f64, ts: NaiveDateTime) -> f64 {
    (ts - start).num_milliseconds() as f64 / 1000.0 / t_scale
}

/// A fitted model, ready to predict
#[derive(Debug, Clone)]
pub struct FittedModel {
    config: ModelConfig,
    start: NaiveDateTime,
    t_scale: f64,
    y_scale: f64,
    trend: PiecewiseLinear,
    seasonalities: Vec<Seasonality>,
    seasonal_beta: Vec<f64>,
    sigma: f64,
    history: Vec<NaiveDateTime>,
}

impl FittedModel {
    /// Timestamps the model was fitted on, ascending
    pub fn history_dates(&self) -> &[NaiveDateTime] {
        &self.history
    }

    pub fn trend(&self) -> &PiecewiseLinear {
        &self.trend
    }

    pub fn seasonalities(&self) -> &[Seasonality] {
        &self.seasonalities
    }

    /// Observation noise in original units
    pub fn noise(&self) -> f64 {
        self.sigma * self.y_scale
    }

    /// History timestamps followed by `periods` steps after the last one
    pub fn make_future_dates(&self, periods: usize, step: Duration) -> Vec<NaiveDateTime> {
        let mut dates = self.history.clone();
        if let Some(last) = self.history.last().copied() {
            dates.extend((1..=periods as i32).map(|i| last + step * i));
        }
        dates
    }

    fn seasonal_component(&self, ts: NaiveDateTime, features: &mut Vec<f64>) -> f64 {
        features.clear();
        let days = epoch_days(ts);
        for seasonality in &self.seasonalities {
            seasonality.push_features(days, features);
        }
        features
            .iter()
            .zip(&self.seasonal_beta)
            .map(|(f, b)| f * b)
            .sum()
    }

    /// Point forecasts and uncertainty intervals at `dates`
    pub fn predict(&self, dates: &[NaiveDateTime]) -> Vec<Prediction> {
        let mut features = Vec::new();
        let t: Vec<f64> = dates
            .iter()
            .map(|ts| scaled_time(self.start, self.t_scale, *ts))
            .collect();
        let trend: Vec<f64> = t.iter().map(|ti| self.trend.at(*ti)).collect();
        let seasonal: Vec<f64> = dates
            .iter()
            .map(|ts| self.seasonal_component(*ts, &mut features))
            .collect();

        let simulation = Simulation {
            samples: self.config.uncertainty_samples,
            interval_width: self.config.interval_width,
            seed: self.config.seed,
            n_changepoints: self.trend.changepoints.len(),
            delta_scale: self.trend.mean_abs_delta(),
            sigma: self.sigma,
            y_scale: self.y_scale,
        };
        let bounds = simulation.intervals(&t, &trend, &seasonal);

        dates
            .iter()
            .zip(trend.iter().zip(&seasonal))
            .zip(bounds)
            .map(|((ds, (tr, s)), (lower, upper))| Prediction {
                ds: *ds,
                yhat: (tr + s) * self.y_scale,
                yhat_lower: lower,
                yhat_upper: upper,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn series(points: usize, f: impl Fn(f64) -> f64) -> Vec<(NaiveDateTime, f64)> {
        (0..points)
            .map(|i| {
                let ts = start() + Duration::minutes(15 * i as i64);
                let hours = i as f64 / 4.0;
                (ts, f(hours))
            })
            .collect()
    }

    fn model() -> AdditiveModel {
        AdditiveModel::new(ModelConfig {
            uncertainty_samples: 300,
            ..ModelConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_linear_trend_extrapolates() {
        // six hours of a clean ramp
        let history = series(24, |h| 20.0 + 0.5 * h);
        let predictions = model()
            .forecast(&history, 48, Duration::minutes(15))
            .unwrap();

        assert_eq!(predictions.len(), 24 + 48);
        for (i, p) in predictions.iter().enumerate() {
            let truth = 20.0 + 0.5 * (i as f64 / 4.0);
            assert!(
                (p.yhat - truth).abs() < 0.05,
                "row {i}: yhat {} vs {truth}",
                p.yhat
            );
            assert!(p.yhat_lower <= p.yhat + 1e-9 && p.yhat <= p.yhat_upper + 1e-9);
        }
    }

    #[test]
    fn test_future_dates_follow_history() {
        let history = series(8, |_| 3.0);
        let fitted = model().fit(&history).unwrap();
        let dates = fitted.make_future_dates(48, Duration::minutes(15));

        assert_eq!(dates.len(), 8 + 48);
        assert_eq!(&dates[..8], fitted.history_dates());
        let last = history.last().unwrap().0;
        assert_eq!(dates[8], last + Duration::minutes(15));
        assert_eq!(*dates.last().unwrap(), last + Duration::hours(12));
    }

    #[test]
    fn test_daily_cycle_is_recovered() {
        // four days, sub-daily sampling enables the daily component
        let history = series(4 * 96, |h| {
            10.0 + 3.0 * (2.0 * std::f64::consts::PI * h / 24.0).sin()
        });
        let fitted = model().fit(&history).unwrap();
        assert_eq!(fitted.seasonalities().len(), 1);
        assert_eq!(fitted.seasonalities()[0].name, "daily");

        let dates = fitted.make_future_dates(48, Duration::minutes(15));
        let predictions = fitted.predict(&dates);
        for (i, p) in predictions.iter().enumerate().skip(4 * 96) {
            let h = i as f64 / 4.0;
            let truth = 10.0 + 3.0 * (2.0 * std::f64::consts::PI * h / 24.0).sin();
            assert!((p.yhat - truth).abs() < 0.1, "row {i}: {} vs {truth}", p.yhat);
        }
    }

    #[test]
    fn test_constant_zero_series() {
        let history = series(10, |_| 0.0);
        let predictions = model()
            .forecast(&history, 4, Duration::minutes(15))
            .unwrap();
        assert!(predictions.iter().all(|p| p.yhat.abs() < 1e-6));
    }

    #[test]
    fn test_missing_values_are_dropped() {
        let mut history = series(6, |h| 5.0 + h);
        history[2].1 = f64::NAN;
        let fitted = model().fit(&history).unwrap();
        assert_eq!(fitted.history_dates().len(), 5);
        assert!(!fitted.history_dates().contains(&history[2].0));
    }

    #[test]
    fn test_insufficient_data() {
        let err = model().fit(&series(1, |_| 1.0)).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"need at least 2 observations to fit, got 1");

        let mut history = series(2, |_| 1.0);
        history[0].1 = f64::NAN;
        assert!(matches!(
            model().fit(&history),
            Err(ForecastError::InsufficientData(1))
        ));
        assert!(matches!(
            model().fit(&[]),
            Err(ForecastError::InsufficientData(0))
        ));
    }

    #[test]
    fn test_seeded_fit_is_deterministic() {
        let history = series(40, |h| 30.0 + (h * 1.7).sin() * 4.0);
        let a = model().forecast(&history, 48, Duration::minutes(15)).unwrap();
        let b = model().forecast(&history, 48, Duration::minutes(15)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ModelConfig {
            changepoint_prior_scale: 0.0,
            ..ModelConfig::default()
        };
        assert!(matches!(
            AdditiveModel::new(config),
            Err(ForecastError::InvalidParameter(_))
        ));
    }
}
