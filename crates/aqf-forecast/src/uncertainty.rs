//! Monte-Carlo uncertainty intervals
//!
//! Each draw adds simulated future trend changes (changepoints beyond the
//! history at the historic rate, Laplace-distributed magnitudes) and
//! Gaussian observation noise to the fitted components.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson, StandardNormal};

use crate::trend::hinge;

/// Inputs for interval simulation, all on the scaled axes
#[derive(Debug, Clone)]
pub struct Simulation {
    pub samples: usize,
    pub interval_width: f64,
    pub seed: u64,
    /// Changepoints in the fitted history
    pub n_changepoints: usize,
    /// Laplace scale for simulated rate changes
    pub delta_scale: f64,
    /// Observation noise
    pub sigma: f64,
    /// Factor back to the original units
    pub y_scale: f64,
}

impl Simulation {
    /// Lower and upper interval bounds for every row, in original units.
    ///
    /// `t` is scaled time (history in `[0, 1]`), `trend` and `seasonal` are
    /// the fitted components at those times.
    pub fn intervals(&self, t: &[f64], trend: &[f64], seasonal: &[f64]) -> Vec<(f64, f64)> {
        if self.samples == 0 {
            return trend
                .iter()
                .zip(seasonal)
                .map(|(tr, s)| {
                    let yhat = (tr + s) * self.y_scale;
                    (yhat, yhat)
                })
                .collect();
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let t_max = t.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut draws: Vec<Vec<f64>> = vec![Vec::with_capacity(self.samples); t.len()];

        for _ in 0..self.samples {
            let changes = self.future_changes(&mut rng, t_max);
            for (i, ti) in t.iter().enumerate() {
                let extra: f64 = changes.iter().map(|(s, d)| d * hinge(*ti, *s)).sum();
                let noise: f64 = rng.sample::<f64, _>(StandardNormal) * self.sigma;
                draws[i].push((trend[i] + extra + seasonal[i] + noise) * self.y_scale);
            }
        }

        let lower_q = (1.0 - self.interval_width) / 2.0;
        let upper_q = (1.0 + self.interval_width) / 2.0;
        draws
            .into_iter()
            .map(|mut row| {
                row.sort_by(|a, b| a.total_cmp(b));
                (quantile(&row, lower_q), quantile(&row, upper_q))
            })
            .collect()
    }

    /// Changepoints `(location, delta)` beyond the end of the history
    fn future_changes(&self, rng: &mut StdRng, t_max: f64) -> Vec<(f64, f64)> {
        if t_max <= 1.0 || self.n_changepoints == 0 {
            return Vec::new();
        }
        let rate = self.n_changepoints as f64 * (t_max - 1.0);
        let count = match Poisson::new(rate) {
            Ok(poisson) => {
                let n: f64 = poisson.sample(rng);
                n as usize
            }
            Err(_) => 0,
        };
        let scale = self.delta_scale + 1e-8;
        (0..count)
            .map(|_| (rng.gen_range(1.0..t_max), laplace(rng, scale)))
            .collect()
    }
}

fn laplace(rng: &mut StdRng, scale: f64) -> f64 {
    let u: f64 = rng.gen_range(-0.5..0.5);
    -scale * u.signum() * (1.0 - 2.0 * u.abs()).max(f64::MIN_POSITIVE).ln()
}

/// Linearly interpolated quantile of an ascending slice
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let h = (n - 1) as f64 * q.clamp(0.0, 1.0);
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulation(samples: usize) -> Simulation {
        Simulation {
            samples,
            interval_width: 0.8,
            seed: 7,
            n_changepoints: 10,
            delta_scale: 0.05,
            sigma: 0.02,
            y_scale: 100.0,
        }
    }

    #[test]
    fn test_quantile_interpolates() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile(&xs, 0.0), 1.0);
        assert_eq!(quantile(&xs, 0.5), 3.0);
        assert_eq!(quantile(&xs, 1.0), 5.0);
        assert!((quantile(&xs, 0.1) - 1.4).abs() < 1e-12);
        assert!(quantile(&[], 0.5).is_nan());
    }

    #[test]
    fn test_intervals_bracket_point_forecast() {
        let t = [0.0, 0.5, 1.0, 1.2, 1.5];
        let trend = [0.1, 0.2, 0.3, 0.34, 0.4];
        let seasonal = [0.0; 5];
        let bounds = simulation(500).intervals(&t, &trend, &seasonal);

        for ((lo, hi), tr) in bounds.iter().zip(trend) {
            let yhat = tr * 100.0;
            assert!(*lo < yhat && yhat < *hi);
        }
    }

    #[test]
    fn test_future_intervals_widen() {
        let t = [1.0, 3.0];
        let trend = [0.3, 0.3];
        let seasonal = [0.0; 2];
        let bounds = simulation(2000).intervals(&t, &trend, &seasonal);

        let width = |(lo, hi): (f64, f64)| hi - lo;
        assert!(width(bounds[1]) > width(bounds[0]));
    }

    #[test]
    fn test_seeded_draws_are_reproducible() {
        let t = [0.0, 1.0, 1.1];
        let trend = [0.0, 0.1, 0.11];
        let seasonal = [0.0; 3];
        let a = simulation(200).intervals(&t, &trend, &seasonal);
        let b = simulation(200).intervals(&t, &trend, &seasonal);
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_samples_collapses_interval() {
        let bounds = simulation(0).intervals(&[0.0], &[0.25], &[0.5]);
        assert_eq!(bounds, vec![(75.0, 75.0)]);
    }
}
