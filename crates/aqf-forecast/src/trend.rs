//! Piecewise-linear trend with changepoints

/// Trend `k·t + m + Σ δ_j (t − s_j)+` on the scaled time axis
#[derive(Debug, Clone, PartialEq)]
pub struct PiecewiseLinear {
    /// Base growth rate
    pub k: f64,
    /// Offset
    pub m: f64,
    /// Changepoint locations, ascending
    pub changepoints: Vec<f64>,
    /// Rate adjustment at each changepoint
    pub deltas: Vec<f64>,
}

impl PiecewiseLinear {
    pub fn at(&self, t: f64) -> f64 {
        let bends: f64 = self
            .changepoints
            .iter()
            .zip(&self.deltas)
            .map(|(s, d)| d * hinge(t, *s))
            .sum();
        self.k * t + self.m + bends
    }

    /// Mean absolute rate change, the scale used when simulating future changes
    pub fn mean_abs_delta(&self) -> f64 {
        if self.deltas.is_empty() {
            return 0.0;
        }
        self.deltas.iter().map(|d| d.abs()).sum::<f64>() / self.deltas.len() as f64
    }
}

pub fn hinge(t: f64, s: f64) -> f64 {
    (t - s).max(0.0)
}

/// Place up to `n_changepoints` at evenly spaced rows within the first
/// `range` fraction of the (scaled, ascending) history.
///
/// Short histories get fewer changepoints: never more than the eligible
/// rows minus one.
pub fn place_changepoints(t: &[f64], n_changepoints: usize, range: f64) -> Vec<f64> {
    let eligible = (t.len() as f64 * range).floor() as usize;
    let n = if n_changepoints + 1 > eligible {
        eligible.saturating_sub(1)
    } else {
        n_changepoints
    };
    if n == 0 {
        return Vec::new();
    }

    let last = (eligible - 1) as f64;
    (1..=n)
        .map(|i| {
            let idx = (last * i as f64 / n as f64).round() as usize;
            t[idx]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 / (n - 1) as f64).collect()
    }

    #[test]
    fn test_changepoints_within_range() {
        let t = axis(101);
        let cps = place_changepoints(&t, 25, 0.8);

        assert_eq!(cps.len(), 25);
        assert!(cps.windows(2).all(|w| w[0] < w[1]));
        assert!(cps[0] > 0.0);
        assert!(*cps.last().unwrap() <= 0.8);
    }

    #[test]
    fn test_short_history_gets_fewer_changepoints() {
        // floor(10 * 0.8) = 8 eligible rows -> 7 changepoints
        assert_eq!(place_changepoints(&axis(10), 25, 0.8).len(), 7);
        assert!(place_changepoints(&axis(2), 25, 0.8).is_empty());
        assert!(place_changepoints(&axis(50), 0, 0.8).is_empty());
    }

    #[test]
    fn test_trend_bends_at_changepoint() {
        let trend = PiecewiseLinear {
            k: 1.0,
            m: 0.5,
            changepoints: vec![0.5],
            deltas: vec![-2.0],
        };
        assert_eq!(trend.at(0.0), 0.5);
        assert_eq!(trend.at(0.5), 1.0);
        // slope after the changepoint is 1 - 2 = -1
        assert!((trend.at(1.0) - 0.5).abs() < 1e-12);
        assert_eq!(trend.mean_abs_delta(), 2.0);
    }
}
