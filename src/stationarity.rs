//! Augmented Dickey-Fuller stationarity testing.
//!
//! A mean-reversion strategy is only justified when the spread it trades is
//! stationary. `adf_test` is the diagnostic gate a caller should check before
//! trusting a backtest's premise; the backtester itself never consumes it.
//!
//! The test regresses Δy on a constant, the lagged level and lagged
//! differences, selecting the lag order automatically by AIC up to the
//! Schwert bound. P-values use the MacKinnon (1994) response surface and the
//! critical values the MacKinnon (2010) finite-sample regressions, both for
//! the constant-only case.

use crate::error::{PairError, Result};
use crate::types::SeriesPoint;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Minimum number of defined points for a meaningful test.
pub const MIN_ADF_POINTS: usize = 20;

/// Result of an Augmented Dickey-Fuller test. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdfResult {
    /// The tau statistic on the lagged level coefficient.
    pub test_statistic: f64,
    pub p_value: f64,
    /// Confidence level → rejection threshold ("1%", "5%", "10%").
    pub critical_values: BTreeMap<String, f64>,
    /// Lag order selected by AIC.
    pub lag: usize,
    /// Observations used in the final regression.
    pub n_obs: usize,
    /// True iff `p_value < alpha`: the unit-root null is rejected and the
    /// series is treated as mean-reverting.
    pub is_stationary: bool,
}

struct AdfFit {
    t_stat: f64,
    aic: f64,
    n_obs: usize,
}

/// Run the ADF test on a series at significance level `alpha`.
///
/// Undefined points are dropped before testing. Fails with
/// `InsufficientData` below [`MIN_ADF_POINTS`] defined points.
pub fn adf_test(series: &[SeriesPoint], alpha: f64) -> Result<AdfResult> {
    if !(0.0 < alpha && alpha < 1.0) {
        return Err(PairError::Config(format!(
            "ADF alpha must lie in (0, 1), got {}",
            alpha
        )));
    }

    let data: Vec<f64> = series.iter().filter_map(|p| p.value).collect();
    if data.len() < MIN_ADF_POINTS {
        return Err(PairError::InsufficientData {
            required: MIN_ADF_POINTS,
            actual: data.len(),
        });
    }

    let n = data.len();
    let diff: Vec<f64> = data.windows(2).map(|w| w[1] - w[0]).collect();

    // Schwert rule, capped so the regression keeps degrees of freedom.
    let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).floor() as usize;
    let max_lag = schwert.min(n.saturating_sub(8) / 2);

    // Auto lag: compare AICs on the common sample implied by max_lag, then
    // refit the winner on its full usable sample.
    let mut best: Option<(usize, f64)> = None;
    for lag in 0..=max_lag {
        if let Some(fit) = adf_regression(&data, &diff, lag, max_lag) {
            match best {
                Some((_, best_aic)) if fit.aic >= best_aic => {}
                _ => best = Some((lag, fit.aic)),
            }
        }
    }
    let (lag, _) = best.ok_or_else(|| {
        PairError::DegenerateInput("ADF regression is singular for every lag order".to_string())
    })?;

    let fit = adf_regression(&data, &diff, lag, lag).ok_or_else(|| {
        PairError::DegenerateInput("ADF regression is singular at the selected lag".to_string())
    })?;

    let p_value = mackinnon_p_value(fit.t_stat);
    let critical_values = mackinnon_critical_values(fit.n_obs);
    let is_stationary = p_value < alpha;

    info!(
        "ADF test: tau={:.4} p={:.4} lag={} nobs={} stationary={}",
        fit.t_stat, p_value, lag, fit.n_obs, is_stationary
    );

    Ok(AdfResult {
        test_statistic: fit.t_stat,
        p_value,
        critical_values,
        lag,
        n_obs: fit.n_obs,
        is_stationary,
    })
}

/// Fit Δy_t = α + ρ·y_{t−1} + Σ γ_i·Δy_{t−i} + ε over rows t = start..,
/// returning the tau statistic on ρ and the AIC of the fit.
fn adf_regression(data: &[f64], diff: &[f64], lag: usize, start: usize) -> Option<AdfFit> {
    let n_obs = diff.len().checked_sub(start)?;
    let n_params = 2 + lag;
    if n_obs < n_params + 3 {
        return None;
    }

    let mut x_data = Vec::with_capacity(n_obs * n_params);
    let mut y_data = Vec::with_capacity(n_obs);
    for t in start..diff.len() {
        y_data.push(diff[t]);
        x_data.push(1.0);
        x_data.push(data[t]);
        for i in 1..=lag {
            x_data.push(diff[t - i]);
        }
    }

    let x = DMatrix::from_row_slice(n_obs, n_params, &x_data);
    let y = DVector::from_vec(y_data);

    let xtx = x.transpose() * &x;
    let xtx_inv = xtx.try_inverse()?;
    let beta = &xtx_inv * (x.transpose() * &y);

    let residuals = &y - &x * &beta;
    let ssr: f64 = residuals.iter().map(|r| r * r).sum();
    if ssr <= 0.0 {
        debug!("ADF regression has zero residual sum of squares at lag {}", lag);
        return None;
    }

    let mse = ssr / (n_obs - n_params) as f64;
    let se = (mse * xtx_inv[(1, 1)]).sqrt();
    if se <= 0.0 || !se.is_finite() {
        return None;
    }

    Some(AdfFit {
        t_stat: beta[1] / se,
        aic: n_obs as f64 * (ssr / n_obs as f64).ln() + 2.0 * n_params as f64,
        n_obs,
    })
}

// MacKinnon (1994) response surface for the constant-only tau distribution
// with one integrated variable: p = Phi(polynomial in tau), split between a
// small-p and a large-p regime.
const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const TAU_SMALLP: [f64; 3] = [2.1659, 1.4412, 3.8269e-2];
const TAU_LARGEP: [f64; 4] = [1.7339, 9.3202e-1, -1.2745e-1, -1.0368e-2];

fn mackinnon_p_value(tau: f64) -> f64 {
    if tau > TAU_MAX {
        return 1.0;
    }
    if tau < TAU_MIN {
        return 0.0;
    }
    let z = if tau <= TAU_STAR {
        TAU_SMALLP[0] + TAU_SMALLP[1] * tau + TAU_SMALLP[2] * tau * tau
    } else {
        TAU_LARGEP[0]
            + TAU_LARGEP[1] * tau
            + TAU_LARGEP[2] * tau * tau
            + TAU_LARGEP[3] * tau * tau * tau
    };
    norm_cdf(z)
}

/// MacKinnon (2010) finite-sample critical values, constant-only case.
fn mackinnon_critical_values(n_obs: usize) -> BTreeMap<String, f64> {
    let t = n_obs as f64;
    let mut values = BTreeMap::new();
    values.insert(
        "1%".to_string(),
        -3.43035 - 6.5393 / t - 16.786 / (t * t) - 79.433 / (t * t * t),
    );
    values.insert(
        "5%".to_string(),
        -2.86154 - 2.8903 / t - 4.234 / (t * t) - 40.040 / (t * t * t),
    );
    values.insert(
        "10%".to_string(),
        -2.56677 - 1.5384 / t - 2.809 / (t * t),
    );
    values
}

fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Abramowitz & Stegun 7.1.26 approximation, max error 1.5e-7.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1.0 - poly * (-x * x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn ts(i: usize) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(i as i64)
    }

    fn to_series(values: &[f64]) -> Vec<SeriesPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| SeriesPoint::new(ts(i), Some(v)))
            .collect()
    }

    /// Mean-reverting AR(1) noise: x_t = 0.5 x_{t-1} + e_t.
    fn mean_reverting_series(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut values = Vec::with_capacity(n);
        let mut x = 0.0;
        for _ in 0..n {
            x = 0.5 * x + rng.gen_range(-1.0..1.0);
            values.push(x);
        }
        values
    }

    /// Random walk: x_t = x_{t-1} + e_t.
    fn random_walk(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut values = Vec::with_capacity(n);
        let mut x = 0.0;
        for _ in 0..n {
            x += rng.gen_range(-1.0..1.0);
            values.push(x);
        }
        values
    }

    #[test]
    fn test_adf_rejects_unit_root_for_stationary_series() {
        let series = to_series(&mean_reverting_series(400, 7));
        let result = adf_test(&series, 0.05).unwrap();
        assert!(
            result.is_stationary,
            "stationary AR(1) should reject the unit root (tau={}, p={})",
            result.test_statistic, result.p_value
        );
        assert!(result.test_statistic < -3.0);
    }

    #[test]
    fn test_adf_accepts_unit_root_for_random_walk() {
        let series = to_series(&random_walk(400, 11));
        let result = adf_test(&series, 0.05).unwrap();
        assert!(
            !result.is_stationary,
            "random walk should not reject the unit root (tau={}, p={})",
            result.test_statistic, result.p_value
        );
    }

    #[test]
    fn test_adf_insufficient_data() {
        let series = to_series(&[1.0; 10]);
        assert!(matches!(
            adf_test(&series, 0.05),
            Err(PairError::InsufficientData {
                required: MIN_ADF_POINTS,
                actual: 10
            })
        ));
    }

    #[test]
    fn test_adf_rejects_invalid_alpha() {
        let series = to_series(&mean_reverting_series(100, 3));
        assert!(matches!(
            adf_test(&series, 0.0),
            Err(PairError::Config(_))
        ));
        assert!(adf_test(&series, 1.2).is_err());
    }

    #[test]
    fn test_adf_drops_undefined_points() {
        let mut series = to_series(&mean_reverting_series(300, 5));
        series[0].value = None;
        series[150].value = None;
        let result = adf_test(&series, 0.05).unwrap();
        assert!(result.is_stationary);
    }

    #[test]
    fn test_critical_values_ordering() {
        let values = mackinnon_critical_values(250);
        assert!(values["1%"] < values["5%"]);
        assert!(values["5%"] < values["10%"]);
        // Asymptotic anchors for a large sample.
        assert!((values["5%"] + 2.86154).abs() < 0.05);
    }

    #[test]
    fn test_mackinnon_p_value_behaviour() {
        // Strongly negative tau: decisive rejection.
        assert!(mackinnon_p_value(-6.0) < 0.001);
        // Around the 5% critical value the p-value is near 0.05.
        let p = mackinnon_p_value(-2.86);
        assert!((p - 0.05).abs() < 0.01, "p at -2.86 = {}", p);
        // Non-negative tau: no evidence against the unit root.
        assert!(mackinnon_p_value(0.0) > 0.5);
        assert!((mackinnon_p_value(5.0) - 1.0).abs() < f64::EPSILON);
        assert!(mackinnon_p_value(-20.0) == 0.0);
    }

    #[test]
    fn test_norm_cdf_sanity() {
        assert!((norm_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((norm_cdf(1.96) - 0.975).abs() < 1e-3);
        assert!((norm_cdf(-1.96) - 0.025).abs() < 1e-3);
    }
}
