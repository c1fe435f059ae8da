//! Hedge ratio estimation.
//!
//! Five interchangeable estimators describe how many units of asset B offset
//! one unit of asset A: OLS, Huber robust regression, total least squares,
//! rolling OLS and a recursive Kalman filter. Static estimators return one
//! (ratio, intercept) pair for the whole window; rolling and Kalman return a
//! time-varying sequence with one point per timestamp.

use crate::config::{EngineConfig, KalmanSettings};
use crate::error::{PairError, Result};
use crate::types::AlignedPair;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Divisor guard: price B values below this magnitude are excluded from
/// static fits and skip the Kalman observation update.
pub const MIN_DIVISOR: f64 = 1e-12;

/// Huber tuning constant (95% efficiency under normal errors).
const HUBER_K: f64 = 1.345;

/// Maximum IRLS iterations for the Huber fit.
const HUBER_MAX_ITER: usize = 50;

/// IRLS convergence tolerance on the parameter change.
const HUBER_TOL: f64 = 1e-8;

/// Closed set of estimation strategies. Adding a method is a new variant
/// plus one fitting function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorMethod {
    #[default]
    Ols,
    Huber,
    Tls,
    Rolling,
    Kalman,
}

impl std::fmt::Display for EstimatorMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EstimatorMethod::Ols => write!(f, "ols"),
            EstimatorMethod::Huber => write!(f, "huber"),
            EstimatorMethod::Tls => write!(f, "tls"),
            EstimatorMethod::Rolling => write!(f, "rolling"),
            EstimatorMethod::Kalman => write!(f, "kalman"),
        }
    }
}

/// A scalar fit valid for the whole estimation window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StaticFit {
    pub ratio: f64,
    pub intercept: f64,
    /// False only when the Huber IRLS loop hit its iteration cap; the fields
    /// then hold the best iterate rather than a converged solution.
    pub converged: bool,
    pub iterations: usize,
}

/// Fit values at a single timestamp of a time-varying estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointFit {
    pub ratio: f64,
    pub intercept: f64,
    pub ratio_variance: f64,
}

/// One timestamp of a time-varying estimate. `fit` is `None` while the
/// trailing window is still filling or when the window had too few valid
/// rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HedgePoint {
    pub timestamp: DateTime<Utc>,
    pub fit: Option<PointFit>,
}

/// Result of a hedge ratio estimation. Immutable once produced; a fresh
/// value is created per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HedgeRatioEstimate {
    Static(StaticFit),
    TimeVarying(Vec<HedgePoint>),
}

impl HedgeRatioEstimate {
    pub fn is_time_varying(&self) -> bool {
        matches!(self, HedgeRatioEstimate::TimeVarying(_))
    }
}

/// Estimate the hedge ratio of an aligned pair with the requested method.
///
/// Fails with `InsufficientData` when fewer than the method-specific minimum
/// number of usable points exist: 2 for OLS/Huber/TLS (after excluding rows
/// with a near-zero B price), the configured window for rolling OLS, and 1
/// for Kalman.
pub fn estimate(
    pair: &AlignedPair,
    method: EstimatorMethod,
    config: &EngineConfig,
) -> Result<HedgeRatioEstimate> {
    info!(
        "Estimating hedge ratio: method={} points={}",
        method,
        pair.len()
    );
    match method {
        EstimatorMethod::Ols => ols_fit(pair).map(HedgeRatioEstimate::Static),
        EstimatorMethod::Huber => huber_fit(pair).map(HedgeRatioEstimate::Static),
        EstimatorMethod::Tls => tls_fit(pair).map(HedgeRatioEstimate::Static),
        EstimatorMethod::Rolling => {
            rolling_ols(pair, config.window).map(HedgeRatioEstimate::TimeVarying)
        }
        EstimatorMethod::Kalman => {
            kalman_fit(pair, &config.kalman).map(HedgeRatioEstimate::TimeVarying)
        }
    }
}

/// Rows usable for static fitting: B prices below the divisor guard are
/// excluded.
fn valid_rows(a: &[f64], b: &[f64]) -> Vec<(f64, f64)> {
    a.iter()
        .zip(b.iter())
        .filter(|(_, &bv)| bv.abs() >= MIN_DIVISOR)
        .map(|(&av, &bv)| (av, bv))
        .collect()
}

fn require_points(actual: usize, required: usize) -> Result<()> {
    if actual < required {
        return Err(PairError::InsufficientData { required, actual });
    }
    Ok(())
}

/// Unweighted least squares core: regresses a on b, returns (slope,
/// intercept).
fn ols_core(rows: &[(f64, f64)]) -> Result<(f64, f64)> {
    let n = rows.len() as f64;
    let mean_a = rows.iter().map(|(a, _)| a).sum::<f64>() / n;
    let mean_b = rows.iter().map(|(_, b)| b).sum::<f64>() / n;

    let sxx: f64 = rows.iter().map(|(_, b)| (b - mean_b).powi(2)).sum();
    if sxx < MIN_DIVISOR {
        return Err(PairError::DegenerateInput(
            "price series B has zero variance".to_string(),
        ));
    }
    let sxy: f64 = rows
        .iter()
        .map(|(a, b)| (a - mean_a) * (b - mean_b))
        .sum();

    let slope = sxy / sxx;
    Ok((slope, mean_a - slope * mean_b))
}

/// Ordinary least squares: minimizes squared residuals of A regressed on B.
pub fn ols_fit(pair: &AlignedPair) -> Result<StaticFit> {
    let rows = valid_rows(&pair.a, &pair.b);
    require_points(rows.len(), 2)?;
    let (ratio, intercept) = ols_core(&rows)?;
    Ok(StaticFit {
        ratio,
        intercept,
        converged: true,
        iterations: 1,
    })
}

fn weighted_ols(rows: &[(f64, f64)], weights: &[f64]) -> Result<(f64, f64)> {
    let wsum: f64 = weights.iter().sum();
    if wsum < MIN_DIVISOR {
        return Err(PairError::DegenerateInput(
            "all observation weights collapsed to zero".to_string(),
        ));
    }
    let mean_a = rows
        .iter()
        .zip(weights)
        .map(|((a, _), w)| w * a)
        .sum::<f64>()
        / wsum;
    let mean_b = rows
        .iter()
        .zip(weights)
        .map(|((_, b), w)| w * b)
        .sum::<f64>()
        / wsum;

    let sxx: f64 = rows
        .iter()
        .zip(weights)
        .map(|((_, b), w)| w * (b - mean_b).powi(2))
        .sum();
    if sxx < MIN_DIVISOR {
        return Err(PairError::DegenerateInput(
            "weighted price series B has zero variance".to_string(),
        ));
    }
    let sxy: f64 = rows
        .iter()
        .zip(weights)
        .map(|((a, b), w)| w * (a - mean_a) * (b - mean_b))
        .sum();

    let slope = sxy / sxx;
    Ok((slope, mean_a - slope * mean_b))
}

/// Median of a slice (interpolated for even lengths).
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Huber robust regression via iteratively reweighted least squares.
///
/// Residuals beyond `HUBER_K` robust standard deviations get down-weighted.
/// Never fails on non-convergence: after `HUBER_MAX_ITER` iterations the best
/// iterate is returned with `converged = false`.
pub fn huber_fit(pair: &AlignedPair) -> Result<StaticFit> {
    let rows = valid_rows(&pair.a, &pair.b);
    require_points(rows.len(), 2)?;

    let (mut slope, mut intercept) = ols_core(&rows)?;

    for iteration in 1..=HUBER_MAX_ITER {
        let residuals: Vec<f64> = rows
            .iter()
            .map(|(a, b)| a - (slope * b + intercept))
            .collect();

        // Robust scale: 1.4826 x MAD estimates sigma under normal errors.
        let mut abs_res: Vec<f64> = residuals.iter().map(|r| r.abs()).collect();
        let scale = 1.4826 * median(&mut abs_res);
        if scale < MIN_DIVISOR {
            // Essentially perfect fit; nothing left to reweight.
            return Ok(StaticFit {
                ratio: slope,
                intercept,
                converged: true,
                iterations: iteration,
            });
        }

        let threshold = HUBER_K * scale;
        let weights: Vec<f64> = residuals
            .iter()
            .map(|r| {
                if r.abs() <= threshold {
                    1.0
                } else {
                    threshold / r.abs()
                }
            })
            .collect();

        let (new_slope, new_intercept) = weighted_ols(&rows, &weights)?;
        let change = (new_slope - slope).abs() + (new_intercept - intercept).abs();
        slope = new_slope;
        intercept = new_intercept;

        if change < HUBER_TOL {
            return Ok(StaticFit {
                ratio: slope,
                intercept,
                converged: true,
                iterations: iteration,
            });
        }
    }

    warn!(
        "Huber fit did not converge in {} iterations; returning best iterate",
        HUBER_MAX_ITER
    );
    Ok(StaticFit {
        ratio: slope,
        intercept,
        converged: false,
        iterations: HUBER_MAX_ITER,
    })
}

/// Total least squares (orthogonal regression).
///
/// Minimizes perpendicular distance, accounting for noise in both series via
/// the total-variance decomposition of the centered data. Appropriate when
/// neither series is the "independent" one.
pub fn tls_fit(pair: &AlignedPair) -> Result<StaticFit> {
    let rows = valid_rows(&pair.a, &pair.b);
    require_points(rows.len(), 2)?;

    let n = rows.len() as f64;
    let mean_a = rows.iter().map(|(a, _)| a).sum::<f64>() / n;
    let mean_b = rows.iter().map(|(_, b)| b).sum::<f64>() / n;

    let s_bb: f64 = rows.iter().map(|(_, b)| (b - mean_b).powi(2)).sum::<f64>() / n;
    let s_aa: f64 = rows.iter().map(|(a, _)| (a - mean_a).powi(2)).sum::<f64>() / n;
    let s_ab: f64 = rows
        .iter()
        .map(|(a, b)| (a - mean_a) * (b - mean_b))
        .sum::<f64>()
        / n;

    if s_ab.abs() < MIN_DIVISOR {
        return Err(PairError::DegenerateInput(
            "no covariance between the two series".to_string(),
        ));
    }

    // Slope of the principal axis of the centered scatter: the positive
    // root of the characteristic equation for the 2x2 covariance matrix.
    let diff = s_aa - s_bb;
    let ratio = (diff + (diff * diff + 4.0 * s_ab * s_ab).sqrt()) / (2.0 * s_ab);
    let intercept = mean_a - ratio * mean_b;

    Ok(StaticFit {
        ratio,
        intercept,
        converged: true,
        iterations: 1,
    })
}

/// Rolling OLS over a trailing window of fixed size at every timestamp.
///
/// The first `window - 1` points are undefined. Within each window, rows
/// with a near-zero B price are excluded; a window left with fewer than two
/// valid rows yields an undefined point.
pub fn rolling_ols(pair: &AlignedPair, window: usize) -> Result<Vec<HedgePoint>> {
    require_points(pair.len(), window.max(2))?;

    let mut points = Vec::with_capacity(pair.len());
    for i in 0..pair.len() {
        if i + 1 < window {
            points.push(HedgePoint {
                timestamp: pair.timestamps[i],
                fit: None,
            });
            continue;
        }

        let start = i + 1 - window;
        let rows = valid_rows(&pair.a[start..=i], &pair.b[start..=i]);
        let fit = if rows.len() < 2 {
            debug!(
                "rolling window ending at index {} has {} valid rows; point undefined",
                i,
                rows.len()
            );
            None
        } else {
            match ols_core(&rows) {
                Ok((ratio, intercept)) => {
                    Some(PointFit {
                        ratio,
                        intercept,
                        ratio_variance: slope_variance(&rows, ratio, intercept),
                    })
                }
                Err(_) => None,
            }
        };

        points.push(HedgePoint {
            timestamp: pair.timestamps[i],
            fit,
        });
    }

    Ok(points)
}

/// Sampling variance of the OLS slope: mse / Sxx.
fn slope_variance(rows: &[(f64, f64)], slope: f64, intercept: f64) -> f64 {
    let n = rows.len();
    if n <= 2 {
        return 0.0;
    }
    let mean_b = rows.iter().map(|(_, b)| b).sum::<f64>() / n as f64;
    let sxx: f64 = rows.iter().map(|(_, b)| (b - mean_b).powi(2)).sum();
    if sxx < MIN_DIVISOR {
        return 0.0;
    }
    let ssr: f64 = rows
        .iter()
        .map(|(a, b)| (a - (slope * b + intercept)).powi(2))
        .sum();
    ssr / (n - 2) as f64 / sxx
}

/// Explicit Kalman filter state: posterior mean and covariance of the
/// (ratio, intercept) random-walk state.
///
/// The filter is a pure function of (prior state, observation); no state is
/// ever kept between calls, which makes repeated invocations idempotent and
/// lets callers carry the state forward themselves for streaming use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KalmanState {
    /// [ratio, intercept].
    pub mean: [f64; 2],
    /// 2x2 covariance of the state estimate.
    pub cov: [[f64; 2]; 2],
}

impl KalmanState {
    /// Initial state from settings: prior means with a large diagonal
    /// covariance unless tighter priors are configured.
    pub fn from_settings(settings: &KalmanSettings) -> Self {
        Self {
            mean: [settings.initial_ratio, settings.initial_intercept],
            cov: [
                [settings.initial_variance, 0.0],
                [0.0, settings.initial_variance],
            ],
        }
    }
}

/// One predict/update cycle of the hedge ratio Kalman filter.
///
/// Predict: the state mean carries forward unchanged (random walk) and the
/// covariance is inflated by the process noise. Update: the prediction
/// residual of `price_a` against the model-implied value corrects the state
/// and shrinks the covariance. When `price_b` is below the divisor guard the
/// observation update is skipped and only the predicted state is returned.
pub fn kalman_step(
    state: &KalmanState,
    price_a: f64,
    price_b: f64,
    settings: &KalmanSettings,
) -> (KalmanState, PointFit) {
    // Predict: P = P + Q.
    let q = settings.process_noise;
    let mut p = state.cov;
    p[0][0] += q;
    p[1][1] += q;

    let predicted = KalmanState {
        mean: state.mean,
        cov: p,
    };

    if price_b.abs() < MIN_DIVISOR || !price_a.is_finite() || !price_b.is_finite() {
        debug!("Kalman observation skipped (degenerate B price); predict-only step");
        return (predicted, point_fit_of(&predicted));
    }

    // Observation row H = [price_b, 1].
    let ph = [
        p[0][0] * price_b + p[0][1],
        p[1][0] * price_b + p[1][1],
    ];
    let innovation = price_a - (state.mean[0] * price_b + state.mean[1]);
    let s = price_b * ph[0] + ph[1] + settings.observation_noise;
    if s.abs() < MIN_DIVISOR {
        return (predicted, point_fit_of(&predicted));
    }

    let gain = [ph[0] / s, ph[1] / s];
    let mean = [
        state.mean[0] + gain[0] * innovation,
        state.mean[1] + gain[1] * innovation,
    ];

    // Covariance update: P = (I - K H) P, then symmetrize and floor the
    // diagonal against round-off.
    let ikh = [
        [1.0 - gain[0] * price_b, -gain[0]],
        [-gain[1] * price_b, 1.0 - gain[1]],
    ];
    let mut cov = [[0.0; 2]; 2];
    for r in 0..2 {
        for c in 0..2 {
            cov[r][c] = ikh[r][0] * p[0][c] + ikh[r][1] * p[1][c];
        }
    }
    let off = (cov[0][1] + cov[1][0]) / 2.0;
    cov[0][1] = off;
    cov[1][0] = off;
    cov[0][0] = cov[0][0].max(1e-12);
    cov[1][1] = cov[1][1].max(1e-12);

    let posterior = KalmanState { mean, cov };
    (posterior, point_fit_of(&posterior))
}

fn point_fit_of(state: &KalmanState) -> PointFit {
    PointFit {
        ratio: state.mean[0],
        intercept: state.mean[1],
        ratio_variance: state.cov[0][0],
    }
}

/// Run the Kalman filter over a full aligned pair from a fresh prior.
///
/// Produces one point per observation. By convention the first emitted point
/// is the prior itself, since no update has occurred yet; the first
/// observation is then folded into the state before the second point.
pub fn kalman_fit(pair: &AlignedPair, settings: &KalmanSettings) -> Result<Vec<HedgePoint>> {
    kalman_fit_with_state(pair, KalmanState::from_settings(settings), settings)
        .map(|(points, _)| points)
}

/// Kalman filter variant that accepts an explicit prior and returns the
/// final posterior state, for callers that carry state across growing
/// series themselves.
pub fn kalman_fit_with_state(
    pair: &AlignedPair,
    initial: KalmanState,
    settings: &KalmanSettings,
) -> Result<(Vec<HedgePoint>, KalmanState)> {
    require_points(pair.len(), 1)?;

    let mut state = initial;
    let mut points = Vec::with_capacity(pair.len());

    points.push(HedgePoint {
        timestamp: pair.timestamps[0],
        fit: Some(point_fit_of(&state)),
    });
    let (next, _) = kalman_step(&state, pair.a[0], pair.b[0], settings);
    state = next;

    for i in 1..pair.len() {
        let (next, fit) = kalman_step(&state, pair.a[i], pair.b[i], settings);
        state = next;
        points.push(HedgePoint {
            timestamp: pair.timestamps[i],
            fit: Some(fit),
        });
    }

    Ok((points, state))
}
