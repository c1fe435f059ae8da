//! Spread construction, z-score normalization and correlation analytics.

use crate::error::{PairError, Result};
use crate::hedge::{HedgeRatioEstimate, MIN_DIVISOR};
use crate::types::{AlignedPair, SeriesPoint, SpreadSeries, ZScoreSeries};
use tracing::debug;

/// Combine an aligned pair with a hedge ratio estimate into a spread series:
/// spread = priceA − ratio × priceB − intercept.
///
/// A static estimate is broadcast across the whole index. A time-varying
/// estimate is applied element-wise and must cover the pair's index exactly;
/// otherwise the call fails with an alignment error. Undefined hedge points
/// yield undefined spread points.
pub fn compute_spread(
    pair: &AlignedPair,
    estimate: &HedgeRatioEstimate,
) -> Result<SpreadSeries> {
    match estimate {
        HedgeRatioEstimate::Static(fit) => Ok(pair
            .timestamps
            .iter()
            .zip(pair.a.iter().zip(pair.b.iter()))
            .map(|(&ts, (&a, &b))| {
                SeriesPoint::new(ts, Some(a - fit.ratio * b - fit.intercept))
            })
            .collect()),
        HedgeRatioEstimate::TimeVarying(points) => {
            if points.len() != pair.len() {
                return Err(PairError::Alignment(format!(
                    "estimate has {} points but pair has {}",
                    points.len(),
                    pair.len()
                )));
            }
            pair.timestamps
                .iter()
                .enumerate()
                .map(|(i, &ts)| {
                    if points[i].timestamp != ts {
                        return Err(PairError::Alignment(format!(
                            "estimate timestamp mismatch at index {}: {} vs {}",
                            i, points[i].timestamp, ts
                        )));
                    }
                    let value = points[i]
                        .fit
                        .map(|fit| pair.a[i] - fit.ratio * pair.b[i] - fit.intercept);
                    Ok(SeriesPoint::new(ts, value))
                })
                .collect()
        }
    }
}

/// Mean and sample standard deviation of a fully-defined window, or `None`
/// if any point in the window is undefined.
fn window_stats(window: &[SeriesPoint]) -> Option<(f64, f64)> {
    let mut values = Vec::with_capacity(window.len());
    for point in window {
        values.push(point.value?);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some((mean, var.sqrt()))
}

/// Rolling z-score of a spread over a trailing window.
///
/// The first `window − 1` points are undefined (insufficient history). A
/// window with zero standard deviation (degenerate flat spread) or containing
/// undefined spread points also yields an undefined z-score rather than an
/// infinite or fabricated value; processing continues past such points.
pub fn compute_zscore(spread: &[SeriesPoint], window: usize) -> Result<ZScoreSeries> {
    if window < 2 {
        return Err(PairError::Config(format!(
            "z-score window must be at least 2, got {}",
            window
        )));
    }
    if spread.len() < window {
        return Err(PairError::InsufficientData {
            required: window,
            actual: spread.len(),
        });
    }

    let mut zscores = Vec::with_capacity(spread.len());
    for i in 0..spread.len() {
        if i + 1 < window {
            zscores.push(SeriesPoint::new(spread[i].timestamp, None));
            continue;
        }

        let value = spread[i].value.and_then(|x| {
            let (mean, std) = window_stats(&spread[i + 1 - window..=i])?;
            if std < MIN_DIVISOR {
                debug!(
                    "zero-variance window ending at index {}; z-score undefined",
                    i
                );
                None
            } else {
                Some((x - mean) / std)
            }
        });
        zscores.push(SeriesPoint::new(spread[i].timestamp, value));
    }

    Ok(zscores)
}

/// Static Pearson correlation of the two legs of an aligned pair.
pub fn correlation(pair: &AlignedPair) -> Result<f64> {
    if pair.len() < 2 {
        return Err(PairError::InsufficientData {
            required: 2,
            actual: pair.len(),
        });
    }
    pearson(&pair.a, &pair.b).ok_or_else(|| {
        PairError::DegenerateInput("zero variance in one of the series".to_string())
    })
}

/// Rolling Pearson correlation over a trailing window; the first
/// `window − 1` points are undefined, as are zero-variance windows.
pub fn rolling_correlation(pair: &AlignedPair, window: usize) -> Result<Vec<SeriesPoint>> {
    if window < 2 {
        return Err(PairError::Config(format!(
            "correlation window must be at least 2, got {}",
            window
        )));
    }
    if pair.len() < window {
        return Err(PairError::InsufficientData {
            required: window,
            actual: pair.len(),
        });
    }

    let mut points = Vec::with_capacity(pair.len());
    for i in 0..pair.len() {
        let value = if i + 1 < window {
            None
        } else {
            let start = i + 1 - window;
            pearson(&pair.a[start..=i], &pair.b[start..=i])
        };
        points.push(SeriesPoint::new(pair.timestamps[i], value));
    }
    Ok(points)
}

fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let var_a: f64 = a.iter().map(|x| (x - mean_a).powi(2)).sum();
    let var_b: f64 = b.iter().map(|x| (x - mean_b).powi(2)).sum();
    if var_a < MIN_DIVISOR || var_b < MIN_DIVISOR {
        return None;
    }
    let cov: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - mean_a) * (y - mean_b))
        .sum();
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

/// Percentage returns of a defined-value series. The first point is
/// undefined, as is any point following a near-zero price.
pub fn pct_returns(series: &[SeriesPoint]) -> Vec<SeriesPoint> {
    let mut returns = Vec::with_capacity(series.len());
    for i in 0..series.len() {
        let value = if i == 0 {
            None
        } else {
            match (series[i - 1].value, series[i].value) {
                (Some(prev), Some(curr)) if prev.abs() >= MIN_DIVISOR => {
                    Some(curr / prev - 1.0)
                }
                _ => None,
            }
        };
        returns.push(SeriesPoint::new(series[i].timestamp, value));
    }
    returns
}

/// Annualized rolling volatility of a returns series (std × √252).
pub fn rolling_volatility(returns: &[SeriesPoint], window: usize) -> Result<Vec<SeriesPoint>> {
    if window < 2 {
        return Err(PairError::Config(format!(
            "volatility window must be at least 2, got {}",
            window
        )));
    }
    if returns.len() < window {
        return Err(PairError::InsufficientData {
            required: window,
            actual: returns.len(),
        });
    }

    let mut points = Vec::with_capacity(returns.len());
    for i in 0..returns.len() {
        let value = if i + 1 < window {
            None
        } else {
            window_stats(&returns[i + 1 - window..=i]).map(|(_, std)| std * 252.0_f64.sqrt())
        };
        points.push(SeriesPoint::new(returns[i].timestamp, value));
    }
    Ok(points)
}
