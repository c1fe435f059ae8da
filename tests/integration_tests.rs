//! End-to-end tests of the pair analytics pipeline.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pairbench::backtest::run_backtest;
use pairbench::config::EngineConfig;
use pairbench::hedge::{estimate, EstimatorMethod, HedgeRatioEstimate};
use pairbench::report::write_trades_csv;
use pairbench::spread::{compute_spread, compute_zscore, correlation};
use pairbench::stationarity::adf_test;
use pairbench::types::{AlignedPair, PricePoint, PriceSeries, SeriesPoint};

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn series_from(values: &[f64]) -> PriceSeries {
    PriceSeries::new(
        values
            .iter()
            .enumerate()
            .map(|(i, &p)| PricePoint::new(start_time() + Duration::hours(i as i64), p))
            .collect(),
    )
    .unwrap()
}

/// Cointegrated pair: A = 2B + 1 + mean-reverting noise, with B following a
/// slow random walk around 50.
fn cointegrated_pair(n: usize, seed: u64) -> AlignedPair {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut b_values = Vec::with_capacity(n);
    let mut a_values = Vec::with_capacity(n);
    let mut level: f64 = 50.0;
    let mut noise = 0.0;
    for _ in 0..n {
        level += rng.gen_range(-0.2..0.2);
        level = level.max(10.0);
        noise = 0.7 * noise + rng.gen_range(-0.5..0.5);
        b_values.push(level);
        a_values.push(2.0 * level + 1.0 + noise);
    }
    AlignedPair::from_series(&series_from(&a_values), &series_from(&b_values))
}

#[test]
fn test_ols_recovers_known_relationship() {
    let pair = cointegrated_pair(500, 42);
    let config = EngineConfig::default();

    let estimate = estimate(&pair, EstimatorMethod::Ols, &config).unwrap();
    let fit = match estimate {
        HedgeRatioEstimate::Static(fit) => fit,
        _ => panic!("OLS estimate should be static"),
    };
    assert!((fit.ratio - 2.0).abs() < 0.1, "ratio = {}", fit.ratio);
    assert!(
        (fit.intercept - 1.0).abs() < 5.0,
        "intercept = {}",
        fit.intercept
    );
}

#[test]
fn test_all_methods_produce_usable_spreads() {
    let pair = cointegrated_pair(300, 9);
    let config = EngineConfig::default();

    for method in [
        EstimatorMethod::Ols,
        EstimatorMethod::Huber,
        EstimatorMethod::Tls,
        EstimatorMethod::Rolling,
        EstimatorMethod::Kalman,
    ] {
        let hedge = estimate(&pair, method, &config).unwrap();
        let spread = compute_spread(&pair, &hedge).unwrap();
        assert_eq!(spread.len(), pair.len(), "{} spread length", method);
        let defined = spread.iter().filter(|p| p.value.is_some()).count();
        assert!(
            defined >= pair.len() - config.window,
            "{} produced only {} defined spread points",
            method,
            defined
        );

        let zscore = compute_zscore(&spread, config.window).unwrap();
        assert_eq!(zscore.len(), spread.len());
        // Warmup region is always undefined.
        for point in &zscore[..config.window - 1] {
            assert!(point.value.is_none());
        }
    }
}

#[test]
fn test_kalman_tracks_constant_ratio() {
    let pair = cointegrated_pair(600, 21);
    let config = EngineConfig::default();

    let hedge = estimate(&pair, EstimatorMethod::Kalman, &config).unwrap();
    let ratios: Vec<f64> = match &hedge {
        HedgeRatioEstimate::TimeVarying(points) => {
            points.iter().map(|p| p.fit.unwrap().ratio).collect()
        }
        _ => panic!("Kalman estimate should be time-varying"),
    };

    // Convergence: the tail of the ratio sequence is tighter than the head
    // and centred on the true ratio.
    let head = &ratios[1..100];
    let tail = &ratios[500..];
    let var = |xs: &[f64]| {
        let mean = xs.iter().sum::<f64>() / xs.len() as f64;
        xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / xs.len() as f64
    };
    assert!(var(tail) < var(head));

    let tail_mean = tail.iter().sum::<f64>() / tail.len() as f64;
    assert!((tail_mean - 2.0).abs() < 0.1, "tail mean = {}", tail_mean);
}

#[test]
fn test_cointegrated_spread_is_stationary_but_prices_are_not() {
    let pair = cointegrated_pair(500, 3);
    let config = EngineConfig::default();

    let hedge = estimate(&pair, EstimatorMethod::Ols, &config).unwrap();
    let spread = compute_spread(&pair, &hedge).unwrap();

    let adf_spread = adf_test(&spread, config.adf_alpha).unwrap();
    assert!(
        adf_spread.is_stationary,
        "cointegration residual should be stationary (p={})",
        adf_spread.p_value
    );

    // A drifting random walk keeps its unit root.
    let mut rng = StdRng::seed_from_u64(99);
    let mut level = 100.0;
    let walk: Vec<SeriesPoint> = (0..500)
        .map(|i| {
            level += 0.05 + rng.gen_range(-0.3..0.3);
            SeriesPoint::new(start_time() + Duration::hours(i as i64), Some(level))
        })
        .collect();
    let adf_walk = adf_test(&walk, config.adf_alpha).unwrap();
    assert!(
        !adf_walk.is_stationary,
        "random walk should not be stationary (p={})",
        adf_walk.p_value
    );
}

#[test]
fn test_legs_are_highly_correlated() {
    let pair = cointegrated_pair(400, 17);
    let corr = correlation(&pair).unwrap();
    assert!(corr > 0.95, "correlation = {}", corr);
}

#[test]
fn test_full_pipeline_backtest_invariants() {
    let pair = cointegrated_pair(800, 5);
    let config = EngineConfig::default();

    let hedge = estimate(&pair, EstimatorMethod::Ols, &config).unwrap();
    let spread = compute_spread(&pair, &hedge).unwrap();
    let zscore = compute_zscore(&spread, config.window).unwrap();
    let report = run_backtest(&spread, &zscore, &config).unwrap();

    // Mean-reverting noise at entry 2.0 should trigger at least one trade
    // over 800 points.
    assert!(report.total_trades > 0);

    // No two trades overlap and every record is closed.
    for adjacent in report.trades.windows(2) {
        assert!(adjacent[0].exit_time.unwrap() <= adjacent[1].entry_time);
    }
    assert!(report.trades.iter().all(|t| t.is_closed()));

    // Entry/exit sides are consistent with the thresholds.
    for trade in &report.trades {
        match trade.direction {
            pairbench::types::Direction::Short => {
                assert!(trade.entry_zscore >= config.entry_threshold);
                if !trade.forced {
                    assert!(trade.exit_zscore.unwrap() <= config.exit_threshold);
                }
            }
            pairbench::types::Direction::Long => {
                assert!(trade.entry_zscore <= -config.entry_threshold);
                if !trade.forced {
                    assert!(trade.exit_zscore.unwrap() >= config.exit_threshold);
                }
            }
        }
    }

    // At most the last trade is forced.
    assert!(report.forced_closes <= 1);
    if report.forced_closes == 1 {
        assert!(report.trades.last().unwrap().forced);
    }

    // Accounting: totals add up and the equity curve ends at total P&L.
    let pnl_sum: f64 = report.trades.iter().filter_map(|t| t.pnl).sum();
    assert!((pnl_sum - report.total_pnl).abs() < 1e-9);
    assert!(
        (report.equity_curve.last().unwrap().value.unwrap() - report.total_pnl).abs() < 1e-9
    );

    // Position trace covers the full index.
    assert_eq!(report.positions.len(), zscore.len());

    // Determinism: a second run over the same inputs is identical.
    let again = run_backtest(&spread, &zscore, &config).unwrap();
    assert_eq!(report, again);
}

#[test]
fn test_csv_export_of_pipeline_trades() {
    let pair = cointegrated_pair(600, 13);
    let config = EngineConfig::default();

    let hedge = estimate(&pair, EstimatorMethod::Kalman, &config).unwrap();
    let spread = compute_spread(&pair, &hedge).unwrap();
    let zscore = compute_zscore(&spread, config.window).unwrap();
    let report = run_backtest(&spread, &zscore, &config).unwrap();

    let mut buffer = Vec::new();
    write_trades_csv(&report.trades, &mut buffer).unwrap();
    let text = String::from_utf8(buffer).unwrap();
    assert_eq!(text.lines().count(), report.total_trades + 1);
    assert!(text.starts_with("entry_time,exit_time,direction"));
}

#[test]
fn test_rolling_estimate_rejects_misaligned_spread_request() {
    let pair = cointegrated_pair(100, 1);
    let config = EngineConfig::default();
    let hedge = estimate(&pair, EstimatorMethod::Rolling, &config).unwrap();

    // Asking for a spread over a different (shorter) pair must fail.
    let truncated = AlignedPair {
        timestamps: pair.timestamps[..50].to_vec(),
        a: pair.a[..50].to_vec(),
        b: pair.b[..50].to_vec(),
    };
    assert!(compute_spread(&truncated, &hedge).is_err());
}

#[test]
fn test_repeated_estimation_is_idempotent() {
    let pair = cointegrated_pair(200, 33);
    let config = EngineConfig::default();

    // The Kalman filter holds no hidden state: identical inputs give
    // identical outputs on every call.
    let first = estimate(&pair, EstimatorMethod::Kalman, &config).unwrap();
    let second = estimate(&pair, EstimatorMethod::Kalman, &config).unwrap();
    assert_eq!(first, second);
}
