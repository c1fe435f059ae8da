//! Pairbench - pair-trading analytics and backtesting.
//!
//! # Overview
//!
//! Pairbench estimates the time-varying relationship between two correlated
//! price series and evaluates a statistical-arbitrage signal built on it:
//!
//! - **Hedge ratio estimation**: OLS, Huber robust regression, total least
//!   squares, rolling OLS and a recursive Kalman filter
//! - **Spread analytics**: spread construction, rolling z-scores, static and
//!   rolling correlation
//! - **Stationarity testing**: Augmented Dickey-Fuller with automatic lag
//!   selection and MacKinnon p-values
//! - **Mean-reversion backtesting**: threshold state machine producing a
//!   trade ledger, position trace and equity curve
//!
//! The engine is a pure computation core: it reads already-materialized
//! price series, performs no market I/O, and returns plain tabular results.
//! Ingestion, OHLC resampling, storage and presentation are external
//! collaborators.
//!
//! # Quick Start
//!
//! ```
//! use chrono::{Duration, TimeZone, Utc};
//! use pairbench::backtest::run_backtest;
//! use pairbench::config::EngineConfig;
//! use pairbench::hedge::{estimate, EstimatorMethod};
//! use pairbench::spread::{compute_spread, compute_zscore};
//! use pairbench::stationarity::adf_test;
//! use pairbench::types::{AlignedPair, PricePoint, PriceSeries};
//!
//! // Two synthetic cointegrated series: A ≈ 2B + 1.
//! let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let points = |f: &dyn Fn(usize) -> f64| -> PriceSeries {
//!     PriceSeries::new(
//!         (0..120)
//!             .map(|i| PricePoint::new(start + Duration::days(i as i64), f(i)))
//!             .collect(),
//!     )
//!     .unwrap()
//! };
//! let series_b = points(&|i| 50.0 + (i as f64 * 0.3).sin() * 4.0);
//! let series_a = points(&|i| {
//!     2.0 * (50.0 + (i as f64 * 0.3).sin() * 4.0) + 1.0 + (i as f64 * 1.7).cos()
//! });
//!
//! let config = EngineConfig::default();
//! let pair = AlignedPair::from_series(&series_a, &series_b);
//!
//! let hedge = estimate(&pair, EstimatorMethod::Ols, &config).unwrap();
//! let spread = compute_spread(&pair, &hedge).unwrap();
//! let zscore = compute_zscore(&spread, config.window).unwrap();
//!
//! // Diagnostic gate: the spread should be mean-reverting.
//! let adf = adf_test(&spread, config.adf_alpha).unwrap();
//! assert!(adf.is_stationary);
//!
//! let report = run_backtest(&spread, &zscore, &config).unwrap();
//! println!("trades: {}, pnl: {:.4}", report.total_trades, report.total_pnl);
//! ```
//!
//! # Modules
//!
//! - [`types`]: Core data types (PriceSeries, AlignedPair, TradeRecord)
//! - [`config`]: Explicit configuration value object with TOML loading
//! - [`hedge`]: Hedge ratio estimators and the Kalman filter
//! - [`spread`]: Spread, z-score and correlation analytics
//! - [`stationarity`]: ADF stationarity testing
//! - [`backtest`]: Mean-reversion backtest state machine
//! - [`report`]: Terminal reporting and CSV/JSON export

pub mod backtest;
pub mod config;
pub mod error;
pub mod hedge;
pub mod report;
pub mod spread;
pub mod stationarity;
pub mod types;

// Re-exports for convenience
pub use backtest::{run_backtest, run_many, sharpe_ratio, BacktestReport, PositionPoint};
pub use config::{EngineConfig, KalmanSettings};
pub use error::{PairError, Result};
pub use hedge::{
    estimate, huber_fit, kalman_fit, kalman_fit_with_state, kalman_step, ols_fit, rolling_ols,
    tls_fit, EstimatorMethod, HedgePoint, HedgeRatioEstimate, KalmanState, PointFit, StaticFit,
};
pub use report::{export_trades_csv, write_trades_csv, ResultFormatter};
pub use spread::{
    compute_spread, compute_zscore, correlation, pct_returns, rolling_correlation,
    rolling_volatility,
};
pub use stationarity::{adf_test, AdfResult};
pub use types::{
    AlignedPair, Direction, PositionState, PricePoint, PriceSeries, SeriesPoint, SpreadSeries,
    TradeRecord, ZScoreSeries,
};
