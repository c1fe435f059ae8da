//! Core data types for pair analytics and backtesting.

use crate::error::{PairError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single (timestamp, price) observation for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, price: f64) -> Self {
        Self { timestamp, price }
    }
}

/// Ordered price series for one symbol.
///
/// Timestamps are strictly increasing with no duplicates; gaps are allowed.
/// The constructor validates ordering so downstream code can rely on it.
/// The engine only ever reads a series, it never mutates one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Create a series from ordered points.
    ///
    /// Fails with an alignment error if timestamps are not strictly
    /// increasing (duplicates included).
    pub fn new(points: Vec<PricePoint>) -> Result<Self> {
        for (i, pair) in points.windows(2).enumerate() {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(PairError::Alignment(format!(
                    "timestamps must be strictly increasing (violation at index {})",
                    i + 1
                )));
            }
        }
        Ok(Self { points })
    }

    /// Build a series from parallel timestamp and price slices.
    pub fn from_parts(timestamps: &[DateTime<Utc>], prices: &[f64]) -> Result<Self> {
        if timestamps.len() != prices.len() {
            return Err(PairError::Alignment(format!(
                "timestamp/price length mismatch: {} vs {}",
                timestamps.len(),
                prices.len()
            )));
        }
        Self::new(
            timestamps
                .iter()
                .zip(prices.iter())
                .map(|(&t, &p)| PricePoint::new(t, p))
                .collect(),
        )
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Two price series inner-joined on a common timestamp index.
///
/// Invariant: `timestamps`, `a` and `b` always have equal length, with
/// matching timestamps at every index. Rows where either side is missing are
/// dropped during construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedPair {
    pub timestamps: Vec<DateTime<Utc>>,
    pub a: Vec<f64>,
    pub b: Vec<f64>,
}

impl AlignedPair {
    /// Inner-join two price series on their timestamps.
    ///
    /// Both inputs are already sorted, so a single merge pass suffices.
    pub fn from_series(series_a: &PriceSeries, series_b: &PriceSeries) -> Self {
        let pa = series_a.points();
        let pb = series_b.points();
        let mut timestamps = Vec::new();
        let mut a = Vec::new();
        let mut b = Vec::new();

        let (mut i, mut j) = (0, 0);
        while i < pa.len() && j < pb.len() {
            match pa[i].timestamp.cmp(&pb[j].timestamp) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    timestamps.push(pa[i].timestamp);
                    a.push(pa[i].price);
                    b.push(pb[j].price);
                    i += 1;
                    j += 1;
                }
            }
        }

        Self { timestamps, a, b }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// A timestamped value that may be undefined.
///
/// Undefined points arise from insufficient rolling history or from
/// degenerate inputs (zero-variance windows, near-zero divisors). They are
/// carried through the pipeline as `None` rather than NaN so that consumers
/// cannot mistake them for real values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
}

impl SeriesPoint {
    pub fn new(timestamp: DateTime<Utc>, value: Option<f64>) -> Self {
        Self { timestamp, value }
    }
}

/// Spread series: priceA − ratio × priceB − intercept per timestamp.
pub type SpreadSeries = Vec<SeriesPoint>;

/// Rolling z-score of a spread series.
pub type ZScoreSeries = Vec<SeriesPoint>;

/// Trade direction in spread terms.
///
/// Long spread: long A, short ratio × B. Short spread is the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Position state of the backtest state machine. At most one open position
/// exists at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PositionState {
    #[default]
    Flat,
    LongSpread,
    ShortSpread,
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionState::Flat => write!(f, "FLAT"),
            PositionState::LongSpread => write!(f, "LONG_SPREAD"),
            PositionState::ShortSpread => write!(f, "SHORT_SPREAD"),
        }
    }
}

/// A single round-trip trade on the spread.
///
/// Entry fields are populated when the position opens; exit fields and `pnl`
/// when it closes. A record is immutable once closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub direction: Direction,
    pub entry_time: DateTime<Utc>,
    pub entry_zscore: f64,
    pub entry_spread: f64,
    pub exit_time: Option<DateTime<Utc>>,
    /// Undefined when the position was force-closed at a point with no
    /// defined z-score.
    pub exit_zscore: Option<f64>,
    pub exit_spread: Option<f64>,
    pub pnl: Option<f64>,
    /// True when the position was force-closed at the end of the series
    /// (mark-to-market rather than a signal-driven exit).
    pub forced: bool,
}

impl TradeRecord {
    /// Open a new trade.
    pub fn open(
        direction: Direction,
        entry_time: DateTime<Utc>,
        entry_zscore: f64,
        entry_spread: f64,
    ) -> Self {
        Self {
            direction,
            entry_time,
            entry_zscore,
            entry_spread,
            exit_time: None,
            exit_zscore: None,
            exit_spread: None,
            pnl: None,
            forced: false,
        }
    }

    /// Close the trade and compute its P&L.
    ///
    /// Long spread: pnl = −(exit − entry) × size; short spread:
    /// pnl = +(exit − entry) × size. The sign convention matches the
    /// reference mean-reversion simulator exactly.
    pub fn close(
        &mut self,
        exit_time: DateTime<Utc>,
        exit_zscore: Option<f64>,
        exit_spread: f64,
        position_size: f64,
        forced: bool,
    ) {
        let signed = match self.direction {
            Direction::Long => -1.0,
            Direction::Short => 1.0,
        };
        self.exit_time = Some(exit_time);
        self.exit_zscore = exit_zscore;
        self.exit_spread = Some(exit_spread);
        self.pnl = Some(signed * (exit_spread - self.entry_spread) * position_size);
        self.forced = forced;
    }

    pub fn is_closed(&self) -> bool {
        self.pnl.is_some()
    }

    pub fn is_win(&self) -> bool {
        self.pnl.map(|p| p > 0.0).unwrap_or(false)
    }
}
