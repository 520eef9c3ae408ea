//! Core data types for the bartest engine.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics};

use crate::error::{Error, Result};

/// Timestamp in milliseconds since Unix epoch (UTC).
pub type TimestampMs = i64;

/// One hour in milliseconds.
pub const HOUR_MS: i64 = 60 * 60 * 1000;

/// One day in milliseconds.
pub const DAY_MS: i64 = 24 * HOUR_MS;

/// Mean calendar year (365.25 days) in milliseconds.
pub const YEAR_MS: f64 = 365.25 * DAY_MS as f64;

/// Convert a millisecond timestamp to a UTC datetime, if representable.
#[inline]
pub fn ts_to_datetime(ts_ms: TimestampMs) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ts_ms)
}

/// One OHLCV observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar timestamp (ms).
    pub ts_ms: TimestampMs,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Total volume.
    pub volume: f64,
}

impl Bar {
    /// Bar timestamp as a UTC datetime.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        ts_to_datetime(self.ts_ms)
    }
}

/// An ordered sequence of bars with strictly increasing timestamps.
///
/// The ordering invariant is checked on construction (including
/// deserialization), so every `Series` in hand is safe to index by position
/// or to search by timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Bar>", into = "Vec<Bar>")]
pub struct Series {
    bars: Vec<Bar>,
}

impl Series {
    /// Build a series, rejecting unordered or duplicate timestamps.
    pub fn new(bars: Vec<Bar>) -> Result<Self> {
        if let Some(i) = bars.windows(2).position(|w| w[1].ts_ms <= w[0].ts_ms) {
            return Err(Error::invalid_input(format!(
                "timestamps must be strictly increasing: bar {} ({}) follows {}",
                i + 1,
                bars[i + 1].ts_ms,
                bars[i].ts_ms
            )));
        }
        Ok(Self { bars })
    }

    /// Build a synthetic series from close prices at a fixed spacing.
    ///
    /// open = previous close, high/low bracket open and close, volume = 1.
    pub fn from_closes(start_ms: TimestampMs, step_ms: i64, closes: &[f64]) -> Result<Self> {
        if step_ms <= 0 {
            return Err(Error::invalid_input("bar spacing must be positive"));
        }
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let open = if i == 0 { close } else { closes[i - 1] };
                Bar {
                    ts_ms: start_ms + i as i64 * step_ms,
                    open,
                    high: open.max(close),
                    low: open.min(close),
                    close,
                    volume: 1.0,
                }
            })
            .collect();
        Self::new(bars)
    }

    /// Number of bars.
    #[inline]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Whether the series holds no bars.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// All bars, in timestamp order.
    #[inline]
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// Bar at a position.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    /// First bar.
    pub fn first(&self) -> Option<&Bar> {
        self.bars.first()
    }

    /// Last bar.
    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Iterate over bars.
    pub fn iter(&self) -> std::slice::Iter<'_, Bar> {
        self.bars.iter()
    }

    /// Close prices, aligned to bar positions.
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Timestamps, aligned to bar positions.
    pub fn timestamps(&self) -> Vec<TimestampMs> {
        self.bars.iter().map(|b| b.ts_ms).collect()
    }

    /// Position of the bar with exactly this timestamp.
    pub fn position_of(&self, ts_ms: TimestampMs) -> Option<usize> {
        self.bars.binary_search_by_key(&ts_ms, |b| b.ts_ms).ok()
    }

    /// Positions of the bars falling inside a time range.
    pub fn index_range(&self, range: &TimeRange) -> Range<usize> {
        let start = self.bars.partition_point(|b| b.ts_ms < range.start_ms);
        let end = self.bars.partition_point(|b| b.ts_ms < range.end_ms);
        start..end.max(start)
    }

    /// Copy of the bars in a position range (clamped to the series).
    pub fn slice(&self, range: Range<usize>) -> Series {
        let end = range.end.min(self.bars.len());
        let start = range.start.min(end);
        Series {
            bars: self.bars[start..end].to_vec(),
        }
    }

    /// Copy of the bars falling inside a time range.
    pub fn slice_time(&self, range: &TimeRange) -> Series {
        self.slice(self.index_range(range))
    }

    /// Median spacing between consecutive bars, in milliseconds.
    pub fn median_spacing_ms(&self) -> Option<i64> {
        median_spacing_ms(&self.timestamps())
    }
}

impl TryFrom<Vec<Bar>> for Series {
    type Error = Error;

    fn try_from(bars: Vec<Bar>) -> Result<Self> {
        Series::new(bars)
    }
}

impl From<Series> for Vec<Bar> {
    fn from(series: Series) -> Self {
        series.bars
    }
}

impl<'a> IntoIterator for &'a Series {
    type Item = &'a Bar;
    type IntoIter = std::slice::Iter<'a, Bar>;

    fn into_iter(self) -> Self::IntoIter {
        self.bars.iter()
    }
}

/// Median spacing of an ordered timestamp sequence, rounded to the nearest
/// millisecond (an even gap count averages the two middle gaps).
pub fn median_spacing_ms(timestamps: &[TimestampMs]) -> Option<i64> {
    if timestamps.len() < 2 {
        return None;
    }
    let gaps: Vec<f64> = timestamps.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    let mut data = Data::new(gaps);
    Some(OrderStatistics::median(&mut data).round() as i64)
}

/// Per-bar trading decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    /// Open a long if flat.
    Buy,
    /// Close the long if long.
    Sell,
    /// Do nothing.
    Hold,
}

impl Signal {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Signal::Buy => "buy",
            Signal::Sell => "sell",
            Signal::Hold => "hold",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Signal::Buy),
            "sell" => Ok(Signal::Sell),
            "hold" => Ok(Signal::Hold),
            other => Err(Error::contract_violation(format!(
                "signal must be one of buy/sell/hold, got {other:?}"
            ))),
        }
    }
}

/// Position status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Flat,
    Long,
}

/// A completed round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Bar position of the entry.
    pub entry_index: usize,
    /// Bar position of the exit (always after the entry).
    pub exit_index: usize,
    /// Entry timestamp.
    pub entry_ts: TimestampMs,
    /// Exit timestamp.
    pub exit_ts: TimestampMs,
    /// Entry price (close of the entry bar).
    pub entry_price: f64,
    /// Exit price (close of the exit bar).
    pub exit_price: f64,
    /// Fees paid on both sides.
    pub fee_paid: f64,
    /// Gross P&L against initial capital (before fees).
    pub pnl: f64,
}

impl Trade {
    /// P&L after both fees.
    #[inline]
    pub fn net_pnl(&self) -> f64 {
        self.pnl - self.fee_paid
    }

    /// Price return of the round trip.
    #[inline]
    pub fn return_pct(&self) -> f64 {
        (self.exit_price - self.entry_price) / self.entry_price
    }

    /// Whether gross P&L is positive.
    #[inline]
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }

    /// Number of bars the position was held.
    #[inline]
    pub fn holding_bars(&self) -> usize {
        self.exit_index - self.entry_index
    }
}

/// Account value at a bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub ts_ms: TimestampMs,
    pub equity: f64,
}

/// Half-open time range `[start_ms, end_ms)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_ms: TimestampMs,
    pub end_ms: TimestampMs,
}

impl TimeRange {
    /// Create a range.
    pub fn new(start_ms: TimestampMs, end_ms: TimestampMs) -> Self {
        Self { start_ms, end_ms }
    }

    /// Whether the range contains a timestamp.
    #[inline]
    pub fn contains(&self, ts_ms: TimestampMs) -> bool {
        ts_ms >= self.start_ms && ts_ms < self.end_ms
    }

    /// Whether two ranges share any instant.
    #[inline]
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start_ms < other.end_ms && other.start_ms < self.end_ms
    }

    /// Whether the range is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end_ms <= self.start_ms
    }

    /// Length in milliseconds.
    #[inline]
    pub fn duration_ms(&self) -> i64 {
        (self.end_ms - self.start_ms).max(0)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (ts_to_datetime(self.start_ms), ts_to_datetime(self.end_ms)) {
            (Some(s), Some(e)) => write!(f, "[{}, {})", s.to_rfc3339(), e.to_rfc3339()),
            _ => write!(f, "[{}, {})", self.start_ms, self.end_ms),
        }
    }
}

/// One walk-forward fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    /// Position of the fold in time order.
    pub index: usize,
    /// Range a strategy may fit on.
    pub train: TimeRange,
    /// Range that is scored.
    pub test: TimeRange,
}
