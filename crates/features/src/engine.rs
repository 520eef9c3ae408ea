//! Indicator precomputation engine.
//!
//! Runs every requested indicator over the full close series once and joins
//! the results into a read-only set aligned to bar positions.

use std::collections::BTreeMap;

use bartest_core::{Error, Result, Series};
use tracing::debug;

use crate::bollinger::bollinger;
use crate::momentum::{momentum, roc};
use crate::moving_average::{ema, sma};
use crate::rsi::rsi;
use crate::spec::{IndicatorRequest, IndicatorSpec};
use crate::volatility::rolling_volatility;

/// Precomputed indicator series, keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSet {
    len: usize,
    series: BTreeMap<String, Vec<f64>>,
}

impl IndicatorSet {
    /// Empty set for a series of `len` bars.
    pub fn empty(len: usize) -> Self {
        Self {
            len,
            series: BTreeMap::new(),
        }
    }

    /// Insert a named series. Its length must match the bar count.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.len {
            return Err(Error::invalid_input(format!(
                "indicator {name} has {} values for {} bars",
                values.len(),
                self.len
            )));
        }
        self.series.insert(name, values);
        Ok(())
    }

    /// Value of a named indicator at a bar position.
    pub fn get(&self, name: &str, index: usize) -> Option<f64> {
        self.series.get(name).and_then(|v| v.get(index).copied())
    }

    /// Full series for a named indicator.
    pub fn get_series(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(Vec::as_slice)
    }

    /// Indicator names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Number of bars every series is aligned to.
    pub fn bar_count(&self) -> usize {
        self.len
    }

    /// Number of indicator series.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// View restricted to a single bar.
    pub fn row(&self, index: usize) -> IndicatorRow<'_> {
        IndicatorRow { set: self, index }
    }

    /// Consume into the underlying map.
    pub fn into_map(self) -> BTreeMap<String, Vec<f64>> {
        self.series
    }
}

/// Indicator values at one bar. Nothing after that bar is reachable.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorRow<'a> {
    set: &'a IndicatorSet,
    index: usize,
}

impl<'a> IndicatorRow<'a> {
    /// Bar position of this row.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Raw value (may be NaN during warm-up).
    pub fn get(&self, name: &str) -> Option<f64> {
        self.set.get(name, self.index)
    }

    /// Value only when defined.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).filter(|v| !v.is_nan())
    }
}

/// Compute every indicator in `spec` over `series`.
///
/// Deterministic: the same series and spec always yield the same set.
pub fn compute(series: &Series, spec: &IndicatorSpec) -> Result<IndicatorSet> {
    spec.validate()?;

    let closes = series.closes();
    let mut set = IndicatorSet::empty(closes.len());

    for request in spec.requests() {
        let mut names = request.output_names().into_iter();
        let mut next_name = || {
            names
                .next()
                .ok_or_else(|| Error::invalid_input("indicator produced an unnamed series"))
        };

        match *request {
            IndicatorRequest::Sma { window } => set.insert(next_name()?, sma(&closes, window))?,
            IndicatorRequest::Ema { window } => set.insert(next_name()?, ema(&closes, window))?,
            IndicatorRequest::Rsi { window } => set.insert(next_name()?, rsi(&closes, window))?,
            IndicatorRequest::Bollinger { window, num_std } => {
                let bands = bollinger(&closes, window, num_std);
                set.insert(next_name()?, bands.upper)?;
                set.insert(next_name()?, bands.middle)?;
                set.insert(next_name()?, bands.lower)?;
            }
            IndicatorRequest::Momentum { window } => {
                set.insert(next_name()?, momentum(&closes, window))?
            }
            IndicatorRequest::Roc { window } => set.insert(next_name()?, roc(&closes, window))?,
            IndicatorRequest::Volatility { window } => {
                set.insert(next_name()?, rolling_volatility(&closes, window))?
            }
        }
    }

    debug!(bars = closes.len(), indicators = set.len(), "precomputed indicators");
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bartest_core::HOUR_MS;

    fn series(closes: &[f64]) -> Series {
        Series::from_closes(0, HOUR_MS, closes).unwrap()
    }

    #[test]
    fn test_compute_all_kinds() {
        let s = series(&[100.0, 101.0, 99.0, 102.0, 104.0, 103.0, 105.0]);
        let spec = IndicatorSpec::new()
            .sma(3)
            .ema(3)
            .rsi(3)
            .bollinger(3, 2.0)
            .momentum(2)
            .roc(2)
            .volatility(3);
        let set = compute(&s, &spec).unwrap();

        assert_eq!(set.len(), 9);
        assert_eq!(set.bar_count(), 7);
        for name in set.names() {
            assert_eq!(set.get_series(name).unwrap().len(), 7);
        }
        assert!((set.get("sma_3", 2).unwrap() - 100.0).abs() < 1e-12);
        assert!(set.get("sma_3", 1).unwrap().is_nan());
        assert!(set.get("bb_upper_3_2", 6).unwrap() > set.get("bb_lower_3_2", 6).unwrap());
    }

    #[test]
    fn test_window_exceeds_history() {
        let s = series(&[1.0, 2.0]);
        let set = compute(&s, &IndicatorSpec::new().sma(20)).unwrap();
        assert!(set.get_series("sma_20").unwrap().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_deterministic() {
        let s = series(&[5.0, 6.0, 4.0, 7.0, 8.0, 3.0]);
        let spec = IndicatorSpec::new().ema(2).rsi(2);
        assert_eq!(compute(&s, &spec).unwrap(), compute(&s, &spec).unwrap());
    }

    #[test]
    fn test_invalid_window() {
        let s = series(&[1.0, 2.0, 3.0]);
        assert!(compute(&s, &IndicatorSpec::new().rsi(0)).is_err());
    }

    #[test]
    fn test_row_view() {
        let s = series(&[1.0, 2.0, 3.0]);
        let set = compute(&s, &IndicatorSpec::new().sma(2)).unwrap();
        let row = set.row(0);
        assert!(row.get("sma_2").unwrap().is_nan());
        assert_eq!(row.value("sma_2"), None);
        assert_eq!(set.row(2).value("sma_2"), Some(2.5));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_insert_length_mismatch() {
        let mut set = IndicatorSet::empty(3);
        assert!(set.insert("x", vec![1.0]).is_err());
        assert!(set.insert("x", vec![1.0, 2.0, 3.0]).is_ok());
    }
}
