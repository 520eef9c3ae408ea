//! The strategy contract.
//!
//! The simulator calls `process_bar` exactly once per bar, in timestamp
//! order, then `get_signal` for that same bar. A strategy only ever sees the
//! current bar and the indicator values at that bar.

use bartest_core::{Bar, Result, Signal};
use bartest_features::{IndicatorRow, IndicatorSpec};

/// Everything a strategy may look at for one bar.
#[derive(Debug, Clone, Copy)]
pub struct BarContext<'a> {
    /// Bar position within the series being simulated.
    pub index: usize,
    /// The bar itself.
    pub bar: &'a Bar,
    /// Precomputed indicators at this bar.
    pub indicators: IndicatorRow<'a>,
}

/// A pluggable trading policy.
///
/// Errors returned from either method abort the run; the simulator reports
/// them as strategy contract violations.
pub trait Strategy {
    /// Display name for reporting.
    fn name(&self) -> &str;

    /// Author for reporting.
    fn author(&self) -> &str {
        "unknown"
    }

    /// Indicators to precompute before the run.
    fn indicators(&self) -> IndicatorSpec {
        IndicatorSpec::new()
    }

    /// Update internal state with the next bar.
    fn process_bar(&mut self, ctx: &BarContext<'_>) -> Result<()>;

    /// Decision for the bar most recently processed.
    fn get_signal(&self) -> Result<Signal>;
}

impl<S: Strategy + ?Sized> Strategy for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn author(&self) -> &str {
        (**self).author()
    }

    fn indicators(&self) -> IndicatorSpec {
        (**self).indicators()
    }

    fn process_bar(&mut self, ctx: &BarContext<'_>) -> Result<()> {
        (**self).process_bar(ctx)
    }

    fn get_signal(&self) -> Result<Signal> {
        (**self).get_signal()
    }
}

/// Replays a fixed signal sequence, one per bar; holds once exhausted.
#[derive(Debug, Clone)]
pub struct SignalReplay {
    signals: Vec<Signal>,
    cursor: Option<usize>,
}

impl SignalReplay {
    pub fn new(signals: Vec<Signal>) -> Self {
        Self {
            signals,
            cursor: None,
        }
    }
}

impl Strategy for SignalReplay {
    fn name(&self) -> &str {
        "signal_replay"
    }

    fn process_bar(&mut self, ctx: &BarContext<'_>) -> Result<()> {
        self.cursor = Some(ctx.index);
        Ok(())
    }

    fn get_signal(&self) -> Result<Signal> {
        Ok(self
            .cursor
            .and_then(|i| self.signals.get(i).copied())
            .unwrap_or(Signal::Hold))
    }
}
