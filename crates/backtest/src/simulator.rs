//! Backtest simulator.
//!
//! Replays a series bar by bar through a strategy and accounts a single
//! long-only position sized at the initial capital. Equity is additive:
//! every percentage move is measured against the fixed initial capital, so
//! gains never compound across trades.
//!
//! Additive equity can be driven below zero by a collapsing position plus
//! fees. The first bar where that happens is the ruin bar: any open long is
//! liquidated there, later signals are ignored, and equity is reported as 0
//! from that bar on.

use bartest_core::config::BacktestConfig;
use bartest_core::{EquityPoint, Error, Result, Series, Signal, Trade, TimestampMs};
use bartest_features::compute;
use tracing::{debug, info, warn};

use crate::position::{Position, PositionTracker};
use crate::strategy::{BarContext, Strategy};

/// Everything a completed run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    /// One point per bar.
    pub equity_curve: Vec<EquityPoint>,
    /// Bar-over-bar equity change, aligned to `equity_curve`; element 0 is 0.
    pub returns: Vec<f64>,
    /// Closed round trips, in exit order.
    pub trades: Vec<Trade>,
    /// Position left open at the last bar (marked to market, not closed).
    pub final_position: Position,
    /// Fees paid during the run.
    pub total_fees: f64,
    /// Capital the run was sized at.
    pub initial_capital: f64,
    /// Bar at which equity was exhausted, if it was.
    pub ruined_at: Option<usize>,
}

impl BacktestResult {
    /// Equity values without timestamps.
    pub fn equity_values(&self) -> Vec<f64> {
        self.equity_curve.iter().map(|p| p.equity).collect()
    }

    /// Equity at the last bar.
    pub fn final_equity(&self) -> f64 {
        self.equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(self.initial_capital)
    }

    /// Returns paired with their bar timestamps.
    pub fn return_points(&self) -> Vec<(TimestampMs, f64)> {
        self.equity_curve
            .iter()
            .zip(&self.returns)
            .map(|(p, r)| (p.ts_ms, *r))
            .collect()
    }
}

/// Backtest simulator.
#[derive(Debug, Clone)]
pub struct BacktestSimulator {
    config: BacktestConfig,
}

impl BacktestSimulator {
    /// Create a simulator; capital and fee are validated here, once.
    pub fn new(config: BacktestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Run `strategy` over `series`.
    ///
    /// Fails without partial output on an empty series, a non-positive or
    /// non-finite close, or any strategy error.
    pub fn run<S: Strategy + ?Sized>(
        &self,
        series: &Series,
        strategy: &mut S,
    ) -> Result<BacktestResult> {
        validate_series(series)?;

        let capital = self.config.initial_capital;
        let verbose = self.config.verbose;
        let indicators = compute(series, &strategy.indicators())?;
        let mut tracker = PositionTracker::new(capital, self.config.fee);
        let mut equity_curve = Vec::with_capacity(series.len());
        let mut ruined_at = None;

        for (index, bar) in series.iter().enumerate() {
            let ctx = BarContext {
                index,
                bar,
                indicators: indicators.row(index),
            };
            strategy
                .process_bar(&ctx)
                .map_err(|e| contract_error(strategy.name(), index, e))?;
            let signal = strategy
                .get_signal()
                .map_err(|e| contract_error(strategy.name(), index, e))?;

            match signal {
                _ if ruined_at.is_some() => {}
                Signal::Buy => {
                    if tracker.open_long(index, bar) && verbose {
                        info!(ts_ms = bar.ts_ms, index, price = bar.close, "BUY");
                    }
                }
                Signal::Sell => {
                    if let Some(trade) = tracker.close_long(index, bar) {
                        if verbose {
                            info!(
                                ts_ms = bar.ts_ms,
                                index,
                                price = bar.close,
                                pnl = trade.pnl,
                                "SELL"
                            );
                        }
                    }
                }
                Signal::Hold => {}
            }

            let mut equity = tracker.equity(bar.close);
            if ruined_at.is_none() && equity <= 0.0 {
                let liquidated = tracker.liquidate(index, bar);
                warn!(
                    ts_ms = bar.ts_ms,
                    index,
                    equity,
                    liquidated = liquidated.is_some(),
                    "equity exhausted, trading stopped"
                );
                ruined_at = Some(index);
            }
            if ruined_at.is_some() {
                equity = 0.0;
            }

            equity_curve.push(EquityPoint {
                ts_ms: bar.ts_ms,
                equity,
            });
        }

        let equity: Vec<f64> = equity_curve.iter().map(|p| p.equity).collect();
        let returns = pct_change(&equity);
        let (final_position, trades, total_fees) = tracker.into_parts();

        debug!(
            strategy = strategy.name(),
            bars = series.len(),
            trades = trades.len(),
            final_equity = equity.last().copied().unwrap_or(capital),
            open_at_end = final_position.is_long(),
            ruined_at,
            "backtest complete"
        );

        Ok(BacktestResult {
            equity_curve,
            returns,
            trades,
            final_position,
            total_fees,
            initial_capital: capital,
            ruined_at,
        })
    }
}

/// Run a backtest with explicit capital, fee and verbosity.
pub fn run_backtest<S: Strategy + ?Sized>(
    series: &Series,
    strategy: &mut S,
    initial_capital: f64,
    fee: f64,
    verbose: bool,
) -> Result<BacktestResult> {
    let simulator = BacktestSimulator::new(BacktestConfig {
        initial_capital,
        fee,
        verbose,
    })?;
    simulator.run(series, strategy)
}

/// Bar-over-bar percentage change. Element 0, and any element whose previous
/// value is zero, is 0.
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }
    out.push(0.0);
    out.extend(values.windows(2).map(|w| {
        if w[0] == 0.0 {
            0.0
        } else {
            (w[1] - w[0]) / w[0]
        }
    }));
    out
}

fn validate_series(series: &Series) -> Result<()> {
    if series.is_empty() {
        return Err(Error::invalid_input("series is empty"));
    }
    if let Some((i, bar)) = series
        .iter()
        .enumerate()
        .find(|(_, b)| !(b.close.is_finite() && b.close > 0.0))
    {
        return Err(Error::invalid_input(format!(
            "close at bar {i} must be positive and finite, got {}",
            bar.close
        )));
    }
    Ok(())
}

fn contract_error(name: &str, index: usize, err: Error) -> Error {
    match err {
        Error::StrategyContractViolation(msg) => {
            Error::contract_violation(format!("{name} at bar {index}: {msg}"))
        }
        other => Error::contract_violation(format!("{name} at bar {index}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::SignalReplay;
    use bartest_core::HOUR_MS;
    use bartest_core::Signal::{Buy, Hold, Sell};

    fn series(closes: &[f64]) -> Series {
        Series::from_closes(0, HOUR_MS, closes).unwrap()
    }

    struct Failing;

    impl Strategy for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn process_bar(&mut self, ctx: &BarContext<'_>) -> Result<()> {
            if ctx.index == 2 {
                return Err(Error::invalid_input("boom"));
            }
            Ok(())
        }

        fn get_signal(&self) -> Result<Signal> {
            Ok(Hold)
        }
    }

    #[test]
    fn test_single_round_trip() {
        let s = series(&[100.0, 102.0, 101.0, 105.0, 103.0]);
        let mut strategy = SignalReplay::new(vec![Buy, Hold, Hold, Sell, Hold]);
        let result = run_backtest(&s, &mut strategy, 10_000.0, 0.001, false).unwrap();

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.entry_price, 100.0);
        assert_eq!(trade.exit_price, 105.0);
        assert!((trade.pnl - 500.0).abs() < 1e-9);
        assert!((trade.fee_paid - 20.0).abs() < 1e-9);

        let equity = result.equity_values();
        let expected = [9_990.0, 10_190.0, 10_090.0, 10_480.0, 10_480.0];
        for (got, want) in equity.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }
        assert_eq!(result.final_position, Position::Flat);
        assert!((result.total_fees - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_series_rejected() {
        let s = Series::default();
        let mut strategy = SignalReplay::new(vec![]);
        let err = run_backtest(&s, &mut strategy, 10_000.0, 0.0, false).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_bad_config_rejected() {
        let s = series(&[1.0, 2.0]);
        let mut strategy = SignalReplay::new(vec![]);
        assert!(run_backtest(&s, &mut strategy, 0.0, 0.0, false).is_err());
        assert!(run_backtest(&s, &mut strategy, 100.0, -0.1, false).is_err());
    }

    #[test]
    fn test_non_positive_close_rejected() {
        let s = series(&[1.0, 0.0, 2.0]);
        let mut strategy = SignalReplay::new(vec![]);
        let err = run_backtest(&s, &mut strategy, 100.0, 0.0, false).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_strategy_error_aborts() {
        let s = series(&[1.0, 2.0, 3.0, 4.0]);
        let err = run_backtest(&s, &mut Failing, 100.0, 0.0, false).unwrap_err();
        assert!(err.is_contract_violation());
        assert!(err.to_string().contains("failing at bar 2"));
    }

    #[test]
    fn test_open_position_marked_not_closed() {
        let s = series(&[100.0, 110.0, 120.0]);
        let mut strategy = SignalReplay::new(vec![Hold, Buy, Hold]);
        let result = run_backtest(&s, &mut strategy, 1_000.0, 0.0, false).unwrap();

        assert!(result.trades.is_empty());
        assert_eq!(result.final_position.entry_index(), Some(1));
        let expected = 1_000.0 + (120.0 - 110.0) / 110.0 * 1_000.0;
        assert!((result.final_equity() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_collapse_floors_equity_at_zero() {
        let s = series(&[1_000.0, 1.0, 0.5, 2.0]);
        let mut strategy = SignalReplay::new(vec![Buy, Hold, Buy, Sell]);
        let result = run_backtest(&s, &mut strategy, 1_000.0, 0.05, false).unwrap();

        // 1000 - 999 - 50 < 0 at bar 1: liquidated, then frozen at zero
        assert_eq!(result.ruined_at, Some(1));
        assert_eq!(result.equity_values(), vec![950.0, 0.0, 0.0, 0.0]);
        assert_eq!(result.returns[1], -1.0);
        assert_eq!(result.returns[2], 0.0);
        assert_eq!(result.returns[3], 0.0);

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].exit_index, 1);
        assert!((result.trades[0].pnl + 999.0).abs() < 1e-9);
        assert_eq!(result.final_position, Position::Flat);
    }

    #[test]
    fn test_solvent_run_is_not_ruined() {
        let s = series(&[100.0, 50.0, 60.0]);
        let mut strategy = SignalReplay::new(vec![Buy, Hold, Sell]);
        let result = run_backtest(&s, &mut strategy, 1_000.0, 0.001, false).unwrap();
        assert_eq!(result.ruined_at, None);
        assert!((result.final_equity() - (1_000.0 - 400.0 - 2.0)).abs() < 1e-9);
    }

    #[test]
    fn test_returns_aligned() {
        let s = series(&[100.0, 110.0, 99.0]);
        let mut strategy = SignalReplay::new(vec![Buy]);
        let result = run_backtest(&s, &mut strategy, 100.0, 0.0, false).unwrap();

        assert_eq!(result.returns.len(), 3);
        assert_eq!(result.returns[0], 0.0);
        assert!((result.returns[1] - 0.1).abs() < 1e-12);
        let points = result.return_points();
        assert_eq!(points[2].0, 2 * HOUR_MS);
    }

    #[test]
    fn test_verbose_does_not_change_results() {
        let s = series(&[100.0, 101.0, 99.0, 104.0]);
        let signals = vec![Buy, Sell, Buy, Sell];
        let quiet = run_backtest(&s, &mut SignalReplay::new(signals.clone()), 500.0, 0.01, false);
        let loud = run_backtest(&s, &mut SignalReplay::new(signals), 500.0, 0.01, true);
        assert_eq!(quiet.unwrap(), loud.unwrap());
    }

    #[test]
    fn test_pct_change() {
        assert!(pct_change(&[]).is_empty());
        assert_eq!(pct_change(&[5.0]), vec![0.0]);
        assert_eq!(pct_change(&[0.0, 5.0]), vec![0.0, 0.0]);
        assert_eq!(pct_change(&[2.0, 3.0]), vec![0.0, 0.5]);
    }
}
