//! Vectorized moving-average crossover backtest.
//!
//! Long while the fast SMA was above the slow SMA on the previous bar, flat
//! otherwise. Unlike the event-driven simulator this one compounds: equity is
//! `initial_capital * prod(1 + r)`, and each position change costs `fee` as a
//! fraction of current equity. Equity is floored at zero and stays there once
//! reached. Useful as a fast cross-check and for sweeps.

use bartest_core::config::BacktestConfig;
use bartest_core::{EquityPoint, Error, Result, Series};
use bartest_features::moving_average::sma;

use crate::metrics::{BacktestMetrics, MetricsCalculator};
use crate::simulator::pct_change;

/// Output of a vectorized run.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorResult {
    pub equity_curve: Vec<EquityPoint>,
    pub returns: Vec<f64>,
    /// 1.0 while long, 0.0 while flat, per bar.
    pub positions: Vec<f64>,
    /// Position changes divided by two.
    pub num_trades: usize,
    /// Metrics; the trade log is empty so trade statistics are zero.
    pub metrics: BacktestMetrics,
}

/// Run the crossover over the whole series.
pub fn sma_crossover(
    series: &Series,
    fast: usize,
    slow: usize,
    config: &BacktestConfig,
    metrics: &MetricsCalculator,
) -> Result<VectorResult> {
    config.validate()?;
    if series.is_empty() {
        return Err(Error::invalid_input("series is empty"));
    }
    if fast == 0 || slow == 0 {
        return Err(Error::invalid_input("SMA windows must be positive"));
    }

    let closes = series.closes();
    let fast_ma = sma(&closes, fast);
    let slow_ma = sma(&closes, slow);
    let n = closes.len();

    // Yesterday's signal is today's position; NaN comparisons are false
    let mut positions = vec![0.0; n];
    for i in 1..n {
        positions[i] = if fast_ma[i - 1] > slow_ma[i - 1] { 1.0 } else { 0.0 };
    }

    let bar_returns = pct_change(&closes);
    let mut changes = 0usize;
    let mut equity = config.initial_capital;
    let mut equity_curve = Vec::with_capacity(n);
    for (i, bar) in series.iter().enumerate() {
        let mut r = positions[i] * bar_returns[i];
        if i > 0 && positions[i] != positions[i - 1] {
            r -= config.fee;
            changes += 1;
        }
        equity = (equity * (1.0 + r)).max(0.0);
        equity_curve.push(EquityPoint {
            ts_ms: bar.ts_ms,
            equity,
        });
    }

    let values: Vec<f64> = equity_curve.iter().map(|p| p.equity).collect();
    let returns = pct_change(&values);
    let mut metrics = metrics.calculate(&equity_curve, &returns, &[]);
    metrics.num_trades = changes / 2;

    Ok(VectorResult {
        equity_curve,
        returns,
        positions,
        num_trades: changes / 2,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use bartest_core::HOUR_MS;

    fn run(closes: &[f64], fast: usize, slow: usize, fee: f64) -> VectorResult {
        let series = Series::from_closes(0, HOUR_MS, closes).unwrap();
        sma_crossover(
            &series,
            fast,
            slow,
            &BacktestConfig::new(10_000.0, fee),
            &MetricsCalculator::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_position_is_shifted() {
        let result = run(&[1.0, 2.0, 3.0, 4.0, 5.0], 1, 2, 0.0);
        // fast > slow from bar 1, so long from bar 2
        assert_eq!(result.positions, vec![0.0, 0.0, 1.0, 1.0, 1.0]);
        assert_abs_diff_eq!(result.equity_curve[4].equity, 10_000.0 * 5.0 / 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fee_on_each_change() {
        // Up, up, down, down: enter at bar 2, exit at bar 4
        let result = run(&[10.0, 11.0, 12.0, 11.0, 10.0, 9.0], 1, 2, 0.01);
        assert_eq!(result.positions, vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
        assert_eq!(result.num_trades, 1);
        assert_eq!(result.metrics.num_trades, 1);

        let expected = 10_000.0 * (1.0 + 1.0 / 11.0 - 0.01) * (1.0 - 1.0 / 12.0) * (1.0 - 0.01);
        assert_abs_diff_eq!(result.equity_curve[5].equity, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_equity_floors_at_zero() {
        // Enters at bar 2 into a 99.95% drop and pays a 50% fee on top
        let result = run(&[1.0, 2.0, 0.001, 0.002, 0.003], 1, 2, 0.5);
        assert_eq!(result.equity_curve[2].equity, 0.0);
        assert_eq!(result.returns[2], -1.0);
        assert!(result.equity_curve.iter().all(|p| p.equity >= 0.0));
        let ruin = result
            .equity_curve
            .iter()
            .position(|p| p.equity == 0.0)
            .unwrap();
        assert!(result.equity_curve[ruin..].iter().all(|p| p.equity == 0.0));
        assert!(result.returns[ruin + 1..].iter().all(|r| *r == 0.0));
    }

    #[test]
    fn test_flat_series_never_trades() {
        let result = run(&[5.0; 8], 2, 4, 0.01);
        assert_eq!(result.num_trades, 0);
        assert!(result.equity_curve.iter().all(|p| p.equity == 10_000.0));
        assert_eq!(result.metrics.win_rate, 0.0);
    }

    #[test]
    fn test_rejects_empty_and_zero_windows() {
        let config = BacktestConfig::default();
        let calc = MetricsCalculator::default();
        assert!(sma_crossover(&Series::default(), 1, 2, &config, &calc).is_err());
        let series = Series::from_closes(0, 1, &[1.0, 2.0]).unwrap();
        assert!(sma_crossover(&series, 0, 2, &config, &calc).is_err());
    }
}
