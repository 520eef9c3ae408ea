//! End-to-end scenarios: simulator, metrics and walk-forward together.

use approx::assert_abs_diff_eq;
use bartest_backtest::walk_forward::validate_folds;
use bartest_backtest::{
    compute_metrics, generate_folds, run_backtest, BarContext, MetricsCalculator, SignalReplay,
    Strategy, WalkForwardValidator,
};
use bartest_core::config::{BacktestConfig, MetricsConfig, WalkForwardConfig};
use bartest_core::{Result, Series, Signal, HOUR_MS};
use bartest_features::IndicatorSpec;

fn hourly(closes: &[f64]) -> Series {
    Series::from_closes(1_704_067_200_000, HOUR_MS, closes).unwrap()
}

/// Long when the fast SMA is above the slow SMA, flat otherwise.
struct SmaCross {
    fast: usize,
    slow: usize,
    signal: Signal,
}

impl SmaCross {
    fn new(fast: usize, slow: usize) -> Self {
        Self {
            fast,
            slow,
            signal: Signal::Hold,
        }
    }
}

impl Strategy for SmaCross {
    fn name(&self) -> &str {
        "sma_cross"
    }

    fn author(&self) -> &str {
        "tests"
    }

    fn indicators(&self) -> IndicatorSpec {
        IndicatorSpec::new().sma(self.fast).sma(self.slow)
    }

    fn process_bar(&mut self, ctx: &BarContext<'_>) -> Result<()> {
        let fast = ctx.indicators.value(&format!("sma_{}", self.fast));
        let slow = ctx.indicators.value(&format!("sma_{}", self.slow));
        self.signal = match (fast, slow) {
            (Some(f), Some(s)) if f > s => Signal::Buy,
            (Some(_), Some(_)) => Signal::Sell,
            _ => Signal::Hold,
        };
        Ok(())
    }

    fn get_signal(&self) -> Result<Signal> {
        Ok(self.signal)
    }
}

fn wave(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 100.0 + 10.0 * ((i as f64) / 9.0).sin() + (i % 5) as f64 * 0.3)
        .collect()
}

#[test]
fn round_trip_with_fees() {
    let series = hourly(&[100.0, 102.0, 101.0, 105.0, 103.0]);
    let mut strategy = SignalReplay::new(vec![
        Signal::Buy,
        Signal::Hold,
        Signal::Hold,
        Signal::Sell,
        Signal::Hold,
    ]);
    let result = run_backtest(&series, &mut strategy, 10_000.0, 0.001, false).unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!((trade.entry_price, trade.exit_price), (100.0, 105.0));
    assert_abs_diff_eq!(trade.pnl, 500.0, epsilon = 1e-9);
    assert_abs_diff_eq!(trade.fee_paid, 20.0, epsilon = 1e-9);
    assert_abs_diff_eq!(result.equity_curve[3].equity, 10_480.0, epsilon = 1e-9);
    assert_abs_diff_eq!(result.equity_curve[4].equity, 10_480.0, epsilon = 1e-9);
    assert_eq!(result.equity_curve[4].ts_ms, series.get(4).unwrap().ts_ms);
}

#[test]
fn alternating_signals_every_bar() {
    let closes = [100.0, 101.0, 100.0, 102.0, 101.0, 100.0, 99.0, 103.0, 104.0, 102.0];
    let series = hourly(&closes);
    let signals = (0..10)
        .map(|i| if i % 2 == 0 { Signal::Buy } else { Signal::Sell })
        .collect();
    let result = run_backtest(&series, &mut SignalReplay::new(signals), 1_000.0, 0.002, false)
        .unwrap();

    let expected_pnl: Vec<f64> = (0..5)
        .map(|k| (closes[2 * k + 1] - closes[2 * k]) / closes[2 * k] * 1_000.0)
        .collect();
    assert_eq!(result.trades.len(), 5);
    for (trade, pnl) in result.trades.iter().zip(&expected_pnl) {
        assert_abs_diff_eq!(trade.pnl, *pnl, epsilon = 1e-9);
        assert_abs_diff_eq!(trade.fee_paid, 4.0, epsilon = 1e-12);
        assert_eq!(trade.exit_index, trade.entry_index + 1);
    }

    let metrics = compute_metrics(&result.equity_curve, &result.returns, &result.trades);
    assert_eq!(metrics.num_trades, 5);
    assert_abs_diff_eq!(metrics.win_rate, 0.6, epsilon = 1e-12);

    let final_equity = 1_000.0 + expected_pnl.iter().sum::<f64>() - 20.0;
    assert_abs_diff_eq!(result.final_equity(), final_equity, epsilon = 1e-9);
}

#[test]
fn never_trading_is_flat_and_undefined_sharpe() {
    let series = hourly(&wave(50));
    let result = run_backtest(&series, &mut SignalReplay::new(vec![]), 5_000.0, 0.0, false)
        .unwrap();
    assert!(result.equity_curve.iter().all(|p| p.equity == 5_000.0));

    let metrics = compute_metrics(&result.equity_curve, &result.returns, &result.trades);
    assert!(metrics.sharpe.is_nan());
    assert_eq!(metrics.total_return, 0.0);
    assert_eq!(metrics.max_drawdown, 0.0);
    assert_eq!(metrics.win_rate, 0.0);
}

#[test]
fn indicator_driven_strategy_runs() {
    let series = hourly(&wave(200));
    let result = run_backtest(&series, &mut SmaCross::new(3, 12), 10_000.0, 0.0005, false)
        .unwrap();
    assert_eq!(result.equity_curve.len(), 200);
    assert!(!result.trades.is_empty());
    assert!(result.trades.iter().all(|t| t.entry_index < t.exit_index));
    // No decision before the slow SMA warms up
    assert!(result.trades[0].entry_index >= 11);

    let report = MetricsCalculator::new(MetricsConfig {
        rolling_window: 24,
        ..Default::default()
    })
    .report(&result);
    assert_eq!(report.rolling_sharpe.len(), 200);
    assert_eq!(report.unrealized_drawdown.len(), 200);
    assert_eq!(report.realized_drawdown.len(), 200);
    assert!(report.unrealized_drawdown.iter().all(|d| (-1.0..=0.0).contains(d)));
}

#[test]
fn walk_forward_ranks_candidates() {
    // 20 days of hourly bars
    let series = hourly(&wave(20 * 24));
    let folds = generate_folds(
        &series,
        &WalkForwardConfig {
            train_days: 6,
            test_days: 3,
            ..Default::default()
        },
    )
    .unwrap();
    assert!(validate_folds(&folds).is_ok());
    assert_eq!(folds.len(), 5);

    let validator = WalkForwardValidator::new(
        BacktestConfig::new(10_000.0, 0.0005),
        MetricsConfig::default(),
        2,
    )
    .unwrap();
    let grid = vec![(2, 8), (3, 12), (5, 20)];
    let ranked = validator
        .evaluate(&series, |&(f, s)| SmaCross::new(f, s), &grid, &folds)
        .unwrap();

    assert_eq!(ranked.len(), 3);
    for candidate in &ranked {
        assert_eq!(candidate.folds.len(), folds.len());
        let indices: Vec<usize> = candidate.folds.iter().map(|f| f.fold_index).collect();
        assert_eq!(indices, (0..folds.len()).collect::<Vec<_>>());
    }
    for pair in ranked.windows(2) {
        let (a, b) = (pair[0].average_sharpe, pair[1].average_sharpe);
        assert!(b.is_nan() || a >= b);
    }
}

#[test]
fn walk_forward_is_deterministic_across_worker_counts() {
    let series = hourly(&wave(12 * 24));
    let folds = generate_folds(
        &series,
        &WalkForwardConfig {
            train_days: 3,
            test_days: 3,
            ..Default::default()
        },
    )
    .unwrap();
    let grid = vec![(2, 6), (4, 10)];

    let run = |workers| {
        WalkForwardValidator::new(BacktestConfig::default(), MetricsConfig::default(), workers)
            .unwrap()
            .evaluate(&series, |&(f, s)| SmaCross::new(f, s), &grid, &folds)
            .unwrap()
    };
    let (a, b) = (run(1), run(4));
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.params, y.params);
        assert_eq!(x.fold_sharpes().len(), y.fold_sharpes().len());
        for (s, t) in x.fold_sharpes().iter().zip(y.fold_sharpes()) {
            assert!(s == &t || (s.is_nan() && t.is_nan()));
        }
    }
}

#[test]
fn walk_forward_rejects_empty_grid() {
    let series = hourly(&wave(10 * 24));
    let folds = generate_folds(
        &series,
        &WalkForwardConfig {
            train_days: 2,
            test_days: 2,
            ..Default::default()
        },
    )
    .unwrap();
    let validator = WalkForwardValidator::new(
        BacktestConfig::default(),
        MetricsConfig::default(),
        0,
    )
    .unwrap();
    let grid: Vec<(usize, usize)> = Vec::new();
    let err = validator
        .evaluate(&series, |&(f, s)| SmaCross::new(f, s), &grid, &folds)
        .unwrap_err();
    assert!(err.is_invalid_input());
}
