//! Backtest performance metrics.
//!
//! Scalar metrics come from the per-bar equity and return series plus the
//! trade log. Metrics whose denominator vanishes (zero variance, a span too
//! short to annualize) are NaN rather than errors.

use bartest_core::config::MetricsConfig;
use bartest_core::{median_spacing_ms, EquityPoint, Error, Result, Trade, YEAR_MS};
use serde::Serialize;
use statrs::statistics::Statistics;

use crate::simulator::{pct_change, BacktestResult};

/// Standard deviations below this are treated as zero.
const MIN_STD: f64 = 1e-12;

/// Backtest performance metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BacktestMetrics {
    /// Annualized Sharpe ratio of per-bar returns.
    pub sharpe: f64,
    /// Annualized Sortino ratio of per-bar returns.
    pub sortino: f64,
    /// (last equity - first equity) / first equity.
    pub total_return: f64,
    /// Total return compounded to a yearly rate.
    pub annualized_return: f64,
    /// Worst peak-to-trough decline, as a fraction in [-1, 0].
    pub max_drawdown: f64,
    /// Number of closed trades.
    pub num_trades: usize,
    /// Fraction of trades with positive P&L (0 when there are none).
    pub win_rate: f64,
    /// Gross wins / gross losses.
    pub profit_factor: f64,
    /// Average winning trade P&L.
    pub avg_win: f64,
    /// Average losing trade P&L.
    pub avg_loss: f64,
    /// Consecutive wins (max).
    pub max_consecutive_wins: usize,
    /// Consecutive losses (max).
    pub max_consecutive_losses: usize,
    /// Average holding period in bars.
    pub avg_holding_bars: f64,
    /// Periods per year used to annualize.
    pub periods_per_year: f64,
}

/// Metrics plus the per-bar diagnostic series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    pub metrics: BacktestMetrics,
    /// Sharpe over a trailing window of returns; NaN until the window fills.
    pub rolling_sharpe: Vec<f64>,
    /// Drawdown of the marked-to-market equity at every bar.
    pub unrealized_drawdown: Vec<f64>,
    /// Drawdown of equity sampled only at trade exits.
    pub realized_drawdown: Vec<f64>,
}

/// Metrics calculator.
#[derive(Debug, Clone, Default)]
pub struct MetricsCalculator {
    config: MetricsConfig,
}

impl MetricsCalculator {
    /// Create a new metrics calculator.
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Annualization factor: the configured override, else one year divided
    /// by the median bar spacing. NaN when spacing cannot be inferred.
    pub fn periods_per_year(&self, equity: &[EquityPoint]) -> f64 {
        if let Some(p) = self.config.periods_per_year {
            return p;
        }
        let timestamps: Vec<i64> = equity.iter().map(|p| p.ts_ms).collect();
        match median_spacing_ms(&timestamps) {
            Some(spacing) if spacing > 0 => YEAR_MS / spacing as f64,
            _ => f64::NAN,
        }
    }

    /// Calculate metrics from a run's series and trade log.
    pub fn calculate(
        &self,
        equity: &[EquityPoint],
        returns: &[f64],
        trades: &[Trade],
    ) -> BacktestMetrics {
        let values: Vec<f64> = equity.iter().map(|p| p.equity).collect();
        let periods_per_year = self.periods_per_year(equity);

        let mut metrics = BacktestMetrics {
            sharpe: sharpe_ratio(returns, periods_per_year),
            sortino: sortino_ratio(returns, periods_per_year),
            total_return: total_return(&values),
            annualized_return: f64::NAN,
            max_drawdown: max_drawdown(&values),
            num_trades: trades.len(),
            win_rate: win_rate(trades),
            profit_factor: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            max_consecutive_wins: 0,
            max_consecutive_losses: 0,
            avg_holding_bars: 0.0,
            periods_per_year,
        };
        metrics.annualized_return = self.annualized_return(equity, metrics.total_return);

        let mut gross_wins = 0.0;
        let mut gross_losses = 0.0;
        let mut wins = 0usize;
        let mut current_wins = 0usize;
        let mut current_losses = 0usize;
        let mut holding = 0usize;

        for trade in trades {
            holding += trade.holding_bars();
            if trade.is_win() {
                wins += 1;
                gross_wins += trade.pnl;
                current_wins += 1;
                current_losses = 0;
                metrics.max_consecutive_wins = metrics.max_consecutive_wins.max(current_wins);
            } else {
                gross_losses += trade.pnl.abs();
                current_losses += 1;
                current_wins = 0;
                metrics.max_consecutive_losses =
                    metrics.max_consecutive_losses.max(current_losses);
            }
        }

        let losses = trades.len() - wins;
        if wins > 0 {
            metrics.avg_win = gross_wins / wins as f64;
        }
        if losses > 0 {
            metrics.avg_loss = -gross_losses / losses as f64;
        }
        metrics.profit_factor = if gross_losses > 0.0 {
            gross_wins / gross_losses
        } else if gross_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };
        if !trades.is_empty() {
            metrics.avg_holding_bars = holding as f64 / trades.len() as f64;
        }

        metrics
    }

    /// Calculate metrics for series that did not come from the simulator.
    ///
    /// Returns are derived from the equity curve when not given. Fails when
    /// the returns are not aligned to the curve, or when a trade falls
    /// outside the curve or does not exit after it enters.
    pub fn calculate_checked(
        &self,
        equity: &[EquityPoint],
        returns: Option<&[f64]>,
        trades: &[Trade],
    ) -> Result<BacktestMetrics> {
        let derived;
        let returns = match returns {
            Some(r) if r.len() != equity.len() => {
                return Err(Error::invalid_input(format!(
                    "{} returns for {} equity points",
                    r.len(),
                    equity.len()
                )));
            }
            Some(r) => r,
            None => {
                let values: Vec<f64> = equity.iter().map(|p| p.equity).collect();
                derived = pct_change(&values);
                &derived
            }
        };
        if let Some((i, t)) = trades
            .iter()
            .enumerate()
            .find(|(_, t)| t.entry_index >= t.exit_index || t.exit_index >= equity.len())
        {
            return Err(Error::invalid_input(format!(
                "trade {i} ({} -> {}) does not fit a {}-point curve",
                t.entry_index,
                t.exit_index,
                equity.len()
            )));
        }
        Ok(self.calculate(equity, returns, trades))
    }

    /// Calculate metrics plus rolling Sharpe and drawdown series for a run.
    pub fn report(&self, result: &BacktestResult) -> BacktestReport {
        let metrics = self.calculate(&result.equity_curve, &result.returns, &result.trades);
        let values = result.equity_values();

        BacktestReport {
            rolling_sharpe: rolling_sharpe(
                &result.returns,
                self.config.rolling_window,
                metrics.periods_per_year,
            ),
            unrealized_drawdown: drawdown_series(&values),
            realized_drawdown: realized_drawdown_series(&values, &result.trades),
            metrics,
        }
    }

    /// Total return compounded over the run's length in years.
    ///
    /// With a periods-per-year override the length is the bar count; otherwise
    /// it is the calendar span of the timestamps.
    fn annualized_return(&self, equity: &[EquityPoint], total_return: f64) -> f64 {
        if equity.len() < 2 || total_return.is_nan() {
            return f64::NAN;
        }
        let years = match self.config.periods_per_year {
            Some(p) => (equity.len() - 1) as f64 / p,
            None => {
                let span = equity[equity.len() - 1].ts_ms - equity[0].ts_ms;
                span as f64 / YEAR_MS
            }
        };
        let growth = 1.0 + total_return;
        if years <= 0.0 || growth < 0.0 {
            return f64::NAN;
        }
        growth.powf(1.0 / years) - 1.0
    }
}

/// Calculate metrics with the default configuration.
pub fn compute_metrics(
    equity: &[EquityPoint],
    returns: &[f64],
    trades: &[Trade],
) -> BacktestMetrics {
    MetricsCalculator::default().calculate(equity, returns, trades)
}

/// (last - first) / first. NaN for an empty curve or a zero start.
pub fn total_return(equity: &[f64]) -> f64 {
    match (equity.first(), equity.last()) {
        (Some(&first), Some(&last)) if first != 0.0 => (last - first) / first,
        _ => f64::NAN,
    }
}

/// mean / sample std * sqrt(periods_per_year). NaN with zero variance.
pub fn sharpe_ratio(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return f64::NAN;
    }
    let mean = Statistics::mean(returns);
    let std = Statistics::std_dev(returns);
    if !(std > MIN_STD) {
        return f64::NAN;
    }
    mean / std * periods_per_year.sqrt()
}

/// mean / downside deviation * sqrt(periods_per_year).
///
/// Infinite when there is no downside and the mean is positive, NaN when
/// there is no downside otherwise.
pub fn sortino_ratio(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return f64::NAN;
    }
    let n = returns.len() as f64;
    let mean = Statistics::mean(returns);
    let downside_var = returns
        .iter()
        .filter(|&&r| r < 0.0)
        .map(|r| r * r)
        .sum::<f64>()
        / n;
    let downside = downside_var.sqrt();
    if downside > MIN_STD {
        mean / downside * periods_per_year.sqrt()
    } else if mean > 0.0 {
        f64::INFINITY
    } else {
        f64::NAN
    }
}

/// Drawdown at every bar: (equity - running peak) / running peak, clamped
/// to [-1, 0]. A non-positive peak counts as a total loss.
pub fn drawdown_series(equity: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    equity
        .iter()
        .map(|&e| {
            peak = peak.max(e);
            if peak <= 0.0 {
                -1.0
            } else {
                ((e - peak) / peak).clamp(-1.0, 0.0)
            }
        })
        .collect()
}

/// Worst drawdown, in [-1, 0]; 0 for a curve that never declines.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    drawdown_series(equity).into_iter().fold(0.0, f64::min)
}

/// Fraction of trades with positive P&L; 0 for an empty log.
pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_win()).count() as f64 / trades.len() as f64
}

/// Sharpe over each trailing window of `window` returns.
pub fn rolling_sharpe(returns: &[f64], window: usize, periods_per_year: f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; returns.len()];
    if window < 2 || returns.len() < window {
        return out;
    }
    for (i, slot) in out.iter_mut().enumerate().skip(window - 1) {
        *slot = sharpe_ratio(&returns[i + 1 - window..=i], periods_per_year);
    }
    out
}

/// Drawdown of the realized equity curve: equity only changes at the bars
/// where a trade closes and is carried forward in between.
pub fn realized_drawdown_series(equity: &[f64], trades: &[Trade]) -> Vec<f64> {
    let Some(&start) = equity.first() else {
        return Vec::new();
    };
    let mut realized = vec![f64::NAN; equity.len()];
    for trade in trades {
        if let Some(slot) = realized.get_mut(trade.exit_index) {
            *slot = equity[trade.exit_index];
        }
    }

    let mut last = start;
    for value in realized.iter_mut() {
        if value.is_nan() {
            *value = last;
        } else {
            last = *value;
        }
    }
    drawdown_series(&realized)
}
