//! Walk-forward validation over calendar folds.
//!
//! Folds pair a train range with the test range that immediately follows
//! it; test ranges slide forward by their own length, so they never overlap.
//! The validator does no fitting: for every (parameter set, fold) it builds a
//! fresh strategy, runs it on the fold's test slice and records the Sharpe.
//! Candidates are ranked by mean test Sharpe, with undefined Sharpe last.

use bartest_core::config::{BacktestConfig, MetricsConfig, WalkForwardConfig};
use bartest_core::{Config, Error, Fold, Result, Series, TimeRange, DAY_MS};
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::metrics::MetricsCalculator;
use crate::simulator::BacktestSimulator;
use crate::strategy::Strategy;

/// Score of one candidate on one fold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FoldScore {
    pub fold_index: usize,
    /// Test-range Sharpe (NaN when undefined).
    pub sharpe: f64,
    pub total_return: f64,
    pub num_trades: usize,
    /// Bars in the test slice.
    pub bars: usize,
}

/// A parameter set with its per-fold scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateResult<P> {
    pub params: P,
    /// Scores in fold order.
    pub folds: Vec<FoldScore>,
    /// Mean test Sharpe over all folds; NaN when any fold is undefined.
    pub average_sharpe: f64,
}

impl<P> CandidateResult<P> {
    /// Per-fold test Sharpe, in fold order.
    pub fn fold_sharpes(&self) -> Vec<f64> {
        self.folds.iter().map(|f| f.sharpe).collect()
    }

    fn rank_key(&self) -> OrderedFloat<f64> {
        if self.average_sharpe.is_nan() {
            OrderedFloat(f64::NEG_INFINITY)
        } else {
            OrderedFloat(self.average_sharpe)
        }
    }
}

/// Build rolling (or anchored) folds over the series' calendar span.
///
/// Test windows holding fewer than `min_test_bars` bars are skipped, which
/// also decides whether a trailing partial window is kept.
pub fn generate_folds(series: &Series, config: &WalkForwardConfig) -> Result<Vec<Fold>> {
    config.validate()?;
    let (Some(first), Some(last)) = (series.first(), series.last()) else {
        return Err(Error::invalid_input("cannot build folds over an empty series"));
    };

    let train_ms = config.train_days * DAY_MS;
    let test_ms = config.test_days * DAY_MS;
    let origin = first.ts_ms;

    let mut folds = Vec::new();
    for step in 0_i64.. {
        // Windows starting past i64::MAX cannot hold bars
        let Some(offset) = step.checked_mul(test_ms) else {
            break;
        };
        let Some(test_start) = origin
            .checked_add(train_ms)
            .and_then(|t| t.checked_add(offset))
        else {
            break;
        };
        if test_start > last.ts_ms {
            break;
        }
        let train_start = if config.anchored { origin } else { origin + offset };
        let test = TimeRange::new(test_start, test_start.saturating_add(test_ms));

        let bars = series.index_range(&test).len();
        if bars < config.min_test_bars {
            warn!(%test, bars, "skipping fold with too few test bars");
            continue;
        }

        folds.push(Fold {
            index: folds.len(),
            train: TimeRange::new(train_start, test_start),
            test,
        });
    }

    if folds.is_empty() {
        return Err(Error::insufficient_data(format!(
            "series spans too little time for a {}-day train and {}-day test window",
            config.train_days, config.test_days
        )));
    }
    debug!(folds = folds.len(), "generated walk-forward folds");
    Ok(folds)
}

/// Check that folds are time-ordered with non-empty, non-overlapping test
/// ranges, each train range ending no later than its test range starts.
pub fn validate_folds(folds: &[Fold]) -> Result<()> {
    for fold in folds {
        if fold.test.is_empty() {
            return Err(Error::invalid_input(format!(
                "fold {} has an empty test range",
                fold.index
            )));
        }
        if fold.train.end_ms > fold.test.start_ms {
            return Err(Error::invalid_input(format!(
                "fold {} trains past the start of its test range",
                fold.index
            )));
        }
    }
    for pair in folds.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if b.test.start_ms < a.test.end_ms {
            return Err(Error::invalid_input(format!(
                "fold {} test range {} overlaps or precedes fold {} test range {}",
                b.index, b.test, a.index, a.test
            )));
        }
    }
    Ok(())
}

/// Sort candidates by mean test Sharpe, descending; undefined last. Ties
/// keep their grid order.
pub fn rank_candidates<P>(candidates: &mut [CandidateResult<P>]) {
    candidates.sort_by(|a, b| b.rank_key().cmp(&a.rank_key()));
}

/// Mean of per-fold Sharpe ratios. A single undefined fold makes the whole
/// candidate undefined, so it ranks last instead of being scored on its
/// remaining folds.
fn mean_sharpe(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Walk-forward validator.
#[derive(Debug, Clone)]
pub struct WalkForwardValidator {
    simulator: BacktestSimulator,
    metrics: MetricsCalculator,
    workers: usize,
}

impl WalkForwardValidator {
    /// Create a validator. `workers = 0` uses rayon's global pool.
    pub fn new(backtest: BacktestConfig, metrics: MetricsConfig, workers: usize) -> Result<Self> {
        metrics.validate()?;
        Ok(Self {
            simulator: BacktestSimulator::new(backtest)?,
            metrics: MetricsCalculator::new(metrics),
            workers,
        })
    }

    /// Create a validator from a full configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.backtest.clone(),
            config.metrics.clone(),
            config.walk_forward.workers,
        )
    }

    /// Score every parameter set on every fold and rank the results.
    ///
    /// Each (parameter set, fold) pair runs on its own strategy instance and
    /// its own copy of the test slice, in parallel. Any failure aborts the
    /// whole evaluation.
    pub fn evaluate<P, S, F>(
        &self,
        series: &Series,
        strategy_factory: F,
        param_grid: &[P],
        folds: &[Fold],
    ) -> Result<Vec<CandidateResult<P>>>
    where
        P: Clone + Sync,
        S: Strategy,
        F: Fn(&P) -> S + Sync,
    {
        if param_grid.is_empty() {
            return Err(Error::invalid_input("parameter grid is empty"));
        }
        if folds.is_empty() {
            return Err(Error::invalid_input("no folds to evaluate"));
        }
        validate_folds(folds)?;

        let slices: Vec<Series> = folds
            .iter()
            .map(|fold| {
                if series.index_range(&fold.train).is_empty() && !fold.train.is_empty() {
                    warn!(fold = fold.index, train = %fold.train, "train range holds no bars");
                }
                let slice = series.slice_time(&fold.test);
                if slice.is_empty() {
                    return Err(Error::invalid_input(format!(
                        "fold {} test range {} holds no bars",
                        fold.index, fold.test
                    )));
                }
                Ok(slice)
            })
            .collect::<Result<_>>()?;

        let tasks: Vec<(usize, usize)> = (0..param_grid.len())
            .flat_map(|p| (0..folds.len()).map(move |f| (p, f)))
            .collect();

        let run_task = |&(p, f): &(usize, usize)| -> Result<FoldScore> {
            let mut strategy = strategy_factory(&param_grid[p]);
            let slice = &slices[f];
            let result = self.simulator.run(slice, &mut strategy)?;
            let metrics =
                self.metrics
                    .calculate(&result.equity_curve, &result.returns, &result.trades);
            Ok(FoldScore {
                fold_index: folds[f].index,
                sharpe: metrics.sharpe,
                total_return: metrics.total_return,
                num_trades: metrics.num_trades,
                bars: slice.len(),
            })
        };

        let scores: Vec<FoldScore> = if self.workers > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .build()
                .map_err(|e| Error::config(format!("failed to build worker pool: {e}")))?;
            pool.install(|| tasks.par_iter().map(run_task).collect::<Result<Vec<_>>>())?
        } else {
            tasks.par_iter().map(run_task).collect::<Result<Vec<_>>>()?
        };

        let mut candidates: Vec<CandidateResult<P>> = scores
            .chunks(folds.len())
            .zip(param_grid)
            .map(|(fold_scores, params)| CandidateResult {
                params: params.clone(),
                folds: fold_scores.to_vec(),
                average_sharpe: mean_sharpe(fold_scores.iter().map(|s| s.sharpe)),
            })
            .collect();

        rank_candidates(&mut candidates);
        if let Some(best) = candidates.first() {
            debug!(
                candidates = candidates.len(),
                folds = folds.len(),
                best_sharpe = best.average_sharpe,
                "walk-forward evaluation complete"
            );
        }
        Ok(candidates)
    }
}
