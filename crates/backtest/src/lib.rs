//! Backtesting engine for the bartest system.
//!
//! This crate provides:
//! - The strategy contract the engine drives bar by bar
//! - Long-only position tracking with flat per-side fees
//! - Non-compounding equity simulation
//! - Performance metrics and drawdown/rolling-Sharpe series
//! - Walk-forward validation over calendar folds
//! - A vectorized moving-average crossover backtest

pub mod metrics;
pub mod position;
pub mod simulator;
pub mod strategy;
pub mod vectorized;
pub mod walk_forward;

pub use metrics::{compute_metrics, BacktestMetrics, BacktestReport, MetricsCalculator};
pub use position::{Position, PositionTracker};
pub use simulator::{run_backtest, BacktestResult, BacktestSimulator};
pub use strategy::{BarContext, SignalReplay, Strategy};
pub use walk_forward::{generate_folds, CandidateResult, FoldScore, WalkForwardValidator};
