//! PyO3 bindings for the bartest backtesting engine.
//!
//! Exposes the Rust engine to Python:
//! - Bars, trades and metrics as Python classes
//! - Event-driven backtests driven by a Python strategy object
//! - Indicator precomputation and metrics over an equity curve
//! - Walk-forward fold generation and the vectorized crossover backtest

use std::collections::BTreeMap;

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use tracing_subscriber::EnvFilter;

use bartest_backtest::vectorized::{self, VectorResult};
use bartest_backtest::{
    BacktestMetrics, BacktestResult, BacktestSimulator, BarContext, MetricsCalculator,
    Strategy as RustStrategy,
};
use bartest_core::config::{BacktestConfig, MetricsConfig, WalkForwardConfig};
use bartest_core::{
    Bar as RustBar, EquityPoint, Error as RustError, Series, Signal, TimestampMs,
    Trade as RustTrade,
};
use bartest_features::{compute, IndicatorSpec};

fn to_py_err(err: RustError) -> PyErr {
    match err {
        RustError::StrategyContractViolation(_) | RustError::Io(_) => {
            PyRuntimeError::new_err(err.to_string())
        }
        _ => PyValueError::new_err(err.to_string()),
    }
}

fn py_contract(err: PyErr) -> RustError {
    RustError::contract_violation(err.to_string())
}

// ============================================================================
// Python-exposed Types
// ============================================================================

/// One OHLCV bar.
#[pyclass]
#[derive(Clone)]
pub struct Bar {
    #[pyo3(get, set)]
    pub ts_ms: i64,
    #[pyo3(get, set)]
    pub open: f64,
    #[pyo3(get, set)]
    pub high: f64,
    #[pyo3(get, set)]
    pub low: f64,
    #[pyo3(get, set)]
    pub close: f64,
    #[pyo3(get, set)]
    pub volume: f64,
}

#[pymethods]
impl Bar {
    #[new]
    #[pyo3(signature = (ts_ms, open, high, low, close, volume=0.0))]
    fn new(ts_ms: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Bar {
            ts_ms,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "Bar(ts_ms={}, o={}, h={}, l={}, c={}, v={})",
            self.ts_ms, self.open, self.high, self.low, self.close, self.volume
        )
    }
}

impl From<Bar> for RustBar {
    fn from(b: Bar) -> Self {
        RustBar {
            ts_ms: b.ts_ms,
            open: b.open,
            high: b.high,
            low: b.low,
            close: b.close,
            volume: b.volume,
        }
    }
}

fn to_series(bars: Vec<Bar>) -> PyResult<Series> {
    Series::new(bars.into_iter().map(RustBar::from).collect()).map_err(to_py_err)
}

/// A closed round trip.
#[pyclass]
#[derive(Clone)]
pub struct Trade {
    #[pyo3(get)]
    pub entry_index: usize,
    #[pyo3(get)]
    pub exit_index: usize,
    #[pyo3(get)]
    pub entry_ts: i64,
    #[pyo3(get)]
    pub exit_ts: i64,
    #[pyo3(get)]
    pub entry_price: f64,
    #[pyo3(get)]
    pub exit_price: f64,
    #[pyo3(get)]
    pub fee_paid: f64,
    #[pyo3(get)]
    pub pnl: f64,
}

#[pymethods]
impl Trade {
    #[new]
    #[pyo3(signature = (entry_index, exit_index, entry_price, exit_price, pnl, fee_paid=0.0, entry_ts=0, exit_ts=0))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        entry_index: usize,
        exit_index: usize,
        entry_price: f64,
        exit_price: f64,
        pnl: f64,
        fee_paid: f64,
        entry_ts: i64,
        exit_ts: i64,
    ) -> Self {
        Trade {
            entry_index,
            exit_index,
            entry_ts,
            exit_ts,
            entry_price,
            exit_price,
            fee_paid,
            pnl,
        }
    }

    /// P&L after both fees.
    #[getter]
    fn net_pnl(&self) -> f64 {
        self.pnl - self.fee_paid
    }

    fn __repr__(&self) -> String {
        format!(
            "Trade(entry={}@{}, exit={}@{}, pnl={:.4})",
            self.entry_index, self.entry_price, self.exit_index, self.exit_price, self.pnl
        )
    }
}

impl From<&RustTrade> for Trade {
    fn from(t: &RustTrade) -> Self {
        Trade {
            entry_index: t.entry_index,
            exit_index: t.exit_index,
            entry_ts: t.entry_ts,
            exit_ts: t.exit_ts,
            entry_price: t.entry_price,
            exit_price: t.exit_price,
            fee_paid: t.fee_paid,
            pnl: t.pnl,
        }
    }
}

impl From<Trade> for RustTrade {
    fn from(t: Trade) -> Self {
        RustTrade {
            entry_index: t.entry_index,
            exit_index: t.exit_index,
            entry_ts: t.entry_ts,
            exit_ts: t.exit_ts,
            entry_price: t.entry_price,
            exit_price: t.exit_price,
            fee_paid: t.fee_paid,
            pnl: t.pnl,
        }
    }
}

/// Summary metrics. Undefined values are NaN.
#[pyclass]
#[derive(Clone)]
pub struct Metrics {
    #[pyo3(get)]
    pub sharpe: f64,
    #[pyo3(get)]
    pub sortino: f64,
    #[pyo3(get)]
    pub total_return: f64,
    #[pyo3(get)]
    pub annualized_return: f64,
    #[pyo3(get)]
    pub max_drawdown: f64,
    #[pyo3(get)]
    pub num_trades: usize,
    #[pyo3(get)]
    pub win_rate: f64,
    #[pyo3(get)]
    pub profit_factor: f64,
    #[pyo3(get)]
    pub avg_win: f64,
    #[pyo3(get)]
    pub avg_loss: f64,
    #[pyo3(get)]
    pub avg_holding_bars: f64,
    #[pyo3(get)]
    pub periods_per_year: f64,
}

#[pymethods]
impl Metrics {
    /// The headline metrics as a dict.
    fn to_dict<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let d = PyDict::new_bound(py);
        d.set_item("sharpe", self.sharpe)?;
        d.set_item("total_return", self.total_return)?;
        d.set_item("annualized_return", self.annualized_return)?;
        d.set_item("max_drawdown", self.max_drawdown)?;
        d.set_item("num_trades", self.num_trades)?;
        d.set_item("win_rate", self.win_rate)?;
        Ok(d)
    }

    fn __repr__(&self) -> String {
        format!(
            "Metrics(sharpe={:.4}, total_return={:.4}, max_drawdown={:.4}, trades={})",
            self.sharpe, self.total_return, self.max_drawdown, self.num_trades
        )
    }
}

impl From<BacktestMetrics> for Metrics {
    fn from(m: BacktestMetrics) -> Self {
        Metrics {
            sharpe: m.sharpe,
            sortino: m.sortino,
            total_return: m.total_return,
            annualized_return: m.annualized_return,
            max_drawdown: m.max_drawdown,
            num_trades: m.num_trades,
            win_rate: m.win_rate,
            profit_factor: m.profit_factor,
            avg_win: m.avg_win,
            avg_loss: m.avg_loss,
            avg_holding_bars: m.avg_holding_bars,
            periods_per_year: m.periods_per_year,
        }
    }
}

/// Output of an event-driven backtest.
#[pyclass]
pub struct BacktestOutcome {
    /// (ts_ms, equity) per bar.
    #[pyo3(get)]
    pub equity: Vec<(i64, f64)>,
    #[pyo3(get)]
    pub returns: Vec<f64>,
    #[pyo3(get)]
    pub trades: Vec<Trade>,
    #[pyo3(get)]
    pub metrics: Metrics,
    #[pyo3(get)]
    pub total_fees: f64,
    /// Whether a long position was still open at the last bar.
    #[pyo3(get)]
    pub open_at_end: bool,
    /// Bar at which equity was exhausted and trading stopped.
    #[pyo3(get)]
    pub ruined_at: Option<usize>,
}

#[pymethods]
impl BacktestOutcome {
    #[getter]
    fn final_equity(&self) -> Option<f64> {
        self.equity.last().map(|(_, e)| *e)
    }
}

impl BacktestOutcome {
    fn new(result: &BacktestResult, metrics: BacktestMetrics) -> Self {
        BacktestOutcome {
            equity: result
                .equity_curve
                .iter()
                .map(|p| (p.ts_ms, p.equity))
                .collect(),
            returns: result.returns.clone(),
            trades: result.trades.iter().map(Trade::from).collect(),
            metrics: metrics.into(),
            total_fees: result.total_fees,
            open_at_end: result.final_position.is_long(),
            ruined_at: result.ruined_at,
        }
    }
}

/// Output of the vectorized crossover backtest.
#[pyclass]
pub struct VectorOutcome {
    #[pyo3(get)]
    pub equity: Vec<(i64, f64)>,
    #[pyo3(get)]
    pub positions: Vec<f64>,
    #[pyo3(get)]
    pub num_trades: usize,
    #[pyo3(get)]
    pub metrics: Metrics,
}

impl From<VectorResult> for VectorOutcome {
    fn from(r: VectorResult) -> Self {
        VectorOutcome {
            equity: r.equity_curve.iter().map(|p| (p.ts_ms, p.equity)).collect(),
            positions: r.positions,
            num_trades: r.num_trades,
            metrics: r.metrics.into(),
        }
    }
}

// ============================================================================
// Python strategy adapter
// ============================================================================

/// Drives a Python object through the strategy contract.
///
/// The object must provide `process_bar(bar: dict)` and `get_signal() -> str`.
/// Optional attributes: `name`, `author`, and `indicators`, a list such as
/// `[{"sma": {"window": 20}}, {"rsi": {"window": 14}}]` (or a method returning
/// one).
struct PyStrategy<'py> {
    obj: Bound<'py, PyAny>,
    name: String,
    author: String,
    spec: IndicatorSpec,
    columns: Vec<String>,
}

impl<'py> PyStrategy<'py> {
    fn new(obj: &Bound<'py, PyAny>) -> PyResult<Self> {
        let name = match optional_string(obj, "name")? {
            Some(name) => name,
            None => obj
                .getattr("__class__")?
                .getattr("__name__")?
                .extract::<String>()?,
        };
        let author = optional_string(obj, "author")?.unwrap_or_else(|| "unknown".to_string());
        let spec = if obj.hasattr("indicators")? {
            let mut value = obj.getattr("indicators")?;
            if value.is_callable() {
                value = value.call0()?;
            }
            parse_indicator_spec(&value)?
        } else {
            IndicatorSpec::new()
        };
        let columns = spec
            .requests()
            .iter()
            .flat_map(|r| r.output_names())
            .collect();

        Ok(PyStrategy {
            obj: obj.clone(),
            name,
            author,
            spec,
            columns,
        })
    }

    fn bar_dict(&self, ctx: &BarContext<'_>) -> PyResult<Bound<'py, PyDict>> {
        let py = self.obj.py();
        let d = PyDict::new_bound(py);
        d.set_item("index", ctx.index)?;
        d.set_item("ts_ms", ctx.bar.ts_ms)?;
        d.set_item("open", ctx.bar.open)?;
        d.set_item("high", ctx.bar.high)?;
        d.set_item("low", ctx.bar.low)?;
        d.set_item("close", ctx.bar.close)?;
        d.set_item("volume", ctx.bar.volume)?;

        let indicators = PyDict::new_bound(py);
        for column in &self.columns {
            indicators.set_item(column, ctx.indicators.value(column))?;
        }
        d.set_item("indicators", indicators)?;
        Ok(d)
    }
}

impl RustStrategy for PyStrategy<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn author(&self) -> &str {
        &self.author
    }

    fn indicators(&self) -> IndicatorSpec {
        self.spec.clone()
    }

    fn process_bar(&mut self, ctx: &BarContext<'_>) -> bartest_core::Result<()> {
        let row = self.bar_dict(ctx).map_err(py_contract)?;
        self.obj
            .call_method1("process_bar", (row,))
            .map_err(py_contract)?;
        Ok(())
    }

    fn get_signal(&self) -> bartest_core::Result<Signal> {
        let raw: String = self
            .obj
            .call_method0("get_signal")
            .and_then(|s| s.extract())
            .map_err(py_contract)?;
        raw.parse()
    }
}

fn optional_string(obj: &Bound<'_, PyAny>, attr: &str) -> PyResult<Option<String>> {
    if !obj.hasattr(attr)? {
        return Ok(None);
    }
    let value = obj.getattr(attr)?;
    if value.is_none() {
        return Ok(None);
    }
    Ok(Some(value.str()?.to_string()))
}

fn parse_indicator_spec(value: &Bound<'_, PyAny>) -> PyResult<IndicatorSpec> {
    if value.is_none() {
        return Ok(IndicatorSpec::new());
    }
    let json: String = PyModule::import_bound(value.py(), "json")?
        .call_method1("dumps", (value,))?
        .extract()?;
    let spec: IndicatorSpec = serde_json::from_str(&json)
        .map_err(|e| PyValueError::new_err(format!("invalid indicator list: {e}")))?;
    spec.validate().map_err(to_py_err)?;
    Ok(spec)
}

// ============================================================================
// Python-exposed Functions
// ============================================================================

/// Run a Python strategy over `bars` and compute metrics on the result.
#[pyfunction]
#[pyo3(signature = (strategy, bars, initial_capital=10_000.0, fee=0.0, verbose=false, periods_per_year=None))]
fn run_backtest(
    strategy: &Bound<'_, PyAny>,
    bars: Vec<Bar>,
    initial_capital: f64,
    fee: f64,
    verbose: bool,
    periods_per_year: Option<f64>,
) -> PyResult<BacktestOutcome> {
    let series = to_series(bars)?;
    let mut strategy = PyStrategy::new(strategy)?;
    let simulator = BacktestSimulator::new(BacktestConfig {
        initial_capital,
        fee,
        verbose,
    })
    .map_err(to_py_err)?;
    let result = simulator.run(&series, &mut strategy).map_err(to_py_err)?;

    let metrics = metrics_calculator(periods_per_year)?.calculate(
        &result.equity_curve,
        &result.returns,
        &result.trades,
    );
    Ok(BacktestOutcome::new(&result, metrics))
}

/// Metrics for an equity curve of (ts_ms, equity) pairs and its trade log.
///
/// `returns` defaults to the bar-over-bar change of the curve.
#[pyfunction]
#[pyo3(signature = (equity, returns=None, trades=None, periods_per_year=None))]
fn compute_metrics(
    equity: Vec<(i64, f64)>,
    returns: Option<Vec<f64>>,
    trades: Option<Vec<Trade>>,
    periods_per_year: Option<f64>,
) -> PyResult<Metrics> {
    let curve: Vec<EquityPoint> = equity
        .into_iter()
        .map(|(ts_ms, equity)| EquityPoint { ts_ms, equity })
        .collect();
    let trades: Vec<RustTrade> = trades
        .unwrap_or_default()
        .into_iter()
        .map(RustTrade::from)
        .collect();
    let metrics = metrics_calculator(periods_per_year)?
        .calculate_checked(&curve, returns.as_deref(), &trades)
        .map_err(to_py_err)?;
    Ok(metrics.into())
}

/// Precompute indicators over `bars`, keyed by output column name.
#[pyfunction]
fn compute_indicators(
    bars: Vec<Bar>,
    indicators: &Bound<'_, PyAny>,
) -> PyResult<BTreeMap<String, Vec<f64>>> {
    let series = to_series(bars)?;
    let spec = parse_indicator_spec(indicators)?;
    Ok(compute(&series, &spec).map_err(to_py_err)?.into_map())
}

/// Walk-forward folds as ((train_start, train_end), (test_start, test_end)).
#[pyfunction]
#[pyo3(signature = (bars, train_days=180, test_days=30, anchored=false, min_test_bars=2))]
fn generate_folds(
    bars: Vec<Bar>,
    train_days: i64,
    test_days: i64,
    anchored: bool,
    min_test_bars: usize,
) -> PyResult<Vec<((TimestampMs, TimestampMs), (TimestampMs, TimestampMs))>> {
    let series = to_series(bars)?;
    let config = WalkForwardConfig {
        train_days,
        test_days,
        anchored,
        min_test_bars,
        ..Default::default()
    };
    let folds = bartest_backtest::generate_folds(&series, &config).map_err(to_py_err)?;
    Ok(folds
        .iter()
        .map(|f| {
            (
                (f.train.start_ms, f.train.end_ms),
                (f.test.start_ms, f.test.end_ms),
            )
        })
        .collect())
}

/// Vectorized fast/slow SMA crossover with compounding equity.
#[pyfunction]
#[pyo3(signature = (bars, fast, slow, initial_capital=10_000.0, fee=0.0, periods_per_year=None))]
fn sma_crossover(
    bars: Vec<Bar>,
    fast: usize,
    slow: usize,
    initial_capital: f64,
    fee: f64,
    periods_per_year: Option<f64>,
) -> PyResult<VectorOutcome> {
    let series = to_series(bars)?;
    let config = BacktestConfig::new(initial_capital, fee);
    let calculator = metrics_calculator(periods_per_year)?;
    let result =
        vectorized::sma_crossover(&series, fast, slow, &config, &calculator).map_err(to_py_err)?;
    Ok(result.into())
}

/// Route engine logs to stderr at `level` (an env-filter directive such as
/// "info" or "bartest_backtest=debug"). Later calls are no-ops.
#[pyfunction]
#[pyo3(signature = (level="info"))]
fn init_logging(level: &str) -> PyResult<()> {
    let filter = EnvFilter::try_new(level)
        .map_err(|e| PyValueError::new_err(format!("invalid log filter {level:?}: {e}")))?;
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_err()
    {
        tracing::debug!("logging already initialized");
    }
    Ok(())
}

fn metrics_calculator(periods_per_year: Option<f64>) -> PyResult<MetricsCalculator> {
    let config = MetricsConfig {
        periods_per_year,
        ..Default::default()
    };
    config.validate().map_err(to_py_err)?;
    Ok(MetricsCalculator::new(config))
}

// ============================================================================
// Module Definition
// ============================================================================

/// bartest - bar-based strategy backtesting in Rust.
#[pymodule]
fn bartest(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Types
    m.add_class::<Bar>()?;
    m.add_class::<Trade>()?;
    m.add_class::<Metrics>()?;
    m.add_class::<BacktestOutcome>()?;
    m.add_class::<VectorOutcome>()?;

    // Functions
    m.add_function(wrap_pyfunction!(run_backtest, m)?)?;
    m.add_function(wrap_pyfunction!(compute_metrics, m)?)?;
    m.add_function(wrap_pyfunction!(compute_indicators, m)?)?;
    m.add_function(wrap_pyfunction!(generate_folds, m)?)?;
    m.add_function(wrap_pyfunction!(sma_crossover, m)?)?;
    m.add_function(wrap_pyfunction!(init_logging, m)?)?;

    Ok(())
}
