//! Indicator precomputation for the bartest engine.
//!
//! This crate handles:
//! - Simple and exponential moving averages
//! - Relative strength index
//! - Bollinger bands
//! - Momentum and rate of change
//! - Rolling volatility of log returns
//!
//! Every indicator is computed over the whole series in one pass and aligned
//! to bar positions. Bars without enough history hold `f64::NAN`.

pub mod bollinger;
pub mod engine;
pub mod momentum;
pub mod moving_average;
pub mod rsi;
pub mod spec;
pub mod volatility;

pub use engine::{compute, IndicatorRow, IndicatorSet};
pub use spec::{IndicatorRequest, IndicatorSpec};
pub use volatility::RollingVolatility;
