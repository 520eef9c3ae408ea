//! Configuration structures for the bartest engine.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Simulator configuration.
    pub backtest: BacktestConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
    /// Walk-forward configuration.
    pub walk_forward: WalkForwardConfig,
}

impl Config {
    /// Parse a configuration from JSON. Missing sections take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.backtest.validate()?;
        self.metrics.validate()?;
        self.walk_forward.validate()
    }
}

/// Simulator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Starting equity; every position is sized at this amount.
    pub initial_capital: f64,
    /// Fee per side as a fraction of initial capital (0.001 == 0.1%).
    pub fee: f64,
    /// Log every trade as it happens.
    pub verbose: bool,
}

impl BacktestConfig {
    /// Create a config with the given capital and fee.
    pub fn new(initial_capital: f64, fee: f64) -> Self {
        Self {
            initial_capital,
            fee,
            verbose: false,
        }
    }

    /// Check capital and fee.
    pub fn validate(&self) -> Result<()> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(Error::invalid_input(format!(
                "initial_capital must be positive, got {}",
                self.initial_capital
            )));
        }
        if !(self.fee.is_finite() && self.fee >= 0.0) {
            return Err(Error::invalid_input(format!(
                "fee must be non-negative, got {}",
                self.fee
            )));
        }
        Ok(())
    }
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            fee: 0.0,
            verbose: false,
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Annualization factor; inferred from bar spacing when unset.
    pub periods_per_year: Option<f64>,
    /// Window (bars) of the rolling Sharpe series.
    pub rolling_window: usize,
}

impl MetricsConfig {
    /// Check the annualization override and rolling window.
    pub fn validate(&self) -> Result<()> {
        if let Some(p) = self.periods_per_year {
            if !(p.is_finite() && p > 0.0) {
                return Err(Error::config(format!(
                    "periods_per_year must be positive, got {p}"
                )));
            }
        }
        if self.rolling_window < 2 {
            return Err(Error::config("rolling_window must be at least 2"));
        }
        Ok(())
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            periods_per_year: None,
            // 30 days of hourly bars
            rolling_window: 24 * 30,
        }
    }
}

/// Longest train or test window, in days (about a thousand years).
pub const MAX_WINDOW_DAYS: i64 = 365_250;

/// Walk-forward fold configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    /// Train window length in days.
    pub train_days: i64,
    /// Test window length in days; folds slide forward by this much.
    pub test_days: i64,
    /// Keep every train window anchored at the series start.
    pub anchored: bool,
    /// Minimum bars a (possibly partial) final test window must hold.
    pub min_test_bars: usize,
    /// Worker threads for evaluation (0 = rayon's global pool).
    pub workers: usize,
}

impl WalkForwardConfig {
    /// Check window lengths.
    pub fn validate(&self) -> Result<()> {
        if !(0..=MAX_WINDOW_DAYS).contains(&self.train_days) {
            return Err(Error::config(format!(
                "train_days must be in 0..={MAX_WINDOW_DAYS}, got {}",
                self.train_days
            )));
        }
        if !(1..=MAX_WINDOW_DAYS).contains(&self.test_days) {
            return Err(Error::config(format!(
                "test_days must be in 1..={MAX_WINDOW_DAYS}, got {}",
                self.test_days
            )));
        }
        if self.min_test_bars == 0 {
            return Err(Error::config("min_test_bars must be at least 1"));
        }
        Ok(())
    }
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            train_days: 180,
            test_days: 30,
            anchored: false,
            min_test_bars: 2,
            workers: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.backtest.initial_capital, 10_000.0);
        assert_eq!(config.backtest.fee, 0.0);
        assert!(!config.backtest.verbose);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = Config::from_json_str(r#"{"backtest": {"fee": 0.001}}"#).unwrap();
        assert_eq!(config.backtest.fee, 0.001);
        assert_eq!(config.backtest.initial_capital, 10_000.0);
        assert_eq!(config.walk_forward.test_days, 30);
    }

    #[test]
    fn test_negative_fee_rejected() {
        let err = BacktestConfig::new(10_000.0, -0.001).validate().unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_non_positive_capital_rejected() {
        assert!(BacktestConfig::new(0.0, 0.0).validate().is_err());
        assert!(BacktestConfig::new(-5.0, 0.0).validate().is_err());
        assert!(BacktestConfig::new(f64::NAN, 0.0).validate().is_err());
    }

    #[test]
    fn test_bad_walk_forward_rejected() {
        let json = r#"{"walk_forward": {"test_days": 0}}"#;
        assert!(matches!(Config::from_json_str(json), Err(Error::Config(_))));
    }

    #[test]
    fn test_huge_walk_forward_windows_rejected() {
        let config = WalkForwardConfig {
            train_days: i64::MAX / 2,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = WalkForwardConfig {
            test_days: MAX_WINDOW_DAYS + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = WalkForwardConfig {
            train_days: MAX_WINDOW_DAYS,
            test_days: MAX_WINDOW_DAYS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(Config::from_json_str("{"), Err(Error::Json(_))));
    }
}
