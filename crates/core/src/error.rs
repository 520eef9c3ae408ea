//! Error types for the bartest engine.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the bartest engine.
///
/// Undefined metrics (zero variance, too short a span) are not errors; they
/// are reported as `f64::NAN` in the metric itself.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid input (empty series, bad capital or fee, unordered timestamps).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A strategy broke its contract (raised, or produced an unknown signal).
    #[error("Strategy contract violation: {0}")]
    StrategyContractViolation(String),

    /// Insufficient data for computation.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a strategy contract violation error.
    pub fn contract_violation(msg: impl Into<String>) -> Self {
        Error::StrategyContractViolation(msg.into())
    }

    /// Create an insufficient data error.
    pub fn insufficient_data(msg: impl Into<String>) -> Self {
        Error::InsufficientData(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Whether this error was raised by input validation.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }

    /// Whether this error was raised by a misbehaving strategy.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Error::StrategyContractViolation(_))
    }
}
