//! Indicator requests.
//!
//! A spec is an ordered list of requests. In JSON each request is keyed by
//! its kind, e.g. `[{"sma": {"window": 20}}, {"rsi": {"window": 14}}]`.

use bartest_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// One requested indicator with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorRequest {
    Sma { window: usize },
    Ema { window: usize },
    Rsi { window: usize },
    Bollinger { window: usize, num_std: f64 },
    Momentum { window: usize },
    Roc { window: usize },
    Volatility { window: usize },
}

impl IndicatorRequest {
    /// Names of the series this request produces.
    pub fn output_names(&self) -> Vec<String> {
        match self {
            IndicatorRequest::Sma { window } => vec![format!("sma_{window}")],
            IndicatorRequest::Ema { window } => vec![format!("ema_{window}")],
            IndicatorRequest::Rsi { window } => vec![format!("rsi_{window}")],
            IndicatorRequest::Bollinger { window, num_std } => vec![
                format!("bb_upper_{window}_{num_std}"),
                format!("bb_middle_{window}_{num_std}"),
                format!("bb_lower_{window}_{num_std}"),
            ],
            IndicatorRequest::Momentum { window } => vec![format!("momentum_{window}")],
            IndicatorRequest::Roc { window } => vec![format!("roc_{window}")],
            IndicatorRequest::Volatility { window } => vec![format!("volatility_{window}")],
        }
    }

    /// Reject windows that can never produce a value.
    pub fn validate(&self) -> Result<()> {
        let (kind, window, min) = match self {
            IndicatorRequest::Sma { window } => ("sma", *window, 1),
            IndicatorRequest::Ema { window } => ("ema", *window, 1),
            IndicatorRequest::Rsi { window } => ("rsi", *window, 1),
            IndicatorRequest::Bollinger { window, num_std } => {
                if !num_std.is_finite() || *num_std < 0.0 {
                    return Err(Error::invalid_input(format!(
                        "bollinger num_std must be non-negative, got {num_std}"
                    )));
                }
                ("bollinger", *window, 2)
            }
            IndicatorRequest::Momentum { window } => ("momentum", *window, 1),
            IndicatorRequest::Roc { window } => ("roc", *window, 1),
            IndicatorRequest::Volatility { window } => ("volatility", *window, 2),
        };
        if window < min {
            return Err(Error::invalid_input(format!(
                "{kind} window must be at least {min}, got {window}"
            )));
        }
        Ok(())
    }
}

/// Ordered collection of indicator requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndicatorSpec {
    requests: Vec<IndicatorRequest>,
}

impl IndicatorSpec {
    /// Empty spec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request.
    pub fn with(mut self, request: IndicatorRequest) -> Self {
        self.requests.push(request);
        self
    }

    pub fn sma(self, window: usize) -> Self {
        self.with(IndicatorRequest::Sma { window })
    }

    pub fn ema(self, window: usize) -> Self {
        self.with(IndicatorRequest::Ema { window })
    }

    pub fn rsi(self, window: usize) -> Self {
        self.with(IndicatorRequest::Rsi { window })
    }

    pub fn bollinger(self, window: usize, num_std: f64) -> Self {
        self.with(IndicatorRequest::Bollinger { window, num_std })
    }

    pub fn momentum(self, window: usize) -> Self {
        self.with(IndicatorRequest::Momentum { window })
    }

    pub fn roc(self, window: usize) -> Self {
        self.with(IndicatorRequest::Roc { window })
    }

    pub fn volatility(self, window: usize) -> Self {
        self.with(IndicatorRequest::Volatility { window })
    }

    /// Requests in insertion order.
    pub fn requests(&self) -> &[IndicatorRequest] {
        &self.requests
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Validate every request.
    pub fn validate(&self) -> Result<()> {
        self.requests.iter().try_for_each(IndicatorRequest::validate)
    }
}
