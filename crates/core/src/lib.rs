//! Core types and configuration for the bartest backtesting engine.
//!
//! This crate provides shared types used across all other crates:
//! - Market data types (bars, series)
//! - Signals, trades and equity points
//! - Walk-forward folds
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
