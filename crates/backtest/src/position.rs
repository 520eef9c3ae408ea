//! Position tracking for backtesting.
//!
//! Tracks the open long, realized P&L, fees and the trade log. Every
//! position is sized at the full initial capital, and every side costs a flat
//! `fee * initial_capital`.

use bartest_core::{Bar, PositionStatus, TimestampMs, Trade};

/// Current position. An entry price exists exactly when long.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Position {
    #[default]
    Flat,
    Long {
        /// Bar position of the entry.
        entry_index: usize,
        /// Entry timestamp.
        entry_ts: TimestampMs,
        /// Entry price.
        entry_price: f64,
    },
}

impl Position {
    /// Flat or long.
    pub fn status(&self) -> PositionStatus {
        match self {
            Position::Flat => PositionStatus::Flat,
            Position::Long { .. } => PositionStatus::Long,
        }
    }

    pub fn is_long(&self) -> bool {
        matches!(self, Position::Long { .. })
    }

    pub fn entry_price(&self) -> Option<f64> {
        match self {
            Position::Long { entry_price, .. } => Some(*entry_price),
            Position::Flat => None,
        }
    }

    pub fn entry_index(&self) -> Option<usize> {
        match self {
            Position::Long { entry_index, .. } => Some(*entry_index),
            Position::Flat => None,
        }
    }

    /// Unrealized P&L at `price`, measured against `capital`.
    pub fn unrealized_pnl(&self, price: f64, capital: f64) -> f64 {
        match self {
            Position::Long { entry_price, .. } => (price - entry_price) / entry_price * capital,
            Position::Flat => 0.0,
        }
    }
}

/// Position tracker for backtesting.
#[derive(Debug, Clone)]
pub struct PositionTracker {
    /// Capital every position is sized at.
    initial_capital: f64,
    /// Fee charged per side (absolute).
    fee_per_side: f64,
    /// Current position.
    position: Position,
    /// Closed trades.
    trades: Vec<Trade>,
    /// Total realized gross P&L.
    realized_pnl: f64,
    /// Total fees paid, including the entry fee of an open position.
    total_fees: f64,
}

impl PositionTracker {
    /// Create a tracker. `fee` is the per-side fraction of initial capital.
    pub fn new(initial_capital: f64, fee: f64) -> Self {
        Self {
            initial_capital,
            fee_per_side: fee * initial_capital,
            position: Position::Flat,
            trades: Vec::new(),
            realized_pnl: 0.0,
            total_fees: 0.0,
        }
    }

    /// Current position.
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Closed trades, in exit order.
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Realized gross P&L.
    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    /// Fees paid so far.
    pub fn total_fees(&self) -> f64 {
        self.total_fees
    }

    /// Open a long at the bar's close. No-op (returns false) when already long.
    pub fn open_long(&mut self, index: usize, bar: &Bar) -> bool {
        if self.position.is_long() {
            return false;
        }
        self.position = Position::Long {
            entry_index: index,
            entry_ts: bar.ts_ms,
            entry_price: bar.close,
        };
        self.total_fees += self.fee_per_side;
        true
    }

    /// Close the long at the bar's close. No-op (returns None) when flat.
    pub fn close_long(&mut self, index: usize, bar: &Bar) -> Option<Trade> {
        let Position::Long {
            entry_index,
            entry_ts,
            entry_price,
        } = self.position
        else {
            return None;
        };

        let pnl = self.position.unrealized_pnl(bar.close, self.initial_capital);
        let trade = Trade {
            entry_index,
            exit_index: index,
            entry_ts,
            exit_ts: bar.ts_ms,
            entry_price,
            exit_price: bar.close,
            fee_paid: 2.0 * self.fee_per_side,
            pnl,
        };

        self.realized_pnl += pnl;
        self.total_fees += self.fee_per_side;
        self.position = Position::Flat;
        self.trades.push(trade.clone());

        Some(trade)
    }

    /// Close out after ruin. A long opened before `index` is closed at the
    /// bar's close like a sell; a long opened on this very bar is dropped
    /// without a trade, keeping `entry_index < exit_index` for every trade.
    pub fn liquidate(&mut self, index: usize, bar: &Bar) -> Option<Trade> {
        match self.position {
            Position::Long { entry_index, .. } if entry_index < index => {
                self.close_long(index, bar)
            }
            Position::Long { .. } => {
                self.position = Position::Flat;
                None
            }
            Position::Flat => None,
        }
    }

    /// Equity marked at `price`: capital plus realized and open P&L, minus
    /// every fee paid so far. Can be negative; the simulator floors it.
    pub fn equity(&self, price: f64) -> f64 {
        self.initial_capital + self.realized_pnl
            + self.position.unrealized_pnl(price, self.initial_capital)
            - self.total_fees
    }

    /// Win rate of closed trades (0 when none).
    pub fn win_rate(&self) -> f64 {
        if self.trades.is_empty() {
            return 0.0;
        }
        let wins = self.trades.iter().filter(|t| t.is_win()).count();
        wins as f64 / self.trades.len() as f64
    }

    /// Give up the trade log and final position.
    pub fn into_parts(self) -> (Position, Vec<Trade>, f64) {
        (self.position, self.trades, self.total_fees)
    }
}
