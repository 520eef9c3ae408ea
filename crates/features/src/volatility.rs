//! Rolling volatility of log returns.
//!
//! One log return per bar after the first. A bar whose price (or whose
//! predecessor's price) is not positive and finite contributes an invalid
//! return; any window holding one reports no volatility, so the output stays
//! aligned to bar positions.

use std::collections::VecDeque;

/// Streaming population standard deviation of the last `window` log returns.
#[derive(Debug, Clone)]
pub struct RollingVolatility {
    window: usize,
    /// Last `window` returns; NaN marks an invalid one.
    returns: VecDeque<f64>,
    prev_price: Option<f64>,
    /// Sums over the valid returns in the window.
    sum: f64,
    sum_sq: f64,
    invalid: usize,
}

impl RollingVolatility {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            returns: VecDeque::with_capacity(window + 1),
            prev_price: None,
            sum: 0.0,
            sum_sq: 0.0,
            invalid: 0,
        }
    }

    /// Feed the next bar's price; returns the volatility once the window is
    /// full of valid returns.
    pub fn add_price(&mut self, price: f64) -> Option<f64> {
        if let Some(prev) = self.prev_price {
            let ret = if is_valid_price(prev) && is_valid_price(price) {
                (price / prev).ln()
            } else {
                f64::NAN
            };
            self.push(ret);
        }
        self.prev_price = Some(price);
        if self.is_ready() {
            self.volatility()
        } else {
            None
        }
    }

    fn push(&mut self, ret: f64) {
        if ret.is_nan() {
            self.invalid += 1;
        } else {
            self.sum += ret;
            self.sum_sq += ret * ret;
        }
        self.returns.push_back(ret);

        if self.returns.len() > self.window {
            match self.returns.pop_front() {
                Some(old) if old.is_nan() => self.invalid -= 1,
                Some(old) => {
                    self.sum -= old;
                    self.sum_sq -= old * old;
                }
                None => {}
            }
        }
    }

    /// Volatility of the returns currently held. None with fewer than two
    /// returns or with an invalid one in the window.
    pub fn volatility(&self) -> Option<f64> {
        let n = self.returns.len();
        if n < 2 || self.invalid > 0 {
            return None;
        }
        let n = n as f64;
        let mean = self.sum / n;
        // Running sums can leave a tiny negative variance
        let variance = (self.sum_sq / n - mean * mean).max(0.0);
        Some(variance.sqrt())
    }

    /// Whether the window holds `window` returns.
    pub fn is_ready(&self) -> bool {
        self.window > 0 && self.returns.len() >= self.window
    }
}

fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Rolling volatility aligned to bar positions: NaN until `window` returns
/// are available (the first value lands at position `window`) and for every
/// window touching an invalid price.
pub fn rolling_volatility(prices: &[f64], window: usize) -> Vec<f64> {
    let mut vol = RollingVolatility::new(window);
    prices
        .iter()
        .map(|&p| vol.add_price(p).unwrap_or(f64::NAN))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_not_ready() {
        let mut vol = RollingVolatility::new(3);
        assert!(vol.volatility().is_none());
        assert!(vol.add_price(100.0).is_none());
        assert!(vol.add_price(101.0).is_none());
        assert!(!vol.is_ready());
    }

    #[test]
    fn test_constant_price() {
        let out = rolling_volatility(&[100.0; 10], 5);
        assert!(out[..5].iter().all(|v| v.is_nan()));
        assert!(out[5..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_known_volatility() {
        // Log returns 0.01, 0.02, 0.03: population std = sqrt(2/3) * 0.01
        let mut prices = vec![100.0_f64];
        for r in [0.01_f64, 0.02, 0.03] {
            let last = prices[prices.len() - 1];
            prices.push(last * r.exp());
        }
        let out = rolling_volatility(&prices, 3);
        assert_abs_diff_eq!(out[3], (2.0_f64 / 3.0).sqrt() * 0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_window_slides() {
        // Returns: +r, -r, +r, then flat; once the window is all flat it is ~0
        let out = rolling_volatility(&[100.0, 110.0, 100.0, 110.0, 110.0, 110.0], 2);
        assert!(out[1].is_nan());
        assert!(out[2] > 0.01);
        assert!(out[4] > 0.01);
        assert_abs_diff_eq!(out[5], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_bad_price_poisons_only_its_windows() {
        let out = rolling_volatility(&[100.0, 101.0, 102.0, -1.0, 101.0, 102.0, 103.0, 104.0], 2);
        assert_eq!(out.len(), 8);
        assert!(out[2].is_finite());
        // Returns into and out of the bad bar are invalid
        assert!(out[3].is_nan());
        assert!(out[4].is_nan());
        assert!(out[5].is_nan());
        assert!(out[6].is_finite());
        assert!(out[7].is_finite());
    }
}
