//! Momentum and rate of change over a fixed lookback.

/// `values[i] - values[i - window]`.
pub fn momentum(values: &[f64], window: usize) -> Vec<f64> {
    lagged(values, window, |now, then| now - then)
}

/// `values[i] / values[i - window] - 1`. NaN where the lagged value is zero.
pub fn roc(values: &[f64], window: usize) -> Vec<f64> {
    lagged(values, window, |now, then| {
        if then == 0.0 {
            f64::NAN
        } else {
            now / then - 1.0
        }
    })
}

fn lagged(values: &[f64], window: usize, f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if window == 0 {
        return result;
    }
    for i in window..n {
        result[i] = f(values[i], values[i - window]);
    }
    result
}
