//! Simple and exponential moving averages.

/// Simple moving average over `window` values.
///
/// Positions before `window - 1` are NaN. A NaN input poisons every window
/// that contains it.
pub fn sma(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if window == 0 || n < window {
        return result;
    }

    let mut sum = 0.0;
    let mut nan_count = 0usize;
    for i in 0..n {
        let v = values[i];
        if v.is_nan() {
            nan_count += 1;
        } else {
            sum += v;
        }

        if i >= window {
            let old = values[i - window];
            if old.is_nan() {
                nan_count -= 1;
            } else {
                sum -= old;
            }
        }

        if i + 1 >= window && nan_count == 0 {
            result[i] = sum / window as f64;
        }
    }

    result
}

/// Exponential moving average with `alpha = 2 / (window + 1)`.
///
/// Seeded with the SMA of the first `window` values at position
/// `window - 1`. A NaN after the seed leaves the rest of the series NaN.
pub fn ema(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if window == 0 || n < window {
        return result;
    }

    let seed_window = &values[..window];
    if seed_window.iter().any(|v| v.is_nan()) {
        return result;
    }
    let seed = seed_window.iter().sum::<f64>() / window as f64;
    result[window - 1] = seed;

    let alpha = 2.0 / (window as f64 + 1.0);
    let mut prev = seed;
    for i in window..n {
        if values[i].is_nan() {
            break;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }

    result
}
