//! Bollinger bands: SMA +/- `num_std` rolling standard deviations.
//!
//! Uses the sample standard deviation (n - 1) of the window.

use crate::moving_average::sma;

/// Upper, middle and lower bands, aligned to bar positions.
#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Compute Bollinger bands. Windows shorter than 2 have no defined spread.
pub fn bollinger(values: &[f64], window: usize, num_std: f64) -> BollingerBands {
    let n = values.len();
    let middle = sma(values, window);
    let mut upper = vec![f64::NAN; n];
    let mut lower = vec![f64::NAN; n];

    if window >= 2 {
        for i in (window - 1)..n {
            let mean = middle[i];
            if mean.is_nan() {
                continue;
            }
            let slice = &values[i + 1 - window..=i];
            let var = slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (window - 1) as f64;
            let band = num_std * var.sqrt();
            upper[i] = mean + band;
            lower[i] = mean - band;
        }
    }

    BollingerBands {
        upper,
        middle,
        lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_constant_series_collapses() {
        let bands = bollinger(&[10.0; 5], 3, 2.0);
        assert_abs_diff_eq!(bands.upper[4], 10.0);
        assert_abs_diff_eq!(bands.lower[4], 10.0);
    }

    #[test]
    fn test_known_values() {
        // window [1, 2, 3]: mean 2, sample std 1
        let bands = bollinger(&[1.0, 2.0, 3.0], 3, 2.0);
        assert!(bands.upper[1].is_nan());
        assert_abs_diff_eq!(bands.middle[2], 2.0);
        assert_abs_diff_eq!(bands.upper[2], 4.0);
        assert_abs_diff_eq!(bands.lower[2], 0.0);
    }

    #[test]
    fn test_ordering() {
        let bands = bollinger(&[3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0], 4, 1.5);
        for i in 3..8 {
            assert!(bands.lower[i] <= bands.middle[i]);
            assert!(bands.middle[i] <= bands.upper[i]);
        }
    }
}
