//! Descriptive statistics.
//!
//! Missing values (NaN, ±inf) are removed before anything is computed.

use serde::{Deserialize, Serialize};

/// Finite values of `sample`, in order.
pub fn finite(sample: &[f64]) -> Vec<f64> {
    sample.iter().copied().filter(|v| v.is_finite()).collect()
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
pub(crate) fn sample_std(values: &[f64], mean: f64) -> f64 {
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (values.len() as f64 - 1.0)).sqrt()
}

/// Quantile of sorted data with linear interpolation between order statistics.
pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Mean, standard deviation and coefficient of variation of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointEstimate {
    /// Finite values used.
    pub n: usize,
    pub mean: f64,
    /// Sample standard deviation (n - 1).
    pub std: f64,
    /// `std / mean`; `None` when the mean is zero.
    pub coefficient_of_variation: Option<f64>,
}

impl PointEstimate {
    /// Requires at least two finite values.
    pub fn from_sample(sample: &[f64]) -> Option<Self> {
        let values = finite(sample);
        if values.len() < 2 {
            return None;
        }

        let mean = mean(&values);
        let std = sample_std(&values, mean);
        let coefficient_of_variation = if mean != 0.0 { Some(std / mean) } else { None };

        Some(Self {
            n: values.len(),
            mean,
            std,
            coefficient_of_variation,
        })
    }
}

/// Count, moments and quartiles of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Describe {
    /// Finite values used.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Sample standard deviation; NaN for a single value.
    pub std: f64,
    /// Smallest value.
    pub min: f64,
    /// First quartile, linear interpolation.
    pub q25: f64,
    /// Second quartile.
    pub median: f64,
    /// Third quartile.
    pub q75: f64,
    /// Largest value.
    pub max: f64,
}

impl Describe {
    pub fn from_sample(sample: &[f64]) -> Option<Self> {
        let mut values = finite(sample);
        if values.is_empty() {
            return None;
        }
        values.sort_by(|a, b| a.total_cmp(b));

        let mean = mean(&values);
        let std = if values.len() > 1 {
            sample_std(&values, mean)
        } else {
            f64::NAN
        };

        Some(Self {
            count: values.len(),
            mean,
            std,
            min: values[0],
            q25: quantile_sorted(&values, 0.25),
            median: quantile_sorted(&values, 0.5),
            q75: quantile_sorted(&values, 0.75),
            max: values[values.len() - 1],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_point_estimate() {
        let est = PointEstimate::from_sample(&[1.0, 2.0, 3.0, f64::NAN]).unwrap();
        assert_eq!(est.n, 3);
        assert_relative_eq!(est.mean, 2.0);
        assert_relative_eq!(est.std, 1.0);
        assert_relative_eq!(est.coefficient_of_variation.unwrap(), 0.5);
    }

    #[test]
    fn test_point_estimate_zero_mean() {
        let est = PointEstimate::from_sample(&[-1.0, 1.0]).unwrap();
        assert!(est.coefficient_of_variation.is_none());
        assert!(PointEstimate::from_sample(&[1.0]).is_none());
    }

    #[test]
    fn test_describe_quartiles() {
        let d = Describe::from_sample(&[4.0, 1.0, 3.0, 2.0, 5.0]).unwrap();
        assert_eq!(d.count, 5);
        assert_relative_eq!(d.min, 1.0);
        assert_relative_eq!(d.q25, 2.0);
        assert_relative_eq!(d.median, 3.0);
        assert_relative_eq!(d.q75, 4.0);
        assert_relative_eq!(d.max, 5.0);

        let d = Describe::from_sample(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_relative_eq!(d.q25, 1.75);
        assert_relative_eq!(d.median, 2.5);
    }

    #[test]
    fn test_describe_single_value() {
        let d = Describe::from_sample(&[0.02]).unwrap();
        assert_eq!(d.count, 1);
        assert!(d.std.is_nan());
        assert!(Describe::from_sample(&[]).is_none());
    }
}
