//! Normality test suite for return samples.
//!
//! Four independent tests, none authoritative on its own:
//! - D'Agostino-Pearson omnibus K² (skewness and kurtosis z-tests)
//! - Shapiro-Wilk W (Royston's approximation, 3 <= n <= 5000)
//! - Anderson-Darling A² against a named reference distribution, with a
//!   critical-value table at 15 / 10 / 5 / 2.5 / 1 % significance
//! - One-sample two-sided Kolmogorov-Smirnov D against N(0, 1)
//!
//! NaNs are dropped before any statistic is computed.

use std::f64::consts::{FRAC_1_SQRT_2, PI};

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};
use thiserror::Error;
use tracing::warn;

use super::descriptive::{finite, mean, sample_std};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiagnosticsError {
    #[error("{test} needs at least {required} observations, got {available}")]
    InsufficientSample {
        test: &'static str,
        required: usize,
        available: usize,
    },

    #[error("Sample has zero variance")]
    ZeroVariance,

    #[error("Value {0} is outside the support of the reference distribution")]
    OutOfSupport(f64),

    #[error("Distribution error: {0}")]
    Distribution(String),
}

/// Statistic and p-value of a test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Test statistic.
    pub statistic: f64,
    /// Probability of a statistic at least this extreme under the null.
    pub p_value: f64,
}

impl TestOutcome {
    /// Whether the null hypothesis is rejected at level `alpha`.
    pub fn rejects(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

/// Reference distribution for the Anderson-Darling test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceDistribution {
    #[default]
    Normal,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriticalValue {
    /// Significance level in percent (e.g. 5.0).
    pub significance_pct: f64,
    /// Statistic above which the null is rejected.
    pub value: f64,
}

/// Anderson-Darling statistic with its critical-value table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AndersonDarling {
    pub reference: ReferenceDistribution,
    pub statistic: f64,
    /// Ordered from the loosest to the strictest level.
    pub critical_values: Vec<CriticalValue>,
}

impl AndersonDarling {
    /// `Some(true)` if the statistic exceeds the critical value at the given
    /// significance level; `None` if the level is not tabulated.
    pub fn rejects_at(&self, significance_pct: f64) -> Option<bool> {
        self.critical_values
            .iter()
            .find(|c| (c.significance_pct - significance_pct).abs() < 1e-9)
            .map(|c| self.statistic > c.value)
    }
}

/// Results of all four tests on one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalityReport {
    /// Finite values tested.
    pub n: usize,
    pub omnibus: TestOutcome,
    pub shapiro_wilk: TestOutcome,
    pub anderson_darling: AndersonDarling,
    pub kolmogorov_smirnov: TestOutcome,
}

/// One point of a normal probability (QQ) comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QqPoint {
    /// Standard normal quantile.
    pub theoretical: f64,
    /// Ordered standardized value.
    pub sample: f64,
}

const AD_SIGNIFICANCE: [f64; 5] = [15.0, 10.0, 5.0, 2.5, 1.0];
const AD_NORMAL: [f64; 5] = [0.576, 0.656, 0.787, 0.918, 1.092];
const AD_EXPONENTIAL: [f64; 5] = [0.922, 1.078, 1.341, 1.606, 1.957];

// Royston (1995) polynomial coefficients
const SW_C1: [f64; 6] = [0.0, 0.221157, -0.147981, -2.071190, 4.434685, -2.706056];
const SW_C2: [f64; 6] = [0.0, 0.042981, -0.293762, -1.752461, 5.682633, -3.582633];
const SW_C3: [f64; 4] = [0.5440, -0.39978, 0.025054, -6.714e-4];
const SW_C4: [f64; 4] = [1.3822, -0.77857, 0.062767, -0.0020322];
const SW_C5: [f64; 4] = [-1.5861, -0.31082, -0.083751, 0.0038915];
const SW_C6: [f64; 3] = [-0.4803, -0.082676, 0.0030302];
const SW_GAMMA: [f64; 2] = [-2.273, 0.459];
const SW_MAX_N: usize = 5000;

fn standard_normal() -> Result<Normal, DiagnosticsError> {
    Normal::new(0.0, 1.0).map_err(|e| DiagnosticsError::Distribution(e.to_string()))
}

fn poly(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

fn prepare(
    sample: &[f64],
    test: &'static str,
    required: usize,
) -> Result<Vec<f64>, DiagnosticsError> {
    let values = finite(sample);
    if values.len() < required {
        return Err(DiagnosticsError::InsufficientSample {
            test,
            required,
            available: values.len(),
        });
    }
    Ok(values)
}

/// Population central moments m2, m3, m4.
fn central_moments(values: &[f64], mean: f64) -> (f64, f64, f64) {
    let n = values.len() as f64;
    let (m2, m3, m4) = values.iter().fold((0.0, 0.0, 0.0), |(s2, s3, s4), v| {
        let d = v - mean;
        let d2 = d * d;
        (s2 + d2, s3 + d2 * d, s4 + d2 * d2)
    });
    (m2 / n, m3 / n, m4 / n)
}

fn skewness_z(b1: f64, n: f64) -> f64 {
    let y = b1 * ((n + 1.0) * (n + 3.0) / (6.0 * (n - 2.0))).sqrt();
    let beta2 = 3.0 * (n * n + 27.0 * n - 70.0) * (n + 1.0) * (n + 3.0)
        / ((n - 2.0) * (n + 5.0) * (n + 7.0) * (n + 9.0));
    let w2 = -1.0 + (2.0 * (beta2 - 1.0)).sqrt();
    let delta = 1.0 / (0.5 * w2.ln()).sqrt();
    let alpha = (2.0 / (w2 - 1.0)).sqrt();
    delta * (y / alpha).asinh()
}

fn kurtosis_z(b2: f64, n: f64) -> f64 {
    let expected = 3.0 * (n - 1.0) / (n + 1.0);
    let var_b2 = 24.0 * n * (n - 2.0) * (n - 3.0) / ((n + 1.0).powi(2) * (n + 3.0) * (n + 5.0));
    let x = (b2 - expected) / var_b2.sqrt();

    let sqrt_beta1 = 6.0 * (n * n - 5.0 * n + 2.0) / ((n + 7.0) * (n + 9.0))
        * (6.0 * (n + 3.0) * (n + 5.0) / (n * (n - 2.0) * (n - 3.0))).sqrt();
    let a = 6.0
        + 8.0 / sqrt_beta1 * (2.0 / sqrt_beta1 + (1.0 + 4.0 / (sqrt_beta1 * sqrt_beta1)).sqrt());

    let term1 = 1.0 - 2.0 / (9.0 * a);
    let denom = 1.0 + x * (2.0 / (a - 4.0)).sqrt();
    let term2 = if denom == 0.0 {
        f64::NAN
    } else {
        denom.signum() * ((1.0 - 2.0 / a) / denom.abs()).cbrt()
    };

    (term1 - term2) / (2.0 / (9.0 * a)).sqrt()
}

/// D'Agostino-Pearson omnibus test. K² is χ²(2) under normality.
pub fn omnibus_test(sample: &[f64]) -> Result<TestOutcome, DiagnosticsError> {
    let x = prepare(sample, "omnibus test", 8)?;
    let n = x.len() as f64;
    let (m2, m3, m4) = central_moments(&x, mean(&x));
    if m2 <= 0.0 {
        return Err(DiagnosticsError::ZeroVariance);
    }

    let z_skew = skewness_z(m3 / m2.powf(1.5), n);
    let z_kurt = kurtosis_z(m4 / (m2 * m2), n);
    let k2 = z_skew * z_skew + z_kurt * z_kurt;

    let chi2 = ChiSquared::new(2.0).map_err(|e| DiagnosticsError::Distribution(e.to_string()))?;
    Ok(TestOutcome {
        statistic: k2,
        p_value: chi2.sf(k2),
    })
}

/// Upper-half Shapiro-Wilk coefficients, largest first.
fn shapiro_wilk_coefficients(n: usize) -> Result<Vec<f64>, DiagnosticsError> {
    if n == 3 {
        return Ok(vec![FRAC_1_SQRT_2]);
    }

    let normal = standard_normal()?;
    let nf = n as f64;
    let half = n / 2;

    let m: Vec<f64> = (1..=half)
        .map(|i| -normal.inverse_cdf((i as f64 - 0.375) / (nf + 0.25)))
        .collect();
    let summ2 = 2.0 * m.iter().map(|v| v * v).sum::<f64>();
    let ssumm2 = summ2.sqrt();
    let rsn = 1.0 / nf.sqrt();

    let mut a = vec![0.0; half];
    a[0] = poly(&SW_C1, rsn) + m[0] / ssumm2;

    if n > 5 {
        a[1] = poly(&SW_C2, rsn) + m[1] / ssumm2;
        let fac = ((summ2 - 2.0 * m[0] * m[0] - 2.0 * m[1] * m[1])
            / (1.0 - 2.0 * a[0] * a[0] - 2.0 * a[1] * a[1]))
            .sqrt();
        for i in 2..half {
            a[i] = m[i] / fac;
        }
    } else {
        let fac = ((summ2 - 2.0 * m[0] * m[0]) / (1.0 - 2.0 * a[0] * a[0])).sqrt();
        for i in 1..half {
            a[i] = m[i] / fac;
        }
    }

    Ok(a)
}

fn shapiro_wilk_p_value(w: f64, n: usize) -> Result<f64, DiagnosticsError> {
    if w >= 1.0 {
        return Ok(1.0);
    }

    let nf = n as f64;
    if n == 3 {
        let p = 6.0 / PI * (w.sqrt().asin() - PI / 3.0);
        return Ok(p.clamp(0.0, 1.0));
    }

    let w1 = (1.0 - w).ln();
    let (y, m, s) = if n <= 11 {
        let gamma = poly(&SW_GAMMA, nf);
        if w1 >= gamma {
            return Ok(0.0);
        }
        (-(gamma - w1).ln(), poly(&SW_C3, nf), poly(&SW_C4, nf).exp())
    } else {
        let ln_n = nf.ln();
        (w1, poly(&SW_C5, ln_n), poly(&SW_C6, ln_n).exp())
    };

    Ok(standard_normal()?.sf((y - m) / s))
}

/// Shapiro-Wilk test.
pub fn shapiro_wilk(sample: &[f64]) -> Result<TestOutcome, DiagnosticsError> {
    let mut x = prepare(sample, "Shapiro-Wilk test", 3)?;
    if x.len() > SW_MAX_N {
        warn!(
            "Shapiro-Wilk p-value approximation is calibrated up to n = {}, got {}",
            SW_MAX_N,
            x.len()
        );
    }
    x.sort_by(|a, b| a.total_cmp(b));

    let n = x.len();
    let mean = mean(&x);
    let ss: f64 = x.iter().map(|v| (v - mean).powi(2)).sum();
    if ss <= 0.0 {
        return Err(DiagnosticsError::ZeroVariance);
    }

    let a = shapiro_wilk_coefficients(n)?;
    let b: f64 = a
        .iter()
        .enumerate()
        .map(|(i, coef)| coef * (x[n - 1 - i] - x[i]))
        .sum();
    let w = (b * b / ss).min(1.0);

    Ok(TestOutcome {
        statistic: w,
        p_value: shapiro_wilk_p_value(w, n)?,
    })
}

/// Anderson-Darling test against `reference`, with location/scale estimated from the sample.
pub fn anderson_darling(
    sample: &[f64],
    reference: ReferenceDistribution,
) -> Result<AndersonDarling, DiagnosticsError> {
    let mut x = prepare(sample, "Anderson-Darling test", 2)?;
    x.sort_by(|a, b| a.total_cmp(b));
    let n = x.len();
    let nf = n as f64;
    let mean = mean(&x);

    // ln F(x_i) and ln(1 - F(x_i))
    let (log_cdf, log_sf): (Vec<f64>, Vec<f64>) = match reference {
        ReferenceDistribution::Normal => {
            let std = sample_std(&x, mean);
            if std <= 0.0 {
                return Err(DiagnosticsError::ZeroVariance);
            }
            let normal = standard_normal()?;
            x.iter()
                .map(|v| {
                    let z = (v - mean) / std;
                    (normal.cdf(z).ln(), normal.sf(z).ln())
                })
                .unzip()
        }
        ReferenceDistribution::Exponential => {
            if let Some(&bad) = x.iter().find(|v| **v < 0.0) {
                return Err(DiagnosticsError::OutOfSupport(bad));
            }
            if mean <= 0.0 {
                return Err(DiagnosticsError::ZeroVariance);
            }
            x.iter()
                .map(|v| {
                    let w = v / mean;
                    ((-(-w).exp_m1()).ln(), -w)
                })
                .unzip()
        }
    };

    let s: f64 = (0..n)
        .map(|i| (2.0 * (i + 1) as f64 - 1.0) / nf * (log_cdf[i] + log_sf[n - 1 - i]))
        .sum();
    let statistic = -nf - s;

    let (table, adjustment) = match reference {
        ReferenceDistribution::Normal => (AD_NORMAL, 1.0 + 4.0 / nf - 25.0 / (nf * nf)),
        ReferenceDistribution::Exponential => (AD_EXPONENTIAL, 1.0 + 0.6 / nf),
    };
    let critical_values = AD_SIGNIFICANCE
        .iter()
        .zip(table.iter())
        .map(|(&significance_pct, &value)| CriticalValue {
            significance_pct,
            value: value / adjustment,
        })
        .collect();

    Ok(AndersonDarling {
        reference,
        statistic,
        critical_values,
    })
}

/// Kolmogorov survival function with Stephens' small-sample correction.
fn kolmogorov_p_value(d: f64, n: usize) -> f64 {
    let sqrt_n = (n as f64).sqrt();
    let lambda = (sqrt_n + 0.12 + 0.11 / sqrt_n) * d;
    if lambda < 0.2 {
        return 1.0;
    }

    let mut sum = 0.0;
    for j in 1..=100 {
        let term = (-2.0 * (j * j) as f64 * lambda * lambda).exp();
        sum += if j % 2 == 1 { term } else { -term };
        if term < 1e-16 {
            break;
        }
    }
    (2.0 * sum).clamp(0.0, 1.0)
}

/// One-sample two-sided Kolmogorov-Smirnov test against the standard normal.
///
/// The sample is compared as given; standardize it first to test shape only.
pub fn kolmogorov_smirnov(sample: &[f64]) -> Result<TestOutcome, DiagnosticsError> {
    let mut x = prepare(sample, "Kolmogorov-Smirnov test", 1)?;
    x.sort_by(|a, b| a.total_cmp(b));
    let n = x.len();
    let nf = n as f64;
    let normal = standard_normal()?;

    let (d_plus, d_minus) = x
        .iter()
        .enumerate()
        .fold((0.0f64, 0.0f64), |(dp, dm), (i, v)| {
            let f = normal.cdf(*v);
            (
                dp.max((i + 1) as f64 / nf - f),
                dm.max(f - i as f64 / nf),
            )
        });
    let d = d_plus.max(d_minus);

    Ok(TestOutcome {
        statistic: d,
        p_value: kolmogorov_p_value(d, n),
    })
}

/// `(x - mean) / std` over the finite values of `sample`.
pub fn standardize(sample: &[f64]) -> Result<Vec<f64>, DiagnosticsError> {
    let x = prepare(sample, "standardization", 2)?;
    let mean = mean(&x);
    let std = sample_std(&x, mean);
    if std <= 0.0 {
        return Err(DiagnosticsError::ZeroVariance);
    }
    Ok(x.iter().map(|v| (v - mean) / std).collect())
}

/// Sorted standardized sample against Blom normal quantiles.
pub fn qq_points(sample: &[f64]) -> Result<Vec<QqPoint>, DiagnosticsError> {
    let mut z = standardize(sample)?;
    z.sort_by(|a, b| a.total_cmp(b));
    let normal = standard_normal()?;
    let nf = z.len() as f64;

    Ok(z
        .into_iter()
        .enumerate()
        .map(|(i, sample)| QqPoint {
            theoretical: normal.inverse_cdf((i as f64 + 1.0 - 0.375) / (nf + 0.25)),
            sample,
        })
        .collect())
}

/// Runs the four tests on one sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalitySuite {
    reference: ReferenceDistribution,
}

impl NormalitySuite {
    pub fn new(reference: ReferenceDistribution) -> Self {
        Self { reference }
    }

    pub fn run(&self, sample: &[f64]) -> Result<NormalityReport, DiagnosticsError> {
        Ok(NormalityReport {
            n: finite(sample).len(),
            omnibus: omnibus_test(sample)?,
            shapiro_wilk: shapiro_wilk(sample)?,
            anderson_darling: anderson_darling(sample, self.reference)?,
            kolmogorov_smirnov: kolmogorov_smirnov(sample)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Evenly spaced standard normal quantiles.
    fn normal_sample(n: usize) -> Vec<f64> {
        let normal = Normal::new(0.0, 1.0).unwrap();
        (1..=n)
            .map(|i| normal.inverse_cdf((i as f64 - 0.5) / n as f64))
            .collect()
    }

    /// Evenly spaced unit exponential quantiles.
    fn exponential_sample(n: usize) -> Vec<f64> {
        (1..=n)
            .map(|i| -(1.0 - (i as f64 - 0.5) / n as f64).ln())
            .collect()
    }

    #[test]
    fn test_normal_sample_not_rejected() {
        let report = NormalitySuite::default().run(&normal_sample(200)).unwrap();
        assert_eq!(report.n, 200);
        assert!(!report.omnibus.rejects(0.05));
        assert!(!report.shapiro_wilk.rejects(0.05));
        assert_eq!(report.anderson_darling.rejects_at(5.0), Some(false));
        assert!(!report.kolmogorov_smirnov.rejects(0.05));
    }

    #[test]
    fn test_skewed_sample_rejected() {
        let sample = exponential_sample(200);
        let report = NormalitySuite::default().run(&sample).unwrap();
        assert!(report.omnibus.rejects(0.01));
        assert!(report.shapiro_wilk.rejects(0.01));
        assert_eq!(report.anderson_darling.rejects_at(1.0), Some(true));
    }

    #[test]
    fn test_anderson_darling_exponential_reference() {
        let ad =
            anderson_darling(&exponential_sample(200), ReferenceDistribution::Exponential).unwrap();
        assert_eq!(ad.critical_values.len(), 5);
        assert_eq!(ad.rejects_at(5.0), Some(false));
        assert_eq!(ad.rejects_at(7.0), None);

        let err = anderson_darling(&[-1.0, 2.0, 3.0], ReferenceDistribution::Exponential);
        assert_eq!(err, Err(DiagnosticsError::OutOfSupport(-1.0)));
    }

    #[test]
    fn test_anderson_darling_critical_adjustment() {
        let ad = anderson_darling(&normal_sample(50), ReferenceDistribution::Normal).unwrap();
        let adj = 1.0 + 4.0 / 50.0 - 25.0 / 2500.0;
        assert_relative_eq!(ad.critical_values[2].value, 0.787 / adj, epsilon = 1e-12);
        assert_eq!(ad.critical_values[2].significance_pct, 5.0);
    }

    #[test]
    fn test_shapiro_wilk_three_points() {
        let outcome = shapiro_wilk(&[1.0, 2.0, 4.0]).unwrap();
        assert_relative_eq!(outcome.statistic, 27.0 / 28.0, epsilon = 1e-12);
        assert!(outcome.p_value > 0.6 && outcome.p_value < 0.7);

        let perfect = shapiro_wilk(&[1.0, 2.0, 3.0]).unwrap();
        assert_relative_eq!(perfect.statistic, 1.0, epsilon = 1e-12);
        assert_relative_eq!(perfect.p_value, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_shapiro_wilk_small_samples() {
        for n in 4..=11 {
            let outcome = shapiro_wilk(&normal_sample(n)).unwrap();
            assert!(outcome.statistic > 0.9 && outcome.statistic <= 1.0, "n = {}", n);
            assert!(outcome.p_value > 0.05, "n = {}", n);
        }
    }

    #[test]
    fn test_kolmogorov_smirnov_far_sample() {
        let sample: Vec<f64> = (0..50).map(|i| 10.0 + i as f64).collect();
        let outcome = kolmogorov_smirnov(&sample).unwrap();
        assert_relative_eq!(outcome.statistic, 1.0, epsilon = 1e-9);
        assert!(outcome.p_value < 1e-10);
    }

    #[test]
    fn test_nan_dropped_not_imputed() {
        let mut sample = normal_sample(30);
        let clean = omnibus_test(&sample).unwrap();
        sample.push(f64::NAN);
        sample.insert(0, f64::NAN);
        let with_nan = omnibus_test(&sample).unwrap();
        assert_eq!(clean, with_nan);
    }

    #[test]
    fn test_insufficient_sample() {
        let result = omnibus_test(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(
            result,
            Err(DiagnosticsError::InsufficientSample {
                test: "omnibus test",
                required: 8,
                available: 5
            })
        );
        assert!(matches!(
            shapiro_wilk(&[1.0, f64::NAN]),
            Err(DiagnosticsError::InsufficientSample { .. })
        ));
    }

    #[test]
    fn test_zero_variance() {
        assert_eq!(omnibus_test(&[1.0; 10]), Err(DiagnosticsError::ZeroVariance));
        assert_eq!(standardize(&[2.0; 4]), Err(DiagnosticsError::ZeroVariance));
    }

    #[test]
    fn test_standardize_and_qq() {
        let z = standardize(&[1.0, 2.0, f64::NAN, 3.0]).unwrap();
        assert_eq!(z.len(), 3);
        assert_relative_eq!(z[0], -1.0, epsilon = 1e-12);
        assert_relative_eq!(z[2], 1.0, epsilon = 1e-12);

        let qq = qq_points(&normal_sample(21)).unwrap();
        assert_eq!(qq.len(), 21);
        assert_relative_eq!(qq[10].theoretical, 0.0, epsilon = 1e-9);
        assert!(qq.windows(2).all(|w| w[0].sample <= w[1].sample));
    }
}
