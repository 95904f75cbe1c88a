//! Conditional return analyzer.
//!
//! Joins monthly returns to regime labels by date and, per regime, regresses
//! the monthly return on the two scaled indicators:
//!
//! ```text
//! y = b0 + b1 * scaled_a + b2 * scaled_b
//! total     = Σ (y - ȳ)²
//! explained = Σ (ŷ - ȳ)²
//! residual  = Σ (y - ŷ)²
//! R²        = explained / total
//! ```
//!
//! Regimes are never pooled. Regressions fan out across regimes with rayon.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::data::{MacroSeries, MonthlyObservation, ObservationDate};
use crate::diagnostics::Describe;
use crate::regime::{ClusterAssignment, RegimeLabel};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConditionalError {
    #[error("Cluster {cluster} has {available} observations, regression needs at least {required}")]
    InsufficientSample {
        cluster: RegimeLabel,
        required: usize,
        available: usize,
    },

    #[error("Unknown cluster {cluster} (k = {k})")]
    UnknownCluster { cluster: RegimeLabel, k: usize },
}

/// One month with its regime, scaled indicators and returns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConditionalRow {
    pub date: ObservationDate,
    pub cluster: RegimeLabel,
    /// Scaled indicator A for the month.
    pub scaled_a: f64,
    /// Scaled indicator B for the month.
    pub scaled_b: f64,
    /// First monthly return of the month.
    pub monthly_return: f64,
    /// Mean monthly return over the month.
    pub avg_monthly_return: f64,
}

/// All joined rows of one regime, in date order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClusterSample {
    pub cluster: RegimeLabel,
    pub rows: Vec<ConditionalRow>,
}

impl ClusterSample {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dates(&self) -> Vec<ObservationDate> {
        self.rows.iter().map(|r| r.date).collect()
    }

    pub fn monthly_returns(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.monthly_return).collect()
    }

    pub fn avg_monthly_returns(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.avg_monthly_return).collect()
    }
}

/// OLS fit and variance decomposition for one regime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionResult {
    pub cluster: RegimeLabel,
    /// Joined rows in the regime.
    pub observations: usize,
    pub intercept: f64,
    /// Coefficients on scaled indicator A and B.
    pub coefficients: [f64; 2],
    /// Sum of squared deviations of the returns from their mean.
    pub total_variance: f64,
    /// Sum of squared deviations of the fitted values from the mean.
    pub explained_variance: f64,
    /// Sum of squared residuals.
    pub residual_variance: f64,
    /// `None` when the returns are constant.
    pub r_squared: Option<f64>,
}

impl RegressionResult {
    pub fn predict(&self, scaled_a: f64, scaled_b: f64) -> f64 {
        self.intercept + self.coefficients[0] * scaled_a + self.coefficients[1] * scaled_b
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReturnRange {
    /// Inclusive lower bound.
    pub min: f64,
    /// Inclusive upper bound.
    pub max: f64,
}

impl ReturnRange {
    fn of(values: impl Iterator<Item = f64>) -> Option<Self> {
        values.fold(None, |range, v| match range {
            None => Some(Self { min: v, max: v }),
            Some(r) => Some(Self {
                min: r.min.min(v),
                max: r.max.max(v),
            }),
        })
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

/// Historical return range of one regime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRange {
    pub cluster: RegimeLabel,
    /// Range of first monthly returns.
    pub monthly_return: ReturnRange,
    /// Range of mean monthly returns.
    pub avg_monthly_return: ReturnRange,
}

/// Per-regime summary of monthly returns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterDescription {
    pub cluster: RegimeLabel,
    /// Joined rows in the regime.
    pub size: usize,
    /// `None` when the regime has no rows.
    pub monthly_return: Option<Describe>,
}

/// Least-squares fit of `y` on two regressors plus intercept.
///
/// Solved on centered data through the 2x2 normal equations; when the
/// regressors are collinear the minimum-norm solution is used.
fn ordinary_least_squares(x: &[[f64; 2]], y: &[f64]) -> (f64, [f64; 2]) {
    let n = y.len() as f64;
    let x_mean = [
        x.iter().map(|r| r[0]).sum::<f64>() / n,
        x.iter().map(|r| r[1]).sum::<f64>() / n,
    ];
    let y_mean = y.iter().sum::<f64>() / n;

    let (mut s11, mut s12, mut s22, mut s1y, mut s2y) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (row, &target) in x.iter().zip(y) {
        let d1 = row[0] - x_mean[0];
        let d2 = row[1] - x_mean[1];
        let dy = target - y_mean;
        s11 += d1 * d1;
        s12 += d1 * d2;
        s22 += d2 * d2;
        s1y += d1 * dy;
        s2y += d2 * dy;
    }

    let trace = s11 + s22;
    let det = s11 * s22 - s12 * s12;
    let beta = if trace <= 0.0 {
        [0.0, 0.0]
    } else if det > 1e-12 * trace * trace {
        [
            (s22 * s1y - s12 * s2y) / det,
            (s11 * s2y - s12 * s1y) / det,
        ]
    } else {
        // rank one: pinv(S) = S / trace(S)²
        let t2 = trace * trace;
        [(s11 * s1y + s12 * s2y) / t2, (s12 * s1y + s22 * s2y) / t2]
    };

    let intercept = y_mean - beta[0] * x_mean[0] - beta[1] * x_mean[1];
    (intercept, beta)
}

/// Regime-conditional view of monthly returns.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalReturnAnalyzer {
    samples: Vec<ClusterSample>,
}

impl ConditionalReturnAnalyzer {
    /// Inner-join macro observations, their labels and monthly returns on date.
    ///
    /// Months with a missing return are dropped.
    pub fn new(
        series: &MacroSeries,
        assignment: &ClusterAssignment,
        monthly: &[MonthlyObservation],
    ) -> Self {
        let by_date: HashMap<ObservationDate, &MonthlyObservation> =
            monthly.iter().map(|m| (m.date, m)).collect();

        let rows: Vec<ConditionalRow> = series
            .observations()
            .iter()
            .zip(&assignment.labels)
            .filter_map(|(obs, &cluster)| {
                let m = by_date.get(&obs.date)?;
                if !m.monthly_return.is_finite() || !m.avg_monthly_return.is_finite() {
                    return None;
                }
                Some(ConditionalRow {
                    date: obs.date,
                    cluster,
                    scaled_a: obs.scaled_a,
                    scaled_b: obs.scaled_b,
                    monthly_return: m.monthly_return,
                    avg_monthly_return: m.avg_monthly_return,
                })
            })
            .collect();

        debug!(
            "Joined {} labeled months with {} return months: {} rows",
            series.len(),
            monthly.len(),
            rows.len()
        );

        Self::from_rows(rows, assignment.k())
    }

    /// Partition already-joined rows into `k` regimes.
    pub fn from_rows(rows: Vec<ConditionalRow>, k: usize) -> Self {
        let mut samples: Vec<ClusterSample> = (0..k)
            .map(|cluster| ClusterSample {
                cluster,
                rows: Vec::new(),
            })
            .collect();
        for row in rows {
            if let Some(sample) = samples.get_mut(row.cluster) {
                sample.rows.push(row);
            }
        }
        for sample in &mut samples {
            sample.rows.sort_by_key(|r| r.date);
        }
        Self { samples }
    }

    pub fn k(&self) -> usize {
        self.samples.len()
    }

    pub fn samples(&self) -> &[ClusterSample] {
        &self.samples
    }

    pub fn sample(&self, cluster: RegimeLabel) -> Option<&ClusterSample> {
        self.samples.get(cluster)
    }

    /// Regression and variance decomposition for one regime.
    pub fn fit_cluster(&self, cluster: RegimeLabel) -> Result<RegressionResult, ConditionalError> {
        let sample = self.sample(cluster).ok_or(ConditionalError::UnknownCluster {
            cluster,
            k: self.k(),
        })?;
        if sample.len() < 2 {
            return Err(ConditionalError::InsufficientSample {
                cluster,
                required: 2,
                available: sample.len(),
            });
        }

        let x: Vec<[f64; 2]> = sample.rows.iter().map(|r| [r.scaled_a, r.scaled_b]).collect();
        let y = sample.monthly_returns();
        let (intercept, coefficients) = ordinary_least_squares(&x, &y);

        let y_mean = y.iter().sum::<f64>() / y.len() as f64;
        let (mut total, mut explained, mut residual) = (0.0, 0.0, 0.0);
        for (row, &target) in x.iter().zip(&y) {
            let fitted = intercept + coefficients[0] * row[0] + coefficients[1] * row[1];
            total += (target - y_mean).powi(2);
            explained += (fitted - y_mean).powi(2);
            residual += (target - fitted).powi(2);
        }
        let r_squared = if total > 0.0 { Some(explained / total) } else { None };

        Ok(RegressionResult {
            cluster,
            observations: y.len(),
            intercept,
            coefficients,
            total_variance: total,
            explained_variance: explained,
            residual_variance: residual,
            r_squared,
        })
    }

    /// One result per regime, in cluster order.
    pub fn regressions(&self) -> Vec<Result<RegressionResult, ConditionalError>> {
        let results: Vec<_> = (0..self.k())
            .into_par_iter()
            .map(|cluster| self.fit_cluster(cluster))
            .collect();

        for result in &results {
            match result {
                Ok(r) => info!(
                    "Cluster {}: n = {}, R² = {}",
                    r.cluster,
                    r.observations,
                    r.r_squared.map_or("n/a".to_string(), |v| format!("{:.4}", v))
                ),
                Err(e) => info!("{}", e),
            }
        }
        results
    }

    /// Min/max of monthly and averaged monthly returns for every non-empty regime.
    pub fn prediction_ranges(&self) -> Vec<PredictionRange> {
        self.samples
            .iter()
            .filter_map(|s| {
                Some(PredictionRange {
                    cluster: s.cluster,
                    monthly_return: ReturnRange::of(s.monthly_returns().into_iter())?,
                    avg_monthly_return: ReturnRange::of(s.avg_monthly_returns().into_iter())?,
                })
            })
            .collect()
    }

    pub fn describe(&self) -> Vec<ClusterDescription> {
        self.samples
            .iter()
            .map(|s| ClusterDescription {
                cluster: s.cluster,
                size: s.len(),
                monthly_return: Describe::from_sample(&s.monthly_returns()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MacroRow, MacroSeries};
    use crate::regime::{RegimeCentroid, ScalingStrategy};
    use approx::assert_relative_eq;
    use chrono::{Months, NaiveDate};

    fn month(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2001, 1, 1)
            .unwrap()
            .checked_add_months(Months::new(i as u32))
            .unwrap()
    }

    fn row(i: usize, cluster: RegimeLabel, a: f64, b: f64, y: f64) -> ConditionalRow {
        ConditionalRow {
            date: month(i),
            cluster,
            scaled_a: a,
            scaled_b: b,
            monthly_return: y,
            avg_monthly_return: y / 2.0,
        }
    }

    #[test]
    fn test_exact_linear_fit() {
        let points = [(0.0, 1.0), (1.0, 0.5), (2.0, -1.0), (-1.0, 0.3), (0.5, 2.0), (1.5, 1.5)];
        let rows = points
            .iter()
            .enumerate()
            .map(|(i, &(a, b))| row(i, 0, a, b, 0.01 + 0.02 * a - 0.03 * b))
            .collect();
        let analyzer = ConditionalReturnAnalyzer::from_rows(rows, 1);

        let result = analyzer.fit_cluster(0).unwrap();
        assert_eq!(result.observations, 6);
        assert_relative_eq!(result.intercept, 0.01, epsilon = 1e-12);
        assert_relative_eq!(result.coefficients[0], 0.02, epsilon = 1e-12);
        assert_relative_eq!(result.coefficients[1], -0.03, epsilon = 1e-12);
        assert_relative_eq!(result.residual_variance, 0.0, epsilon = 1e-20);
        assert_relative_eq!(result.r_squared.unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_variance_decomposition_identity() {
        let ys = [0.02, -0.01, 0.03, 0.00, -0.04, 0.05, 0.01, -0.02];
        let rows: Vec<ConditionalRow> = ys
            .iter()
            .enumerate()
            .map(|(i, &y)| {
                let a = (i as f64 * 0.7).sin();
                let b = (i as f64 * 1.3).cos();
                row(i, i % 2, a, b, y)
            })
            .collect();
        let analyzer = ConditionalReturnAnalyzer::from_rows(rows, 2);

        for result in analyzer.regressions() {
            let r = result.unwrap();
            assert_relative_eq!(
                r.total_variance,
                r.explained_variance + r.residual_variance,
                epsilon = 1e-12
            );
            let r2 = r.r_squared.unwrap();
            assert!((0.0..=1.0 + 1e-12).contains(&r2));
        }
    }

    #[test]
    fn test_collinear_regressors() {
        let rows = (0..5)
            .map(|i| {
                let x = i as f64;
                row(i, 0, x, x, 0.5 + 0.2 * x)
            })
            .collect();
        let analyzer = ConditionalReturnAnalyzer::from_rows(rows, 1);
        let r = analyzer.fit_cluster(0).unwrap();

        assert_relative_eq!(r.coefficients[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(r.coefficients[1], 0.1, epsilon = 1e-12);
        assert_relative_eq!(r.intercept, 0.5, epsilon = 1e-12);
        assert_relative_eq!(r.residual_variance, 0.0, epsilon = 1e-20);
    }

    #[test]
    fn test_single_member_cluster_rejected() {
        let rows = vec![
            row(0, 0, 0.0, 0.0, 0.01),
            row(1, 0, 1.0, 1.0, 0.02),
            row(2, 1, 0.5, 0.5, 0.03),
        ];
        let analyzer = ConditionalReturnAnalyzer::from_rows(rows, 3);
        let results = analyzer.regressions();

        assert!(results[0].is_ok());
        assert_eq!(
            results[1],
            Err(ConditionalError::InsufficientSample {
                cluster: 1,
                required: 2,
                available: 1
            })
        );
        assert_eq!(
            results[2],
            Err(ConditionalError::InsufficientSample {
                cluster: 2,
                required: 2,
                available: 0
            })
        );
        assert_eq!(
            analyzer.fit_cluster(5),
            Err(ConditionalError::UnknownCluster { cluster: 5, k: 3 })
        );
    }

    #[test]
    fn test_constant_returns_have_no_r_squared() {
        let rows = vec![
            row(0, 0, 0.0, 1.0, 0.25),
            row(1, 0, 1.0, 0.0, 0.25),
            row(2, 0, 2.0, 3.0, 0.25),
        ];
        let analyzer = ConditionalReturnAnalyzer::from_rows(rows, 1);
        let result = analyzer.fit_cluster(0).unwrap();

        assert_eq!(result.total_variance, 0.0);
        assert_eq!(result.r_squared, None);
        assert_relative_eq!(result.intercept, 0.25, epsilon = 1e-12);
        assert_relative_eq!(result.coefficients[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(result.coefficients[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_prediction_ranges() {
        let rows = vec![
            row(0, 0, 0.0, 0.0, 0.04),
            row(1, 0, 1.0, 1.0, -0.02),
            row(2, 0, 0.5, 0.5, 0.01),
        ];
        let analyzer = ConditionalReturnAnalyzer::from_rows(rows, 2);
        let ranges = analyzer.prediction_ranges();

        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].cluster, 0);
        assert_relative_eq!(ranges[0].monthly_return.min, -0.02);
        assert_relative_eq!(ranges[0].monthly_return.max, 0.04);
        assert_relative_eq!(ranges[0].avg_monthly_return.min, -0.01);
        assert_relative_eq!(ranges[0].avg_monthly_return.max, 0.02);

        let described = analyzer.describe();
        assert_eq!(described[0].size, 3);
        assert!(described[1].monthly_return.is_none());
    }

    #[test]
    fn test_join_drops_unmatched_and_missing() {
        let rows: Vec<MacroRow> = (0..4)
            .map(|i| MacroRow {
                date: month(i),
                indicator_a: 4.0 + i as f64,
                indicator_b: 2.0 - i as f64 * 0.5,
            })
            .collect();
        let series = MacroSeries::from_raw(rows, ScalingStrategy::ZScore).unwrap();
        let assignment = ClusterAssignment {
            labels: vec![0, 0, 1, 1],
            centroids: vec![
                RegimeCentroid {
                    cluster: 0,
                    scaled_a: -1.0,
                    scaled_b: 1.0,
                },
                RegimeCentroid {
                    cluster: 1,
                    scaled_a: 1.0,
                    scaled_b: -1.0,
                },
            ],
            inertia: 0.0,
            iterations: 1,
        };
        let monthly: Vec<MonthlyObservation> = [
            (0, 100.0, 0.01, 0.01),
            (1, 101.0, f64::NAN, 0.0),
            (3, 102.0, -0.02, -0.01),
        ]
        .iter()
        .map(|&(i, first_price, monthly_return, avg_monthly_return)| MonthlyObservation {
            date: month(i),
            first_price,
            monthly_return,
            avg_monthly_return,
        })
        .collect();

        let analyzer = ConditionalReturnAnalyzer::new(&series, &assignment, &monthly);
        assert_eq!(analyzer.sample(0).unwrap().dates(), vec![month(0)]);
        assert_eq!(analyzer.sample(1).unwrap().dates(), vec![month(3)]);
        let obs = series.observations()[3];
        assert_relative_eq!(analyzer.sample(1).unwrap().rows[0].scaled_a, obs.scaled_a);
    }
}
