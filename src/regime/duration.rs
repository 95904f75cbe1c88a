//! Duration distribution tester.
//!
//! Regime durations (rows between consecutive changepoints) are scored
//! against two independent null hypotheses:
//! - continuous time: exponential with location = min, scale = mean
//! - discrete time: geometric with success probability = 1 / mean
//!
//! Both chi-square outcomes are reported; neither is preferred.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, DiscreteCDF, Exp, Geometric};
use thiserror::Error;
use tracing::{info, warn};

use super::segmentation::RegimeSegmentation;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DurationError {
    #[error("At least 2 histogram bins are required, got {0}")]
    TooFewBins(usize),

    #[error("No durations to test")]
    Empty,

    #[error("{distribution:?} fit leaves a negative expected count {value} in the last bin")]
    NegativeExpectedCount {
        distribution: CandidateDistribution,
        value: f64,
    },

    #[error("Distribution error: {0}")]
    Distribution(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateDistribution {
    Exponential,
    Geometric,
}

/// A fitted duration distribution.
pub trait DurationModel {
    fn candidate(&self) -> CandidateDistribution;

    /// `P(X < t)`.
    fn prob_below(&self, t: f64) -> f64;
}

/// Shifted exponential: `X = location + Exp(1 / scale)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialFit {
    /// Smallest observed duration.
    pub location: f64,
    /// Observed mean duration.
    pub scale: f64,
    dist: Exp,
}

impl ExponentialFit {
    pub fn new(location: f64, scale: f64) -> Result<Self, DurationError> {
        let dist = Exp::new(1.0 / scale).map_err(|e| DurationError::Distribution(e.to_string()))?;
        Ok(Self {
            location,
            scale,
            dist,
        })
    }
}

impl DurationModel for ExponentialFit {
    fn candidate(&self) -> CandidateDistribution {
        CandidateDistribution::Exponential
    }

    fn prob_below(&self, t: f64) -> f64 {
        if t <= self.location {
            0.0
        } else {
            self.dist.cdf(t - self.location)
        }
    }
}

/// Geometric on `{1, 2, ...}`.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometricFit {
    /// Success probability, `1 / mean`.
    pub p: f64,
    dist: Geometric,
}

impl GeometricFit {
    pub fn new(p: f64) -> Result<Self, DurationError> {
        let dist = Geometric::new(p).map_err(|e| DurationError::Distribution(e.to_string()))?;
        Ok(Self { p, dist })
    }
}

impl DurationModel for GeometricFit {
    fn candidate(&self) -> CandidateDistribution {
        CandidateDistribution::Geometric
    }

    fn prob_below(&self, t: f64) -> f64 {
        // P(X < t) = P(X <= ceil(t) - 1)
        let below = t.ceil() - 1.0;
        if below < 1.0 {
            0.0
        } else {
            self.dist.cdf(below as u64)
        }
    }
}

/// Equal-width bins `[e_i, e_{i+1})`, the last one closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// `bins + 1` ascending edges.
    pub edges: Vec<f64>,
    /// Observed values per bin.
    pub counts: Vec<usize>,
}

impl Histogram {
    /// Bin `values` over `[min, max]`. Needs at least one value and two bins.
    pub fn new(values: &[f64], bins: usize) -> Result<Self, DurationError> {
        if bins < 2 {
            return Err(DurationError::TooFewBins(bins));
        }
        if values.is_empty() {
            return Err(DurationError::Empty);
        }

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let (lo, hi) = if min == max { (min - 0.5, max + 0.5) } else { (min, max) };
        let width = (hi - lo) / bins as f64;

        let mut edges: Vec<f64> = (0..bins).map(|i| lo + i as f64 * width).collect();
        edges.push(hi);

        // bin index = number of interior edges <= v, so observed and
        // expected counts share the same boundaries
        let interior = &edges[1..bins];
        let mut counts = vec![0; bins];
        for &v in values {
            counts[interior.partition_point(|e| *e <= v)] += 1;
        }

        Ok(Self { edges, counts })
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// Chi-square goodness of fit of one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodnessOfFit {
    /// Candidate under test.
    pub distribution: CandidateDistribution,
    /// Expected count per bin; sums to the sample size.
    pub expected: Vec<f64>,
    /// Pearson chi-square statistic; infinite when a bin with no expected mass is occupied.
    pub statistic: f64,
    /// Survival probability of the statistic.
    pub p_value: f64,
    /// `bins - 1`.
    pub degrees_of_freedom: usize,
}

impl GoodnessOfFit {
    pub fn rejects(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationSummary {
    /// Number of closed intervals.
    pub n: usize,
    /// Shortest duration.
    pub min: f64,
    /// Longest duration.
    pub max: f64,
    /// Mean duration.
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DurationFitReport {
    pub summary: DurationSummary,
    pub histogram: Histogram,
    pub exponential_fit: ExponentialFit,
    pub geometric_fit: GeometricFit,
    /// Exponential fit tested against `histogram`.
    pub exponential: GoodnessOfFit,
    /// Geometric fit tested against `histogram`.
    pub geometric: GoodnessOfFit,
}

/// Outcome of duration analysis on a segmentation.
#[derive(Debug, Clone, PartialEq)]
pub enum DurationAnalysis {
    /// Fewer than two changepoints: no closed interval to measure.
    InsufficientTransitions { changepoints: usize },
    Tested(Box<DurationFitReport>),
}

impl DurationAnalysis {
    pub fn report(&self) -> Option<&DurationFitReport> {
        match self {
            Self::Tested(report) => Some(report),
            Self::InsufficientTransitions { .. } => None,
        }
    }
}

/// Expected bin counts for `model`, with the last bin taking the residual.
fn expected_counts<M: DurationModel>(
    model: &M,
    histogram: &Histogram,
) -> Result<Vec<f64>, DurationError> {
    let n = histogram.total() as f64;
    let bins = histogram.bins();
    let mut expected: Vec<f64> = histogram
        .edges
        .windows(2)
        .take(bins - 1)
        .map(|e| n * (model.prob_below(e[1]) - model.prob_below(e[0])))
        .collect();

    let residual = n - expected.iter().sum::<f64>();
    let residual = if residual >= 0.0 {
        residual
    } else if residual > -1e-9 * n {
        0.0
    } else {
        return Err(DurationError::NegativeExpectedCount {
            distribution: model.candidate(),
            value: residual,
        });
    };
    expected.push(residual);
    Ok(expected)
}

fn chi_square<M: DurationModel>(
    model: &M,
    histogram: &Histogram,
) -> Result<GoodnessOfFit, DurationError> {
    let expected = expected_counts(model, histogram)?;

    let mut statistic = 0.0;
    for (&observed, &exp) in histogram.counts.iter().zip(&expected) {
        let observed = observed as f64;
        if exp > 0.0 {
            statistic += (observed - exp).powi(2) / exp;
        } else if observed > 0.0 {
            statistic = f64::INFINITY;
        }
    }

    let degrees_of_freedom = histogram.bins() - 1;
    let p_value = if statistic.is_infinite() {
        0.0
    } else {
        ChiSquared::new(degrees_of_freedom as f64)
            .map_err(|e| DurationError::Distribution(e.to_string()))?
            .sf(statistic)
    };

    Ok(GoodnessOfFit {
        distribution: model.candidate(),
        expected,
        statistic,
        p_value,
        degrees_of_freedom,
    })
}

/// Fits and scores both candidate duration distributions.
#[derive(Debug, Clone, Copy)]
pub struct DurationTester {
    bins: usize,
}

impl Default for DurationTester {
    fn default() -> Self {
        Self { bins: 10 }
    }
}

impl DurationTester {
    pub fn new(bins: usize) -> Result<Self, DurationError> {
        if bins < 2 {
            return Err(DurationError::TooFewBins(bins));
        }
        Ok(Self { bins })
    }

    /// Test a list of row-count durations.
    pub fn test(&self, durations: &[usize]) -> Result<DurationFitReport, DurationError> {
        if durations.is_empty() {
            return Err(DurationError::Empty);
        }
        let values: Vec<f64> = durations.iter().map(|&d| d as f64).collect();
        let n = values.len();
        let summary = DurationSummary {
            n,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean: values.iter().sum::<f64>() / n as f64,
        };

        let histogram = Histogram::new(&values, self.bins)?;
        let exponential_fit = ExponentialFit::new(summary.min, summary.mean)?;
        let geometric_fit = GeometricFit::new(1.0 / summary.mean)?;

        let exponential = chi_square(&exponential_fit, &histogram)?;
        let geometric = chi_square(&geometric_fit, &histogram)?;

        info!(
            "Duration fit over {} intervals: exponential chi2 {:.3} (p {:.4}), \
             geometric chi2 {:.3} (p {:.4})",
            n, exponential.statistic, exponential.p_value, geometric.statistic, geometric.p_value
        );

        Ok(DurationFitReport {
            summary,
            histogram,
            exponential_fit,
            geometric_fit,
            exponential,
            geometric,
        })
    }

    /// Test the closed-interval durations of a segmentation.
    pub fn analyze(
        &self,
        segmentation: &RegimeSegmentation,
    ) -> Result<DurationAnalysis, DurationError> {
        if !segmentation.has_sufficient_transitions() {
            warn!(
                "Duration analysis skipped: {} changepoints, insufficient transitions",
                segmentation.changepoints.len()
            );
            return Ok(DurationAnalysis::InsufficientTransitions {
                changepoints: segmentation.changepoints.len(),
            });
        }
        let report = self.test(&segmentation.duration_rows())?;
        Ok(DurationAnalysis::Tested(Box::new(report)))
    }
}
