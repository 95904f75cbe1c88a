//! Run configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::regime::ScalingStrategy;
use crate::returns::HorizonLags;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("cluster_count must be at least 1")]
    ZeroClusters,

    #[error("histogram_bins must be at least 2, got {0}")]
    TooFewBins(usize),

    #[error("restarts and max_iterations must be positive")]
    ZeroIterations,

    #[error("tolerance must be positive and finite, got {0}")]
    InvalidTolerance(f64),

    #[error("Lag for {0} must be positive")]
    ZeroLag(&'static str),
}

/// Numeric constants for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Number of regimes (k). Fixed, never auto-selected.
    #[serde(default = "default_cluster_count")]
    pub cluster_count: usize,

    /// Seed for cluster initialization.
    #[serde(default)]
    pub seed: u64,

    /// Independently seeded k-means initializations.
    #[serde(default = "default_restarts")]
    pub restarts: usize,

    /// Lloyd iteration cap per restart.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Convergence threshold on total centroid movement.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Indicator scaling before clustering.
    #[serde(default)]
    pub scaling: ScalingStrategy,

    /// Histogram bins for the duration chi-square tests.
    #[serde(default = "default_histogram_bins")]
    pub histogram_bins: usize,

    /// Months to step back in the forward range lookup.
    #[serde(default = "default_lookback_months")]
    pub lookback_months: u32,

    /// Trading-day lags per return horizon.
    #[serde(default)]
    pub lags: HorizonLags,
}

fn default_cluster_count() -> usize {
    3
}

fn default_restarts() -> usize {
    10
}

fn default_max_iterations() -> usize {
    300
}

fn default_tolerance() -> f64 {
    1e-4
}

fn default_histogram_bins() -> usize {
    10
}

fn default_lookback_months() -> u32 {
    3
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            cluster_count: default_cluster_count(),
            seed: 0,
            restarts: default_restarts(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            scaling: ScalingStrategy::default(),
            histogram_bins: default_histogram_bins(),
            lookback_months: default_lookback_months(),
            lags: HorizonLags::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster_count == 0 {
            return Err(ConfigError::ZeroClusters);
        }
        if self.histogram_bins < 2 {
            return Err(ConfigError::TooFewBins(self.histogram_bins));
        }
        if self.restarts == 0 || self.max_iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(ConfigError::InvalidTolerance(self.tolerance));
        }

        let lags = [
            ("daily", self.lags.daily),
            ("weekly", self.lags.weekly),
            ("monthly", self.lags.monthly),
            ("monthly_log", self.lags.monthly_log),
            ("yearly", self.lags.yearly),
        ];
        if let Some(&(name, _)) = lags.iter().find(|(_, lag)| *lag == 0) {
            return Err(ConfigError::ZeroLag(name));
        }

        Ok(())
    }
}
