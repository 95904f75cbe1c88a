//! Indicator scaling strategies.
//!
//! Both strategies map `x` to `(x - center) / spread`:
//! - z-score: center = sample mean, spread = sample standard deviation (n - 1)
//! - min-max: center = minimum, spread = maximum - minimum
//!
//! Parameters are fitted once over the full history and never updated.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScalingError {
    #[error("Need at least {required} values to scale, got {available}")]
    TooFewValues { required: usize, available: usize },

    #[error("Degenerate spread: {0}")]
    DegenerateSpread(f64),
}

/// How macro indicators are scaled before clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingStrategy {
    /// `(x - mean) / stdev`.
    #[default]
    ZScore,
    /// `(x - min) / (max - min)`, mapping the history onto `[0, 1]`.
    MinMax,
}

/// Fitted scaling parameters for one indicator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingParams {
    /// Strategy the parameters were fitted with.
    pub strategy: ScalingStrategy,
    /// Subtracted before dividing (mean or minimum).
    pub center: f64,
    /// Divisor (standard deviation or range). Always positive.
    pub spread: f64,
}

impl ScalingParams {
    /// Fit over `values`. Fails when the spread is zero or undefined.
    pub fn fit(strategy: ScalingStrategy, values: &[f64]) -> Result<Self, ScalingError> {
        let (center, spread) = match strategy {
            ScalingStrategy::ZScore => {
                if values.len() < 2 {
                    return Err(ScalingError::TooFewValues {
                        required: 2,
                        available: values.len(),
                    });
                }
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
                (mean, var.sqrt())
            }
            ScalingStrategy::MinMax => {
                if values.is_empty() {
                    return Err(ScalingError::TooFewValues {
                        required: 1,
                        available: 0,
                    });
                }
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                (min, max - min)
            }
        };

        if !spread.is_finite() || spread <= 0.0 {
            return Err(ScalingError::DegenerateSpread(spread));
        }

        Ok(Self {
            strategy,
            center,
            spread,
        })
    }

    pub fn apply(&self, value: f64) -> f64 {
        (value - self.center) / self.spread
    }

    /// Map a scaled value back to indicator units (e.g. for centroids).
    pub fn invert(&self, scaled: f64) -> f64 {
        scaled * self.spread + self.center
    }
}
