//! Macro regime detection.
//!
//! Scaled two-indicator observations are clustered into `k` regimes; the
//! resulting label sequence is cut into contiguous intervals at every
//! changepoint, and the interval durations are tested against exponential
//! and geometric persistence models.

pub mod clustering;
pub mod duration;
pub mod scaling;
pub mod segmentation;

pub use clustering::{
    ClusterAssignment, ClusterError, LabeledDate, RegimeCentroid, RegimeClusterer, RegimeLabel,
};
pub use duration::{
    CandidateDistribution, DurationAnalysis, DurationError, DurationFitReport, DurationModel,
    DurationSummary, DurationTester, ExponentialFit, GeometricFit, GoodnessOfFit, Histogram,
};
pub use scaling::{ScalingError, ScalingParams, ScalingStrategy};
pub use segmentation::{
    yearly_occupancy, Changepoint, OpenRun, RegimeInterval, RegimeSegmentation, SegmentationError,
};
