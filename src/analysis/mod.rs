//! Regime-conditional return analysis.
//!
//! Per-regime OLS of monthly returns on the scaled indicators, historical
//! return ranges per regime, and the forward range lookup built on them.

pub mod conditional;
pub mod forecast;

pub use conditional::{
    ClusterDescription, ClusterSample, ConditionalError, ConditionalReturnAnalyzer, ConditionalRow,
    PredictionRange, RegressionResult, ReturnRange,
};
pub use forecast::{ForwardRangeLookup, LookupError, RangeMatch};
