//! Distribution diagnostics for return samples.
//!
//! Descriptive point estimates plus a suite of normality tests. All entry
//! points drop missing values first and report insufficient samples as
//! errors instead of producing NaN statistics.

pub mod descriptive;
pub mod normality;

pub use descriptive::{finite, Describe, PointEstimate};
pub use normality::{
    anderson_darling, kolmogorov_smirnov, omnibus_test, qq_points, shapiro_wilk, standardize,
    AndersonDarling, CriticalValue, DiagnosticsError, NormalityReport, NormalitySuite, QqPoint,
    ReferenceDistribution, TestOutcome,
};
