//! End-to-end regime analysis.
//!
//! Provides:
//! - Run configuration with serde defaults
//! - A staged pipeline producing an immutable report
//! - Forward range lookup and a plain-text summary on the report

pub mod config;
pub mod runner;

pub use config::{AnalysisConfig, ConfigError};
pub use runner::{PipelineError, RegimePipeline, RegimeReport};
