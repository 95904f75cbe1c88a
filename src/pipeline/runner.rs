//! Regime analysis pipeline.
//!
//! Each stage takes its inputs by reference and returns new values; nothing
//! produced by an earlier stage is mutated by a later one:
//!
//! 1. cluster the scaled macro observations
//! 2. segment the label sequence into regime intervals
//! 3. test interval durations (skipped on insufficient transitions)
//! 4. join monthly returns to labels, regress per regime in parallel
//! 5. derive per-regime prediction ranges for the forward lookup

use std::collections::BTreeMap;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::info;

use crate::analysis::{
    ClusterDescription, ConditionalError, ConditionalReturnAnalyzer, ForwardRangeLookup,
    LookupError, PredictionRange, RangeMatch, RegressionResult,
};
use crate::data::{
    resample_monthly, DataError, IndicatorSeries, MacroSeries, MonthlyObservation, PriceSeries,
};
use crate::diagnostics::{DiagnosticsError, NormalityReport, NormalitySuite};
use crate::regime::{
    yearly_occupancy, ClusterAssignment, ClusterError, DurationAnalysis, DurationError,
    DurationTester, LabeledDate, RegimeClusterer, RegimeSegmentation, SegmentationError,
};
use crate::returns::{HorizonReturns, ReturnCalculator, ReturnError, ReturnHorizon, ReturnSeries};

use super::config::{AnalysisConfig, ConfigError};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Return error: {0}")]
    Returns(#[from] ReturnError),

    #[error("Diagnostics error: {0}")]
    Diagnostics(#[from] DiagnosticsError),

    #[error("Clustering error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Segmentation error: {0}")]
    Segmentation(#[from] SegmentationError),

    #[error("Duration test error: {0}")]
    Duration(#[from] DurationError),
}

/// Immutable results of one pipeline run.
#[derive(Debug, Clone)]
pub struct RegimeReport {
    pub config: AnalysisConfig,
    pub assignment: ClusterAssignment,
    pub labeled: Vec<LabeledDate>,
    pub segmentation: RegimeSegmentation,
    pub durations: DurationAnalysis,
    /// One entry per regime; failures are kept, not dropped.
    pub regressions: Vec<Result<RegressionResult, ConditionalError>>,
    pub prediction_ranges: Vec<PredictionRange>,
    pub descriptions: Vec<ClusterDescription>,
    /// Observations per regime for each calendar year.
    pub occupancy: BTreeMap<i32, Vec<usize>>,
    lookup: ForwardRangeLookup,
}

impl RegimeReport {
    /// Historical range of the regime active `lookback_months` before `reference`.
    pub fn lookup(&self, reference: NaiveDate) -> Result<RangeMatch, LookupError> {
        self.lookup.lookup(reference, self.config.lookback_months)
    }

    pub fn summary(&self) -> String {
        let durations = match &self.durations {
            DurationAnalysis::InsufficientTransitions { changepoints } => format!(
                "Durations: insufficient transitions ({} changepoints)\n",
                changepoints
            ),
            DurationAnalysis::Tested(report) => format!(
                "Durations: n={} min={:.0} max={:.0} mean={:.2}\n  \
                 {:?}: chi2={:.3} p={:.4}\n  \
                 {:?}: chi2={:.3} p={:.4}\n",
                report.summary.n,
                report.summary.min,
                report.summary.max,
                report.summary.mean,
                report.exponential.distribution,
                report.exponential.statistic,
                report.exponential.p_value,
                report.geometric.distribution,
                report.geometric.statistic,
                report.geometric.p_value,
            ),
        };

        let mut out = format!(
            "Regime Analysis Summary\n\
             =======================\n\
             Observations: {}  Regimes: {}  Inertia: {:.4}\n\
             Changepoints: {}  Closed intervals: {}\n\
             {}\n",
            self.labeled.len(),
            self.assignment.k(),
            self.assignment.inertia,
            self.segmentation.changepoints.len(),
            self.segmentation.intervals.len(),
            durations,
        );

        for result in &self.regressions {
            let line = match result {
                Ok(r) => format!(
                    "Regime {}: n={} y = {:.4} + {:.4}*A + {:.4}*B  R2={}\n",
                    r.cluster,
                    r.observations,
                    r.intercept,
                    r.coefficients[0],
                    r.coefficients[1],
                    r.r_squared.map_or("n/a".to_string(), |v| format!("{:.4}", v))
                ),
                Err(e) => format!("{}\n", e),
            };
            out.push_str(&line);
        }
        for range in &self.prediction_ranges {
            out.push_str(&format!(
                "Regime {} range: monthly [{:.4}, {:.4}]  averaged [{:.4}, {:.4}]\n",
                range.cluster,
                range.monthly_return.min,
                range.monthly_return.max,
                range.avg_monthly_return.min,
                range.avg_monthly_return.max
            ));
        }
        out
    }
}

/// Runs the regime analysis stages under one configuration.
#[derive(Debug, Clone, Default)]
pub struct RegimePipeline {
    config: AnalysisConfig,
}

impl RegimePipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Macro series from CPI levels and unemployment, scaled per the configuration.
    pub fn macro_series(
        &self,
        cpi: &IndicatorSeries,
        unemployment: &IndicatorSeries,
    ) -> Result<MacroSeries, PipelineError> {
        Ok(MacroSeries::from_cpi_and_unemployment(
            cpi,
            unemployment,
            self.config.scaling,
        )?)
    }

    pub fn horizon_returns(&self, prices: &PriceSeries) -> Result<HorizonReturns, PipelineError> {
        Ok(ReturnCalculator::horizons(prices, &self.config.lags)?)
    }

    /// Monthly-horizon returns resampled to one row per calendar month.
    pub fn monthly_observations(
        &self,
        prices: &PriceSeries,
    ) -> Result<Vec<MonthlyObservation>, PipelineError> {
        let monthly = ReturnCalculator::horizon(prices, ReturnHorizon::Monthly, &self.config.lags)?;
        Ok(resample_monthly(prices, &monthly))
    }

    /// Normality suite on one return series.
    pub fn diagnose(&self, returns: &ReturnSeries) -> Result<NormalityReport, PipelineError> {
        Ok(NormalitySuite::default().run(&returns.values())?)
    }

    pub fn run(
        &self,
        series: &MacroSeries,
        monthly: &[MonthlyObservation],
    ) -> Result<RegimeReport, PipelineError> {
        self.config.validate()?;
        let config = &self.config;

        let assignment = RegimeClusterer::new(config.cluster_count, config.seed)
            .with_restarts(config.restarts)
            .with_max_iterations(config.max_iterations)
            .with_tolerance(config.tolerance)
            .fit_series(series)?;
        let labeled = assignment.labeled_dates(series);

        let segmentation = RegimeSegmentation::from_labels(&labeled)?;
        let durations = DurationTester::new(config.histogram_bins)?.analyze(&segmentation)?;

        let analyzer = ConditionalReturnAnalyzer::new(series, &assignment, monthly);
        let regressions = analyzer.regressions();
        let prediction_ranges = analyzer.prediction_ranges();
        let descriptions = analyzer.describe();
        let lookup = ForwardRangeLookup::from_analyzer(&analyzer);
        let occupancy = yearly_occupancy(&labeled, assignment.k());

        info!(
            "Pipeline complete: {} regimes, {} intervals, {}/{} regressions fitted",
            assignment.k(),
            segmentation.intervals.len(),
            regressions.iter().filter(|r| r.is_ok()).count(),
            regressions.len()
        );

        Ok(RegimeReport {
            config: config.clone(),
            assignment,
            labeled,
            segmentation,
            durations,
            regressions,
            prediction_ranges,
            descriptions,
            occupancy,
            lookup,
        })
    }
}
