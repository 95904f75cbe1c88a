pub mod analysis;
pub mod data;
pub mod diagnostics;
pub mod pipeline;
pub mod regime;
pub mod returns;

// Re-export commonly used types
pub use data::{MacroObservation, MacroSeries, MonthlyObservation, PriceSeries, IndicatorSeries};
pub use returns::{HorizonLags, ReturnCalculator, ReturnSeries};
pub use diagnostics::{NormalityReport, NormalitySuite, PointEstimate};
pub use regime::{ClusterAssignment, DurationTester, RegimeClusterer, RegimeSegmentation};
pub use regime::ScalingStrategy;
pub use analysis::{ConditionalReturnAnalyzer, ForwardRangeLookup};
pub use analysis::{PredictionRange, RegressionResult};
pub use pipeline::{AnalysisConfig, RegimePipeline, RegimeReport};
