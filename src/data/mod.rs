pub mod resample;
pub mod types;

pub use resample::{resample_monthly, MonthlyObservation};
pub use types::{
    month_start, DataError, IndicatorPoint, IndicatorSeries, MacroObservation, MacroRow,
    MacroSeries, ObservationDate, PricePoint, PriceSeries,
};
