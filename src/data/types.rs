//! Core series types for the macro/equity analysis.
//!
//! Every series is validated once at construction: missing (non-finite)
//! values are dropped, dates must be strictly increasing, and derived
//! columns are computed a single time and never reassigned afterwards.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::regime::scaling::{ScalingError, ScalingParams, ScalingStrategy};

/// Calendar month-start timestamp used as the join key across series.
pub type ObservationDate = NaiveDate;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("Duplicate observation date: {0}")]
    DuplicateDate(NaiveDate),

    #[error("Dates out of order: {previous} followed by {next}")]
    UnorderedDates { previous: NaiveDate, next: NaiveDate },

    #[error("Non-positive price {price} on {date}")]
    NonPositivePrice { date: NaiveDate, price: f64 },

    #[error("Observation date {0} is not the first day of a month")]
    NotMonthStart(NaiveDate),

    #[error("Indicator '{indicator}' cannot be scaled: {source}")]
    DegenerateIndicator {
        indicator: String,
        #[source]
        source: ScalingError,
    },
}

/// Check that dates are strictly increasing.
pub(crate) fn check_ordered<I>(dates: I) -> Result<(), DataError>
where
    I: IntoIterator<Item = NaiveDate>,
{
    let mut previous: Option<NaiveDate> = None;
    for next in dates {
        if let Some(prev) = previous {
            if next == prev {
                return Err(DataError::DuplicateDate(next));
            }
            if next < prev {
                return Err(DataError::UnorderedDates {
                    previous: prev,
                    next,
                });
            }
        }
        previous = Some(next);
    }
    Ok(())
}

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date - chrono::Duration::days(date.day0() as i64)
}

/// A single (date, price) observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// Daily price history, ordered by date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a price series. Missing prices are dropped, never imputed.
    pub fn new(points: Vec<PricePoint>) -> Result<Self, DataError> {
        let total = points.len();
        let points: Vec<PricePoint> = points.into_iter().filter(|p| p.price.is_finite()).collect();
        if points.len() < total {
            debug!("Dropped {} missing prices", total - points.len());
        }

        check_ordered(points.iter().map(|p| p.date))?;

        if let Some(bad) = points.iter().find(|p| p.price <= 0.0) {
            return Err(DataError::NonPositivePrice {
                date: bad.date,
                price: bad.price,
            });
        }

        Ok(Self { points })
    }

    /// Build from `(date, price)` pairs.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(date, price)| PricePoint { date, price })
                .collect(),
        )
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// Sub-series with `start <= date <= end`.
    pub fn window(&self, start: NaiveDate, end: NaiveDate) -> PriceSeries {
        PriceSeries {
            points: self
                .points
                .iter()
                .filter(|p| p.date >= start && p.date <= end)
                .copied()
                .collect(),
        }
    }
}

/// A single (date, value) indicator reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Monthly macro indicator series (e.g. unemployment rate, CPI level).
///
/// Values are assumed already deseasonalized by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSeries {
    name: String,
    points: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub fn new(name: &str, points: Vec<IndicatorPoint>) -> Result<Self, DataError> {
        let points: Vec<IndicatorPoint> =
            points.into_iter().filter(|p| p.value.is_finite()).collect();
        check_ordered(points.iter().map(|p| p.date))?;
        Ok(Self {
            name: name.to_string(),
            points,
        })
    }

    pub fn from_pairs<I>(name: &str, pairs: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        Self::new(
            name,
            pairs
                .into_iter()
                .map(|(date, value)| IndicatorPoint { date, value })
                .collect(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn points(&self) -> &[IndicatorPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Percent change over `periods` observations: `(x[t] / x[t-periods] - 1) * 100`.
    ///
    /// With monthly, gap-free input and `periods = 12` this is the annual
    /// rate (e.g. annual inflation from a CPI level). The first `periods`
    /// observations have no rate and are omitted.
    pub fn annual_rate(&self, periods: usize) -> IndicatorSeries {
        let points = if periods == 0 {
            Vec::new()
        } else {
            self.points
                .iter()
                .skip(periods)
                .zip(self.points.iter())
                .map(|(current, base)| IndicatorPoint {
                    date: current.date,
                    value: (current.value / base.value - 1.0) * 100.0,
                })
                .filter(|p| p.value.is_finite())
                .collect()
        };

        IndicatorSeries {
            name: format!("{} annual rate", self.name),
            points,
        }
    }
}

/// One raw monthly row before scaling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacroRow {
    pub date: ObservationDate,
    pub indicator_a: f64,
    pub indicator_b: f64,
}

/// One monthly macro observation with its scaled columns.
///
/// `indicator_a` is typically the unemployment rate and `indicator_b` the
/// annual inflation rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacroObservation {
    pub date: ObservationDate,
    pub indicator_a: f64,
    pub indicator_b: f64,
    pub scaled_a: f64,
    pub scaled_b: f64,
}

impl MacroObservation {
    /// Point in scaled-indicator space.
    pub fn features(&self) -> [f64; 2] {
        [self.scaled_a, self.scaled_b]
    }
}

/// The two-indicator macro history with scaling fitted once over the full sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroSeries {
    observations: Vec<MacroObservation>,
    scaling: [ScalingParams; 2],
}

impl MacroSeries {
    /// Build from raw rows.
    ///
    /// Rows with a missing value in either indicator are dropped. Dates must be
    /// month starts, unique and increasing.
    pub fn from_raw(rows: Vec<MacroRow>, strategy: ScalingStrategy) -> Result<Self, DataError> {
        let total = rows.len();
        let rows: Vec<MacroRow> = rows
            .into_iter()
            .filter(|r| r.indicator_a.is_finite() && r.indicator_b.is_finite())
            .collect();
        if rows.len() < total {
            debug!("Dropped {} macro rows with missing values", total - rows.len());
        }

        if let Some(bad) = rows.iter().find(|r| r.date.day() != 1) {
            return Err(DataError::NotMonthStart(bad.date));
        }
        check_ordered(rows.iter().map(|r| r.date))?;

        let a: Vec<f64> = rows.iter().map(|r| r.indicator_a).collect();
        let b: Vec<f64> = rows.iter().map(|r| r.indicator_b).collect();
        let scale_a = ScalingParams::fit(strategy, &a).map_err(|source| {
            DataError::DegenerateIndicator {
                indicator: "indicator_a".to_string(),
                source,
            }
        })?;
        let scale_b = ScalingParams::fit(strategy, &b).map_err(|source| {
            DataError::DegenerateIndicator {
                indicator: "indicator_b".to_string(),
                source,
            }
        })?;

        let observations = rows
            .iter()
            .map(|r| MacroObservation {
                date: r.date,
                indicator_a: r.indicator_a,
                indicator_b: r.indicator_b,
                scaled_a: scale_a.apply(r.indicator_a),
                scaled_b: scale_b.apply(r.indicator_b),
            })
            .collect();

        Ok(Self {
            observations,
            scaling: [scale_a, scale_b],
        })
    }

    /// Inner-join two indicator series on date, then scale.
    pub fn from_indicators(
        a: &IndicatorSeries,
        b: &IndicatorSeries,
        strategy: ScalingStrategy,
    ) -> Result<Self, DataError> {
        let b_by_date: HashMap<NaiveDate, f64> =
            b.points().iter().map(|p| (p.date, p.value)).collect();

        let rows: Vec<MacroRow> = a
            .points()
            .iter()
            .filter_map(|p| {
                b_by_date.get(&p.date).map(|&value_b| MacroRow {
                    date: p.date,
                    indicator_a: p.value,
                    indicator_b: value_b,
                })
            })
            .collect();

        debug!(
            "Joined '{}' ({} rows) with '{}' ({} rows): {} common dates",
            a.name(),
            a.len(),
            b.name(),
            b.len(),
            rows.len()
        );

        Self::from_raw(rows, strategy)
    }

    /// Unemployment rate as indicator A, annual CPI inflation as indicator B.
    pub fn from_cpi_and_unemployment(
        cpi: &IndicatorSeries,
        unemployment: &IndicatorSeries,
        strategy: ScalingStrategy,
    ) -> Result<Self, DataError> {
        let inflation = cpi.annual_rate(12);
        Self::from_indicators(unemployment, &inflation, strategy)
    }

    pub fn observations(&self) -> &[MacroObservation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn dates(&self) -> Vec<ObservationDate> {
        self.observations.iter().map(|o| o.date).collect()
    }

    /// Scaled feature matrix, one row per date.
    pub fn features(&self) -> Vec<[f64; 2]> {
        self.observations.iter().map(|o| o.features()).collect()
    }

    /// Scaling parameters for indicator A and B.
    pub fn scaling(&self) -> &[ScalingParams; 2] {
        &self.scaling
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn macro_row(date: NaiveDate, indicator_a: f64, indicator_b: f64) -> MacroRow {
        MacroRow {
            date,
            indicator_a,
            indicator_b,
        }
    }

    #[test]
    fn test_price_series_drops_missing() {
        let series = PriceSeries::from_pairs(vec![
            (date(2024, 1, 2), 100.0),
            (date(2024, 1, 3), f64::NAN),
            (date(2024, 1, 4), 101.0),
        ])
        .unwrap();
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn test_price_series_rejects_duplicates() {
        let result = PriceSeries::from_pairs(vec![
            (date(2024, 1, 2), 100.0),
            (date(2024, 1, 2), 101.0),
        ]);
        assert_eq!(result, Err(DataError::DuplicateDate(date(2024, 1, 2))));
    }

    #[test]
    fn test_price_series_rejects_unordered() {
        let result = PriceSeries::from_pairs(vec![
            (date(2024, 1, 3), 100.0),
            (date(2024, 1, 2), 101.0),
        ]);
        assert!(matches!(result, Err(DataError::UnorderedDates { .. })));
    }

    #[test]
    fn test_price_series_rejects_non_positive() {
        let result = PriceSeries::from_pairs(vec![(date(2024, 1, 2), 0.0)]);
        assert!(matches!(result, Err(DataError::NonPositivePrice { .. })));
    }

    #[test]
    fn test_window_inclusive() {
        let series = PriceSeries::from_pairs(
            (1..=10).map(|d| (date(2024, 1, d), 100.0 + d as f64)),
        )
        .unwrap();
        let window = series.window(date(2024, 1, 3), date(2024, 1, 5));
        assert_eq!(window.len(), 3);
        assert_eq!(window.first_date(), Some(date(2024, 1, 3)));
    }

    #[test]
    fn test_annual_rate() {
        let cpi = IndicatorSeries::from_pairs(
            "CPI",
            (0..14).map(|i| {
                let d = date(2020 + (i / 12) as i32, (i % 12) as u32 + 1, 1);
                (d, 100.0 + i as f64)
            }),
        )
        .unwrap();

        let inflation = cpi.annual_rate(12);
        assert_eq!(inflation.len(), 2);
        assert_eq!(inflation.points()[0].date, date(2021, 1, 1));
        assert_relative_eq!(inflation.points()[0].value, 12.0, epsilon = 1e-10);
        assert_relative_eq!(
            inflation.points()[1].value,
            (113.0 / 101.0 - 1.0) * 100.0,
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_macro_series_requires_month_start() {
        let rows = vec![
            macro_row(date(2020, 1, 1), 4.0, 2.0),
            macro_row(date(2020, 2, 3), 5.0, 3.0),
        ];
        let result = MacroSeries::from_raw(rows, ScalingStrategy::ZScore);
        assert_eq!(result, Err(DataError::NotMonthStart(date(2020, 2, 3))));
    }

    #[test]
    fn test_macro_series_standardizes_once() {
        let rows: Vec<MacroRow> = (1..=4)
            .map(|m| macro_row(date(2020, m, 1), m as f64, 10.0 * m as f64))
            .collect();
        let series = MacroSeries::from_raw(rows, ScalingStrategy::ZScore).unwrap();

        let mean_a: f64 = series.observations().iter().map(|o| o.scaled_a).sum::<f64>() / 4.0;
        assert_relative_eq!(mean_a, 0.0, epsilon = 1e-12);
        assert_relative_eq!(series.scaling()[0].center, 2.5, epsilon = 1e-12);
        // Same shape, different units: identical z-scores
        for o in series.observations() {
            assert_relative_eq!(o.scaled_a, o.scaled_b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_macro_series_rejects_constant_indicator() {
        let rows = vec![
            macro_row(date(2020, 1, 1), 4.0, 2.0),
            macro_row(date(2020, 2, 1), 4.0, 3.0),
            macro_row(date(2020, 3, 1), 4.0, 1.0),
        ];
        let result = MacroSeries::from_raw(rows, ScalingStrategy::ZScore);
        assert_eq!(
            result,
            Err(DataError::DegenerateIndicator {
                indicator: "indicator_a".to_string(),
                source: ScalingError::DegenerateSpread(0.0),
            })
        );
    }

    #[test]
    fn test_macro_series_drops_missing_rows() {
        let rows = vec![
            macro_row(date(2020, 1, 1), 4.0, 2.0),
            macro_row(date(2020, 2, 1), f64::NAN, 3.0),
            macro_row(date(2020, 3, 1), 6.0, 1.0),
        ];
        let series = MacroSeries::from_raw(rows, ScalingStrategy::MinMax).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.observations()[1].scaled_a, 1.0);
    }

    #[test]
    fn test_from_cpi_and_unemployment_joins_on_date() {
        let months: Vec<NaiveDate> = (0..24)
            .map(|i| date(2018 + (i / 12) as i32, (i % 12) as u32 + 1, 1))
            .collect();
        let cpi = IndicatorSeries::from_pairs(
            "CPI",
            months.iter().enumerate().map(|(i, d)| {
                let t = i as f64;
                (*d, 200.0 * (1.0 + 0.002 * t + 0.0001 * t * t))
            }),
        )
        .unwrap();
        let unemployment = IndicatorSeries::from_pairs(
            "UNRATE",
            months.iter().enumerate().map(|(i, d)| (*d, 4.0 + 0.1 * (i % 5) as f64)),
        )
        .unwrap();

        let series =
            MacroSeries::from_cpi_and_unemployment(&cpi, &unemployment, ScalingStrategy::ZScore)
                .unwrap();
        assert_eq!(series.len(), 12);
        assert_eq!(series.observations()[0].date, date(2019, 1, 1));
        assert_relative_eq!(
            series.observations()[0].indicator_a,
            4.0 + 0.1 * 2.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_month_start() {
        assert_eq!(month_start(date(2024, 2, 29)), date(2024, 2, 1));
        assert_eq!(month_start(date(2024, 3, 1)), date(2024, 3, 1));
    }
}
