//! Multi-horizon return calculator.
//!
//! Turns a daily price series into simple or log returns over a lag measured
//! in trading days. The first `lag` observations have no return and are
//! omitted, not zero-filled.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::PriceSeries;
use crate::diagnostics::PointEstimate;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReturnError {
    #[error("Insufficient history for lag {lag}: need {required} prices, have {available}")]
    InsufficientHistory {
        lag: usize,
        required: usize,
        available: usize,
    },

    #[error("Return lag must be at least 1")]
    ZeroLag,
}

/// Simple (`p[t]/p[t-lag] - 1`) or log (`ln(p[t]/p[t-lag])`) return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnKind {
    Simple,
    Log,
}

/// Trading-day lag per return horizon.
///
/// These are policy approximations of calendar periods, not derived from a
/// trading calendar:
/// - weekly: 7 days minus a weekend = 5
/// - monthly: about 30 days minus four weekends = 21 (22 for the log variant)
/// - yearly: 365 - 52 * 2 weekend days - 10 federal holidays = 251
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HorizonLags {
    pub daily: usize,
    pub weekly: usize,
    pub monthly: usize,
    pub monthly_log: usize,
    pub yearly: usize,
}

impl Default for HorizonLags {
    fn default() -> Self {
        Self {
            daily: 1,
            weekly: 5,
            monthly: 21,
            monthly_log: 22,
            yearly: 251,
        }
    }
}

/// Named return horizons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnHorizon {
    Daily,
    Weekly,
    Monthly,
    MonthlyLog,
    Yearly,
}

impl ReturnHorizon {
    pub const ALL: [ReturnHorizon; 5] = [
        ReturnHorizon::Daily,
        ReturnHorizon::Weekly,
        ReturnHorizon::Monthly,
        ReturnHorizon::MonthlyLog,
        ReturnHorizon::Yearly,
    ];

    pub fn lag(&self, lags: &HorizonLags) -> usize {
        match self {
            Self::Daily => lags.daily,
            Self::Weekly => lags.weekly,
            Self::Monthly => lags.monthly,
            Self::MonthlyLog => lags.monthly_log,
            Self::Yearly => lags.yearly,
        }
    }

    pub fn kind(&self) -> ReturnKind {
        match self {
            Self::MonthlyLog => ReturnKind::Log,
            _ => ReturnKind::Simple,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Daily => "daily_return",
            Self::Weekly => "weekly_return",
            Self::Monthly => "monthly_return",
            Self::MonthlyLog => "monthly_log_return",
            Self::Yearly => "yearly_return",
        }
    }
}

/// A single dated return.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReturnPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Dated returns for one lag and kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    pub lag: usize,
    pub kind: ReturnKind,
    points: Vec<ReturnPoint>,
}

impl ReturnSeries {
    pub fn points(&self) -> &[ReturnPoint] {
        &self.points
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Return dated exactly `date`, if any.
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by(|p| p.date.cmp(&date))
            .ok()
            .map(|i| self.points[i].value)
    }

    /// Sub-series with `start <= date <= end` (e.g. a short-term test window).
    pub fn window(&self, start: NaiveDate, end: NaiveDate) -> ReturnSeries {
        ReturnSeries {
            lag: self.lag,
            kind: self.kind,
            points: self
                .points
                .iter()
                .filter(|p| p.date >= start && p.date <= end)
                .copied()
                .collect(),
        }
    }

    /// Mean, standard deviation and coefficient of variation.
    pub fn point_estimate(&self) -> Option<PointEstimate> {
        PointEstimate::from_sample(&self.values())
    }
}

/// Returns over every configured horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonReturns {
    pub daily: ReturnSeries,
    pub weekly: ReturnSeries,
    pub monthly: ReturnSeries,
    pub monthly_log: ReturnSeries,
    pub yearly: ReturnSeries,
}

impl HorizonReturns {
    pub fn get(&self, horizon: ReturnHorizon) -> &ReturnSeries {
        match horizon {
            ReturnHorizon::Daily => &self.daily,
            ReturnHorizon::Weekly => &self.weekly,
            ReturnHorizon::Monthly => &self.monthly,
            ReturnHorizon::MonthlyLog => &self.monthly_log,
            ReturnHorizon::Yearly => &self.yearly,
        }
    }
}

/// Return calculator.
pub struct ReturnCalculator;

impl ReturnCalculator {
    /// Compute returns at `lag` for every date whose lagged price exists.
    pub fn compute(
        prices: &PriceSeries,
        lag: usize,
        kind: ReturnKind,
    ) -> Result<ReturnSeries, ReturnError> {
        if lag == 0 {
            return Err(ReturnError::ZeroLag);
        }
        if prices.len() < lag + 1 {
            return Err(ReturnError::InsufficientHistory {
                lag,
                required: lag + 1,
                available: prices.len(),
            });
        }

        let points = prices.points();
        let returns = points[lag..]
            .iter()
            .zip(points.iter())
            .map(|(current, base)| {
                let ratio = current.price / base.price;
                let value = match kind {
                    ReturnKind::Simple => ratio - 1.0,
                    ReturnKind::Log => ratio.ln(),
                };
                ReturnPoint {
                    date: current.date,
                    value,
                }
            })
            .collect();

        Ok(ReturnSeries {
            lag,
            kind,
            points: returns,
        })
    }

    pub fn simple(prices: &PriceSeries, lag: usize) -> Result<ReturnSeries, ReturnError> {
        Self::compute(prices, lag, ReturnKind::Simple)
    }

    pub fn log(prices: &PriceSeries, lag: usize) -> Result<ReturnSeries, ReturnError> {
        Self::compute(prices, lag, ReturnKind::Log)
    }

    /// Compute one named horizon.
    pub fn horizon(
        prices: &PriceSeries,
        horizon: ReturnHorizon,
        lags: &HorizonLags,
    ) -> Result<ReturnSeries, ReturnError> {
        Self::compute(prices, horizon.lag(lags), horizon.kind())
    }

    /// Compute all five horizons.
    pub fn horizons(
        prices: &PriceSeries,
        lags: &HorizonLags,
    ) -> Result<HorizonReturns, ReturnError> {
        Ok(HorizonReturns {
            daily: Self::horizon(prices, ReturnHorizon::Daily, lags)?,
            weekly: Self::horizon(prices, ReturnHorizon::Weekly, lags)?,
            monthly: Self::horizon(prices, ReturnHorizon::Monthly, lags)?,
            monthly_log: Self::horizon(prices, ReturnHorizon::MonthlyLog, lags)?,
            yearly: Self::horizon(prices, ReturnHorizon::Yearly, lags)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Duration;

    fn series(prices: &[f64]) -> PriceSeries {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        PriceSeries::from_pairs(
            prices
                .iter()
                .enumerate()
                .map(|(i, p)| (base + Duration::days(i as i64), *p)),
        )
        .unwrap()
    }

    #[test]
    fn test_simple_returns_lag_one() {
        let prices = series(&[100.0, 101.0, 99.0, 105.0, 108.0]);
        let returns = ReturnCalculator::simple(&prices, 1).unwrap();

        let values = returns.values();
        assert_eq!(values.len(), 4);
        assert_relative_eq!(values[0], 0.01, epsilon = 1e-4);
        assert_relative_eq!(values[1], -0.0198, epsilon = 1e-4);
        assert_relative_eq!(values[2], 0.0606, epsilon = 1e-4);
        assert_relative_eq!(values[3], 0.0286, epsilon = 1e-4);
    }

    #[test]
    fn test_length_and_definition_for_any_lag() {
        let raw: Vec<f64> = (0..40)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64)
            .collect();
        let prices = series(&raw);

        for lag in 1..raw.len() {
            let returns = ReturnCalculator::simple(&prices, lag).unwrap();
            assert_eq!(returns.len(), raw.len() - lag);
            for (i, point) in returns.points().iter().enumerate() {
                let t = i + lag;
                assert_eq!(point.date, prices.points()[t].date);
                assert_relative_eq!(point.value, raw[t] / raw[t - lag] - 1.0, epsilon = 1e-15);
            }
        }
    }

    #[test]
    fn test_log_returns() {
        let prices = series(&[100.0, 110.0, 121.0]);
        let returns = ReturnCalculator::log(&prices, 2).unwrap();
        assert_eq!(returns.len(), 1);
        assert_relative_eq!(returns.values()[0], (1.21f64).ln(), epsilon = 1e-12);
        assert_eq!(returns.kind, ReturnKind::Log);
    }

    #[test]
    fn test_insufficient_history() {
        let prices = series(&[100.0, 101.0, 102.0]);
        let result = ReturnCalculator::simple(&prices, 3);
        assert_eq!(
            result,
            Err(ReturnError::InsufficientHistory {
                lag: 3,
                required: 4,
                available: 3
            })
        );
    }

    #[test]
    fn test_zero_lag_rejected() {
        let prices = series(&[100.0, 101.0]);
        assert_eq!(ReturnCalculator::simple(&prices, 0), Err(ReturnError::ZeroLag));
    }

    #[test]
    fn test_horizon_lags_defaults() {
        let lags = HorizonLags::default();
        assert_eq!(ReturnHorizon::Weekly.lag(&lags), 5);
        assert_eq!(ReturnHorizon::Monthly.lag(&lags), 21);
        assert_eq!(ReturnHorizon::MonthlyLog.lag(&lags), 22);
        assert_eq!(ReturnHorizon::Yearly.lag(&lags), 251);
        assert_eq!(ReturnHorizon::MonthlyLog.kind(), ReturnKind::Log);
    }

    #[test]
    fn test_all_horizons() {
        let raw: Vec<f64> = (0..300).map(|i| 100.0 * (1.0005f64).powi(i)).collect();
        let prices = series(&raw);
        let all = ReturnCalculator::horizons(&prices, &HorizonLags::default()).unwrap();
        assert_eq!(all.daily.len(), 299);
        assert_eq!(all.yearly.len(), 49);
        assert_relative_eq!(
            all.get(ReturnHorizon::MonthlyLog).values()[0],
            22.0 * (1.0005f64).ln(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_window_and_get() {
        let prices = series(&[100.0, 101.0, 99.0, 105.0, 108.0]);
        let returns = ReturnCalculator::simple(&prices, 1).unwrap();
        let d = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        assert_relative_eq!(returns.get(d).unwrap(), 99.0 / 101.0 - 1.0);
        assert_eq!(returns.window(d, d + Duration::days(1)).len(), 2);
        assert!(returns.get(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).is_none());
    }
}
