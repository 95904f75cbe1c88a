//! Monthly resampling of daily price and return data.
//!
//! Produces one record per calendar month, keyed by the month-start date so
//! it can be joined against monthly macro observations.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::returns::ReturnSeries;

use super::types::{month_start, ObservationDate, PriceSeries};

/// Monthly view of the equity series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyObservation {
    /// First day of the calendar month.
    pub date: ObservationDate,
    /// First available price in the month.
    pub first_price: f64,
    /// First available monthly-horizon return in the month.
    pub monthly_return: f64,
    /// Mean of the month's monthly-horizon returns.
    pub avg_monthly_return: f64,
}

#[derive(Default)]
struct MonthAccumulator {
    first_price: Option<f64>,
    first_return: Option<f64>,
    return_sum: f64,
    return_count: usize,
}

/// Resample daily prices and a monthly-horizon return series to one row per month.
///
/// Months without any return are dropped rather than zero-filled.
pub fn resample_monthly(
    prices: &PriceSeries,
    monthly_returns: &ReturnSeries,
) -> Vec<MonthlyObservation> {
    let mut months: BTreeMap<NaiveDate, MonthAccumulator> = BTreeMap::new();

    for point in prices.points() {
        let acc = months.entry(month_start(point.date)).or_default();
        if acc.first_price.is_none() {
            acc.first_price = Some(point.price);
        }
    }

    for point in monthly_returns.points() {
        if !point.value.is_finite() {
            continue;
        }
        let acc = months.entry(month_start(point.date)).or_default();
        if acc.first_return.is_none() {
            acc.first_return = Some(point.value);
        }
        acc.return_sum += point.value;
        acc.return_count += 1;
    }

    months
        .into_iter()
        .filter_map(|(date, acc)| {
            let first_price = acc.first_price?;
            let monthly_return = acc.first_return?;
            Some(MonthlyObservation {
                date,
                first_price,
                monthly_return,
                avg_monthly_return: acc.return_sum / acc.return_count as f64,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::returns::{ReturnCalculator, ReturnKind};
    use approx::assert_relative_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_resample_first_and_mean() {
        let prices = PriceSeries::from_pairs(vec![
            (date(2024, 1, 30), 100.0),
            (date(2024, 1, 31), 110.0),
            (date(2024, 2, 1), 121.0),
            (date(2024, 2, 2), 110.0),
            (date(2024, 3, 1), 99.0),
        ])
        .unwrap();
        let returns = ReturnCalculator::compute(&prices, 1, ReturnKind::Simple).unwrap();

        let monthly = resample_monthly(&prices, &returns);
        assert_eq!(monthly.len(), 3);

        assert_eq!(monthly[0].date, date(2024, 1, 1));
        assert_eq!(monthly[0].first_price, 100.0);
        assert_relative_eq!(monthly[0].monthly_return, 0.1, epsilon = 1e-12);
        assert_relative_eq!(monthly[0].avg_monthly_return, 0.1, epsilon = 1e-12);

        assert_eq!(monthly[1].date, date(2024, 2, 1));
        assert_eq!(monthly[1].first_price, 121.0);
        assert_relative_eq!(monthly[1].monthly_return, 0.1, epsilon = 1e-12);
        let feb_mean = (0.1 + (110.0 / 121.0 - 1.0)) / 2.0;
        assert_relative_eq!(monthly[1].avg_monthly_return, feb_mean, epsilon = 1e-12);
    }

    #[test]
    fn test_months_without_returns_dropped() {
        let prices = PriceSeries::from_pairs(vec![
            (date(2024, 1, 2), 100.0),
            (date(2024, 2, 1), 101.0),
        ])
        .unwrap();
        let returns = ReturnCalculator::compute(&prices, 1, ReturnKind::Simple).unwrap();

        let monthly = resample_monthly(&prices, &returns);
        assert_eq!(monthly.len(), 1);
        assert_eq!(monthly[0].date, date(2024, 2, 1));
    }
}
