//! Forward range lookup.
//!
//! A naive historical lookup, not a trained forecaster: step back a fixed
//! number of months from the reference date, find the regime whose joined
//! observations contain that exact date, and return that regime's historical
//! return range.

use std::collections::BTreeSet;

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::data::ObservationDate;

use super::conditional::{ConditionalReturnAnalyzer, PredictionRange};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LookupError {
    #[error("No regime found for {lookback} (reference {reference})")]
    NoRegimeFound {
        reference: NaiveDate,
        lookback: NaiveDate,
    },

    #[error("Cannot step back {offset_months} months from {reference}")]
    DateOutOfRange {
        reference: NaiveDate,
        offset_months: u32,
    },
}

/// A successful lookup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeMatch {
    /// Date the lookup was made for.
    pub reference: NaiveDate,
    /// Date whose regime supplied the range.
    pub lookback: NaiveDate,
    pub range: PredictionRange,
}

#[derive(Debug, Clone, PartialEq)]
struct LookupEntry {
    range: PredictionRange,
    dates: BTreeSet<ObservationDate>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ForwardRangeLookup {
    entries: Vec<LookupEntry>,
}

impl ForwardRangeLookup {
    pub fn from_analyzer(analyzer: &ConditionalReturnAnalyzer) -> Self {
        let entries = analyzer
            .prediction_ranges()
            .into_iter()
            .filter_map(|range| {
                let sample = analyzer.sample(range.cluster)?;
                Some(LookupEntry {
                    range,
                    dates: sample.dates().into_iter().collect(),
                })
            })
            .collect();
        Self { entries }
    }

    /// Range of the regime active exactly `offset_months` before `reference`.
    ///
    /// Month arithmetic clamps to the end of shorter months (May 31 minus three
    /// months is Feb 28/29), so only month-start references can match monthly
    /// observations.
    pub fn lookup(
        &self,
        reference: NaiveDate,
        offset_months: u32,
    ) -> Result<RangeMatch, LookupError> {
        let lookback = reference
            .checked_sub_months(Months::new(offset_months))
            .ok_or(LookupError::DateOutOfRange {
                reference,
                offset_months,
            })?;

        let entry = self
            .entries
            .iter()
            .find(|e| e.dates.contains(&lookback))
            .ok_or(LookupError::NoRegimeFound {
                reference,
                lookback,
            })?;

        debug!(
            "Lookup {} -> {}: cluster {}",
            reference, lookback, entry.range.cluster
        );

        Ok(RangeMatch {
            reference,
            lookback,
            range: entry.range,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::conditional::ConditionalRow;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn analyzer() -> ConditionalReturnAnalyzer {
        let rows = [
            (date(2020, 1, 1), 0, 0.03),
            (date(2020, 2, 1), 0, -0.01),
            (date(2020, 3, 1), 1, -0.08),
            (date(2020, 4, 1), 1, 0.05),
        ]
        .iter()
        .map(|&(d, cluster, y)| ConditionalRow {
            date: d,
            cluster,
            scaled_a: 0.0,
            scaled_b: 0.0,
            monthly_return: y,
            avg_monthly_return: y,
        })
        .collect();
        ConditionalReturnAnalyzer::from_rows(rows, 2)
    }

    #[test]
    fn test_lookup_three_months_back() {
        let lookup = ForwardRangeLookup::from_analyzer(&analyzer());

        let found = lookup.lookup(date(2020, 6, 1), 3).unwrap();
        assert_eq!(found.lookback, date(2020, 3, 1));
        assert_eq!(found.range.cluster, 1);
        assert_eq!(found.range.monthly_return.min, -0.08);
        assert_eq!(found.range.monthly_return.max, 0.05);

        let found = lookup.lookup(date(2020, 4, 1), 3).unwrap();
        assert_eq!(found.range.cluster, 0);
    }

    #[test]
    fn test_no_regime_found() {
        let lookup = ForwardRangeLookup::from_analyzer(&analyzer());
        assert_eq!(
            lookup.lookup(date(2021, 1, 1), 3),
            Err(LookupError::NoRegimeFound {
                reference: date(2021, 1, 1),
                lookback: date(2020, 10, 1)
            })
        );
        // mid-month reference never matches month-start observations
        assert!(matches!(
            lookup.lookup(date(2020, 6, 15), 3),
            Err(LookupError::NoRegimeFound { .. })
        ));
    }
}
