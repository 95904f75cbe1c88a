//! Regime segmentation.
//!
//! Walks a date-ordered label sequence once, records a changepoint wherever
//! the label differs from the previous row, and builds the closed intervals
//! between consecutive changepoints. The runs before the first and after the
//! last changepoint are kept separately as open runs: they have no measured
//! duration.

use std::collections::BTreeMap;

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::data::ObservationDate;

use super::clustering::{LabeledDate, RegimeLabel};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SegmentationError {
    #[error("Labels are not in strictly increasing date order at {previous} -> {next}")]
    UnorderedDates {
        previous: ObservationDate,
        next: ObservationDate,
    },
}

/// Row at which the label changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changepoint {
    /// First row carrying the new label.
    pub row: usize,
    /// Date of that row.
    pub date: ObservationDate,
    /// Label before the change.
    pub from: RegimeLabel,
    /// Label from this row on.
    pub to: RegimeLabel,
}

/// A run bounded by changepoints on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegimeInterval {
    pub cluster: RegimeLabel,
    /// Date of the opening changepoint.
    pub start: ObservationDate,
    /// Last date before the closing changepoint.
    pub end: ObservationDate,
    /// Row of the opening changepoint.
    pub start_row: usize,
    /// Inclusive.
    pub end_row: usize,
    /// Calendar days between the opening and closing changepoints.
    pub duration_days: i64,
    /// Rows between the opening and closing changepoints.
    pub duration_rows: usize,
}

/// A run missing a changepoint on at least one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRun {
    /// Label of every row in the run.
    pub cluster: RegimeLabel,
    /// First date of the run.
    pub start: ObservationDate,
    /// Last date of the run.
    pub end: ObservationDate,
    /// First row of the run.
    pub start_row: usize,
    /// Last row of the run, inclusive.
    pub end_row: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RegimeSegmentation {
    /// Every label change, in row order.
    pub changepoints: Vec<Changepoint>,
    /// Closed runs between consecutive changepoints.
    pub intervals: Vec<RegimeInterval>,
    /// Run before the first changepoint, or the whole series if there is none.
    pub leading: Option<OpenRun>,
    /// Run from the last changepoint to the end of the series.
    pub trailing: Option<OpenRun>,
    /// Rows in the labeled series.
    pub observations: usize,
}

impl RegimeSegmentation {
    pub fn from_labels(labeled: &[LabeledDate]) -> Result<Self, SegmentationError> {
        for pair in labeled.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(SegmentationError::UnorderedDates {
                    previous: pair[0].date,
                    next: pair[1].date,
                });
            }
        }

        let n = labeled.len();
        if n == 0 {
            return Ok(Self::default());
        }

        let changepoints: Vec<Changepoint> = labeled
            .windows(2)
            .enumerate()
            .filter(|(_, pair)| pair[1].label != pair[0].label)
            .map(|(i, pair)| Changepoint {
                row: i + 1,
                date: pair[1].date,
                from: pair[0].label,
                to: pair[1].label,
            })
            .collect();

        let intervals: Vec<RegimeInterval> = changepoints
            .windows(2)
            .map(|pair| {
                let (open, close) = (pair[0], pair[1]);
                RegimeInterval {
                    cluster: open.to,
                    start: open.date,
                    end: labeled[close.row - 1].date,
                    start_row: open.row,
                    end_row: close.row - 1,
                    duration_days: (close.date - open.date).num_days(),
                    duration_rows: close.row - open.row,
                }
            })
            .collect();

        let open_run = |start_row: usize, end_row: usize| OpenRun {
            cluster: labeled[start_row].label,
            start: labeled[start_row].date,
            end: labeled[end_row].date,
            start_row,
            end_row,
        };
        let (leading, trailing) = match (changepoints.first(), changepoints.last()) {
            (Some(first), Some(last)) => (
                Some(open_run(0, first.row - 1)),
                Some(open_run(last.row, n - 1)),
            ),
            _ => (Some(open_run(0, n - 1)), None),
        };

        info!(
            "Segmented {} observations: {} changepoints, {} closed intervals",
            n,
            changepoints.len(),
            intervals.len()
        );

        Ok(Self {
            changepoints,
            intervals,
            leading,
            trailing,
            observations: n,
        })
    }

    /// Durations can only be measured between two changepoints.
    pub fn has_sufficient_transitions(&self) -> bool {
        self.changepoints.len() >= 2
    }

    pub fn duration_rows(&self) -> Vec<usize> {
        self.intervals.iter().map(|i| i.duration_rows).collect()
    }

    pub fn duration_days(&self) -> Vec<i64> {
        self.intervals.iter().map(|i| i.duration_days).collect()
    }

    /// Closed intervals of one cluster.
    pub fn intervals_for(&self, cluster: RegimeLabel) -> Vec<&RegimeInterval> {
        self.intervals.iter().filter(|i| i.cluster == cluster).collect()
    }

    /// Label of the run containing `row`, whether closed or open.
    pub fn cluster_at(&self, row: usize) -> Option<RegimeLabel> {
        let open = [self.leading, self.trailing];
        self.intervals
            .iter()
            .find(|i| i.start_row <= row && row <= i.end_row)
            .map(|i| i.cluster)
            .or_else(|| {
                open.iter()
                    .flatten()
                    .find(|r| r.start_row <= row && row <= r.end_row)
                    .map(|r| r.cluster)
            })
    }
}

/// Observations per cluster for each calendar year.
pub fn yearly_occupancy(labeled: &[LabeledDate], k: usize) -> BTreeMap<i32, Vec<usize>> {
    let mut years: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for entry in labeled {
        let counts = years.entry(entry.date.year()).or_insert_with(|| vec![0; k]);
        if entry.label < k {
            counts[entry.label] += 1;
        }
    }
    years
}
