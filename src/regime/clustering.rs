//! Regime clustering engine.
//!
//! Partitions scaled two-indicator observations into `k` regimes with
//! k-means: k-means++ seeding followed by Lloyd iterations. Several seeded
//! restarts are run and the one with the lowest inertia is kept.
//!
//! Output is a pure function of (input, k, seed, restarts, max_iterations,
//! tolerance). Exact distance ties go to the lowest cluster index.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::data::{MacroSeries, ObservationDate};

use super::scaling::ScalingParams;

/// Cluster id in `[0, k)`.
pub type RegimeLabel = usize;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusterError {
    #[error("Cluster count must be positive")]
    InvalidClusterCount,

    #[error("Non-finite feature in row {row}")]
    NonFinite { row: usize },

    #[error("Requested {requested} clusters but only {distinct} distinct observations")]
    DegenerateCluster { requested: usize, distinct: usize },

    #[error("Cluster {cluster} became empty in iteration {iteration}")]
    EmptyCluster { cluster: RegimeLabel, iteration: usize },
}

/// Center of one cluster in scaled-indicator space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeCentroid {
    pub cluster: RegimeLabel,
    /// Mean scaled indicator A of the members.
    pub scaled_a: f64,
    /// Mean scaled indicator B of the members.
    pub scaled_b: f64,
}

impl RegimeCentroid {
    /// Centroid in raw indicator units.
    pub fn in_indicator_units(&self, scaling: &[ScalingParams; 2]) -> (f64, f64) {
        (scaling[0].invert(self.scaled_a), scaling[1].invert(self.scaled_b))
    }
}

/// A date with its regime label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledDate {
    pub date: ObservationDate,
    pub label: RegimeLabel,
}

/// Result of one clustering pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    /// One label per input row.
    pub labels: Vec<RegimeLabel>,
    /// Indexed by label.
    pub centroids: Vec<RegimeCentroid>,
    /// Within-cluster sum of squared distances.
    pub inertia: f64,
    /// Lloyd iterations of the winning restart.
    pub iterations: usize,
}

impl ClusterAssignment {
    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    /// Number of rows per cluster.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k()];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }

    /// Attach labels to the dates of the series that was clustered.
    pub fn labeled_dates(&self, series: &MacroSeries) -> Vec<LabeledDate> {
        series
            .observations()
            .iter()
            .zip(&self.labels)
            .map(|(obs, &label)| LabeledDate {
                date: obs.date,
                label,
            })
            .collect()
    }
}

struct LloydRun {
    labels: Vec<RegimeLabel>,
    centroids: Vec<[f64; 2]>,
    inertia: f64,
    iterations: usize,
}

fn squared_distance(a: &[f64; 2], b: &[f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

/// Nearest centroid and its squared distance; strict `<` keeps the lowest index on ties.
fn nearest(point: &[f64; 2], centroids: &[[f64; 2]]) -> (RegimeLabel, f64) {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (cluster, centroid) in centroids.iter().enumerate() {
        let distance = squared_distance(point, centroid);
        if distance < best_distance {
            best = cluster;
            best_distance = distance;
        }
    }
    (best, best_distance)
}

fn distinct_rows(data: &[[f64; 2]]) -> usize {
    let mut rows = data.to_vec();
    rows.sort_by(|a, b| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])));
    rows.dedup();
    rows.len()
}

/// K-means clusterer for the two-indicator macro space.
#[derive(Debug, Clone)]
pub struct RegimeClusterer {
    k: usize,
    seed: u64,
    restarts: usize,
    max_iterations: usize,
    tolerance: f64,
}

impl RegimeClusterer {
    pub fn new(k: usize, seed: u64) -> Self {
        Self {
            k,
            seed,
            restarts: 10,
            max_iterations: 300,
            tolerance: 1e-4,
        }
    }

    /// Number of independently seeded initializations.
    pub fn with_restarts(mut self, restarts: usize) -> Self {
        self.restarts = restarts.max(1);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Stop once the total centroid movement falls below this distance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Cluster the scaled features of a macro series.
    pub fn fit_series(&self, series: &MacroSeries) -> Result<ClusterAssignment, ClusterError> {
        self.fit(&series.features())
    }

    /// Cluster a feature matrix, one row per observation.
    pub fn fit(&self, data: &[[f64; 2]]) -> Result<ClusterAssignment, ClusterError> {
        if self.k == 0 {
            return Err(ClusterError::InvalidClusterCount);
        }
        if let Some(row) = data
            .iter()
            .position(|p| !p[0].is_finite() || !p[1].is_finite())
        {
            return Err(ClusterError::NonFinite { row });
        }
        let distinct = distinct_rows(data);
        if self.k > distinct {
            return Err(ClusterError::DegenerateCluster {
                requested: self.k,
                distinct,
            });
        }

        let mut master = StdRng::seed_from_u64(self.seed);
        let mut best: Option<LloydRun> = None;
        let mut last_error = None;

        for restart in 0..self.restarts {
            let mut rng = StdRng::seed_from_u64(master.gen::<u64>());
            let initial = self.initialize_plus_plus(data, &mut rng);

            match self.lloyd(data, initial) {
                Ok(run) => {
                    debug!(
                        "Restart {}: inertia {:.6} after {} iterations",
                        restart, run.inertia, run.iterations
                    );
                    let better = best.as_ref().map_or(true, |b| run.inertia < b.inertia);
                    if better {
                        best = Some(run);
                    }
                }
                Err(e) => {
                    debug!("Restart {} discarded: {}", restart, e);
                    last_error = Some(e);
                }
            }
        }

        let run = match (best, last_error) {
            (Some(run), _) => run,
            (None, Some(e)) => return Err(e),
            (None, None) => return Err(ClusterError::InvalidClusterCount),
        };

        info!(
            "Clustered {} observations into {} regimes (inertia {:.4}, {} iterations)",
            data.len(),
            self.k,
            run.inertia,
            run.iterations
        );

        Ok(ClusterAssignment {
            labels: run.labels,
            centroids: run
                .centroids
                .iter()
                .enumerate()
                .map(|(cluster, c)| RegimeCentroid {
                    cluster,
                    scaled_a: c[0],
                    scaled_b: c[1],
                })
                .collect(),
            inertia: run.inertia,
            iterations: run.iterations,
        })
    }

    /// k-means++ seeding. Only points at positive distance from every chosen
    /// center are eligible, so centers are always distinct.
    fn initialize_plus_plus(&self, data: &[[f64; 2]], rng: &mut StdRng) -> Vec<[f64; 2]> {
        let mut centroids = Vec::with_capacity(self.k);
        centroids.push(data[rng.gen_range(0..data.len())]);

        while centroids.len() < self.k {
            let distances: Vec<f64> = data.iter().map(|p| nearest(p, &centroids).1).collect();
            let total: f64 = distances.iter().sum();
            let threshold = rng.gen::<f64>() * total;

            let mut cumulative = 0.0;
            let mut chosen = None;
            for (i, &d) in distances.iter().enumerate() {
                if d <= 0.0 {
                    continue;
                }
                chosen = Some(i);
                cumulative += d;
                if cumulative > threshold {
                    break;
                }
            }

            match chosen {
                Some(i) => centroids.push(data[i]),
                // every point coincides with a center; unreachable once k <= distinct rows
                None => break,
            }
        }

        centroids
    }

    fn lloyd(
        &self,
        data: &[[f64; 2]],
        mut centroids: Vec<[f64; 2]>,
    ) -> Result<LloydRun, ClusterError> {
        let k = centroids.len();
        let mut labels: Vec<RegimeLabel> = Vec::new();
        let mut iterations = 0;

        for iteration in 1..=self.max_iterations {
            iterations = iteration;
            let assigned: Vec<RegimeLabel> =
                data.iter().map(|p| nearest(p, &centroids).0).collect();
            if assigned == labels {
                break;
            }
            labels = assigned;

            let mut sums = vec![[0.0f64; 2]; k];
            let mut counts = vec![0usize; k];
            for (point, &label) in data.iter().zip(&labels) {
                sums[label][0] += point[0];
                sums[label][1] += point[1];
                counts[label] += 1;
            }
            if let Some(cluster) = counts.iter().position(|&c| c == 0) {
                return Err(ClusterError::EmptyCluster { cluster, iteration });
            }

            let mut shift = 0.0;
            for cluster in 0..k {
                let n = counts[cluster] as f64;
                let updated = [sums[cluster][0] / n, sums[cluster][1] / n];
                shift += squared_distance(&updated, &centroids[cluster]);
                centroids[cluster] = updated;
            }

            if shift.sqrt() < self.tolerance {
                break;
            }
        }

        // final assignment against the final centroids
        let mut counts = vec![0usize; k];
        let mut inertia = 0.0;
        labels = data
            .iter()
            .map(|p| {
                let (label, distance) = nearest(p, &centroids);
                counts[label] += 1;
                inertia += distance;
                label
            })
            .collect();
        if let Some(cluster) = counts.iter().position(|&c| c == 0) {
            return Err(ClusterError::EmptyCluster {
                cluster,
                iteration: iterations,
            });
        }

        Ok(LloydRun {
            labels,
            centroids,
            inertia,
            iterations,
        })
    }
}
