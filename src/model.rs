//! K-Means cluster assigner

use crate::config::SegmentationConfig;
use crate::error::SegmentationError;
use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2, ArrayView1};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fitted k-means centroids in normalized feature space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssigner {
    /// Number of clusters
    pub n_clusters: usize,
    /// Cluster centroids in normalized space, one row per cluster
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares on the fitting set
    pub inertia: f64,
}

impl ClusterAssigner {
    /// Fit k-means on normalized features
    ///
    /// # Arguments
    /// * `features` - Normalized feature matrix (n_customers, n_features)
    /// * `config` - Segment count, seed and convergence settings
    ///
    /// # Returns
    /// * Fitted `ClusterAssigner`; the same seed and data always give the same centroids
    pub fn fit(features: &Array2<f64>, config: &SegmentationConfig) -> crate::Result<Self> {
        let n_clusters = config.n_segments;

        if features.nrows() < n_clusters {
            return Err(SegmentationError::InvalidParameters(format!(
                "number of customers ({}) must be at least equal to number of segments ({})",
                features.nrows(),
                n_clusters
            )));
        }

        let dataset = DatasetBase::from(features.clone());

        // seeded per fit so refitting the same data reproduces the partition
        let rng = Xoshiro256Plus::seed_from_u64(config.random_state);
        let model = KMeans::<f64, L2Dist>::params_with(n_clusters, rng, L2Dist)
            .n_runs(config.n_runs)
            .max_n_iterations(config.max_iterations)
            .tolerance(config.tolerance)
            .fit(&dataset)
            .map_err(|e| SegmentationError::Clustering(e.to_string()))?;

        let centroids = model.centroids().clone();
        let mut assigner = Self {
            n_clusters,
            centroids,
            inertia: 0.0,
        };

        let labels = assigner.predict(features)?;
        assigner.inertia = compute_inertia(features, &labels, &assigner.centroids);
        debug!(n_clusters, inertia = assigner.inertia, "K-Means fitted");

        Ok(assigner)
    }

    /// Assign every row to its nearest fitted centroid; ties go to the lower cluster id
    pub fn predict(&self, features: &Array2<f64>) -> crate::Result<Array1<usize>> {
        if features.ncols() != self.n_features() {
            return Err(SegmentationError::ShapeMismatch {
                expected: self.n_features(),
                got: features.ncols(),
            });
        }

        Ok(features
            .outer_iter()
            .map(|point| self.nearest(&point))
            .collect())
    }

    pub fn n_features(&self) -> usize {
        self.centroids.ncols()
    }

    /// Get cluster sizes for a set of labels
    pub fn cluster_sizes(&self, labels: &Array1<usize>) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }

    fn nearest(&self, point: &ArrayView1<f64>) -> usize {
        let mut min_distance = f64::INFINITY;
        let mut closest_cluster = 0;

        for (cluster_idx, centroid) in self.centroids.outer_iter().enumerate() {
            let distance = squared_distance(point, &centroid);
            if distance < min_distance {
                min_distance = distance;
                closest_cluster = cluster_idx;
            }
        }

        closest_cluster
    }
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    labels
        .iter()
        .enumerate()
        .filter(|&(_, &cluster)| cluster < centroids.nrows())
        .map(|(i, &cluster)| squared_distance(&features.row(i), &centroids.row(cluster)))
        .sum()
}

fn squared_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}
