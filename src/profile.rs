//! Per-segment descriptive statistics on raw feature units

use crate::config::{EmptySegmentPolicy, CUSTOMER_LIFETIME, RECENCY, TOTAL_SPEND, TRANSACTION_COUNT};
use crate::error::SegmentationError;
use crate::naming::SegmentRanks;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Summary of one segment: raw feature means, size and display name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentProfile {
    /// Cluster id (0..k-1)
    pub segment: usize,
    /// Mean of each profiled column; NaN when the segment is empty
    #[serde(with = "crate::nan_serde::map")]
    pub feature_means: BTreeMap<String, f64>,
    pub customer_count: usize,
    /// Share of all customers, 0-100
    pub customer_percentage: f64,
    pub segment_name: String,
    pub ranks: SegmentRanks,
}

impl SegmentProfile {
    pub fn mean(&self, column: &str) -> Option<f64> {
        self.feature_means.get(column).copied()
    }

    pub fn recency(&self) -> f64 {
        self.mean_or_nan(RECENCY)
    }

    pub fn transaction_count(&self) -> f64 {
        self.mean_or_nan(TRANSACTION_COUNT)
    }

    pub fn total_spend(&self) -> f64 {
        self.mean_or_nan(TOTAL_SPEND)
    }

    pub fn customer_lifetime(&self) -> f64 {
        self.mean_or_nan(CUSTOMER_LIFETIME)
    }

    pub fn is_empty(&self) -> bool {
        self.customer_count == 0
    }

    fn mean_or_nan(&self, column: &str) -> f64 {
        self.mean(column).unwrap_or(f64::NAN)
    }
}

/// Aggregate raw (unnormalized) features per segment.
///
/// Produces one row per cluster id in `0..n_segments`. Names and ranks are
/// left blank for the namer to fill in.
///
/// # Arguments
/// * `columns` - Names of the columns in `raw_features`
/// * `raw_features` - Imputed raw values (n_customers, n_columns)
/// * `labels` - Cluster id per customer
/// * `n_segments` - Number of fitted clusters
/// * `policy` - Whether segments without customers stay in the table
pub fn build_segment_profiles(
    columns: &[String],
    raw_features: &Array2<f64>,
    labels: &Array1<usize>,
    n_segments: usize,
    policy: EmptySegmentPolicy,
) -> crate::Result<Vec<SegmentProfile>> {
    if raw_features.ncols() != columns.len() {
        return Err(SegmentationError::ShapeMismatch {
            expected: columns.len(),
            got: raw_features.ncols(),
        });
    }
    if raw_features.nrows() != labels.len() {
        return Err(SegmentationError::ShapeMismatch {
            expected: raw_features.nrows(),
            got: labels.len(),
        });
    }

    let mut sums = Array2::<f64>::zeros((n_segments, columns.len()));
    let mut counts = vec![0usize; n_segments];

    for (row, &label) in raw_features.outer_iter().zip(labels.iter()) {
        if label >= n_segments {
            return Err(SegmentationError::InvalidParameters(format!(
                "cluster id {} out of range for {} segments",
                label, n_segments
            )));
        }
        let mut sum = sums.row_mut(label);
        sum += &row;
        counts[label] += 1;
    }

    let total = labels.len();
    let mut profiles = Vec::with_capacity(n_segments);

    for (segment, &count) in counts.iter().enumerate() {
        if count == 0 {
            warn!(segment, "Segment received no customers");
            if policy == EmptySegmentPolicy::Drop {
                continue;
            }
        }

        let feature_means = columns
            .iter()
            .zip(sums.row(segment).iter())
            .map(|(name, &sum)| {
                let mean = if count > 0 { sum / count as f64 } else { f64::NAN };
                (name.clone(), mean)
            })
            .collect();

        let customer_percentage = if total > 0 {
            count as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        profiles.push(SegmentProfile {
            segment,
            feature_means,
            customer_count: count,
            customer_percentage,
            segment_name: String::new(),
            ranks: SegmentRanks::default(),
        });
    }

    Ok(profiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn columns() -> Vec<String> {
        vec![RECENCY.to_string(), TOTAL_SPEND.to_string()]
    }

    #[test]
    fn test_means_on_raw_units() {
        let raw = array![[10.0, 100.0], [20.0, 300.0], [200.0, 50.0], [5.0, 1000.0]];
        let labels = array![0, 0, 1, 2];
        let profiles =
            build_segment_profiles(&columns(), &raw, &labels, 3, EmptySegmentPolicy::Keep).unwrap();

        assert_eq!(profiles.len(), 3);
        assert_abs_diff_eq!(profiles[0].recency(), 15.0);
        assert_abs_diff_eq!(profiles[0].total_spend(), 200.0);
        assert_eq!(profiles[0].customer_count, 2);
        assert_abs_diff_eq!(profiles[0].customer_percentage, 50.0);

        let total: usize = profiles.iter().map(|p| p.customer_count).sum();
        assert_eq!(total, 4);
        let share: f64 = profiles.iter().map(|p| p.customer_percentage).sum();
        assert_abs_diff_eq!(share, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_empty_segment_kept_with_nan_means() {
        let raw = array![[10.0, 100.0], [20.0, 300.0]];
        let labels = array![0, 2];
        let profiles =
            build_segment_profiles(&columns(), &raw, &labels, 3, EmptySegmentPolicy::Keep).unwrap();

        assert_eq!(profiles.len(), 3);
        assert!(profiles[1].is_empty());
        assert!(profiles[1].recency().is_nan());
        assert_abs_diff_eq!(profiles[1].customer_percentage, 0.0);
    }

    #[test]
    fn test_empty_segment_dropped() {
        let raw = array![[10.0, 100.0], [20.0, 300.0]];
        let labels = array![0, 2];
        let profiles =
            build_segment_profiles(&columns(), &raw, &labels, 3, EmptySegmentPolicy::Drop).unwrap();

        let ids: Vec<usize> = profiles.iter().map(|p| p.segment).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_nan_means_survive_json() {
        let raw = array![[10.0, 100.0]];
        let labels = array![1];
        let profiles =
            build_segment_profiles(&columns(), &raw, &labels, 2, EmptySegmentPolicy::Keep).unwrap();

        let json = serde_json::to_string(&profiles).unwrap();
        let restored: Vec<SegmentProfile> = serde_json::from_str(&json).unwrap();
        assert!(restored[0].recency().is_nan());
        assert_eq!(restored[1], profiles[1]);
    }
}
