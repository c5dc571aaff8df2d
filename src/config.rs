//! Segmentation parameters and feature column names

use crate::error::SegmentationError;
use serde::{Deserialize, Serialize};

pub const RECENCY: &str = "recency";
pub const TRANSACTION_COUNT: &str = "transaction_count";
pub const TOTAL_SPEND: &str = "total_spend";
pub const AVERAGE_TRANSACTION_VALUE: &str = "average_transaction_value";
pub const PURCHASE_FREQUENCY: &str = "purchase_frequency";
pub const CUSTOMER_LIFETIME: &str = "customer_lifetime";
pub const AVERAGE_BASKET_SIZE: &str = "average_basket_size";

/// Columns clustered on when the caller does not pass an explicit list
pub const DEFAULT_FEATURE_COLUMNS: [&str; 7] = [
    RECENCY,
    TRANSACTION_COUNT,
    TOTAL_SPEND,
    AVERAGE_TRANSACTION_VALUE,
    PURCHASE_FREQUENCY,
    CUSTOMER_LIFETIME,
    AVERAGE_BASKET_SIZE,
];

/// Columns the segment namer reads from every profile.
///
/// These are always profiled, even when they are not clustered on.
pub const NAMING_COLUMNS: [&str; 4] = [RECENCY, TRANSACTION_COUNT, TOTAL_SPEND, CUSTOMER_LIFETIME];

/// What to do with a segment that received no customers at fit time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptySegmentPolicy {
    /// Keep the row with a zero count and NaN means.
    #[default]
    Keep,
    /// Leave the segment out of the profile table and the naming pass.
    Drop,
}

/// Parameters for fitting a segmentation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Number of segments (k)
    pub n_segments: usize,
    /// Seed for k-means initialization; reused for every fit
    pub random_state: u64,
    /// Number of k-means restarts; the lowest-inertia run wins
    pub n_runs: usize,
    /// Maximum Lloyd iterations per run
    pub max_iterations: u64,
    /// Convergence tolerance on centroid movement
    pub tolerance: f64,
    #[serde(default)]
    pub empty_segments: EmptySegmentPolicy,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            n_segments: 5,
            random_state: 42,
            n_runs: 10,
            max_iterations: 300,
            tolerance: 1e-4,
            empty_segments: EmptySegmentPolicy::Keep,
        }
    }
}

impl SegmentationConfig {
    pub fn with_segments(n_segments: usize) -> Self {
        Self {
            n_segments,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.n_segments == 0 {
            return Err(SegmentationError::InvalidParameters(
                "number of segments must be at least 1".to_string(),
            ));
        }
        if self.n_runs == 0 {
            return Err(SegmentationError::InvalidParameters(
                "number of k-means runs must be at least 1".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(SegmentationError::InvalidParameters(
                "maximum iterations must be at least 1".to_string(),
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(SegmentationError::InvalidParameters(format!(
                "tolerance must be a positive finite number, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SegmentationConfig::default();
        assert_eq!(config.n_segments, 5);
        assert_eq!(config.random_state, 42);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(SegmentationConfig::with_segments(0).validate().is_err());

        let mut config = SegmentationConfig::default();
        config.tolerance = -1.0;
        assert!(config.validate().is_err());

        config.tolerance = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = SegmentationConfig::default();
        config.n_runs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_naming_columns_are_default_features() {
        for column in NAMING_COLUMNS {
            assert!(DEFAULT_FEATURE_COLUMNS.contains(&column));
        }
    }
}
