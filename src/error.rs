//! Error types for the segmentation engine

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the segmentation engine.
///
/// Numeric edge cases (a constant feature column, a segment that received no
/// customers) are not errors; they produce defined sentinel values instead.
#[derive(Debug, Error)]
pub enum SegmentationError {
    /// A requested feature column is absent from the customer table.
    #[error("feature column `{0}` is not present in the customer table")]
    MissingFeature(String),

    /// Profiles, predictions or projections were requested before `fit`/`load`.
    #[error("segmentation model has not been fit yet; call fit() or load_model() first")]
    NotFitted,

    /// A model directory or one of its artifacts does not exist.
    #[error("no segmentation model found at {path:?}: {reason}")]
    ModelNotFound { path: PathBuf, reason: String },

    /// Artifacts exist but disagree with each other.
    #[error("model bundle is corrupt: {0}")]
    CorruptModel(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("invalid customer table: {0}")]
    InvalidTable(String),

    #[error("customer id `{0}` appears more than once")]
    DuplicateCustomerId(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    /// Failure reported by the k-means implementation.
    #[error("clustering failed: {0}")]
    Clustering(String),

    /// Failure reported by the PCA implementation.
    #[error("projection failed: {0}")]
    Projection(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Data(#[from] polars::prelude::PolarsError),
}

impl SegmentationError {
    pub(crate) fn model_not_found(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SegmentationError::ModelNotFound {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
