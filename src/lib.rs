//! SegmentForge: customer segmentation engine built on K-Means clustering
//!
//! This library turns per-customer RFM aggregates into a fixed number of
//! behavioral segments, names them from their profiles, and persists the
//! fitted pipeline so new customers can be scored without retraining.

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
mod nan_serde;
pub mod naming;
pub mod pipeline;
pub mod preprocessing;
pub mod profile;
pub mod projection;
pub mod recommendation;
pub mod store;

// Re-export public items for easier access
pub use cli::{Args, Command};
pub use config::{EmptySegmentPolicy, SegmentationConfig, DEFAULT_FEATURE_COLUMNS};
pub use data::{load_customer_table, CustomerFeatureVector, CustomerTable};
pub use error::SegmentationError;
pub use pipeline::{CustomerSegment, FittedPipelineState, ProjectedCustomer, SegmentationPipeline};
pub use profile::SegmentProfile;
pub use recommendation::SegmentRecommendation;

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, SegmentationError>;
