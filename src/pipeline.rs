//! Segmentation pipeline: fit, score, profile, project and persist

use crate::config::{SegmentationConfig, DEFAULT_FEATURE_COLUMNS, NAMING_COLUMNS};
use crate::data::CustomerTable;
use crate::error::SegmentationError;
use crate::model::ClusterAssigner;
use crate::naming::name_segments;
use crate::preprocessing::{resolve_feature_columns, select_and_impute, StandardScaler};
use crate::profile::{build_segment_profiles, SegmentProfile};
use crate::projection::Projector;
use crate::recommendation::{recommendation_for, SegmentRecommendation};
use crate::store;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Name reported for a cluster id with no profile row (a dropped empty segment)
pub const UNKNOWN_SEGMENT: &str = "Unknown";

/// Everything produced by one `fit`; replaced wholesale by the next one
#[derive(Debug, Clone, PartialEq)]
pub struct FittedPipelineState {
    pub(crate) feature_columns: Vec<String>,
    pub(crate) scaler: StandardScaler,
    pub(crate) clusters: ClusterAssigner,
    pub(crate) projector: Projector,
    pub(crate) profiles: Vec<SegmentProfile>,
}

impl FittedPipelineState {
    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn clusters(&self) -> &ClusterAssigner {
        &self.clusters
    }

    pub fn projector(&self) -> &Projector {
        &self.projector
    }

    pub fn profiles(&self) -> &[SegmentProfile] {
        &self.profiles
    }

    fn segment_name(&self, segment: usize) -> &str {
        self.profiles
            .iter()
            .find(|p| p.segment == segment)
            .map(|p| p.segment_name.as_str())
            .unwrap_or(UNKNOWN_SEGMENT)
    }

    /// Impute and scale `table` with the fitted statistics, without refitting
    fn normalize(&self, table: &CustomerTable) -> crate::Result<Array2<f64>> {
        let raw = select_and_impute(table, &self.feature_columns, Some(self.scaler.mean()))?;
        self.scaler.transform(&raw)
    }
}

/// One customer's segment, merged with the row it was scored from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerSegment {
    pub customer_id: String,
    pub segment: usize,
    pub segment_name: String,
    pub features: BTreeMap<String, Option<f64>>,
    pub attributes: BTreeMap<String, Option<String>>,
}

/// One customer's position on the two principal axes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedCustomer {
    pub customer_id: String,
    pub pc1: f64,
    pub pc2: f64,
    pub segment: usize,
    pub segment_name: String,
}

/// Customer segmentation model.
///
/// Holds at most one fitted state. Methods take `&self` or `&mut self` and do
/// no internal locking: callers must not run `fit` concurrently with any
/// other call on the same instance.
#[derive(Debug, Clone)]
pub struct SegmentationPipeline {
    config: SegmentationConfig,
    state: Option<FittedPipelineState>,
}

impl SegmentationPipeline {
    pub fn new(config: SegmentationConfig) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self { config, state: None })
    }

    pub fn with_segments(n_segments: usize) -> crate::Result<Self> {
        Self::new(SegmentationConfig::with_segments(n_segments))
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> crate::Result<&FittedPipelineState> {
        self.state.as_ref().ok_or(SegmentationError::NotFitted)
    }

    /// Train on `table`, replacing any previous model.
    ///
    /// # Arguments
    /// * `table` - Customer feature table
    /// * `feature_columns` - Columns to cluster on; the seven default features when `None`
    ///
    /// On error the previous model, if any, is left untouched.
    pub fn fit(&mut self, table: &CustomerTable, feature_columns: Option<&[String]>) -> crate::Result<()> {
        let feature_columns = resolve_feature_columns(table, feature_columns)?;
        let profile_columns = profile_columns(table, &feature_columns)?;

        if table.is_empty() {
            return Err(SegmentationError::InvalidTable(
                "cannot fit on a table with no customers".to_string(),
            ));
        }

        info!(
            customers = table.len(),
            features = feature_columns.len(),
            segments = self.config.n_segments,
            "Fitting segmentation pipeline"
        );

        let raw = select_and_impute(table, &feature_columns, None)?;
        let (scaler, normalized) = StandardScaler::fit_transform(&raw)?;

        let clusters = ClusterAssigner::fit(&normalized, &self.config)?;
        let labels = clusters.predict(&normalized)?;

        let profile_raw = select_and_impute(table, &profile_columns, None)?;
        let mut profiles = build_segment_profiles(
            &profile_columns,
            &profile_raw,
            &labels,
            clusters.n_clusters,
            self.config.empty_segments,
        )?;
        name_segments(&mut profiles);

        let projector = Projector::fit(&normalized)?;

        info!(
            inertia = clusters.inertia,
            names = ?profiles.iter().map(|p| p.segment_name.as_str()).collect::<Vec<_>>(),
            "Segmentation pipeline fitted"
        );

        self.state = Some(FittedPipelineState {
            feature_columns,
            scaler,
            clusters,
            projector,
            profiles,
        });
        Ok(())
    }

    /// Cluster id per customer, in table order, scored against the fitted centroids
    pub fn predict(&self, table: &CustomerTable) -> crate::Result<Vec<usize>> {
        let state = self.state()?;
        let normalized = state.normalize(table)?;
        Ok(state.clusters.predict(&normalized)?.to_vec())
    }

    pub fn fit_predict(
        &mut self,
        table: &CustomerTable,
        feature_columns: Option<&[String]>,
    ) -> crate::Result<Vec<usize>> {
        self.fit(table, feature_columns)?;
        self.predict(table)
    }

    /// Cluster id and segment name per customer, merged with the input row
    pub fn get_customer_segments(&self, table: &CustomerTable) -> crate::Result<Vec<CustomerSegment>> {
        let state = self.state()?;
        let labels = self.predict(table)?;

        Ok(labels
            .into_iter()
            .enumerate()
            .map(|(row, segment)| CustomerSegment {
                customer_id: table.customer_ids()[row].clone(),
                segment,
                segment_name: state.segment_name(segment).to_string(),
                features: table.row_features(row),
                attributes: table.row_attributes(row),
            })
            .collect())
    }

    pub fn get_segment_profiles(&self) -> crate::Result<&[SegmentProfile]> {
        Ok(&self.state()?.profiles)
    }

    /// Marketing guidance for every segment name in the profile table
    pub fn get_segment_recommendations(&self) -> crate::Result<BTreeMap<String, SegmentRecommendation>> {
        Ok(self
            .get_segment_profiles()?
            .iter()
            .map(|p| (p.segment_name.clone(), recommendation_for(&p.segment_name)))
            .collect())
    }

    /// Two-component projection per customer, with segment labels
    pub fn get_pca_components(&self, table: &CustomerTable) -> crate::Result<Vec<ProjectedCustomer>> {
        let state = self.state()?;
        let normalized = state.normalize(table)?;
        let projected = state.projector.transform(&normalized)?;
        let labels = state.clusters.predict(&normalized)?;

        Ok(projected
            .outer_iter()
            .zip(labels.iter())
            .enumerate()
            .map(|(row, (point, &segment))| ProjectedCustomer {
                customer_id: table.customer_ids()[row].clone(),
                pc1: point[0],
                pc2: point[1],
                segment,
                segment_name: state.segment_name(segment).to_string(),
            })
            .collect())
    }

    /// Persist the fitted model as one bundle directory
    pub fn save_model(&self, model_dir: impl AsRef<Path>) -> crate::Result<()> {
        store::save_model(model_dir.as_ref(), &self.config, self.state()?)
    }

    /// Rebuild a pipeline from a bundle written by `save_model`
    pub fn load_model(model_dir: impl AsRef<Path>) -> crate::Result<Self> {
        let (config, state) = store::load_model(model_dir.as_ref())?;
        Ok(Self {
            config,
            state: Some(state),
        })
    }
}

/// Fitted features, then every other default feature the table has values for.
///
/// The naming columns must be present even when they are not clustered on.
fn profile_columns(table: &CustomerTable, feature_columns: &[String]) -> crate::Result<Vec<String>> {
    if let Some(missing) = NAMING_COLUMNS.iter().find(|c| !table.has_numeric_column(c)) {
        return Err(SegmentationError::MissingFeature(missing.to_string()));
    }

    let mut columns = feature_columns.to_vec();
    for column in DEFAULT_FEATURE_COLUMNS {
        let observed = table
            .numeric_column(column)
            .map_or(false, |values| values.iter().any(Option::is_some));
        if observed && !columns.iter().any(|c| c == column) {
            columns.push(column.to_string());
        }
    }
    Ok(columns)
}
