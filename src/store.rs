//! Model bundle persistence
//!
//! A bundle is one directory holding a manifest plus one JSON artifact per
//! fitted component. Saving writes into a staging directory that is renamed
//! into place, so a reader sees either the old bundle or the complete new one.

use crate::config::SegmentationConfig;
use crate::error::SegmentationError;
use crate::model::ClusterAssigner;
use crate::pipeline::FittedPipelineState;
use crate::preprocessing::StandardScaler;
use crate::profile::SegmentProfile;
use crate::projection::Projector;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

pub const FORMAT_VERSION: u32 = 1;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const CLUSTERS_FILE: &str = "clusters.json";
pub const PROJECTOR_FILE: &str = "projector.json";
pub const FEATURES_FILE: &str = "feature_columns.json";
pub const PROFILES_FILE: &str = "segment_profiles.json";

const ARTIFACTS: [&str; 5] = [SCALER_FILE, CLUSTERS_FILE, PROJECTOR_FILE, FEATURES_FILE, PROFILES_FILE];

/// Describes a saved bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub config: SegmentationConfig,
    pub feature_columns: Vec<String>,
    pub artifacts: Vec<String>,
}

/// Write `state` and `config` to `model_dir`, replacing any bundle already there
#[instrument(skip_all, fields(path = ?model_dir))]
pub fn save_model(model_dir: &Path, config: &SegmentationConfig, state: &FittedPipelineState) -> crate::Result<()> {
    let staging = sibling_path(model_dir, "staging")?;
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    let written = write_artifacts(&staging, config, state);
    if let Err(e) = written {
        warn!(error = %e, "Failed to write model bundle");
        let _ = fs::remove_dir_all(&staging);
        return Err(e);
    }

    if model_dir.exists() {
        let previous = sibling_path(model_dir, "previous")?;
        if let Err(e) = replace_dir(&staging, model_dir, &previous) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }
    } else {
        fs::rename(&staging, model_dir)?;
    }

    info!(
        segments = state.profiles.len(),
        features = state.feature_columns.len(),
        "Model saved"
    );
    Ok(())
}

/// Read a bundle back; fails without partial state if anything is missing or inconsistent
#[instrument(skip_all, fields(path = ?model_dir))]
pub fn load_model(model_dir: &Path) -> crate::Result<(SegmentationConfig, FittedPipelineState)> {
    if !model_dir.is_dir() {
        return Err(SegmentationError::model_not_found(model_dir, "directory does not exist"));
    }
    for artifact in std::iter::once(MANIFEST_FILE).chain(ARTIFACTS) {
        if !model_dir.join(artifact).is_file() {
            return Err(SegmentationError::model_not_found(
                model_dir,
                format!("missing artifact {}", artifact),
            ));
        }
    }

    let manifest: ModelManifest = read_json(&model_dir.join(MANIFEST_FILE))?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(SegmentationError::CorruptModel(format!(
            "unsupported format version {} (expected {})",
            manifest.format_version, FORMAT_VERSION
        )));
    }

    let scaler: StandardScaler = read_json(&model_dir.join(SCALER_FILE))?;
    let clusters: ClusterAssigner = read_json(&model_dir.join(CLUSTERS_FILE))?;
    let projector: Projector = read_json(&model_dir.join(PROJECTOR_FILE))?;
    let feature_columns: Vec<String> = read_json(&model_dir.join(FEATURES_FILE))?;
    let profiles: Vec<SegmentProfile> = read_json(&model_dir.join(PROFILES_FILE))?;

    check_consistency(&manifest, &scaler, &clusters, &projector, &feature_columns, &profiles)?;

    info!(
        segments = profiles.len(),
        created_at = %manifest.created_at,
        "Model loaded"
    );

    Ok((
        manifest.config,
        FittedPipelineState {
            feature_columns,
            scaler,
            clusters,
            projector,
            profiles,
        },
    ))
}

fn write_artifacts(dir: &Path, config: &SegmentationConfig, state: &FittedPipelineState) -> crate::Result<()> {
    write_json(&dir.join(SCALER_FILE), &state.scaler)?;
    write_json(&dir.join(CLUSTERS_FILE), &state.clusters)?;
    write_json(&dir.join(PROJECTOR_FILE), &state.projector)?;
    write_json(&dir.join(FEATURES_FILE), &state.feature_columns)?;
    write_json(&dir.join(PROFILES_FILE), &state.profiles)?;

    // manifest last: its presence marks a complete bundle
    let manifest = ModelManifest {
        format_version: FORMAT_VERSION,
        created_at: Utc::now(),
        config: config.clone(),
        feature_columns: state.feature_columns.clone(),
        artifacts: ARTIFACTS.iter().map(|a| a.to_string()).collect(),
    };
    write_json(&dir.join(MANIFEST_FILE), &manifest)
}

/// Swap `staging` in for `target`, parking the old bundle at `previous`.
///
/// If the swap fails the old bundle is moved back to `target`.
fn replace_dir(staging: &Path, target: &Path, previous: &Path) -> crate::Result<()> {
    if previous.exists() {
        fs::remove_dir_all(previous)?;
    }
    fs::rename(target, previous)?;
    if let Err(e) = fs::rename(staging, target) {
        warn!(error = %e, "Failed to move new bundle into place, restoring previous bundle");
        fs::rename(previous, target)?;
        return Err(e.into());
    }
    fs::remove_dir_all(previous)?;
    Ok(())
}

fn check_consistency(
    manifest: &ModelManifest,
    scaler: &StandardScaler,
    clusters: &ClusterAssigner,
    projector: &Projector,
    feature_columns: &[String],
    profiles: &[SegmentProfile],
) -> crate::Result<()> {
    if manifest.feature_columns != feature_columns {
        return Err(SegmentationError::CorruptModel(
            "feature columns disagree with the manifest".to_string(),
        ));
    }

    let n_features = feature_columns.len();
    let dims = [
        ("scaler", scaler.n_features()),
        ("clusters", clusters.n_features()),
        ("projector", projector.n_features()),
    ];
    for (name, dim) in dims {
        if dim != n_features {
            return Err(SegmentationError::CorruptModel(format!(
                "{} expects {} features, feature list has {}",
                name, dim, n_features
            )));
        }
    }

    if clusters.centroids.nrows() != clusters.n_clusters || clusters.n_clusters != manifest.config.n_segments {
        return Err(SegmentationError::CorruptModel(format!(
            "{} centroids for {} configured segments",
            clusters.centroids.nrows(),
            manifest.config.n_segments
        )));
    }

    if let Some(profile) = profiles.iter().find(|p| p.segment >= clusters.n_clusters) {
        return Err(SegmentationError::CorruptModel(format!(
            "profile for segment {} but only {} clusters",
            profile.segment, clusters.n_clusters
        )));
    }

    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> crate::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> crate::Result<T> {
    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        SegmentationError::CorruptModel(format!("cannot parse {:?}: {}", path.file_name().unwrap_or_default(), e))
    })
}

/// `<parent>/.<name>.<suffix>`, next to `model_dir` so renames stay on one filesystem
fn sibling_path(model_dir: &Path, suffix: &str) -> crate::Result<PathBuf> {
    let name = model_dir
        .file_name()
        .ok_or_else(|| SegmentationError::InvalidParameters(format!("invalid model directory {:?}", model_dir)))?;
    let parent = model_dir.parent().unwrap_or_else(|| Path::new("."));
    Ok(parent.join(format!(".{}.{}", name.to_string_lossy(), suffix)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CUSTOMER_LIFETIME, RECENCY, TOTAL_SPEND, TRANSACTION_COUNT};
    use crate::data::CustomerTable;
    use crate::pipeline::SegmentationPipeline;
    use tempfile::TempDir;

    fn fitted() -> SegmentationPipeline {
        let spend = vec![Some(5000.0), Some(4800.0), Some(300.0), Some(350.0), Some(1200.0), Some(1100.0)];
        let table = CustomerTable::new(["a", "b", "c", "d", "e", "f"])
            .unwrap()
            .with_numeric_column(RECENCY, vec![Some(5.0), Some(8.0), Some(200.0), Some(180.0), Some(40.0), Some(45.0)])
            .unwrap()
            .with_numeric_column(TRANSACTION_COUNT, vec![Some(30.0), Some(28.0), Some(2.0), Some(3.0), Some(9.0), Some(10.0)])
            .unwrap()
            .with_numeric_column(TOTAL_SPEND, spend)
            .unwrap()
            .with_numeric_column(CUSTOMER_LIFETIME, vec![Some(700.0), Some(650.0), Some(30.0), Some(20.0), Some(300.0), Some(310.0)])
            .unwrap();

        let mut pipeline = SegmentationPipeline::with_segments(3).unwrap();
        let features = vec![RECENCY.to_string(), TRANSACTION_COUNT.to_string(), TOTAL_SPEND.to_string()];
        pipeline.fit(&table, Some(&features)).unwrap();
        pipeline
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let model_dir = dir.path().join("model-v1");
        let pipeline = fitted();

        pipeline.save_model(&model_dir).unwrap();
        for artifact in std::iter::once(MANIFEST_FILE).chain(ARTIFACTS) {
            assert!(model_dir.join(artifact).is_file(), "{} missing", artifact);
        }

        let (config, state) = load_model(&model_dir).unwrap();
        assert_eq!(&config, pipeline.config());
        assert_eq!(&state, pipeline.state().unwrap());
    }

    #[test]
    fn test_save_overwrites_previous_bundle() {
        let dir = TempDir::new().unwrap();
        let model_dir = dir.path().join("model");
        let pipeline = fitted();

        pipeline.save_model(&model_dir).unwrap();
        pipeline.save_model(&model_dir).unwrap();
        assert!(load_model(&model_dir).is_ok());

        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_failed_swap_restores_previous_bundle() {
        let dir = TempDir::new().unwrap();
        let model_dir = dir.path().join("model");
        fitted().save_model(&model_dir).unwrap();

        let staging = dir.path().join(".model.staging");
        let previous = dir.path().join(".model.previous");
        let result = replace_dir(&staging, &model_dir, &previous);

        assert!(matches!(result, Err(SegmentationError::Io(_))));
        assert!(!previous.exists());
        assert!(load_model(&model_dir).is_ok());
    }

    #[test]
    fn test_missing_artifact_is_model_not_found() {
        let dir = TempDir::new().unwrap();
        let model_dir = dir.path().join("model");
        fitted().save_model(&model_dir).unwrap();
        fs::remove_file(model_dir.join(PROJECTOR_FILE)).unwrap();

        let result = load_model(&model_dir);
        assert!(matches!(result, Err(SegmentationError::ModelNotFound { .. })));
    }

    #[test]
    fn test_missing_directory_is_model_not_found() {
        let dir = TempDir::new().unwrap();
        let result = load_model(&dir.path().join("nothing-here"));
        assert!(matches!(result, Err(SegmentationError::ModelNotFound { .. })));
    }

    #[test]
    fn test_inconsistent_bundle_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let model_dir = dir.path().join("model");
        fitted().save_model(&model_dir).unwrap();
        write_json(&model_dir.join(FEATURES_FILE), &vec!["recency".to_string()]).unwrap();

        let result = load_model(&model_dir);
        assert!(matches!(result, Err(SegmentationError::CorruptModel(_))));
    }
}
