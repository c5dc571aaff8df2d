//! Two-component principal-component projection for visualization

use crate::error::SegmentationError;
use linfa::prelude::*;
use linfa_reduction::Pca;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

const N_COMPONENTS: usize = 2;

/// Fitted PCA basis in normalized feature space.
///
/// Always reports two axes. When the data supports fewer (a single feature,
/// a single customer, or no spread along a second direction) the missing
/// axis projects every customer to 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Projector {
    pca: Pca<f64>,
    n_features: usize,
    /// +1 or -1 per fitted axis so its largest loading is positive
    signs: Array1<f64>,
    /// Sample variance along each of the two axes
    explained_variance: Array1<f64>,
}

impl Projector {
    pub fn fit(features: &Array2<f64>) -> crate::Result<Self> {
        let (n, dim) = features.dim();
        if n == 0 || dim == 0 {
            return Err(SegmentationError::InvalidTable(
                "cannot fit a projection on an empty feature matrix".to_string(),
            ));
        }

        let embedding_size = N_COMPONENTS.min(dim).min(n);
        let dataset = DatasetBase::from(features.clone());
        let pca = Pca::params(embedding_size)
            .fit(&dataset)
            .map_err(|e| SegmentationError::Projection(e.to_string()))?;

        let mut projector = Self {
            pca,
            n_features: dim,
            signs: Array1::ones(0),
            explained_variance: Array1::zeros(N_COMPONENTS),
        };

        let axes = projector.raw_components();
        projector.signs = axes
            .outer_iter()
            .map(|axis| {
                let pivot = axis
                    .iter()
                    .copied()
                    .max_by(|a, b| a.abs().total_cmp(&b.abs()))
                    .unwrap_or(0.0);
                if pivot < 0.0 {
                    -1.0
                } else {
                    1.0
                }
            })
            .collect();

        let denominator = n.saturating_sub(1).max(1) as f64;
        for (j, sigma) in projector.pca.singular_values().iter().take(N_COMPONENTS).enumerate() {
            projector.explained_variance[j] = sigma * sigma / denominator;
        }

        debug!(
            pc1_variance = projector.explained_variance[0],
            pc2_variance = projector.explained_variance[1],
            "Projection fitted"
        );

        Ok(projector)
    }

    /// Project rows onto the fitted axes; returns (n_rows, 2)
    pub fn transform(&self, features: &Array2<f64>) -> crate::Result<Array2<f64>> {
        if features.ncols() != self.n_features {
            return Err(SegmentationError::ShapeMismatch {
                expected: self.n_features,
                got: features.ncols(),
            });
        }

        let projected: Array2<f64> = self.pca.predict(features);
        let mut out = Array2::zeros((features.nrows(), N_COMPONENTS));
        for (j, &sign) in self.signs.iter().enumerate().take(projected.ncols().min(N_COMPONENTS)) {
            out.column_mut(j).assign(&projected.column(j).mapv(|v| v * sign));
        }
        Ok(out)
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Unit principal axes, one row per component (2, n_features)
    pub fn components(&self) -> Array2<f64> {
        let raw = self.raw_components();
        let mut components = Array2::zeros((N_COMPONENTS, self.n_features));
        for (j, (axis, &sign)) in raw.outer_iter().zip(self.signs.iter()).enumerate().take(N_COMPONENTS) {
            components.row_mut(j).assign(&axis.mapv(|v| v * sign));
        }
        components
    }

    pub fn explained_variance(&self) -> &Array1<f64> {
        &self.explained_variance
    }

    /// Fitted axes as rows, read back through the model's own projection:
    /// projecting the unit vectors and subtracting the projected origin.
    fn raw_components(&self) -> Array2<f64> {
        let origin: Array2<f64> = self.pca.predict(&Array2::<f64>::zeros((1, self.n_features)));
        let basis: Array2<f64> = self.pca.predict(&Array2::<f64>::eye(self.n_features));
        (basis - &origin.index_axis(Axis(0), 0)).reversed_axes()
    }
}

impl PartialEq for Projector {
    fn eq(&self, other: &Self) -> bool {
        self.n_features == other.n_features
            && self.signs == other.signs
            && self.explained_variance == other.explained_variance
            && self.pca.singular_values() == other.pca.singular_values()
            && self.raw_components() == other.raw_components()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_axes_follow_variance() {
        let features = array![
            [-2.0, -4.0, 0.1],
            [-1.0, -2.0, -0.2],
            [0.0, 0.0, 0.2],
            [1.0, 2.0, -0.2],
            [2.0, 4.0, 0.1]
        ];
        let projector = Projector::fit(&features).unwrap();

        let components = projector.components();
        let pc1 = components.row(0);
        let scale = 5f64.sqrt();
        assert_abs_diff_eq!(pc1[0], 1.0 / scale, epsilon = 1e-6);
        assert_abs_diff_eq!(pc1[1], 2.0 / scale, epsilon = 1e-6);
        assert_abs_diff_eq!(components.row(1).dot(&pc1), 0.0, epsilon = 1e-6);

        let projected = projector.transform(&features).unwrap();
        assert_eq!(projected.shape(), &[5, 2]);
        assert_abs_diff_eq!(projected[[4, 0]], 10.0 / scale, epsilon = 1e-6);
        assert!(projector.explained_variance()[0] > projector.explained_variance()[1]);
    }

    #[test]
    fn test_transform_reuses_basis() {
        let features = array![[1.0, 0.0, 0.5], [-1.0, 0.2, 0.1], [0.3, -0.8, 0.0], [0.0, 0.6, -0.6]];
        let projector = Projector::fit(&features).unwrap();
        let again = Projector::fit(&features).unwrap();
        assert_eq!(projector, again);

        let single = projector.transform(&features.slice(ndarray::s![0..1, ..]).to_owned()).unwrap();
        let all = projector.transform(&features).unwrap();
        for (a, b) in single.row(0).iter().zip(all.row(0).iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_single_feature_pads_second_axis() {
        let features = array![[-1.0], [0.0], [1.0], [2.0]];
        let projector = Projector::fit(&features).unwrap();
        let projected = projector.transform(&features).unwrap();

        assert_eq!(projected.shape(), &[4, 2]);
        assert!(projected.column(1).iter().all(|&v| v == 0.0));
        assert_abs_diff_eq!(projected[[3, 0]] - projected[[0, 0]], 3.0, epsilon = 1e-6);
        assert_eq!(projector.explained_variance()[1], 0.0);
    }

    #[test]
    fn test_serde_keeps_projection() {
        let features = array![[1.0, 2.0, 0.0], [3.0, 5.0, 1.0], [0.5, -1.0, 2.0], [2.0, 0.0, -1.0]];
        let projector = Projector::fit(&features).unwrap();
        let json = serde_json::to_string(&projector).unwrap();
        let restored: Projector = serde_json::from_str(&json).unwrap();

        assert_eq!(
            restored.transform(&features).unwrap(),
            projector.transform(&features).unwrap()
        );
    }

    #[test]
    fn test_dimension_checked() {
        let projector = Projector::fit(&array![[1.0, 2.0], [3.0, 5.0], [0.0, 1.0]]).unwrap();
        assert!(projector.transform(&array![[1.0]]).is_err());
    }
}
