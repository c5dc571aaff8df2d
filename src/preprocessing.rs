//! Feature selection, mean imputation and standard scaling

use crate::config::DEFAULT_FEATURE_COLUMNS;
use crate::data::CustomerTable;
use crate::error::SegmentationError;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Resolve the clustering columns against a table.
///
/// With no explicit list the default RFM features are used. Every column,
/// explicit or default, must exist in the table.
pub fn resolve_feature_columns(
    table: &CustomerTable,
    requested: Option<&[String]>,
) -> crate::Result<Vec<String>> {
    let columns: Vec<String> = match requested {
        Some(columns) => columns.to_vec(),
        None => DEFAULT_FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
    };

    if columns.is_empty() {
        return Err(SegmentationError::InvalidParameters(
            "at least one feature column is required".to_string(),
        ));
    }

    for column in &columns {
        if !table.has_numeric_column(column) {
            return Err(SegmentationError::MissingFeature(column.clone()));
        }
    }

    Ok(columns)
}

/// Extract `columns` as a dense matrix, filling gaps with the column mean.
///
/// The mean is taken over the values present in `table` itself. A column with
/// no values at all is filled from `fallback` when given, otherwise it is an error.
pub fn select_and_impute(
    table: &CustomerTable,
    columns: &[String],
    fallback: Option<&Array1<f64>>,
) -> crate::Result<Array2<f64>> {
    let mut matrix = Array2::zeros((table.len(), columns.len()));

    for (j, column) in columns.iter().enumerate() {
        let values = table
            .numeric_column(column)
            .ok_or_else(|| SegmentationError::MissingFeature(column.clone()))?;

        let mut sum = 0.0;
        let mut observed = 0usize;
        for (row, value) in values.iter().enumerate() {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(SegmentationError::InvalidTable(format!(
                        "column `{}` has a non-finite value on row {}",
                        column,
                        row + 1
                    )));
                }
                sum += v;
                observed += 1;
            }
        }

        let fill = if observed > 0 {
            sum / observed as f64
        } else {
            match fallback {
                Some(means) => means[j],
                None => {
                    return Err(SegmentationError::InvalidTable(format!(
                        "column `{}` has no observed values",
                        column
                    )))
                }
            }
        };

        for (row, value) in values.iter().enumerate() {
            matrix[[row, j]] = value.unwrap_or(fill);
        }
    }

    Ok(matrix)
}

/// Zero-mean/unit-variance scaler remembering its fitted statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    /// Population standard deviation per feature; zero for constant features
    std: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(features: &Array2<f64>) -> crate::Result<Self> {
        if features.nrows() == 0 {
            return Err(SegmentationError::InvalidTable(
                "cannot fit a scaler on an empty table".to_string(),
            ));
        }
        let mean = features
            .mean_axis(Axis(0))
            .ok_or_else(|| SegmentationError::InvalidTable("empty feature matrix".to_string()))?;
        let std = features.std_axis(Axis(0), 0.0);
        Ok(Self { mean, std })
    }

    /// Apply the stored statistics; a constant feature maps to 0 for every row
    pub fn transform(&self, features: &Array2<f64>) -> crate::Result<Array2<f64>> {
        if features.ncols() != self.mean.len() {
            return Err(SegmentationError::ShapeMismatch {
                expected: self.mean.len(),
                got: features.ncols(),
            });
        }

        let mut scaled = features.clone();
        for (j, mut column) in scaled.axis_iter_mut(Axis(1)).enumerate() {
            let (mean, std) = (self.mean[j], self.std[j]);
            if std > 0.0 {
                column.mapv_inplace(|x| (x - mean) / std);
            } else {
                column.fill(0.0);
            }
        }
        Ok(scaled)
    }

    pub fn fit_transform(features: &Array2<f64>) -> crate::Result<(Self, Array2<f64>)> {
        let scaler = Self::fit(features)?;
        let scaled = scaler.transform(features)?;
        Ok((scaler, scaled))
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn std(&self) -> &Array1<f64> {
        &self.std
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn table() -> CustomerTable {
        CustomerTable::new(["a", "b", "c", "d"])
            .unwrap()
            .with_numeric_column("recency", vec![Some(1.0), Some(3.0), None, Some(8.0)])
            .unwrap()
            .with_numeric_column("total_spend", vec![Some(10.0), Some(10.0), Some(10.0), Some(10.0)])
            .unwrap()
            .with_numeric_column("empty", vec![None, None, None, None])
            .unwrap()
    }

    #[test]
    fn test_missing_feature_is_error() {
        let columns = vec!["recency".to_string(), "loyalty".to_string()];
        let result = resolve_feature_columns(&table(), Some(&columns));
        assert!(matches!(result, Err(SegmentationError::MissingFeature(c)) if c == "loyalty"));
    }

    #[test]
    fn test_default_columns_require_all_defaults() {
        let result = resolve_feature_columns(&table(), None);
        assert!(matches!(result, Err(SegmentationError::MissingFeature(_))));
    }

    #[test]
    fn test_imputes_with_input_mean() {
        let columns = vec!["recency".to_string()];
        let matrix = select_and_impute(&table(), &columns, None).unwrap();
        assert_abs_diff_eq!(matrix[[2, 0]], 4.0);
        assert_abs_diff_eq!(matrix[[3, 0]], 8.0);
    }

    #[test]
    fn test_all_missing_column_uses_fallback() {
        let columns = vec!["empty".to_string()];
        assert!(select_and_impute(&table(), &columns, None).is_err());

        let fallback = array![2.5];
        let matrix = select_and_impute(&table(), &columns, Some(&fallback)).unwrap();
        assert!(matrix.iter().all(|&v| v == 2.5));
    }

    #[test]
    fn test_scaler_zero_mean_unit_variance() {
        let features = array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0], [6.0, 5.0]];
        let (scaler, scaled) = StandardScaler::fit_transform(&features).unwrap();

        assert_abs_diff_eq!(scaler.mean()[0], 3.0);
        let column = scaled.column(0);
        assert_abs_diff_eq!(column.mean().unwrap(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(column.std(0.0), 1.0, epsilon = 1e-12);

        // constant column
        assert!(scaled.column(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_transform_reuses_fitted_statistics() {
        let train = array![[0.0], [10.0]];
        let scaler = StandardScaler::fit(&train).unwrap();
        let scaled = scaler.transform(&array![[15.0]]).unwrap();
        assert_abs_diff_eq!(scaled[[0, 0]], 2.0);

        assert!(matches!(
            scaler.transform(&array![[1.0, 2.0]]),
            Err(SegmentationError::ShapeMismatch { expected: 1, got: 2 })
        ));
    }
}
