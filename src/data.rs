//! Customer feature tables and CSV input/output using Polars

use crate::config::{
    AVERAGE_BASKET_SIZE, AVERAGE_TRANSACTION_VALUE, CUSTOMER_LIFETIME, DEFAULT_FEATURE_COLUMNS,
    PURCHASE_FREQUENCY, RECENCY, TOTAL_SPEND, TRANSACTION_COUNT,
};
use crate::error::SegmentationError;
use crate::pipeline::{CustomerSegment, ProjectedCustomer};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Per-customer aggregates as produced by the upstream data loader
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerFeatureVector {
    pub customer_id: String,
    /// Days since last purchase
    pub recency: Option<f64>,
    pub transaction_count: Option<f64>,
    pub total_spend: Option<f64>,
    pub average_transaction_value: Option<f64>,
    pub purchase_frequency: Option<f64>,
    /// Days between first and last purchase
    pub customer_lifetime: Option<f64>,
    pub average_basket_size: Option<f64>,
    /// Demographic/categorical fields passed through untouched
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl CustomerFeatureVector {
    /// Build a record with every feature present, in `DEFAULT_FEATURE_COLUMNS` order
    pub fn from_values(customer_id: impl Into<String>, values: [f64; 7]) -> Self {
        Self {
            customer_id: customer_id.into(),
            recency: Some(values[0]),
            transaction_count: Some(values[1]),
            total_spend: Some(values[2]),
            average_transaction_value: Some(values[3]),
            purchase_frequency: Some(values[4]),
            customer_lifetime: Some(values[5]),
            average_basket_size: Some(values[6]),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    fn feature(&self, name: &str) -> Option<f64> {
        match name {
            RECENCY => self.recency,
            TRANSACTION_COUNT => self.transaction_count,
            TOTAL_SPEND => self.total_spend,
            AVERAGE_TRANSACTION_VALUE => self.average_transaction_value,
            PURCHASE_FREQUENCY => self.purchase_frequency,
            CUSTOMER_LIFETIME => self.customer_lifetime,
            AVERAGE_BASKET_SIZE => self.average_basket_size,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumericColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalColumn {
    pub name: String,
    pub values: Vec<Option<String>>,
}

/// Column-oriented customer table keyed by a unique customer id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerTable {
    customer_ids: Vec<String>,
    numeric: Vec<NumericColumn>,
    categorical: Vec<CategoricalColumn>,
}

impl CustomerTable {
    /// Create a table with no columns; fails if any id repeats
    pub fn new<I, S>(customer_ids: I) -> crate::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let customer_ids: Vec<String> = customer_ids.into_iter().map(Into::into).collect();
        let mut seen = HashSet::with_capacity(customer_ids.len());
        for id in &customer_ids {
            if !seen.insert(id.as_str()) {
                return Err(SegmentationError::DuplicateCustomerId(id.clone()));
            }
        }

        Ok(Self {
            customer_ids,
            numeric: Vec::new(),
            categorical: Vec::new(),
        })
    }

    pub fn with_numeric_column(
        mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> crate::Result<Self> {
        let name = name.into();
        self.check_new_column(&name, values.len())?;
        self.numeric.push(NumericColumn { name, values });
        Ok(self)
    }

    pub fn with_categorical_column(
        mut self,
        name: impl Into<String>,
        values: Vec<Option<String>>,
    ) -> crate::Result<Self> {
        let name = name.into();
        self.check_new_column(&name, values.len())?;
        self.categorical.push(CategoricalColumn { name, values });
        Ok(self)
    }

    /// Build a table from typed records.
    ///
    /// All seven default features become numeric columns; the union of every
    /// record's attribute keys becomes categorical columns.
    pub fn from_feature_vectors(records: &[CustomerFeatureVector]) -> crate::Result<Self> {
        let mut table = Self::new(records.iter().map(|r| r.customer_id.clone()))?;

        for column in DEFAULT_FEATURE_COLUMNS {
            let values = records.iter().map(|r| r.feature(column)).collect();
            table = table.with_numeric_column(column, values)?;
        }

        let attribute_names: BTreeSet<&String> =
            records.iter().flat_map(|r| r.attributes.keys()).collect();
        for name in attribute_names {
            let values = records.iter().map(|r| r.attributes.get(name).cloned()).collect();
            table = table.with_categorical_column(name.clone(), values)?;
        }

        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.customer_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customer_ids.is_empty()
    }

    pub fn customer_ids(&self) -> &[String] {
        &self.customer_ids
    }

    pub fn numeric_column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.numeric
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn numeric_columns(&self) -> &[NumericColumn] {
        &self.numeric
    }

    pub fn categorical_columns(&self) -> &[CategoricalColumn] {
        &self.categorical
    }

    pub fn has_numeric_column(&self, name: &str) -> bool {
        self.numeric.iter().any(|c| c.name == name)
    }

    /// All numeric values of one row, keyed by column name
    pub fn row_features(&self, row: usize) -> BTreeMap<String, Option<f64>> {
        self.numeric
            .iter()
            .map(|c| (c.name.clone(), c.values.get(row).copied().flatten()))
            .collect()
    }

    /// All pass-through values of one row, keyed by column name
    pub fn row_attributes(&self, row: usize) -> BTreeMap<String, Option<String>> {
        self.categorical
            .iter()
            .map(|c| (c.name.clone(), c.values.get(row).cloned().flatten()))
            .collect()
    }

    fn check_new_column(&self, name: &str, len: usize) -> crate::Result<()> {
        if len != self.customer_ids.len() {
            return Err(SegmentationError::InvalidTable(format!(
                "column `{}` has {} values but the table has {} customers",
                name,
                len,
                self.customer_ids.len()
            )));
        }
        let taken = self.numeric.iter().any(|c| c.name == name)
            || self.categorical.iter().any(|c| c.name == name);
        if taken {
            return Err(SegmentationError::InvalidTable(format!(
                "column `{}` is defined twice",
                name
            )));
        }
        Ok(())
    }
}

/// Load a customer feature table from a CSV file
///
/// # Arguments
/// * `file_path` - Path to the CSV file (header row required)
/// * `id_column` - Name of the unique customer id column
///
/// # Returns
/// * `CustomerTable` with numeric columns as features and every other column passed through
pub fn load_customer_table(file_path: impl AsRef<Path>, id_column: &str) -> crate::Result<CustomerTable> {
    let df = CsvReader::from_path(file_path.as_ref())?
        .has_header(true)
        .infer_schema(Some(1000))
        .finish()?;

    if df.height() == 0 {
        return Err(SegmentationError::InvalidTable(format!(
            "no customer rows found in {:?}",
            file_path.as_ref()
        )));
    }

    let ids = df
        .column(id_column)
        .map_err(|_| SegmentationError::InvalidTable(format!("id column `{}` not found", id_column)))?
        .cast(&DataType::Utf8)?;
    let customer_ids = ids
        .utf8()?
        .into_iter()
        .enumerate()
        .map(|(row, id)| {
            id.map(str::to_string).ok_or_else(|| {
                SegmentationError::InvalidTable(format!("customer id missing on row {}", row + 1))
            })
        })
        .collect::<crate::Result<Vec<String>>>()?;

    let mut table = CustomerTable::new(customer_ids)?;

    for series in df.get_columns() {
        if series.name() == id_column {
            continue;
        }
        if series.dtype().is_numeric() {
            let values = series.cast(&DataType::Float64)?;
            let values: Vec<Option<f64>> = values.f64()?.into_iter().collect();
            table = table.with_numeric_column(series.name(), values)?;
        } else {
            let values = series.cast(&DataType::Utf8)?;
            let values: Vec<Option<String>> = values
                .utf8()?
                .into_iter()
                .map(|v| v.map(str::to_string))
                .collect();
            table = table.with_categorical_column(series.name(), values)?;
        }
    }

    debug!(
        customers = table.len(),
        numeric_columns = table.numeric_columns().len(),
        "Loaded customer table"
    );

    Ok(table)
}

/// Write per-customer segment assignments, merged with the input row.
///
/// Numeric features follow the assignment columns, then the pass-through
/// attributes. An input column reusing an assignment column name is left out.
pub fn write_segments_csv(segments: &[CustomerSegment], output_path: impl AsRef<Path>) -> crate::Result<()> {
    const ASSIGNMENT_COLUMNS: [&str; 3] = ["customer_id", "segment", "segment_name"];

    let ids: Vec<&str> = segments.iter().map(|s| s.customer_id.as_str()).collect();
    let labels: Vec<u32> = segments.iter().map(|s| s.segment as u32).collect();
    let names: Vec<&str> = segments.iter().map(|s| s.segment_name.as_str()).collect();

    let mut columns = vec![
        Series::new(ASSIGNMENT_COLUMNS[0], ids),
        Series::new(ASSIGNMENT_COLUMNS[1], labels),
        Series::new(ASSIGNMENT_COLUMNS[2], names),
    ];
    let passes_through = |name: &str| !ASSIGNMENT_COLUMNS.contains(&name);

    let feature_names: BTreeSet<&String> = segments.iter().flat_map(|s| s.features.keys()).collect();
    for name in feature_names.into_iter().filter(|n| passes_through(n)) {
        let values: Vec<Option<f64>> = segments
            .iter()
            .map(|s| s.features.get(name).copied().flatten())
            .collect();
        columns.push(Series::new(name, values));
    }

    let attribute_names: BTreeSet<&String> = segments.iter().flat_map(|s| s.attributes.keys()).collect();
    for name in attribute_names.into_iter().filter(|n| passes_through(n)) {
        let values: Vec<Option<&str>> = segments
            .iter()
            .map(|s| s.attributes.get(name).and_then(|v| v.as_deref()))
            .collect();
        columns.push(Series::new(name, values));
    }

    write_csv(columns, output_path.as_ref())
}

/// Write the two-component projection with segment labels
pub fn write_projection_csv(points: &[ProjectedCustomer], output_path: impl AsRef<Path>) -> crate::Result<()> {
    let ids: Vec<&str> = points.iter().map(|p| p.customer_id.as_str()).collect();
    let pc1: Vec<f64> = points.iter().map(|p| p.pc1).collect();
    let pc2: Vec<f64> = points.iter().map(|p| p.pc2).collect();
    let labels: Vec<u32> = points.iter().map(|p| p.segment as u32).collect();
    let names: Vec<&str> = points.iter().map(|p| p.segment_name.as_str()).collect();

    let columns = vec![
        Series::new("customer_id", ids),
        Series::new("pc1", pc1),
        Series::new("pc2", pc2),
        Series::new("segment", labels),
        Series::new("segment_name", names),
    ];

    write_csv(columns, output_path.as_ref())
}

fn write_csv(columns: Vec<Series>, output_path: &Path) -> crate::Result<()> {
    let mut df = DataFrame::new(columns)?;
    let mut file = File::create(output_path)?;
    CsvWriter::new(&mut file).finish(&mut df)?;
    Ok(())
}
