//! Model-facing output of the pipeline
//!
//! A [`FeatureMatrix`] is column-major with every cell an `f64`; zero stands
//! in for absent values. It is co-indexed with a [`TargetVector`] and a
//! [`SideTable`] carrying everything the model must not see.

use std::sync::Arc;

use arrow::array::{ArrayRef, Date32Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::table::column::{Column, ColumnValues};

/// Days between 0001-01-01 (chrono's day one) and the Unix epoch
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// The ordered feature column names frozen when a pipeline is fit
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnSchema(Vec<String>);

impl ColumnSchema {
    #[must_use]
    pub const fn new(names: Vec<String>) -> Self {
        Self(names)
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Zero-filled feature values keyed by referral id
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    referral_ids: Vec<i64>,
    schema: ColumnSchema,
    columns: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Create a matrix from column-major values
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidValue`] if the column count does not
    /// match the schema or a column length does not match the row count.
    pub fn new(referral_ids: Vec<i64>, schema: ColumnSchema, columns: Vec<Vec<f64>>) -> Result<Self> {
        if columns.len() != schema.len() {
            return Err(PipelineError::InvalidValue {
                column: "feature matrix".to_string(),
                value: format!("{} columns for {} schema names", columns.len(), schema.len()),
                expected: "one column per schema name",
            });
        }
        if let Some((name, column)) = schema
            .iter()
            .zip(&columns)
            .find(|(_, column)| column.len() != referral_ids.len())
        {
            return Err(PipelineError::InvalidValue {
                column: name.to_string(),
                value: format!("{} rows", column.len()),
                expected: "a column matching the row count",
            });
        }
        Ok(Self {
            referral_ids,
            schema,
            columns,
        })
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.referral_ids.len()
    }

    #[must_use]
    pub fn num_features(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn referral_ids(&self) -> &[i64] {
        &self.referral_ids
    }

    #[must_use]
    pub const fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    /// Values of one feature by position
    #[must_use]
    pub fn feature(&self, index: usize) -> &[f64] {
        &self.columns[index]
    }

    /// Values of one feature by name
    #[must_use]
    pub fn feature_by_name(&self, name: &str) -> Option<&[f64]> {
        self.schema
            .iter()
            .position(|candidate| candidate == name)
            .map(|index| self.columns[index].as_slice())
    }

    /// A single cell
    #[must_use]
    pub fn value(&self, row: usize, feature: usize) -> f64 {
        self.columns[feature][row]
    }

    /// Keep the given rows, in the given order
    #[must_use]
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            referral_ids: rows.iter().map(|&row| self.referral_ids[row]).collect(),
            schema: self.schema.clone(),
            columns: self
                .columns
                .iter()
                .map(|column| rows.iter().map(|&row| column[row]).collect())
                .collect(),
        }
    }

    /// Convert to an Arrow batch: `referral_id`, the schema columns, and an
    /// optional `target` column
    pub fn to_record_batch(&self, target: Option<&TargetVector>) -> Result<RecordBatch> {
        let mut fields = Vec::with_capacity(self.columns.len() + 2);
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.columns.len() + 2);

        fields.push(Field::new("referral_id", DataType::Int64, false));
        arrays.push(Arc::new(Int64Array::from(self.referral_ids.clone())));

        for (name, column) in self.schema.iter().zip(&self.columns) {
            fields.push(Field::new(name, DataType::Float64, false));
            arrays.push(Arc::new(Float64Array::from(column.clone())));
        }

        if let Some(target) = target {
            fields.push(Field::new("target", DataType::Float64, false));
            arrays.push(Arc::new(Float64Array::from(target.values().to_vec())));
        }

        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
    }
}

/// One target value per feature-matrix row
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TargetVector(Vec<f64>);

impl TargetVector {
    #[must_use]
    pub const fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self(rows.iter().map(|&row| self.0[row]).collect())
    }
}

/// Keys and non-feature columns, co-indexed with the feature matrix
#[derive(Debug, Clone, PartialEq)]
pub struct SideTable {
    pub referral_ids: Vec<i64>,
    pub client_ids: Vec<i64>,
    pub taken_dates: Vec<NaiveDate>,
    pub columns: Vec<Column>,
}

impl SideTable {
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.referral_ids.len()
    }

    /// Look up a column by name
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Keep the given rows, in the given order
    #[must_use]
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            referral_ids: rows.iter().map(|&row| self.referral_ids[row]).collect(),
            client_ids: rows.iter().map(|&row| self.client_ids[row]).collect(),
            taken_dates: rows.iter().map(|&row| self.taken_dates[row]).collect(),
            columns: self
                .columns
                .iter()
                .map(|column| Column {
                    name: column.name.clone(),
                    values: column.values.take(rows),
                    group: column.group,
                })
                .collect(),
        }
    }

    /// Convert to an Arrow batch with the key columns first
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut fields = vec![
            Field::new("referral_id", DataType::Int64, false),
            Field::new("client_id", DataType::Int64, false),
            Field::new("taken_date", DataType::Date32, false),
        ];
        let mut arrays: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(self.referral_ids.clone())),
            Arc::new(Int64Array::from(self.client_ids.clone())),
            Arc::new(Date32Array::from(
                self.taken_dates.iter().map(|&d| to_date32(d)).collect::<Vec<_>>(),
            )),
        ];

        for column in &self.columns {
            let (data_type, array): (DataType, ArrayRef) = match &column.values {
                ColumnValues::Numeric(values) => {
                    (DataType::Float64, Arc::new(Float64Array::from(values.clone())))
                }
                ColumnValues::Text(values) => (
                    DataType::Utf8,
                    Arc::new(StringArray::from(
                        values.iter().map(Option::as_deref).collect::<Vec<_>>(),
                    )),
                ),
                ColumnValues::Date(values) => (
                    DataType::Date32,
                    Arc::new(Date32Array::from(
                        values.iter().map(|d| d.map(to_date32)).collect::<Vec<_>>(),
                    )),
                ),
            };
            fields.push(Field::new(&column.name, data_type, true));
            arrays.push(array);
        }

        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
    }
}

/// Days since the Unix epoch, Arrow's `Date32` representation
fn to_date32(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}
