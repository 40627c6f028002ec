//! Utilities for working with Arrow arrays.
//!
//! This module provides utility functions for locating columns in a record
//! batch and downcasting the arrays behind them with clear errors.

use arrow::array::{Array, ArrayRef, StringArray, new_null_array};
use arrow::compute::kernels::cast::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;

use crate::error::{PipelineError, Result};

/// Get a column from a record batch by name
///
/// # Arguments
///
/// * `batch` - The record batch containing the column
/// * `table` - The table the batch belongs to (for error messages)
/// * `column_name` - The name of the column to extract
/// * `required` - Whether the column is required (error if missing) or optional (None if missing)
///
/// # Returns
///
/// * `Ok(Some(ArrayRef))` - The column array if found
/// * `Ok(None)` - If the column is not found and `required` is false
/// * `Err(PipelineError::MissingColumn)` - If the column is not found and `required` is true
pub fn get_column(
    batch: &RecordBatch,
    table: &str,
    column_name: &str,
    required: bool,
) -> Result<Option<ArrayRef>> {
    match batch.schema().index_of(column_name) {
        Ok(idx) => Ok(Some(batch.column(idx).clone())),
        Err(_) if required => Err(PipelineError::MissingColumn {
            table: table.to_string(),
            column: column_name.to_string(),
        }),
        Err(_) => Ok(None),
    }
}

/// Downcast a column to a specific array type with clear error messages
///
/// # Type Parameters
///
/// * `A` - The target array type to downcast to
pub fn downcast_array<'a, A: Array + 'static>(
    array: &'a ArrayRef,
    column_name: &str,
    expected: &'static str,
) -> Result<&'a A> {
    array
        .as_any()
        .downcast_ref::<A>()
        .ok_or_else(|| PipelineError::InvalidValue {
            column: column_name.to_string(),
            value: format!("{:?}", array.data_type()),
            expected,
        })
}

/// Cast an array, reporting the first value the cast could not represent
///
/// Arrow's safe cast turns unconvertible values into nulls. This helper
/// compares null positions before and after the cast and turns the first new
/// null into an [`PipelineError::InvalidValue`].
pub fn strict_cast(
    array: &ArrayRef,
    to_type: &DataType,
    column_name: &str,
    expected: &'static str,
) -> Result<ArrayRef> {
    if array.data_type() == &DataType::Null {
        return Ok(new_null_array(to_type, array.len()));
    }

    let casted = cast(array.as_ref(), to_type)?;
    if casted.null_count() == array.null_count() {
        return Ok(casted);
    }

    let offending = (0..array.len()).find(|&row| array.is_valid(row) && casted.is_null(row));
    let value = match offending {
        Some(row) => cast(&array.slice(row, 1), &DataType::Utf8)
            .ok()
            .and_then(|single| {
                single
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .filter(|strings| strings.is_valid(0))
                    .map(|strings| strings.value(0).to_string())
            })
            .unwrap_or_else(|| format!("row {row}")),
        None => String::from("<unknown>"),
    };

    Err(PipelineError::InvalidValue {
        column: column_name.to_string(),
        value,
        expected,
    })
}

/// Cast an array leniently, returning `None` when any value fails to convert
pub fn try_cast(array: &ArrayRef, to_type: &DataType) -> Option<ArrayRef> {
    if array.data_type() == &DataType::Null {
        return Some(new_null_array(to_type, array.len()));
    }
    let casted = cast(array.as_ref(), to_type).ok()?;
    (casted.null_count() == array.null_count()).then_some(casted)
}
