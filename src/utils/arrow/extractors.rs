//! Column extraction utilities for Arrow record batches
//!
//! Raw tables arrive untyped: the same logical column can be an integer in a
//! parquet export, a float after a JSON round trip, or a string typed by hand.
//! The functions here pull whole columns out of an [`ArrayRef`] as the Rust
//! types the pipeline works with, converting where that is lossless.

use arrow::array::{Array, ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::DataType;
use chrono::NaiveDate;

use crate::error::{PipelineError, Result};
use crate::schema::adapt::{DateFormatConfig, parse_date_string};
use crate::utils::arrow::array_utils::{downcast_array, strict_cast, try_cast};

/// How a raw column is carried into the master table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    /// Numbers and booleans
    Numeric,
    /// Native dates and timestamps
    Temporal,
    /// Everything else
    Text,
}

/// Identify which kind of master-table column an Arrow type maps onto
#[must_use]
pub const fn classify(data_type: &DataType) -> CellKind {
    match data_type {
        DataType::Null
        | DataType::Boolean
        | DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _) => CellKind::Numeric,
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => CellKind::Temporal,
        _ => CellKind::Text,
    }
}

/// Extract an identifier column as `i64` values
///
/// # Errors
/// Returns [`PipelineError::InvalidValue`] if a non-null cell is not an integer.
pub fn to_i64_values(array: &ArrayRef, column_name: &str) -> Result<Vec<Option<i64>>> {
    let source = match array.data_type() {
        // Go through f64 so "12.0" and 12.0 are accepted, but never truncate
        DataType::Float16 | DataType::Float32 | DataType::Float64 => {
            let floats = to_f64_values(array, column_name)?;
            return floats
                .into_iter()
                .map(|value| match value {
                    Some(v) if v.fract() == 0.0 && v.is_finite() => Ok(Some(v as i64)),
                    Some(v) => Err(PipelineError::InvalidValue {
                        column: column_name.to_string(),
                        value: v.to_string(),
                        expected: "an integer identifier",
                    }),
                    None => Ok(None),
                })
                .collect();
        }
        _ => strict_cast(array, &DataType::Int64, column_name, "an integer identifier")?,
    };

    let ints = downcast_array::<Int64Array>(&source, column_name, "Int64")?;
    Ok(ints.iter().collect())
}

/// Extract a numeric column as `f64` values, failing on unparseable cells
///
/// # Errors
/// Returns [`PipelineError::InvalidValue`] if a non-null cell is not numeric.
pub fn to_f64_values(array: &ArrayRef, column_name: &str) -> Result<Vec<Option<f64>>> {
    let casted = strict_cast(array, &DataType::Float64, column_name, "a number")?;
    let floats = downcast_array::<Float64Array>(&casted, column_name, "Float64")?;
    Ok(floats.iter().collect())
}

/// Extract a column as `f64` values if every non-null cell is numeric
///
/// Booleans become 1.0/0.0. Strings are accepted only when all of them parse
/// as numbers; otherwise `None` is returned and the caller keeps the column
/// as text.
#[must_use]
pub fn try_f64_values(array: &ArrayRef) -> Option<Vec<Option<f64>>> {
    let casted = try_cast(array, &DataType::Float64)?;
    let floats = casted.as_any().downcast_ref::<Float64Array>()?;
    Some(floats.iter().collect())
}

/// Extract a column as categorical keys
///
/// Integral floats render as integers so that `12`, `12.0` and `"12"` are the
/// same category whichever route the data took. Booleans render as
/// `true`/`false`.
///
/// # Errors
/// Returns an error if the column type cannot be rendered as text.
pub fn to_key_values(array: &ArrayRef, column_name: &str) -> Result<Vec<Option<String>>> {
    match array.data_type() {
        DataType::Float16 | DataType::Float32 | DataType::Float64 => {
            let floats = to_f64_values(array, column_name)?;
            Ok(floats.into_iter().map(|v| v.map(format_key)).collect())
        }
        DataType::Boolean => {
            let bools = downcast_array::<BooleanArray>(array, column_name, "Boolean")?;
            Ok(bools.iter().map(|v| v.map(|b| b.to_string())).collect())
        }
        _ => {
            let casted = strict_cast(array, &DataType::Utf8, column_name, "a text value")?;
            let strings = downcast_array::<StringArray>(&casted, column_name, "Utf8")?;
            Ok(strings.iter().map(|v| v.map(str::to_string)).collect())
        }
    }
}

/// Render a float as a category key
#[must_use]
pub fn format_key(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Extract a column as dates
///
/// Native Arrow dates and timestamps are converted directly; strings are
/// parsed with the configured formats.
///
/// # Errors
/// Returns [`PipelineError::DateParse`] for the first non-null cell that is
/// not a recognisable date.
pub fn to_date_values(
    array: &ArrayRef,
    column_name: &str,
    config: &DateFormatConfig,
) -> Result<Vec<Option<NaiveDate>>> {
    match array.data_type() {
        DataType::Null => Ok(vec![None; array.len()]),
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => {
            let casted = strict_cast(array, &DataType::Date32, column_name, "a date")?;
            let dates = downcast_array::<Date32Array>(&casted, column_name, "Date32")?;
            (0..dates.len())
                .map(|row| {
                    if dates.is_null(row) {
                        return Ok(None);
                    }
                    dates
                        .value_as_date(row)
                        .map(Some)
                        .ok_or_else(|| PipelineError::DateParse {
                            column: column_name.to_string(),
                            value: dates.value(row).to_string(),
                        })
                })
                .collect()
        }
        _ => {
            let keys = to_key_values(array, column_name)?;
            keys.into_iter()
                .map(|cell| match cell {
                    None => Ok(None),
                    Some(text) => parse_date_string(&text, config).map(Some).ok_or_else(|| {
                        PipelineError::DateParse {
                            column: column_name.to_string(),
                            value: text,
                        }
                    }),
                })
                .collect()
        }
    }
}
