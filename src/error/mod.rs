//! Error handling for the referral feature pipeline.

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use std::io;

/// Specialized error type for the feature pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A required table key was not supplied at all
    #[error(
        "table '{table}' not found; this table is required, supply an empty table when there is no data"
    )]
    MissingTable { table: String },

    /// A table that must carry rows was supplied empty
    #[error("table '{table}' contains no data; this table must be populated")]
    EmptyRequiredTable { table: String },

    /// A structural column is absent from a table
    #[error("column '{column}' not found in table '{table}'")]
    MissingColumn { table: String, column: String },

    /// A date cell could not be parsed
    #[error("could not parse '{value}' in column '{column}' as a date")]
    DateParse { column: String, value: String },

    /// A cell held a value of the wrong kind
    #[error("invalid value '{value}' in column '{column}': expected {expected}")]
    InvalidValue {
        column: String,
        value: String,
        expected: &'static str,
    },

    /// A primary key appeared more than once
    #[error("duplicate key {key} in table '{table}'")]
    DuplicateKey { table: String, key: i64 },

    /// `transform` was called on a component that was never fit
    #[error("{component} has not been fit; call fit_transform first")]
    NotFitted { component: &'static str },

    /// Model training or prediction failed
    #[error("model error: {0}")]
    Model(String),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialisation error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
