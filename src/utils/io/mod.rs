//! IO utilities for table ingestion and output
//!
//! Raw tables arrive either as JSON (a request body or a retraining export)
//! or as a directory of Parquet files, one per table.

pub mod json;
pub mod parquet;

use std::path::Path;

use serde_json::Value;

use crate::error::Result;
use crate::table::RawTables;

pub use json::{read_json_file, records_to_batch, tables_from_export, tables_from_request};
pub use parquet::{
    load_tables_from_dir, read_parquet_table, validate_directory, write_feature_matrix,
    write_record_batch,
};

/// Load raw tables from a Parquet directory or a JSON file
///
/// A JSON array is read as a retraining export (honouring `limit`), a JSON
/// object as a request body.
pub fn load_tables(path: &Path, limit: Option<usize>) -> Result<RawTables> {
    if path.is_dir() {
        return load_tables_from_dir(path);
    }
    match read_json_file(path)? {
        export @ Value::Array(_) => tables_from_export(&export, limit),
        body => tables_from_request(&body),
    }
}
