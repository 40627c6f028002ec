//! JSON table ingestion
//!
//! Two shapes are accepted:
//! * a request body, `{"referral": [...], "client": [...], ...}`, where a
//!   null or empty list is an empty table;
//! * a retraining export, `[{"referral": [...], ...}, {...}]`, whose entries
//!   are concatenated per table.
//!
//! Arrow infers each table's schema from its records; numbers mixed into text
//! columns are coerced to strings.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use arrow::datatypes::Schema;
use arrow::error::ArrowError;
use arrow::json::ReaderBuilder;
use arrow::json::reader::infer_json_schema_from_iterator;
use arrow::record_batch::RecordBatch;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::{PipelineError, Result};
use crate::table::{RawTables, TableName};

/// Read a JSON document from disk
pub fn read_json_file(path: &Path) -> Result<Value> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Convert a list of JSON records into one record batch
///
/// # Errors
/// Returns an error if a record is not an object or the values cannot be
/// decoded against the inferred schema.
pub fn records_to_batch(records: &[Value]) -> Result<RecordBatch> {
    if records.is_empty() {
        return Ok(RecordBatch::new_empty(Arc::new(Schema::empty())));
    }
    if let Some(bad) = records.iter().find(|record| !record.is_object()) {
        return Err(PipelineError::InvalidValue {
            column: "record".to_string(),
            value: truncate(&bad.to_string()),
            expected: "a JSON object per record",
        });
    }

    let schema = infer_json_schema_from_iterator(records.iter().map(Ok::<_, ArrowError>))?;
    let mut decoder = ReaderBuilder::new(Arc::new(schema.clone()))
        .with_coerce_primitive(true)
        .with_batch_size(records.len())
        .build_decoder()?;
    decoder.serialize(records)?;

    match decoder.flush()? {
        Some(batch) => Ok(batch),
        None => Ok(RecordBatch::new_empty(Arc::new(schema))),
    }
}

/// Build the table set from a request body
///
/// Keys outside the known table set are ignored. Keys that are absent stay
/// absent, so the pipeline reports them as missing.
pub fn tables_from_request(body: &Value) -> Result<RawTables> {
    let object = body.as_object().ok_or_else(|| PipelineError::InvalidValue {
        column: "request".to_string(),
        value: truncate(&body.to_string()),
        expected: "an object keyed by table name",
    })?;

    let mut tables = RawTables::new();
    for (key, value) in object {
        let Ok(table) = key.parse::<TableName>() else {
            log::debug!("Ignoring unknown request key '{key}'");
            continue;
        };
        match value {
            Value::Null => tables.insert_empty(table),
            Value::Array(records) if records.is_empty() => tables.insert_empty(table),
            Value::Array(records) => tables.insert(table, records_to_batch(records)?)?,
            other => {
                return Err(PipelineError::InvalidValue {
                    column: key.clone(),
                    value: truncate(&other.to_string()),
                    expected: "a list of records or null",
                });
            }
        }
    }
    Ok(tables)
}

/// Build the table set from a retraining export
///
/// Only the first `limit` entries are used when a limit is given. Every known
/// table is present in the result; a table no entry mentions is empty.
pub fn tables_from_export(export: &Value, limit: Option<usize>) -> Result<RawTables> {
    let entries = export.as_array().ok_or_else(|| PipelineError::InvalidValue {
        column: "export".to_string(),
        value: truncate(&export.to_string()),
        expected: "a list of table objects",
    })?;
    let entries = match limit {
        Some(limit) => &entries[..limit.min(entries.len())],
        None => &entries[..],
    };

    // Table keys match case-insensitively, as in a request body
    let mut collected: FxHashMap<TableName, Vec<Value>> = FxHashMap::default();
    for entry in entries {
        let Some(object) = entry.as_object() else {
            return Err(PipelineError::InvalidValue {
                column: "export".to_string(),
                value: truncate(&entry.to_string()),
                expected: "an object keyed by table name",
            });
        };
        for (key, value) in object {
            let (Ok(table), Some(records)) = (key.parse::<TableName>(), value.as_array()) else {
                continue;
            };
            collected
                .entry(table)
                .or_default()
                .extend(records.iter().cloned());
        }
    }

    let mut tables = RawTables::new();
    for table in TableName::ALL {
        let records = collected.remove(&table).unwrap_or_default();
        log::debug!("Export table {table}: {} records", records.len());
        if records.is_empty() {
            tables.insert_empty(table);
        } else {
            tables.insert(table, records_to_batch(&records)?)?;
        }
    }
    log::info!(
        "Built {} tables with {} rows from {} export entries",
        tables.len(),
        tables.total_rows(),
        entries.len()
    );
    Ok(tables)
}

fn truncate(text: &str) -> String {
    const MAX: usize = 80;
    match text.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
