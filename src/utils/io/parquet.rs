//! Parquet file operations
//!
//! A table directory holds one `<table>.parquet` file per known table. Files
//! are read in parallel with rayon and each is concatenated into a single
//! record batch.

use std::fs::File;
use std::path::Path;
use std::time::Instant;

use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use rayon::prelude::*;

use crate::error::{PipelineError, Result};
use crate::table::{FeatureMatrix, RawTables, TableName, TargetVector};
use crate::utils::logging::{log_operation_complete, log_operation_start};

/// Validates that a directory exists and is a directory
///
/// # Errors
/// Returns an IO error of kind `NotFound` otherwise.
pub fn validate_directory(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(PipelineError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Directory does not exist: {}", dir.display()),
        )));
    }
    Ok(())
}

/// Read a Parquet file into a single record batch
pub fn read_parquet_table(path: &Path) -> Result<RecordBatch> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;

    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(concat_batches(&schema, &batches)?)
}

/// Load every known table from a directory
///
/// # Errors
/// Returns [`PipelineError::MissingTable`] for the first table without a
/// `<table>.parquet` file, or the first read error.
pub fn load_tables_from_dir(dir: &Path) -> Result<RawTables> {
    let start = Instant::now();
    let subject = dir.display().to_string();
    log_operation_start("Loading tables from", &subject);
    validate_directory(dir)?;

    let loaded: Vec<Result<(TableName, RecordBatch)>> = TableName::ALL
        .par_iter()
        .map(|&table| {
            let path = dir.join(format!("{table}.parquet"));
            if !path.is_file() {
                return Err(PipelineError::MissingTable {
                    table: table.to_string(),
                });
            }
            let batch = read_parquet_table(&path)?;
            log::debug!("Read {} rows from {}", batch.num_rows(), path.display());
            Ok((table, batch))
        })
        .collect();

    let loaded = loaded.into_iter().collect::<Result<Vec<_>>>()?;
    let tables = RawTables::from_named_batches(
        loaded.into_iter().map(|(table, batch)| (table.as_str(), batch)),
    )?;

    log_operation_complete(
        "loaded",
        &subject,
        tables.total_rows(),
        tables.len(),
        Some(start.elapsed()),
    );
    Ok(tables)
}

/// Write a record batch to a Parquet file, replacing any existing file
pub fn write_record_batch(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

/// Write a feature matrix with its target to Parquet
///
/// The file has a `referral_id` column, one column per schema name and a
/// `target` column.
pub fn write_feature_matrix(
    path: &Path,
    features: &FeatureMatrix,
    target: &TargetVector,
) -> Result<()> {
    let batch = features.to_record_batch(Some(target))?;
    write_record_batch(path, &batch)?;
    log::info!(
        "Wrote {} rows x {} features to {}",
        features.num_rows(),
        features.num_features(),
        path.display()
    );
    Ok(())
}
