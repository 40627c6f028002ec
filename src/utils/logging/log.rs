//! Logging utilities
//!
//! This module provides standardized logging functions for pipeline stages.

use std::time::Duration;

/// Log the start of a stage with consistent format
///
/// # Arguments
/// * `operation` - Description of the operation
/// * `subject` - What the operation works on (a table, a step, a path)
pub fn log_operation_start(operation: &str, subject: &str) {
    log::info!("{operation} {subject}");
}

/// Log a stage completion with consistent format
///
/// # Arguments
/// * `operation` - Description of the operation
/// * `subject` - What the operation worked on
/// * `rows` - Number of rows produced
/// * `columns` - Number of columns produced
/// * `elapsed` - Optional elapsed time
pub fn log_operation_complete(
    operation: &str,
    subject: &str,
    rows: usize,
    columns: usize,
    elapsed: Option<Duration>,
) {
    if let Some(duration) = elapsed {
        log::info!(
            "Successfully {operation} {subject}: {rows} rows x {columns} columns in {duration:?}"
        );
    } else {
        log::info!("Successfully {operation} {subject}: {rows} rows x {columns} columns");
    }
}

/// Log a recovered condition with consistent format
///
/// # Arguments
/// * `message` - Warning message
/// * `context` - Optional subject the warning relates to
pub fn log_warning(message: &str, context: Option<&str>) {
    if let Some(context) = context {
        log::warn!("{context}: {message}");
    } else {
        log::warn!("{message}");
    }
}
