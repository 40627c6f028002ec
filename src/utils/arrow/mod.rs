//! Arrow data handling utilities
//!
//! This module contains utilities for locating columns in record batches and
//! extracting them as the typed vectors the pipeline works with.

pub mod array_utils;
pub mod extractors;

pub use array_utils::{get_column, strict_cast, try_cast};
pub use extractors::{
    CellKind, classify, format_key, to_date_values, to_f64_values, to_i64_values,
    to_key_values, try_f64_values,
};
