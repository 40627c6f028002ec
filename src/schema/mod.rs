//! Adaptation of untyped input cells onto the types the pipeline works with.

pub mod adapt;

pub use adapt::{DateFormatConfig, parse_date_string};
