//! Module for handling date and type adaptation of raw table cells.

pub mod date_utils;
pub mod types;

// Re-export the main types and functions for easier access
pub use date_utils::{detect_date_format, parse_date_string};
pub use types::DateFormatConfig;
