//! Shared utilities
//!
//! Arrow extraction helpers, table ingestion and output, logging helpers and
//! small statistics used by both the pipeline and model evaluation.

pub mod arrow;
pub mod io;
pub mod logging;
pub mod stats;
