//! Logging utilities for output and progress tracking
//!
//! This module provides the stage logging helpers and the progress bars used
//! by training.

pub mod log;
pub mod progress;

pub use log::{log_operation_complete, log_operation_start, log_warning};
pub use progress::{create_main_progress_bar, create_spinner, finish_progress_bar};
