//! A Rust library for turning client referral tables into a time-ordered
//! feature matrix and a look-ahead target, with training, scoring and a
//! versioned model registry on top.

pub mod config;
pub mod error;
pub mod model;
pub mod registry;
pub mod schema;
pub mod table;
pub mod transform;
pub mod utils;

// Re-export the most common types for easier use
// Core types
pub use config::{Config, ForestConfig, PipelineConfig, TrainingConfig};
pub use error::{PipelineError, Result};
pub use table::{
    ColumnSchema, FeatureGroup, FeatureMatrix, MasterTable, RawTables, SideTable, TableName,
    TargetVector,
};

// Pipeline
pub use transform::{Pipeline, PipelineOutput, Transformer};

// Model and registry
pub use model::{
    EvaluationReport, ExtraTreesRegressor, Prediction, Regressor, TrainedModel, TrainingOutcome,
    train,
};
pub use registry::{
    LocalObjectStore, MemoryObjectStore, ModelRegistry, ObjectStore, RegistryError,
};

// Arrow types
pub use arrow::record_batch::RecordBatch;

// Utility functions
pub use utils::io::{load_tables, load_tables_from_dir, tables_from_export, tables_from_request};
