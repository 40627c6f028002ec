//! Table types flowing through the feature pipeline
//!
//! Raw tables come in as Arrow record batches, are consolidated into a
//! [`MasterTable`] with one row per referral, and leave as a
//! [`FeatureMatrix`] with its [`TargetVector`] and [`SideTable`].

pub mod column;
pub mod feature_matrix;
pub mod master;
pub mod raw;

pub use column::{Column, ColumnValues, FeatureGroup};
pub use feature_matrix::{ColumnSchema, FeatureMatrix, SideTable, TargetVector};
pub use master::MasterTable;
pub use raw::{RawTables, TableName};
