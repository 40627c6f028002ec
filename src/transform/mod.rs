//! Feature pipeline transformers
//!
//! The pipeline runs in three phases:
//! 1. [`TableConsolidator`] joins the raw tables into a [`MasterTable`].
//! 2. An ordered list of [`PipelineStep`]s adds time, look-ahead, rolling and
//!    current/ever features to the master table.
//! 3. [`SchemaAligner`] freezes the feature columns at fit time and reindexes
//!    every later table onto them.
//!
//! Every component has the same two-mode contract: `fit_transform` may learn
//! state, `transform` only reads it.

pub mod align;
pub mod consolidate;
pub mod current_ever;
pub mod look_ahead;
pub mod pipeline;
pub mod rolling;
pub mod time_features;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::table::MasterTable;

pub use align::{DENY_LIST, PipelineOutput, SchemaAligner};
pub use consolidate::{CountEncodings, TableConsolidator};
pub use current_ever::CurrentEverSplitter;
pub use look_ahead::LookAheadLabeler;
pub use pipeline::Pipeline;
pub use rolling::RollingWindowCounter;
pub use time_features::TimeOrdering;

/// A master-table step with separate fit and serve modes
pub trait Transformer {
    /// Short name used in log messages
    fn name(&self) -> &'static str;

    /// Learn any state from the table, then transform it
    ///
    /// Stateless steps keep the default, which is [`Transformer::transform`].
    fn fit_transform(&mut self, master: MasterTable) -> Result<MasterTable> {
        self.transform(master)
    }

    /// Transform the table using previously learned state
    fn transform(&self, master: MasterTable) -> Result<MasterTable>;
}

/// The master-table steps a pipeline can hold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PipelineStep {
    TimeOrdering(TimeOrdering),
    LookAhead(LookAheadLabeler),
    RollingWindow(RollingWindowCounter),
    CurrentEver(CurrentEverSplitter),
}

impl PipelineStep {
    fn as_transformer(&self) -> &dyn Transformer {
        match self {
            Self::TimeOrdering(step) => step,
            Self::LookAhead(step) => step,
            Self::RollingWindow(step) => step,
            Self::CurrentEver(step) => step,
        }
    }

    fn as_transformer_mut(&mut self) -> &mut dyn Transformer {
        match self {
            Self::TimeOrdering(step) => step,
            Self::LookAhead(step) => step,
            Self::RollingWindow(step) => step,
            Self::CurrentEver(step) => step,
        }
    }
}

impl Transformer for PipelineStep {
    fn name(&self) -> &'static str {
        self.as_transformer().name()
    }

    fn fit_transform(&mut self, master: MasterTable) -> Result<MasterTable> {
        self.as_transformer_mut().fit_transform(master)
    }

    fn transform(&self, master: MasterTable) -> Result<MasterTable> {
        self.as_transformer().transform(master)
    }
}
