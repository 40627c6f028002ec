//! The composed feature pipeline

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::table::{ColumnSchema, RawTables};
use crate::transform::{
    CurrentEverSplitter, LookAheadLabeler, PipelineOutput, PipelineStep, RollingWindowCounter,
    SchemaAligner, TableConsolidator, TimeOrdering, Transformer,
};
use crate::utils::logging::log_operation_complete;

/// Consolidator, master-table steps and aligner run as one unit
///
/// All learned state (count encodings, dataset start date, column schema)
/// lives in the components and serialises with the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    consolidator: TableConsolidator,
    steps: Vec<PipelineStep>,
    aligner: SchemaAligner,
}

impl Pipeline {
    /// Build the default pipeline for a configuration
    ///
    /// Steps run in this order: time ordering, look-ahead labelling, rolling
    /// window counts (only when windows are configured), current/ever split.
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        let mut steps = vec![
            PipelineStep::TimeOrdering(TimeOrdering::from_config(config)),
            PipelineStep::LookAhead(LookAheadLabeler::from_config(config)),
        ];
        if !config.rolling_windows.is_empty() {
            steps.push(PipelineStep::RollingWindow(RollingWindowCounter::from_config(config)));
        }
        steps.push(PipelineStep::CurrentEver(CurrentEverSplitter::from_config(config)));

        Self::with_steps(TableConsolidator::new(config), steps, SchemaAligner::new())
    }

    /// Build a pipeline from explicit components
    #[must_use]
    pub const fn with_steps(
        consolidator: TableConsolidator,
        steps: Vec<PipelineStep>,
        aligner: SchemaAligner,
    ) -> Self {
        Self {
            consolidator,
            steps,
            aligner,
        }
    }

    #[must_use]
    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    #[must_use]
    pub const fn consolidator(&self) -> &TableConsolidator {
        &self.consolidator
    }

    /// The frozen feature schema, once fit
    #[must_use]
    pub const fn schema(&self) -> Option<&ColumnSchema> {
        self.aligner.schema()
    }

    #[must_use]
    pub const fn is_fitted(&self) -> bool {
        self.aligner.schema().is_some()
    }

    /// Fit every component in order on the given tables
    pub fn fit_transform(&mut self, tables: RawTables) -> Result<PipelineOutput> {
        let start = Instant::now();
        let mut master = self.consolidator.fit_transform(tables)?;
        for step in &mut self.steps {
            log::debug!("Fitting {}", step.name());
            master = step.fit_transform(master)?;
        }
        let output = self.aligner.fit_transform(master)?;

        log_operation_complete(
            "fit",
            "feature pipeline",
            output.features.num_rows(),
            output.features.num_features(),
            Some(start.elapsed()),
        );
        Ok(output)
    }

    /// Run every component in order with the learned state
    pub fn transform(&self, tables: RawTables) -> Result<PipelineOutput> {
        let start = Instant::now();
        let mut master = self.consolidator.transform(tables)?;
        for step in &self.steps {
            log::debug!("Applying {}", step.name());
            master = step.transform(master)?;
        }
        let output = self.aligner.transform(master)?;

        log_operation_complete(
            "transformed",
            "raw tables",
            output.features.num_rows(),
            output.features.num_features(),
            Some(start.elapsed()),
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_step_only_when_configured() {
        let names = |pipeline: &Pipeline| -> Vec<&'static str> {
            pipeline.steps().iter().map(Transformer::name).collect()
        };

        let plain = Pipeline::new(&PipelineConfig::default());
        assert_eq!(
            names(&plain),
            vec!["TimeOrdering", "LookAheadLabeler", "CurrentEverSplitter"]
        );

        let config = PipelineConfig {
            rolling_windows: vec![4, 12],
            ..PipelineConfig::default()
        };
        let rolling = Pipeline::new(&config);
        assert_eq!(
            names(&rolling),
            vec![
                "TimeOrdering",
                "LookAheadLabeler",
                "RollingWindowCounter",
                "CurrentEverSplitter"
            ]
        );
    }

    #[test]
    fn unfitted_pipeline_serialises_with_its_steps() {
        let pipeline = Pipeline::new(&PipelineConfig::default());
        let json = serde_json::to_string(&pipeline).unwrap();
        assert!(json.contains("\"step\":\"time_ordering\""));

        let restored: Pipeline = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, pipeline);
        assert!(!restored.is_fitted());
    }
}
