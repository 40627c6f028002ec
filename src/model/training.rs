//! Training a model from raw tables

use std::ops::Range;
use std::time::Instant;

use chrono::Duration;

use crate::config::{PipelineConfig, TrainingConfig};
use crate::error::{PipelineError, Result};
use crate::model::{EvaluationReport, ExtraTreesRegressor, Regressor, TrainedModel, evaluate_weekly};
use crate::table::{RawTables, SideTable};
use crate::transform::{Pipeline, PipelineOutput};
use crate::utils::logging::{log_operation_complete, log_operation_start};

/// A trained model with its optional held-out evaluation
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: TrainedModel,
    pub evaluation: Option<EvaluationReport>,
    /// Rows the final model was fit on
    pub rows: usize,
}

/// Rows whose look-ahead window lies fully inside the data
///
/// Keeps rows taken on or before the latest taken date minus
/// `observation_window_days`.
#[must_use]
pub fn observed_rows(side: &SideTable, observation_window_days: i64) -> Vec<usize> {
    let Some(&latest) = side.taken_dates.iter().max() else {
        return Vec::new();
    };
    let cutoff = latest - Duration::days(observation_window_days);
    side.taken_dates
        .iter()
        .enumerate()
        .filter(|&(_, &date)| date <= cutoff)
        .map(|(row, _)| row)
        .collect()
}

/// Chronological train/test ranges over `n` time-sorted rows
///
/// The split index is `floor((1 - test_proportion) * (n - 1))`.
#[must_use]
pub fn chronological_split(n: usize, test_proportion: f64) -> (Range<usize>, Range<usize>) {
    if n == 0 {
        return (0..0, 0..0);
    }
    let proportion = test_proportion.clamp(0.0, 1.0);
    let index = ((1.0 - proportion) * (n - 1) as f64).floor() as usize;
    (0..index, index..n)
}

/// Fit a pipeline and a regressor on raw tables
///
/// When evaluation is enabled, a regressor is first fit on the older part of
/// the observed rows and scored on the newer part. The returned model is
/// always fit on every observed row.
pub fn train(
    tables: RawTables,
    pipeline_config: &PipelineConfig,
    config: &TrainingConfig,
) -> Result<TrainingOutcome> {
    pipeline_config.validate()?;
    config.validate()?;
    let start = Instant::now();
    log_operation_start("Training model on", &format!("{} raw tables", tables.len()));

    let mut pipeline = Pipeline::new(pipeline_config);
    let output = pipeline.fit_transform(tables)?;

    let rows = observed_rows(&output.side, config.observation_window_days);
    log::info!(
        "{} of {} rows have a full {}-day look-ahead window",
        rows.len(),
        output.side.num_rows(),
        config.observation_window_days
    );
    if rows.is_empty() {
        return Err(PipelineError::Model(format!(
            "no rows are older than the {}-day observation window",
            config.observation_window_days
        )));
    }
    let observed = select(&output, &rows);

    let evaluation = if config.evaluate {
        evaluate_holdout(&observed, config)?
    } else {
        None
    };

    let mut regressor = ExtraTreesRegressor::new(config.forest.clone());
    regressor.fit(&observed.features, &observed.target)?;

    log_operation_complete(
        "trained",
        "model",
        observed.features.num_rows(),
        observed.features.num_features(),
        Some(start.elapsed()),
    );
    Ok(TrainingOutcome {
        model: TrainedModel::new(pipeline, regressor),
        evaluation,
        rows: rows.len(),
    })
}

fn evaluate_holdout(
    observed: &PipelineOutput,
    config: &TrainingConfig,
) -> Result<Option<EvaluationReport>> {
    let (train_rows, test_rows) =
        chronological_split(observed.features.num_rows(), config.test_proportion);
    if train_rows.is_empty() || test_rows.is_empty() {
        log::warn!(
            "Skipping evaluation: split gave {} train and {} test rows",
            train_rows.len(),
            test_rows.len()
        );
        return Ok(None);
    }
    log::info!(
        "Evaluating on {} held-out rows after fitting on {}",
        test_rows.len(),
        train_rows.len()
    );

    let train = select(observed, &train_rows.collect::<Vec<_>>());
    let test = select(observed, &test_rows.collect::<Vec<_>>());

    let mut regressor = ExtraTreesRegressor::new(config.forest.clone());
    regressor.fit(&train.features, &train.target)?;
    let predicted = regressor.predict(&test.features)?;

    Ok(evaluate_weekly(
        &test.side,
        test.target.values(),
        &predicted,
        config.evaluation_threshold,
    ))
}

fn select(output: &PipelineOutput, rows: &[usize]) -> PipelineOutput {
    PipelineOutput {
        features: output.features.select_rows(rows),
        target: output.target.select_rows(rows),
        side: output.side.select_rows(rows),
    }
}
