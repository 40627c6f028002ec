//! Regression model behind the feature pipeline
//!
//! A [`TrainedModel`] bundles a fitted [`Pipeline`] with a fitted
//! [`Regressor`]; it is the artifact stored in the model registry.

pub mod evaluation;
pub mod forest;
pub mod training;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::table::{FeatureMatrix, RawTables, TargetVector};
use crate::transform::Pipeline;

pub use evaluation::{EvaluationReport, evaluate_weekly};
pub use forest::ExtraTreesRegressor;
pub use training::{TrainingOutcome, chronological_split, observed_rows, train};

/// A model that maps a feature matrix to one score per row
pub trait Regressor {
    /// Fit on a feature matrix and its co-indexed target
    fn fit(&mut self, features: &FeatureMatrix, target: &TargetVector) -> Result<()>;

    /// Predict one value per feature-matrix row
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>>;
}

/// Score for one referral
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub referral_id: i64,
    pub client_id: i64,
    pub taken_date: NaiveDate,
    pub score: f64,
}

/// Fitted pipeline and regressor, serialised together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel<R = ExtraTreesRegressor> {
    pub pipeline: Pipeline,
    pub regressor: R,
}

impl<R: Regressor> TrainedModel<R> {
    #[must_use]
    pub const fn new(pipeline: Pipeline, regressor: R) -> Self {
        Self {
            pipeline,
            regressor,
        }
    }

    /// Run the fitted pipeline on new tables and score every referral
    ///
    /// Predictions come back sorted by (taken date, referral id).
    pub fn predict(&self, tables: RawTables) -> Result<Vec<Prediction>> {
        let output = self.pipeline.transform(tables)?;
        let scores = self.regressor.predict(&output.features)?;

        let side = &output.side;
        Ok(scores
            .into_iter()
            .enumerate()
            .map(|(row, score)| Prediction {
                referral_id: side.referral_ids[row],
                client_id: side.client_ids[row],
                taken_date: side.taken_dates[row],
                score,
            })
            .collect())
    }
}

impl<R: Serialize> TrainedModel<R> {
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl<R: DeserializeOwned> TrainedModel<R> {
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
