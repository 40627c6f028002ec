//! Configuration for the feature pipeline and model training
//!
//! Every struct deserialises with defaults for missing fields, so a config
//! file only needs the values it changes:
//!
//! ```json
//! { "pipeline": { "count_encode": true }, "training": { "forest": { "seed": 7 } } }
//! ```

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::schema::DateFormatConfig;
use crate::table::FeatureGroup;

/// Configuration for building features from raw tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Replace categorical values by their training-time frequency before encoding
    pub count_encode: bool,
    /// Days between referrals above which a new burst starts
    pub break_length_days: i64,
    /// Length of the look-ahead window in days
    pub window_days: i64,
    /// Weight of each burst break when scoring the look-ahead window
    pub break_coefficient: f64,
    /// Feature groups split into `_current` and `_ever` columns
    pub split_groups: Vec<FeatureGroup>,
    /// Trailing windows (in weeks) for rolling referral counts; empty disables them
    pub rolling_windows: Vec<u32>,
    /// Date that client ages and address tenure are measured against; today when unset
    pub reference_date: Option<NaiveDate>,
    /// Accepted date formats for string date columns
    pub date_formats: DateFormatConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            count_encode: false,
            break_length_days: 28,
            window_days: 365,
            break_coefficient: 1.0,
            split_groups: vec![
                FeatureGroup::ReferralIssue,
                FeatureGroup::ReferralDomesticCircumstances,
                FeatureGroup::ReferralReason,
                FeatureGroup::ReferralBenefit,
            ],
            rolling_windows: Vec::new(),
            reference_date: None,
            date_formats: DateFormatConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Reject values the pipeline cannot compute with
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidValue`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.window_days <= 0 {
            return Err(invalid("window_days", self.window_days, "a positive number of days"));
        }
        if self.break_length_days < 0 {
            return Err(invalid(
                "break_length_days",
                self.break_length_days,
                "a non-negative number of days",
            ));
        }
        if !self.break_coefficient.is_finite() {
            return Err(invalid("break_coefficient", self.break_coefficient, "a finite number"));
        }
        if let Some(&window) = self.rolling_windows.iter().find(|&&window| window == 0) {
            return Err(invalid("rolling_windows", window, "window sizes of at least one week"));
        }
        Ok(())
    }
}

pub(crate) fn invalid(field: &str, value: impl fmt::Display, expected: &'static str) -> PipelineError {
    PipelineError::InvalidValue {
        column: field.to_string(),
        value: value.to_string(),
        expected,
    }
}

impl fmt::Display for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pipeline configuration:")?;
        writeln!(f, "  count encoding:     {}", self.count_encode)?;
        writeln!(f, "  break length:       {} days", self.break_length_days)?;
        writeln!(f, "  look-ahead window:  {} days", self.window_days)?;
        writeln!(f, "  break coefficient:  {}", self.break_coefficient)?;
        writeln!(f, "  split groups:       {:?}", self.split_groups)?;
        writeln!(f, "  rolling windows:    {:?}", self.rolling_windows)?;
        match self.reference_date {
            Some(date) => write!(f, "  reference date:     {date}"),
            None => write!(f, "  reference date:     today"),
        }
    }
}

/// How many features each split considers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// Every feature
    All,
    /// Square root of the feature count
    Sqrt,
    /// A fraction of the feature count
    Fraction(f64),
    /// A fixed number of features
    Count(usize),
}

impl MaxFeatures {
    /// Resolve to a concrete count in `1..=n_features`
    #[must_use]
    pub fn resolve(self, n_features: usize) -> usize {
        let wanted = match self {
            Self::All => n_features,
            Self::Sqrt => (n_features as f64).sqrt().round() as usize,
            Self::Fraction(fraction) => (n_features as f64 * fraction).round() as usize,
            Self::Count(count) => count,
        };
        wanted.clamp(1, n_features.max(1))
    }
}

/// Hyperparameters of the extremely randomised trees regressor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_estimators: usize,
    pub max_features: MaxFeatures,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Unlimited when unset
    pub max_depth: Option<usize>,
    pub seed: u64,
    /// Show a progress bar while fitting
    pub show_progress: bool,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 120,
            max_features: MaxFeatures::All,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_depth: None,
            seed: 42,
            show_progress: false,
        }
    }
}

/// Configuration for training a model from a fitted pipeline's output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub forest: ForestConfig,
    /// Rows newer than the last taken date minus this many days are dropped,
    /// so every kept target saw a full look-ahead window
    pub observation_window_days: i64,
    /// Hold out the newest rows and report evaluation metrics before the final fit
    pub evaluate: bool,
    /// Share of rows held out for evaluation
    pub test_proportion: f64,
    /// Share of clients counted as the top group when measuring overlap
    pub evaluation_threshold: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            forest: ForestConfig::default(),
            observation_window_days: 365,
            evaluate: true,
            test_proportion: 0.25,
            evaluation_threshold: 0.2,
        }
    }
}

impl TrainingConfig {
    /// Reject values training cannot run with
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidValue`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.forest.n_estimators == 0 {
            return Err(invalid("n_estimators", 0, "at least one tree"));
        }
        if self.observation_window_days < 0 {
            return Err(invalid(
                "observation_window_days",
                self.observation_window_days,
                "a non-negative number of days",
            ));
        }
        if !(0.0..=1.0).contains(&self.test_proportion) {
            return Err(invalid("test_proportion", self.test_proportion, "a share between 0 and 1"));
        }
        if !(0.0..=1.0).contains(&self.evaluation_threshold) {
            return Err(invalid(
                "evaluation_threshold",
                self.evaluation_threshold,
                "a share between 0 and 1",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for TrainingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Training configuration:")?;
        writeln!(f, "  trees:              {}", self.forest.n_estimators)?;
        writeln!(f, "  max features:       {:?}", self.forest.max_features)?;
        writeln!(f, "  min samples split:  {}", self.forest.min_samples_split)?;
        writeln!(f, "  min samples leaf:   {}", self.forest.min_samples_leaf)?;
        writeln!(f, "  max depth:          {:?}", self.forest.max_depth)?;
        writeln!(f, "  seed:               {}", self.forest.seed)?;
        writeln!(f, "  observation window: {} days", self.observation_window_days)?;
        if self.evaluate {
            write!(
                f,
                "  evaluation:         {:.0}% held out, top {:.0}% overlap",
                self.test_proportion * 100.0,
                self.evaluation_threshold * 100.0
            )
        } else {
            write!(f, "  evaluation:         off")
        }
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub training: TrainingConfig,
}

impl Config {
    /// Load and validate a configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        self.training.validate()
    }
}
