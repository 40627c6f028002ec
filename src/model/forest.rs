//! Extremely randomised trees for regression
//!
//! Every tree sees all rows (no bootstrap). At each node a random subset of
//! features is drawn, each gets one threshold drawn uniformly between its
//! node minimum and maximum, and the candidate with the largest variance
//! reduction wins. Trees are built in parallel, each from its own RNG seeded
//! with `seed + tree index`, so the forest does not depend on scheduling.

use indicatif::ProgressBar;
use rand::prelude::*;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::ForestConfig;
use crate::error::{PipelineError, Result};
use crate::model::Regressor;
use crate::table::{FeatureMatrix, TargetVector};
use crate::utils::logging::{create_main_progress_bar, finish_progress_bar};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict_row(&self, features: &FeatureMatrix, row: usize) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes[index] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if features.value(row, feature) <= threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

/// Limits applied while growing one tree
struct GrowthLimits {
    max_features: usize,
    min_samples_split: usize,
    min_samples_leaf: usize,
    max_depth: Option<usize>,
}

/// Reference regressor used by training and scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraTreesRegressor {
    config: ForestConfig,
    n_features: Option<usize>,
    trees: Vec<Tree>,
}

impl ExtraTreesRegressor {
    #[must_use]
    pub const fn new(config: ForestConfig) -> Self {
        Self {
            config,
            n_features: None,
            trees: Vec::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ForestConfig {
        &self.config
    }

    #[must_use]
    pub const fn is_fitted(&self) -> bool {
        self.n_features.is_some()
    }

    /// Number of fitted trees
    #[must_use]
    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Default for ExtraTreesRegressor {
    fn default() -> Self {
        Self::new(ForestConfig::default())
    }
}

impl Regressor for ExtraTreesRegressor {
    fn fit(&mut self, features: &FeatureMatrix, target: &TargetVector) -> Result<()> {
        if features.num_rows() == 0 {
            return Err(PipelineError::Model("cannot fit on an empty feature matrix".into()));
        }
        if features.num_rows() != target.len() {
            return Err(PipelineError::Model(format!(
                "feature matrix has {} rows but target has {}",
                features.num_rows(),
                target.len()
            )));
        }
        if self.config.n_estimators == 0 {
            return Err(PipelineError::Model("n_estimators must be at least 1".into()));
        }

        let limits = GrowthLimits {
            max_features: self.config.max_features.resolve(features.num_features()),
            min_samples_split: self.config.min_samples_split.max(2),
            min_samples_leaf: self.config.min_samples_leaf.max(1),
            max_depth: self.config.max_depth,
        };
        log::info!(
            "Fitting {} trees on {} rows x {} features ({} features per split)",
            self.config.n_estimators,
            features.num_rows(),
            features.num_features(),
            limits.max_features
        );

        let pb = if self.config.show_progress {
            create_main_progress_bar(self.config.n_estimators as u64, Some("Growing trees"))
        } else {
            ProgressBar::hidden()
        };

        let seed = self.config.seed;
        let trees: Vec<Tree> = (0..self.config.n_estimators)
            .into_par_iter()
            .map(|index| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));
                let tree = grow_tree(features, target.values(), &limits, &mut rng);
                pb.inc(1);
                tree
            })
            .collect();
        finish_progress_bar(&pb, Some("Forest fitted"));

        let total_nodes: usize = trees.iter().map(|tree| tree.nodes.len()).sum();
        log::debug!("Forest has {total_nodes} nodes");

        self.trees = trees;
        self.n_features = Some(features.num_features());
        Ok(())
    }

    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        let expected = self.n_features.ok_or(PipelineError::NotFitted {
            component: "ExtraTreesRegressor",
        })?;
        if features.num_features() != expected {
            return Err(PipelineError::Model(format!(
                "model was fit on {expected} features but got {}",
                features.num_features()
            )));
        }

        let n_trees = self.trees.len() as f64;
        Ok((0..features.num_rows())
            .into_par_iter()
            .map(|row| {
                self.trees
                    .iter()
                    .map(|tree| tree.predict_row(features, row))
                    .sum::<f64>()
                    / n_trees
            })
            .collect())
    }
}

fn grow_tree(
    features: &FeatureMatrix,
    target: &[f64],
    limits: &GrowthLimits,
    rng: &mut StdRng,
) -> Tree {
    let mut samples: Vec<usize> = (0..features.num_rows()).collect();
    let mut nodes = vec![Node::Leaf { value: 0.0 }];
    // (node index, sample range start, end, depth)
    let mut stack = vec![(0usize, 0usize, samples.len(), 0usize)];

    while let Some((node, start, end, depth)) = stack.pop() {
        let rows = &mut samples[start..end];
        let mean = rows.iter().map(|&row| target[row]).sum::<f64>() / rows.len() as f64;

        let splittable = rows.len() >= limits.min_samples_split
            && rows.len() >= 2 * limits.min_samples_leaf
            && limits.max_depth.is_none_or(|max| depth < max)
            && rows.iter().any(|&row| target[row] != target[rows[0]]);

        let split = if splittable {
            best_random_split(features, target, rows, limits, rng)
        } else {
            None
        };

        match split {
            Some((feature, threshold)) => {
                let mid = start
                    + partition(rows, |row| features.value(row, feature) <= threshold);
                let left = nodes.len();
                let right = left + 1;
                nodes.push(Node::Leaf { value: 0.0 });
                nodes.push(Node::Leaf { value: 0.0 });
                nodes[node] = Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                };
                stack.push((right, mid, end, depth + 1));
                stack.push((left, start, mid, depth + 1));
            }
            None => nodes[node] = Node::Leaf { value: mean },
        }
    }

    Tree { nodes }
}

/// Draw features until `max_features` non-constant ones were tried, each with
/// one uniform threshold, and keep the split with the highest
/// `sum_l^2 / n_l + sum_r^2 / n_r` (equivalent to the largest variance drop)
fn best_random_split(
    features: &FeatureMatrix,
    target: &[f64],
    rows: &[usize],
    limits: &GrowthLimits,
    rng: &mut StdRng,
) -> Option<(usize, f64)> {
    let mut candidates: Vec<usize> = (0..features.num_features()).collect();
    candidates.shuffle(rng);

    let mut tried = 0;
    let mut best: Option<(f64, usize, f64)> = None;
    for feature in candidates {
        if tried >= limits.max_features {
            break;
        }
        let (low, high) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &row| {
            let value = features.value(row, feature);
            (lo.min(value), hi.max(value))
        });
        // Constant, infinite or overflowing ranges cannot be sampled
        if high <= low || !(high - low).is_finite() {
            continue;
        }
        tried += 1;

        let threshold = rng.random_range(low..high);
        let (mut n_left, mut sum_left, mut sum_right) = (0usize, 0.0, 0.0);
        for &row in rows {
            if features.value(row, feature) <= threshold {
                n_left += 1;
                sum_left += target[row];
            } else {
                sum_right += target[row];
            }
        }
        let n_right = rows.len() - n_left;
        if n_left < limits.min_samples_leaf || n_right < limits.min_samples_leaf {
            continue;
        }

        let proxy = sum_left * sum_left / n_left as f64 + sum_right * sum_right / n_right as f64;
        if best.is_none_or(|(score, _, _)| proxy > score) {
            best = Some((proxy, feature, threshold));
        }
    }

    best.map(|(_, feature, threshold)| (feature, threshold))
}

/// Move rows satisfying `goes_left` to the front, returning how many did
fn partition(rows: &mut [usize], goes_left: impl Fn(usize) -> bool) -> usize {
    let mut mid = 0;
    for i in 0..rows.len() {
        if goes_left(rows[i]) {
            rows.swap(i, mid);
            mid += 1;
        }
    }
    mid
}
