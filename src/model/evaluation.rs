//! Weekly ranking metrics on held-out rows
//!
//! Rows are grouped by week (ending Sunday) and client, and each client gets
//! the mean actual and mean predicted score for that week. Per week:
//!
//! * `spearman` is the rank correlation of the two client means,
//! * `overlap` is the share of the clients ranked in the top `threshold`
//!   fraction by prediction that are also in the top fraction by actual.
//!
//! Weeks where either metric is undefined (a constant side, or no client in
//! the predicted top group) are dropped before averaging.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use itertools::izip;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::table::SideTable;
use crate::transform::rolling::week_ending;
use crate::utils::stats::{average_ranks, spearman};

/// Metrics averaged over the evaluated weeks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub spearman: f64,
    pub overlap: f64,
    /// Number of weeks both metrics were defined for
    pub weeks: usize,
}

#[derive(Default)]
struct ClientWeek {
    actual: f64,
    predicted: f64,
    rows: usize,
}

/// Evaluate predictions against actual targets, both co-indexed with `side`
///
/// Returns `None` when no week yields both metrics.
#[must_use]
pub fn evaluate_weekly(
    side: &SideTable,
    actual: &[f64],
    predicted: &[f64],
    threshold: f64,
) -> Option<EvaluationReport> {
    let mut weeks: BTreeMap<NaiveDate, BTreeMap<i64, ClientWeek>> = BTreeMap::new();
    for (&date, &client, &a, &p) in izip!(&side.taken_dates, &side.client_ids, actual, predicted) {
        let entry = weeks
            .entry(week_ending(date))
            .or_default()
            .entry(client)
            .or_default();
        entry.actual += a;
        entry.predicted += p;
        entry.rows += 1;
    }

    let mut spearman_sum = 0.0;
    let mut overlap_sum = 0.0;
    let mut evaluated = 0;
    for (week, clients) in &weeks {
        let (actual_means, predicted_means): (Vec<f64>, Vec<f64>) = clients
            .values()
            .map(|c| (c.actual / c.rows as f64, c.predicted / c.rows as f64))
            .unzip();

        let correlation = spearman(&actual_means, &predicted_means);
        let overlap = top_overlap(&actual_means, &predicted_means, threshold);
        match (correlation, overlap) {
            (Some(correlation), Some(overlap)) => {
                spearman_sum += correlation;
                overlap_sum += overlap;
                evaluated += 1;
            }
            _ => log::debug!("Week ending {week}: metrics undefined, skipped"),
        }
    }

    if evaluated == 0 {
        log::warn!("No week in the evaluation set had defined metrics");
        return None;
    }
    let report = EvaluationReport {
        spearman: spearman_sum / evaluated as f64,
        overlap: overlap_sum / evaluated as f64,
        weeks: evaluated,
    };
    log::info!(
        "Evaluated {} weeks: spearman {:.4}, top-{:.0}% overlap {:.4}",
        report.weeks,
        report.spearman,
        threshold * 100.0,
        report.overlap
    );
    Some(report)
}

/// Positions ranked within the top `threshold` fraction, highest value first
fn top_positions(values: &[f64], threshold: f64) -> FxHashSet<usize> {
    let negated: Vec<f64> = values.iter().map(|v| -v).collect();
    let n = values.len() as f64;
    average_ranks(&negated)
        .into_iter()
        .enumerate()
        .filter(|&(_, rank)| rank / n < threshold)
        .map(|(position, _)| position)
        .collect()
}

fn top_overlap(actual: &[f64], predicted: &[f64], threshold: f64) -> Option<f64> {
    let predicted_top = top_positions(predicted, threshold);
    if predicted_top.is_empty() {
        return None;
    }
    let actual_top = top_positions(actual, threshold);
    let shared = predicted_top.intersection(&actual_top).count();
    Some(shared as f64 / predicted_top.len() as f64)
}
