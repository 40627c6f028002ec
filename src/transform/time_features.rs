//! Position of each referral in its client's history, and burst detection
//!
//! A burst is a run of a client's referrals where no gap between consecutive
//! referrals exceeds the break length.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::table::{Column, MasterTable};
use crate::transform::Transformer;
use crate::utils::stats::average_ranks;

pub const REFERRAL_NUMBER: &str = "timefeature_referralnumber";
pub const DAYS_SINCE_LAST: &str = "timefeature_dayssincelastreferral";
pub const START_OF_BURST: &str = "timefeature_startofburst";
pub const BURST_NUMBER: &str = "timefeature_burstnumber";
pub const INDEX_IN_BURST: &str = "timefeature_indexinburst";
pub const TOTAL_REFERRALS: &str = "timefeature_totalreferralsforclient";

/// Adds referral number, recency and burst features
///
/// Fitting records the earliest taken date. Referrals before it are still
/// output but are left out of the referral-number ranking, so training and
/// live scoring rank against the same starting point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeOrdering {
    break_length_days: i64,
    dataset_start_date: Option<NaiveDate>,
}

impl TimeOrdering {
    #[must_use]
    pub const fn new(break_length_days: i64) -> Self {
        Self {
            break_length_days,
            dataset_start_date: None,
        }
    }

    #[must_use]
    pub const fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.break_length_days)
    }

    /// Earliest taken date seen at fit time
    #[must_use]
    pub const fn dataset_start_date(&self) -> Option<NaiveDate> {
        self.dataset_start_date
    }
}

impl Transformer for TimeOrdering {
    fn name(&self) -> &'static str {
        "TimeOrdering"
    }

    fn fit_transform(&mut self, master: MasterTable) -> Result<MasterTable> {
        self.dataset_start_date = master.taken_dates().iter().min().copied();
        log::debug!("Dataset start date: {:?}", self.dataset_start_date);
        self.transform(master)
    }

    fn transform(&self, mut master: MasterTable) -> Result<MasterTable> {
        let start_date = self.dataset_start_date.ok_or(PipelineError::NotFitted {
            component: "TimeOrdering",
        })?;

        let n = master.num_rows();
        let dates = master.taken_dates();
        let mut referral_number = vec![None; n];
        let mut days_since = vec![None; n];
        let mut start_of_burst = vec![None; n];
        let mut burst_number = vec![None; n];
        let mut index_in_burst = vec![None; n];
        let mut total = vec![None; n];

        for history in master.client_histories() {
            // Ranking ignores referrals before the fitted start date
            let valid: Vec<usize> = history
                .iter()
                .copied()
                .filter(|&row| dates[row] >= start_date)
                .collect();
            let valid_dates: Vec<NaiveDate> = valid.iter().map(|&row| dates[row]).collect();
            for (&row, rank) in valid.iter().zip(average_ranks(&valid_dates)) {
                referral_number[row] = Some(rank);
            }

            let mut burst = 1.0;
            let mut burst_rows: Vec<usize> = Vec::new();
            let mut previous: Option<NaiveDate> = None;
            for &row in &history {
                let gap = previous.map_or(0, |prev| (dates[row] - prev).num_days());
                let starts = gap > self.break_length_days;
                if starts {
                    assign_burst_ranks(&burst_rows, dates, &mut index_in_burst);
                    burst_rows.clear();
                    burst += 1.0;
                }
                days_since[row] = Some(gap as f64);
                start_of_burst[row] = Some(if starts { 1.0 } else { 0.0 });
                burst_number[row] = Some(burst);
                total[row] = Some(history.len() as f64);
                burst_rows.push(row);
                previous = Some(dates[row]);
            }
            assign_burst_ranks(&burst_rows, dates, &mut index_in_burst);
        }

        master.extend_columns([
            Column::numeric(REFERRAL_NUMBER, referral_number),
            Column::numeric(DAYS_SINCE_LAST, days_since),
            Column::numeric(START_OF_BURST, start_of_burst),
            Column::numeric(BURST_NUMBER, burst_number),
            Column::numeric(INDEX_IN_BURST, index_in_burst),
            Column::numeric(TOTAL_REFERRALS, total),
        ])?;
        Ok(master)
    }
}

fn assign_burst_ranks(rows: &[usize], dates: &[NaiveDate], out: &mut [Option<f64>]) {
    let burst_dates: Vec<NaiveDate> = rows.iter().map(|&row| dates[row]).collect();
    for (&row, rank) in rows.iter().zip(average_ranks(&burst_dates)) {
        out[row] = Some(rank);
    }
}
