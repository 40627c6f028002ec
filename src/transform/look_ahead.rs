//! Look-ahead referral statistics, the supervised target
//!
//! For a referral taken on day `d`, the window is every referral of the same
//! client taken in `[d, d + window_days]`, both ends inclusive, same-day
//! referrals included. Within it:
//!
//! * `count` is the window size minus the referral itself,
//! * `gaps` is the number of consecutive date differences above the break length,
//! * `score = (count - gaps * break_coefficient) / (window_days / 7)`.
//!
//! Nothing dated before `d` enters a referral's window, so no label sees the
//! referral's own past.

use serde::{Deserialize, Serialize};

use crate::config::{PipelineConfig, invalid};
use crate::error::Result;
use crate::table::{Column, MasterTable};
use crate::transform::Transformer;

pub const FUTURE_COUNT: &str = "futurereferraltargetfeature_futurereferralcount";
pub const FUTURE_SCORE: &str = "futurereferraltargetfeature_futurereferralscore";
pub const FUTURE_GAPS: &str = "futurereferraltargetfeature_futurereferralgaps";

/// Computes the forward-window count, gaps and score per referral
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookAheadLabeler {
    window_days: i64,
    break_length_days: i64,
    break_coefficient: f64,
}

impl LookAheadLabeler {
    #[must_use]
    pub const fn new(window_days: i64, break_length_days: i64, break_coefficient: f64) -> Self {
        Self {
            window_days,
            break_length_days,
            break_coefficient,
        }
    }

    #[must_use]
    pub const fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.window_days,
            config.break_length_days,
            config.break_coefficient,
        )
    }
}

impl Transformer for LookAheadLabeler {
    fn name(&self) -> &'static str {
        "LookAheadLabeler"
    }

    fn transform(&self, mut master: MasterTable) -> Result<MasterTable> {
        // The score divides by the window length in weeks
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
        let n = master.num_rows();
        let dates = master.taken_dates();
        let weeks = self.window_days as f64 / 7.0;
        let mut counts = vec![Some(0.0); n];
        let mut gaps = vec![Some(0.0); n];
        let mut scores = vec![Some(0.0); n];

        for history in master.client_histories() {
            let days: Vec<i64> = history
                .iter()
                .map(|&row| dates[row].signed_duration_since(dates[history[0]]).num_days())
                .collect();

            // breaks[k + 1] = number of long gaps between positions 0..=k
            let mut breaks = vec![0usize; days.len() + 1];
            for k in 0..days.len() {
                let long_gap = k > 0 && days[k] - days[k - 1] > self.break_length_days;
                breaks[k + 1] = breaks[k] + usize::from(long_gap);
            }

            let mut first_same_day = 0;
            let mut last_in_window = 0;
            for (position, &row) in history.iter().enumerate() {
                if days[first_same_day] < days[position] {
                    first_same_day = position;
                }
                last_in_window = last_in_window.max(position);
                while last_in_window + 1 < days.len()
                    && days[last_in_window + 1] - days[position] <= self.window_days
                {
                    last_in_window += 1;
                }

                let count = (last_in_window - first_same_day) as f64;
                let window_gaps = (breaks[last_in_window + 1] - breaks[first_same_day + 1]) as f64;
                counts[row] = Some(count);
                gaps[row] = Some(window_gaps);
                scores[row] = Some((count - window_gaps * self.break_coefficient) / weeks);
            }
        }

        master.extend_columns([
            Column::numeric(FUTURE_COUNT, counts),
            Column::numeric(FUTURE_SCORE, scores),
            Column::numeric(FUTURE_GAPS, gaps),
        ])?;
        Ok(master)
    }
}
