//! Trailing weekly referral counts per client
//!
//! Weeks end on Sunday. `window_count_<w>` counts the client's referrals in
//! the `w` weeks ending with the week of the current referral, including
//! referrals later in that same week.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::config::{PipelineConfig, invalid};
use crate::error::Result;
use crate::table::{Column, MasterTable};
use crate::transform::Transformer;

/// Week-ending date of each referral
pub const WEEKS: &str = "weeks";

/// Adds one rolling count column per configured window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingWindowCounter {
    windows: Vec<u32>,
}

impl RollingWindowCounter {
    #[must_use]
    pub const fn new(windows: Vec<u32>) -> Self {
        Self { windows }
    }

    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.rolling_windows.clone())
    }

    /// Column name for a window size
    #[must_use]
    pub fn column_name(weeks: u32) -> String {
        format!("window_count_{weeks}")
    }
}

/// The Sunday ending the week that contains `date`
#[must_use]
pub fn week_ending(date: NaiveDate) -> NaiveDate {
    date + Duration::days(6 - i64::from(date.weekday().num_days_from_monday()))
}

impl Transformer for RollingWindowCounter {
    fn name(&self) -> &'static str {
        "RollingWindowCounter"
    }

    fn transform(&self, mut master: MasterTable) -> Result<MasterTable> {
        if let Some(&window) = self.windows.iter().find(|&&window| window == 0) {
            return Err(invalid("rolling_windows", window, "window sizes of at least one week"));
        }
        let weeks: Vec<NaiveDate> = master.taken_dates().iter().copied().map(week_ending).collect();
        let histories = master.client_histories();

        let mut columns = Vec::with_capacity(self.windows.len() + 1);
        for &window in &self.windows {
            let span = Duration::weeks(i64::from(window));
            let mut counts = vec![Some(0.0); master.num_rows()];
            for history in &histories {
                let mut first = 0;
                let mut end = 0;
                for &row in history {
                    let week = weeks[row];
                    // Everything in the current week counts, even later in the week
                    while end < history.len() && weeks[history[end]] <= week {
                        end += 1;
                    }
                    while weeks[history[first]] + span <= week {
                        first += 1;
                    }
                    counts[row] = Some((end - first) as f64);
                }
            }
            columns.push(Column::numeric(Self::column_name(window), counts));
        }
        columns.push(Column::date(WEEKS, weeks.into_iter().map(Some).collect()));

        master.extend_columns(columns)?;
        Ok(master)
    }
}
