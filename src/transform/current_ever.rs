//! Split of flattened features into "at this referral" and "ever so far"

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::table::{Column, ColumnValues, FeatureGroup, MasterTable};
use crate::transform::Transformer;

/// Replaces each column of the configured groups with `<name>_current` and
/// `<name>_ever`
///
/// `_ever` is 1 from the first referral (in time order) where the client had
/// a non-zero value onwards, and 0 before it. Output columns are the
/// untouched columns, then every `_current`, then every `_ever`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentEverSplitter {
    groups: Vec<FeatureGroup>,
}

impl CurrentEverSplitter {
    #[must_use]
    pub const fn new(groups: Vec<FeatureGroup>) -> Self {
        Self { groups }
    }

    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.split_groups.clone())
    }

    #[must_use]
    pub fn groups(&self) -> &[FeatureGroup] {
        &self.groups
    }
}

impl Transformer for CurrentEverSplitter {
    fn name(&self) -> &'static str {
        "CurrentEverSplitter"
    }

    fn transform(&self, mut master: MasterTable) -> Result<MasterTable> {
        for group in &self.groups {
            if master.columns_in_groups(std::slice::from_ref(group)).next().is_none() {
                log::warn!("Split group {group:?} matched no columns");
            }
        }

        let histories = master.client_histories();
        let groups = &self.groups;
        let selected = master.drain_columns(|column| {
            column.is_numeric() && column.group.is_some_and(|group| groups.contains(&group))
        });
        log::debug!("Splitting {} columns into current and ever", selected.len());

        let mut ever_columns = Vec::with_capacity(selected.len());
        let mut current_columns = Vec::with_capacity(selected.len());
        for column in selected {
            let ColumnValues::Numeric(values) = &column.values else {
                continue;
            };
            let mut ever = vec![Some(0.0); values.len()];
            for history in &histories {
                let mut seen = false;
                for &row in history {
                    seen |= values[row].is_some_and(|value| value != 0.0);
                    ever[row] = Some(if seen { 1.0 } else { 0.0 });
                }
            }

            let mut ever_column = Column::numeric(format!("{}_ever", column.name), ever);
            ever_column.group = column.group;
            ever_columns.push(ever_column);
            current_columns.push(Column {
                name: format!("{}_current", column.name),
                ..column
            });
        }

        master.extend_columns(current_columns)?;
        master.extend_columns(ever_columns)?;
        Ok(master)
    }
}
