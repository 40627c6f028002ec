//! Schema alignment between fit and serve time
//!
//! Fitting freezes the feature columns as a [`ColumnSchema`]. Every call then
//! reindexes the master table onto exactly that schema: absent columns are
//! zero, extra columns move to the side table, nulls become zero.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::table::{Column, ColumnSchema, FeatureMatrix, MasterTable, SideTable, TargetVector};
use crate::transform::look_ahead::FUTURE_SCORE;
use crate::utils::logging::log_warning;

/// Columns never used as model input: identifiers, administrative fields,
/// free text, the look-ahead columns and the ranking intermediates
pub const DENY_LIST: [&str; 30] = [
    "referral_statusid",
    "referral_referralonhold",
    "referral_referraltakendate",
    "referral_referralreadydate",
    "referral_referralcollecteddate",
    "referral_referralworkerid",
    "referral_referralpreparedworkerid",
    "referral_referralhandedworkerid",
    "referral_clientid",
    "referral_partnername",
    "referral_partnerid",
    "referral_dependantdetails",
    "referral_ethnicityid",
    "referral_addresslocalityid",
    "referral_addresstypeid",
    "referral_referralagencyid",
    "referral_referralagencyworkername",
    "referral_referralagencytelephonenumber",
    "referral_dietaryextranotes",
    "referral_referralnotes",
    "referral_updatetimestamp",
    "client_clientid",
    "reference_date",
    "futurereferraltargetfeature_futurereferralcount",
    "futurereferraltargetfeature_futurereferralscore",
    "futurereferraltargetfeature_futurereferralgaps",
    "weeks",
    "timefeature_totalreferralsforclient",
    "timefeature_burstnumber",
    "timefeature_referralnumber",
];

/// Features, target and side columns for one pipeline call, all co-indexed
/// and sorted by (taken date, referral id)
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub features: FeatureMatrix,
    pub target: TargetVector,
    pub side: SideTable,
}

/// Freezes and applies the feature schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaAligner {
    schema: Option<ColumnSchema>,
}

impl SchemaAligner {
    #[must_use]
    pub const fn new() -> Self {
        Self { schema: None }
    }

    /// The frozen schema, once fit
    #[must_use]
    pub const fn schema(&self) -> Option<&ColumnSchema> {
        self.schema.as_ref()
    }

    /// Whether a column name is excluded from the features
    #[must_use]
    pub fn is_denied(name: &str) -> bool {
        DENY_LIST.contains(&name)
    }

    /// Freeze the schema from this table's columns, then align onto it
    pub fn fit_transform(&mut self, master: MasterTable) -> Result<PipelineOutput> {
        let mut names = Vec::new();
        let mut non_numeric = Vec::new();
        for column in master.columns() {
            if Self::is_denied(&column.name) {
                continue;
            }
            if column.is_numeric() {
                names.push(column.name.clone());
            } else {
                non_numeric.push(format!("{} ({})", column.name, column.values.kind()));
            }
        }
        if !non_numeric.is_empty() {
            log::info!(
                "Excluding {} non-numeric columns from the schema: {}",
                non_numeric.len(),
                non_numeric.join(", ")
            );
        }
        log::info!("Frozen schema of {} feature columns", names.len());

        self.schema = Some(ColumnSchema::new(names));
        self.transform(master)
    }

    /// Reindex onto the frozen schema
    pub fn transform(&self, mut master: MasterTable) -> Result<PipelineOutput> {
        let schema = self.schema.as_ref().ok_or(PipelineError::NotFitted {
            component: "SchemaAligner",
        })?;

        master.sort_by_time();
        let n = master.num_rows();
        let (referral_ids, client_ids, taken_dates, columns) = master.into_parts();

        let positions: FxHashMap<&str, usize> = columns
            .iter()
            .enumerate()
            .map(|(position, column)| (column.name.as_str(), position))
            .collect();
        let mut in_schema = vec![false; columns.len()];

        let mut missing = 0usize;
        let mut features = Vec::with_capacity(schema.len());
        for name in schema.iter() {
            let values = match positions.get(name) {
                Some(&position) => {
                    in_schema[position] = true;
                    let column = &columns[position];
                    match column.values.as_numeric() {
                        Some(cells) => zero_filled(cells),
                        None => {
                            log_warning(
                                &format!("column has {} values, filling with 0", column.values.kind()),
                                Some(name),
                            );
                            vec![0.0; n]
                        }
                    }
                }
                None => {
                    missing += 1;
                    vec![0.0; n]
                }
            };
            features.push(values);
        }
        if missing > 0 {
            log::info!("{missing} schema columns absent from the input; filled with 0");
        }

        let target = match positions
            .get(FUTURE_SCORE)
            .and_then(|&position| columns[position].values.as_numeric())
        {
            Some(cells) => zero_filled(cells),
            None => {
                log_warning("look-ahead score absent, target filled with 0", None);
                vec![0.0; n]
            }
        };
        drop(positions);

        let side_columns: Vec<Column> = columns
            .into_iter()
            .zip(in_schema)
            .filter_map(|(column, used)| (!used).then_some(column))
            .collect();
        let extra = side_columns.iter().filter(|c| !Self::is_denied(&c.name)).count();
        if extra > 0 {
            log::debug!("{extra} non-schema columns moved to the side table");
        }

        Ok(PipelineOutput {
            features: FeatureMatrix::new(referral_ids.clone(), schema.clone(), features)?,
            target: TargetVector::new(target),
            side: SideTable {
                referral_ids,
                client_ids,
                taken_dates,
                columns: side_columns,
            },
        })
    }
}

fn zero_filled(cells: &[Option<f64>]) -> Vec<f64> {
    cells.iter().map(|cell| cell.unwrap_or(0.0)).collect()
}
