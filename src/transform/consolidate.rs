//! Consolidation of raw tables into one row per referral
//!
//! The referral table supplies the rows. Each one-to-many child table is
//! counted per (referral, sub-category) and pivoted into one column per
//! sub-category. The client table is reduced to one row per client with
//! derived demographics and one-hot categoricals, gets the client issues
//! pivoted onto it the same way, and is joined onto each referral by client id.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Instant;

use arrow::array::{Array, ArrayRef};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use chrono::{Local, NaiveDate};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::schema::DateFormatConfig;
use crate::table::{Column, FeatureGroup, MasterTable, RawTables, TableName};
use crate::utils::arrow::{
    CellKind, classify, get_column, strict_cast, to_date_values, to_f64_values, to_i64_values,
    to_key_values, try_f64_values,
};
use crate::utils::logging::{log_operation_complete, log_operation_start};

/// Referral columns that become the master table's key columns
const REFERRAL_ID: &str = "referralinstanceid";
const CLIENT_ID: &str = "clientid";
const TAKEN_DATE: &str = "referraltakendate";

/// Client columns read for derived features
const DATE_OF_BIRTH: &str = "clientdateofbirth";
const ADDRESS_SINCE: &str = "addresssincedate";
const IS_MALE: &str = "clientismale";
const PARTNER_ID: &str = "partnerid";

/// Client attributes one-hot encoded into `client_<column>_<value>`
pub const CLIENT_CATEGORICALS: [&str; 5] = [
    "clientcountryid",
    "clientaddresstypeid",
    "addresspostcode",
    "addresslocalityid",
    "clientresidencyid",
];

/// Category key for a missing categorical value
const NULL_CATEGORY: &str = "nan";

/// Frequency maps learned for count encoding
///
/// Values are replaced by how often they occurred in the training tables.
/// The maps are only ever built by [`TableConsolidator::fit_transform`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountEncodings {
    /// Client categorical column -> value -> count
    pub categories: BTreeMap<String, BTreeMap<String, u64>>,
    /// Child table -> sub-category -> count
    pub sub_categories: BTreeMap<FeatureGroup, BTreeMap<String, u64>>,
}

impl CountEncodings {
    /// Count categorical values and sub-categories in the training tables
    fn learn(tables: &RawTables) -> Result<Self> {
        let mut encodings = Self::default();

        if let Some(client) = tables.get(TableName::Client) {
            if client.num_rows() > 0 {
                for column in CLIENT_CATEGORICALS {
                    let mut counts = BTreeMap::new();
                    for key in categorical_keys(client, column)? {
                        *counts.entry(key).or_insert(0) += 1;
                    }
                    encodings.categories.insert(column.to_string(), counts);
                }
            }
        }

        for table in TableName::REFERRAL_CHILDREN
            .into_iter()
            .chain([TableName::ClientIssue])
        {
            let (Some(batch), Some(group), Some((_, sub_column))) = (
                tables.get(table),
                FeatureGroup::from_table(table),
                table.flatten_columns(),
            ) else {
                continue;
            };
            let mut counts = BTreeMap::new();
            if batch.num_rows() > 0 {
                let subs = to_key_values(&required_column(batch, table, sub_column)?, sub_column)?;
                for sub in subs.into_iter().flatten() {
                    *counts.entry(sub).or_insert(0) += 1;
                }
            }
            encodings.sub_categories.insert(group, counts);
        }

        Ok(encodings)
    }

    fn category(&self, column: &str) -> Option<&BTreeMap<String, u64>> {
        self.categories.get(column)
    }

    fn sub_category(&self, group: FeatureGroup) -> Option<&BTreeMap<String, u64>> {
        self.sub_categories.get(&group)
    }
}

/// Joins the raw tables into a [`MasterTable`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConsolidator {
    count_encode: bool,
    reference_date: Option<NaiveDate>,
    date_formats: DateFormatConfig,
    encodings: Option<CountEncodings>,
}

impl TableConsolidator {
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            count_encode: config.count_encode,
            reference_date: config.reference_date,
            date_formats: config.date_formats.clone(),
            encodings: None,
        }
    }

    /// The frequency maps learned at fit time, when count encoding is on
    #[must_use]
    pub const fn encodings(&self) -> Option<&CountEncodings> {
        self.encodings.as_ref()
    }

    /// Build the master table, learning count encodings when enabled
    pub fn fit_transform(&mut self, tables: RawTables) -> Result<MasterTable> {
        tables.ensure_complete()?;
        if self.count_encode {
            let encodings = CountEncodings::learn(&tables)?;
            log::debug!(
                "Learned count encodings for {} categoricals and {} child tables",
                encodings.categories.len(),
                encodings.sub_categories.len()
            );
            self.encodings = Some(encodings);
        }
        self.consolidate(tables)
    }

    /// Build the master table with the encodings learned at fit time
    pub fn transform(&self, tables: RawTables) -> Result<MasterTable> {
        if self.count_encode && self.encodings.is_none() {
            return Err(PipelineError::NotFitted {
                component: "TableConsolidator",
            });
        }
        self.consolidate(tables)
    }

    fn consolidate(&self, mut tables: RawTables) -> Result<MasterTable> {
        let start = Instant::now();
        log_operation_start("Consolidating", &format!("{} raw tables", tables.len()));
        tables.ensure_complete()?;

        let reference_date = self
            .reference_date
            .unwrap_or_else(|| Local::now().date_naive());

        // Referral side
        let referral = tables.take(TableName::Referral)?;
        if referral.num_rows() == 0 {
            return Err(PipelineError::EmptyRequiredTable {
                table: TableName::Referral.to_string(),
            });
        }
        let mut referrals = self.referral_frame(&referral)?;
        drop(referral);

        for table in TableName::REFERRAL_CHILDREN {
            let batch = tables.take(table)?;
            if batch.num_rows() == 0 {
                log::debug!("Table {table} is empty, contributing no columns");
                continue;
            }
            let columns = self.flatten(&batch, table, &referrals.index)?;
            log::debug!("Flattened {table} into {} columns", columns.len());
            referrals.columns.extend(columns);
        }

        // Client side
        let client = tables.take(TableName::Client)?;
        if client.num_rows() == 0 {
            return Err(PipelineError::EmptyRequiredTable {
                table: TableName::Client.to_string(),
            });
        }
        let mut clients = self.client_frame(&client, reference_date)?;
        drop(client);

        let client_issue = tables.take(TableName::ClientIssue)?;
        if client_issue.num_rows() == 0 {
            log::debug!("Table {} is empty, contributing no columns", TableName::ClientIssue);
        } else {
            let columns = self.flatten(&client_issue, TableName::ClientIssue, &clients.index)?;
            log::debug!("Flattened {} into {} columns", TableName::ClientIssue, columns.len());
            clients.columns.extend(columns);
        }

        // Left join clients onto referrals
        let client_rows: Vec<Option<usize>> = referrals
            .client_ids
            .iter()
            .map(|id| clients.index.get(id).copied())
            .collect();
        let unmatched = client_rows.iter().filter(|row| row.is_none()).count();
        if unmatched > 0 {
            log::warn!("{unmatched} referrals have no matching client row; client columns left empty");
        }

        let mut master = MasterTable::new(referrals.ids, referrals.client_ids, referrals.dates)?;
        master.extend_columns(referrals.columns)?;
        master.extend_columns(clients.columns.into_iter().map(|column| Column {
            values: column.values.take_optional(&client_rows),
            ..column
        }))?;
        master.sort_by_time();

        log_operation_complete(
            "consolidated",
            "master table",
            master.num_rows(),
            master.num_columns(),
            Some(start.elapsed()),
        );
        Ok(master)
    }

    fn referral_frame(&self, batch: &RecordBatch) -> Result<ReferralFrame> {
        let table = TableName::Referral;
        let ids = require_present(
            to_i64_values(&required_column(batch, table, REFERRAL_ID)?, REFERRAL_ID)?,
            REFERRAL_ID,
        )?;
        let client_ids = require_present(
            to_i64_values(&required_column(batch, table, CLIENT_ID)?, CLIENT_ID)?,
            CLIENT_ID,
        )?;
        let dates = to_date_values(
            &required_column(batch, table, TAKEN_DATE)?,
            TAKEN_DATE,
            &self.date_formats,
        )?
        .into_iter()
        .map(|date| {
            date.ok_or_else(|| PipelineError::DateParse {
                column: TAKEN_DATE.to_string(),
                value: "null".to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

        let mut index = FxHashMap::default();
        for (row, &id) in ids.iter().enumerate() {
            if index.insert(id, row).is_some() {
                return Err(PipelineError::DuplicateKey {
                    table: table.to_string(),
                    key: id,
                });
            }
        }

        let schema = batch.schema();
        let mut columns = Vec::new();
        for (field, array) in schema.fields().iter().zip(batch.columns()) {
            let name = field.name().as_str();
            if matches!(name, REFERRAL_ID | CLIENT_ID | TAKEN_DATE) {
                continue;
            }
            columns.push(self.passthrough_column(&format!("referral_{name}"), array)?);
        }

        Ok(ReferralFrame {
            ids,
            client_ids,
            dates,
            index,
            columns,
        })
    }

    /// Carry a referral column over with the most specific type it fits
    fn passthrough_column(&self, name: &str, array: &ArrayRef) -> Result<Column> {
        Ok(match classify(array.data_type()) {
            CellKind::Numeric => Column::numeric(name, to_f64_values(array, name)?),
            CellKind::Temporal => Column::date(name, to_date_values(array, name, &self.date_formats)?),
            CellKind::Text => match try_f64_values(array) {
                Some(values) => Column::numeric(name, values),
                None => Column::text(name, to_key_values(array, name)?),
            },
        })
    }

    fn client_frame(&self, batch: &RecordBatch, reference_date: NaiveDate) -> Result<ClientFrame> {
        let table = TableName::Client;
        let all_ids = require_present(
            to_i64_values(&required_column(batch, table, CLIENT_ID)?, CLIENT_ID)?,
            CLIENT_ID,
        )?;

        // First occurrence of each client wins
        let mut index = FxHashMap::default();
        let mut rows = Vec::with_capacity(all_ids.len());
        for (row, &id) in all_ids.iter().enumerate() {
            if !index.contains_key(&id) {
                index.insert(id, rows.len());
                rows.push(row);
            }
        }
        let duplicates = all_ids.len() - rows.len();
        if duplicates > 0 {
            log::warn!("Client table has {duplicates} duplicate client rows; keeping the first of each");
        }
        let pick = |values: Vec<Option<f64>>| -> Vec<Option<f64>> {
            rows.iter().map(|&row| values[row]).collect()
        };

        let births = to_date_values(
            &required_column(batch, table, DATE_OF_BIRTH)?,
            DATE_OF_BIRTH,
            &self.date_formats,
        )?;
        let ages: Vec<Option<f64>> = births
            .iter()
            .map(|birth| birth.map(|date| age_in_years(date, reference_date)))
            .collect();

        let address_starts = to_date_values(
            &required_column(batch, table, ADDRESS_SINCE)?,
            ADDRESS_SINCE,
            &self.date_formats,
        )?;
        let tenures: Vec<Option<f64>> = address_starts
            .iter()
            .map(|since| since.map(|date| years_between(date, reference_date)))
            .collect();

        let is_male = match get_column(batch, table.as_str(), IS_MALE, false)? {
            Some(array) => flag_values(&array, IS_MALE)?,
            None => {
                log::debug!("Client table has no {IS_MALE} column");
                vec![None; batch.num_rows()]
            }
        };

        let known_partner: Vec<Option<f64>> = match get_column(batch, table.as_str(), PARTNER_ID, false)? {
            Some(array) => {
                // Logical nulls, so an all-null (Null typed) column counts as absent partners
                let nulls = array.logical_nulls();
                (0..array.len())
                    .map(|row| {
                        let present = nulls.as_ref().is_none_or(|nulls| nulls.is_valid(row));
                        Some(if present { 1.0 } else { 0.0 })
                    })
                    .collect()
            }
            None => vec![Some(0.0); batch.num_rows()],
        };

        let mut columns = vec![
            Column::numeric("client_age", pick(ages)),
            Column::numeric("client_addresslength", pick(tenures)),
            Column::numeric("client_clientismale", pick(is_male)),
            Column::numeric("client_knownpartner", pick(known_partner)),
            Column::numeric(
                "client_clientid",
                rows.iter().map(|&row| Some(all_ids[row] as f64)).collect(),
            ),
        ];

        for column in CLIENT_CATEGORICALS {
            let keys = categorical_keys(batch, column)?;
            let keys: Vec<Option<String>> = rows.iter().map(|&row| Some(keys[row].clone())).collect();
            let keys = self.encode_categories(column, keys)?;
            columns.extend(one_hot(&format!("client_{column}"), &keys));
        }

        Ok(ClientFrame { index, columns })
    }

    /// Replace categorical values by their fit-time counts when count encoding
    fn encode_categories(
        &self,
        column: &str,
        keys: Vec<Option<String>>,
    ) -> Result<Vec<Option<String>>> {
        if !self.count_encode {
            return Ok(keys);
        }
        let encodings = self.encodings.as_ref().ok_or(PipelineError::NotFitted {
            component: "TableConsolidator",
        })?;
        let Some(counts) = encodings.category(column) else {
            return Ok(vec![None; keys.len()]);
        };

        let mut unseen = 0usize;
        let encoded = keys
            .into_iter()
            .map(|key| {
                let count = key.as_ref().and_then(|key| counts.get(key));
                if key.is_some() && count.is_none() {
                    unseen += 1;
                }
                count.map(u64::to_string)
            })
            .collect();
        if unseen > 0 {
            log::info!("{unseen} values of client {column} were not seen at fit time; left unencoded");
        }
        Ok(encoded)
    }

    /// Count rows per (key, sub-category) and pivot to one column per sub-category
    ///
    /// `index` maps the table's key onto a row of the frame the columns are
    /// joined to. Keys with no row there are counted but land nowhere.
    fn flatten(
        &self,
        batch: &RecordBatch,
        table: TableName,
        index: &FxHashMap<i64, usize>,
    ) -> Result<Vec<Column>> {
        let (Some((key_column, sub_column)), Some(group)) =
            (table.flatten_columns(), FeatureGroup::from_table(table))
        else {
            return Ok(Vec::new());
        };

        let keys = to_i64_values(&required_column(batch, table, key_column)?, key_column)?;
        let mut subs = to_key_values(&required_column(batch, table, sub_column)?, sub_column)?;

        if self.count_encode {
            let encodings = self.encodings.as_ref().ok_or(PipelineError::NotFitted {
                component: "TableConsolidator",
            })?;
            let counts = encodings.sub_category(group);
            let mut unseen = 0usize;
            for sub in &mut subs {
                if let Some(value) = sub.take() {
                    match counts.and_then(|counts| counts.get(&value)) {
                        Some(count) => *sub = Some(count.to_string()),
                        None => unseen += 1,
                    }
                }
            }
            if unseen > 0 {
                log::info!("{unseen} {table} rows have sub-categories not seen at fit time; skipped");
            }
        }

        let n_rows = index.len();
        let mut pivot: FxHashMap<String, Vec<Option<f64>>> = FxHashMap::default();
        let mut unmatched = 0usize;
        for (key, sub) in keys.into_iter().zip(subs) {
            let (Some(key), Some(sub)) = (key, sub) else {
                continue;
            };
            let cells = pivot.entry(sub).or_insert_with(|| vec![None; n_rows]);
            match index.get(&key) {
                Some(&row) => *cells[row].get_or_insert(0.0) += 1.0,
                None => unmatched += 1,
            }
        }
        if unmatched > 0 {
            log::debug!("{unmatched} {table} rows reference keys outside the joined table");
        }

        let mut sub_categories: Vec<String> = pivot.keys().cloned().collect();
        sub_categories.sort_by(|a, b| category_order(a, b));

        Ok(sub_categories
            .into_iter()
            .filter_map(|sub| {
                let values = pivot.remove(&sub)?;
                Some(Column::numeric(format!("{table}_{sub}"), values).with_group(group))
            })
            .collect())
    }
}

/// Referral-side columns before the client join
struct ReferralFrame {
    ids: Vec<i64>,
    client_ids: Vec<i64>,
    dates: Vec<NaiveDate>,
    /// referral id -> row
    index: FxHashMap<i64, usize>,
    columns: Vec<Column>,
}

/// One row per distinct client
struct ClientFrame {
    /// client id -> row
    index: FxHashMap<i64, usize>,
    columns: Vec<Column>,
}

fn required_column(batch: &RecordBatch, table: TableName, column: &str) -> Result<ArrayRef> {
    get_column(batch, table.as_str(), column, true)?.ok_or_else(|| PipelineError::MissingColumn {
        table: table.to_string(),
        column: column.to_string(),
    })
}

/// Key columns may not hold nulls
fn require_present(values: Vec<Option<i64>>, column: &str) -> Result<Vec<i64>> {
    values
        .into_iter()
        .map(|value| {
            value.ok_or_else(|| PipelineError::InvalidValue {
                column: column.to_string(),
                value: "null".to_string(),
                expected: "a non-null identifier",
            })
        })
        .collect()
}

/// Categorical cells as keys, with nulls as `"nan"`; an absent column is all nulls
fn categorical_keys(batch: &RecordBatch, column: &str) -> Result<Vec<String>> {
    match get_column(batch, TableName::Client.as_str(), column, false)? {
        Some(array) => Ok(to_key_values(&array, column)?
            .into_iter()
            .map(|key| key.unwrap_or_else(|| NULL_CATEGORY.to_string()))
            .collect()),
        None => {
            log::debug!("Client table has no {column} column; treating it as all null");
            Ok(vec![NULL_CATEGORY.to_string(); batch.num_rows()])
        }
    }
}

/// 0/1 indicator columns, one per distinct value, in category order
///
/// Rows whose value is `None` get 0 in every indicator.
fn one_hot(prefix: &str, keys: &[Option<String>]) -> Vec<Column> {
    let mut values: Vec<&String> = keys.iter().flatten().collect();
    values.sort_by(|a, b| category_order(a, b));
    values.dedup();

    values
        .into_iter()
        .map(|value| {
            let cells = keys
                .iter()
                .map(|key| Some(if key.as_ref() == Some(value) { 1.0 } else { 0.0 }))
                .collect();
            Column::numeric(format!("{prefix}_{value}"), cells)
        })
        .collect()
}

/// Numeric categories in numeric order first, then the rest lexically
fn category_order(a: &str, b: &str) -> Ordering {
    // "nan" and "inf" parse as floats but sort as text
    let numeric = |s: &str| s.parse::<f64>().ok().filter(|v| v.is_finite());
    match (numeric(a), numeric(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// 0/1 flags from booleans, numbers or `true`/`false` text
fn flag_values(array: &ArrayRef, column: &str) -> Result<Vec<Option<f64>>> {
    match array.data_type() {
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
            let flags = strict_cast(array, &DataType::Boolean, column, "a true/false flag")?;
            to_f64_values(&flags, column)
        }
        _ => to_f64_values(array, column),
    }
}

/// Whole days between two dates, in 365-day years
fn years_between(from: NaiveDate, to: NaiveDate) -> f64 {
    (to - from).num_days() as f64 / 365.0
}

/// Age in years at the reference date
///
/// Two-digit birth years in the source data can parse a century late, giving
/// a negative age; those ages are moved back by 100 years. This is a
/// data-quality workaround, not a business rule.
fn age_in_years(birth: NaiveDate, reference_date: NaiveDate) -> f64 {
    let age = years_between(birth, reference_date);
    if age < 0.0 { age + 100.0 } else { age }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn negative_ages_move_back_a_century() {
        let reference = date(2020, 1, 1);
        let age = age_in_years(date(2055, 2, 1), reference);
        let expected = (reference - date(2055, 2, 1)).num_days() as f64 / 365.0 + 100.0;
        assert!((age - expected).abs() < 1e-12);
        assert!(age > 0.0 && age < 100.0);

        assert!((age_in_years(date(2019, 1, 1), reference) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn categories_sort_numerically_before_text() {
        let mut values = vec!["10", "nan", "2", "b", "1.5"];
        values.sort_by(|a, b| category_order(a, b));
        assert_eq!(values, vec!["1.5", "2", "10", "b", "nan"]);
    }

    #[test]
    fn one_hot_marks_unencoded_rows_as_zero() {
        let keys = vec![Some("2".to_string()), None, Some("1".to_string())];
        let columns = one_hot("client_clientcountryid", &keys);

        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["client_clientcountryid_1", "client_clientcountryid_2"]);
        assert_eq!(
            columns[0].values.as_numeric().unwrap(),
            &[Some(0.0), Some(0.0), Some(1.0)]
        );
        assert_eq!(
            columns[1].values.as_numeric().unwrap(),
            &[Some(1.0), Some(0.0), Some(0.0)]
        );
    }
}
