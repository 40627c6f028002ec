//! Raw input tables keyed by a closed set of table names

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use rustc_hash::FxHashMap;

use crate::error::{PipelineError, Result};

/// The tables a referral extract is made of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableName {
    Referral,
    Client,
    ReferralIssue,
    ReferralBenefit,
    ReferralReason,
    ReferralDietaryRequirements,
    ReferralDomesticCircumstances,
    ReferralDocument,
    ClientIssue,
}

impl TableName {
    /// Every table a pipeline call requires, in load order
    pub const ALL: [Self; 9] = [
        Self::Referral,
        Self::Client,
        Self::ReferralIssue,
        Self::ReferralBenefit,
        Self::ReferralReason,
        Self::ReferralDietaryRequirements,
        Self::ReferralDomesticCircumstances,
        Self::ReferralDocument,
        Self::ClientIssue,
    ];

    /// Child tables flattened onto the referral table
    pub const REFERRAL_CHILDREN: [Self; 6] = [
        Self::ReferralIssue,
        Self::ReferralBenefit,
        Self::ReferralReason,
        Self::ReferralDietaryRequirements,
        Self::ReferralDomesticCircumstances,
        Self::ReferralDocument,
    ];

    /// The lower-case key used in requests, exports and file names
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Referral => "referral",
            Self::Client => "client",
            Self::ReferralIssue => "referralissue",
            Self::ReferralBenefit => "referralbenefit",
            Self::ReferralReason => "referralreason",
            Self::ReferralDietaryRequirements => "referraldietaryrequirements",
            Self::ReferralDomesticCircumstances => "referraldomesticcircumstances",
            Self::ReferralDocument => "referraldocument",
            Self::ClientIssue => "clientissue",
        }
    }

    /// Key and sub-category columns of a one-to-many child table
    ///
    /// Returns `None` for the referral and client tables.
    #[must_use]
    pub const fn flatten_columns(self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::Referral | Self::Client => None,
            Self::ReferralIssue => Some(("referralinstanceid", "clientissueid")),
            Self::ReferralBenefit => Some(("referralinstanceid", "benefittypeid")),
            Self::ReferralReason => Some(("referralinstanceid", "referralreasonid")),
            Self::ReferralDietaryRequirements => {
                Some(("referralinstanceid", "dietaryrequirementsid"))
            }
            Self::ReferralDomesticCircumstances => {
                Some(("referralinstanceid", "domesticcircumstancesid"))
            }
            Self::ReferralDocument => Some(("referralinstanceid", "referraldocumentid")),
            Self::ClientIssue => Some(("clientid", "clientissueid")),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableName {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == lowered)
            .ok_or_else(|| PipelineError::InvalidValue {
                column: "table".to_string(),
                value: s.to_string(),
                expected: "a known table name",
            })
    }
}

/// The set of raw tables handed to one pipeline call
///
/// Tables are consumed with [`RawTables::take`]; a set is not reusable once a
/// pipeline has run over it.
#[derive(Debug, Clone, Default)]
pub struct RawTables {
    tables: FxHashMap<TableName, RecordBatch>,
}

impl RawTables {
    /// Create an empty table set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table set from named batches, ignoring names outside the known set
    pub fn from_named_batches<I, S>(batches: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, RecordBatch)>,
        S: AsRef<str>,
    {
        let mut tables = Self::new();
        for (name, batch) in batches {
            match name.as_ref().parse::<TableName>() {
                Ok(table) => tables.insert(table, batch)?,
                Err(_) => log::debug!("Ignoring unknown table '{}'", name.as_ref()),
            }
        }
        Ok(tables)
    }

    /// Insert a table, normalising its column names to lower case
    pub fn insert(&mut self, name: TableName, batch: RecordBatch) -> Result<()> {
        let batch = lowercase_columns(name, batch)?;
        self.tables.insert(name, batch);
        Ok(())
    }

    /// Insert an empty table, the "no data" state for a table
    pub fn insert_empty(&mut self, name: TableName) {
        self.tables
            .insert(name, RecordBatch::new_empty(Arc::new(Schema::empty())));
    }

    /// Remove a table from the set and hand it to the caller
    ///
    /// # Errors
    /// Returns [`PipelineError::MissingTable`] if the key is absent.
    pub fn take(&mut self, name: TableName) -> Result<RecordBatch> {
        self.tables
            .remove(&name)
            .ok_or_else(|| PipelineError::MissingTable {
                table: name.to_string(),
            })
    }

    /// Borrow a table without consuming it
    #[must_use]
    pub fn get(&self, name: TableName) -> Option<&RecordBatch> {
        self.tables.get(&name)
    }

    /// Check that every required table key is present
    ///
    /// # Errors
    /// Returns [`PipelineError::MissingTable`] naming the first absent table.
    pub fn ensure_complete(&self) -> Result<()> {
        match TableName::ALL
            .into_iter()
            .find(|name| !self.tables.contains_key(name))
        {
            Some(missing) => Err(PipelineError::MissingTable {
                table: missing.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Number of tables in the set
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether the set holds no tables
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Total number of rows across all tables
    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.tables.values().map(RecordBatch::num_rows).sum()
    }
}

/// Lower-case every column name; the first of two colliding names wins
fn lowercase_columns(table: TableName, batch: RecordBatch) -> Result<RecordBatch> {
    let schema = batch.schema();
    if schema
        .fields()
        .iter()
        .all(|field| field.name().chars().all(|c| !c.is_ascii_uppercase()))
    {
        return Ok(batch);
    }

    let mut seen = Vec::with_capacity(schema.fields().len());
    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut columns = Vec::with_capacity(schema.fields().len());
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        let lowered = field.name().to_ascii_lowercase();
        if seen.contains(&lowered) {
            log::warn!(
                "Table {table}: column '{}' collides with an earlier column after lower-casing, dropping it",
                field.name()
            );
            continue;
        }
        fields.push(Field::new(&lowered, field.data_type().clone(), field.is_nullable()));
        columns.push(column.clone());
        seen.push(lowered);
    }

    let schema = Arc::new(Schema::new(fields));
    Ok(RecordBatch::try_new(schema, columns)?)
}
