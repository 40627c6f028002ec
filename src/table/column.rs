//! Typed master-table columns

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::table::raw::TableName;

/// The child table a flattened column was produced from
///
/// Steps that work on families of columns select them by this tag rather than
/// by matching column names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeatureGroup {
    ReferralIssue,
    ReferralBenefit,
    ReferralReason,
    ReferralDietaryRequirements,
    ReferralDomesticCircumstances,
    ReferralDocument,
    ClientIssue,
}

impl FeatureGroup {
    /// The group for a flattened child table, if the table is one
    #[must_use]
    pub const fn from_table(table: TableName) -> Option<Self> {
        match table {
            TableName::Referral | TableName::Client => None,
            TableName::ReferralIssue => Some(Self::ReferralIssue),
            TableName::ReferralBenefit => Some(Self::ReferralBenefit),
            TableName::ReferralReason => Some(Self::ReferralReason),
            TableName::ReferralDietaryRequirements => Some(Self::ReferralDietaryRequirements),
            TableName::ReferralDomesticCircumstances => Some(Self::ReferralDomesticCircumstances),
            TableName::ReferralDocument => Some(Self::ReferralDocument),
            TableName::ClientIssue => Some(Self::ClientIssue),
        }
    }

    /// The child table behind this group
    #[must_use]
    pub const fn table(self) -> TableName {
        match self {
            Self::ReferralIssue => TableName::ReferralIssue,
            Self::ReferralBenefit => TableName::ReferralBenefit,
            Self::ReferralReason => TableName::ReferralReason,
            Self::ReferralDietaryRequirements => TableName::ReferralDietaryRequirements,
            Self::ReferralDomesticCircumstances => TableName::ReferralDomesticCircumstances,
            Self::ReferralDocument => TableName::ReferralDocument,
            Self::ClientIssue => TableName::ClientIssue,
        }
    }
}

/// Cell storage for one column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
    Date(Vec<Option<NaiveDate>>),
}

impl ColumnValues {
    /// Number of cells
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(values) => values.len(),
            Self::Text(values) => values.len(),
            Self::Date(values) => values.len(),
        }
    }

    /// Whether the column has no cells
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric cells, if this is a numeric column
    #[must_use]
    pub fn as_numeric(&self) -> Option<&[Option<f64>]> {
        match self {
            Self::Numeric(values) => Some(values),
            _ => None,
        }
    }

    /// Short name of the cell type, for log messages
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Numeric(_) => "numeric",
            Self::Text(_) => "text",
            Self::Date(_) => "date",
        }
    }

    /// Gather cells by row index
    #[must_use]
    pub fn take(&self, rows: &[usize]) -> Self {
        match self {
            Self::Numeric(values) => Self::Numeric(rows.iter().map(|&row| values[row]).collect()),
            Self::Text(values) => {
                Self::Text(rows.iter().map(|&row| values[row].clone()).collect())
            }
            Self::Date(values) => Self::Date(rows.iter().map(|&row| values[row]).collect()),
        }
    }

    /// Gather cells by optional row index; `None` yields a null cell
    #[must_use]
    pub fn take_optional(&self, rows: &[Option<usize>]) -> Self {
        match self {
            Self::Numeric(values) => {
                Self::Numeric(rows.iter().map(|row| row.and_then(|r| values[r])).collect())
            }
            Self::Text(values) => Self::Text(
                rows.iter()
                    .map(|row| row.and_then(|r| values[r].clone()))
                    .collect(),
            ),
            Self::Date(values) => {
                Self::Date(rows.iter().map(|row| row.and_then(|r| values[r])).collect())
            }
        }
    }
}

/// A named master-table column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
    /// Set for columns flattened from a child table
    pub group: Option<FeatureGroup>,
}

impl Column {
    /// Create an untagged numeric column
    #[must_use]
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Numeric(values),
            group: None,
        }
    }

    /// Create an untagged text column
    #[must_use]
    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Text(values),
            group: None,
        }
    }

    /// Create an untagged date column
    #[must_use]
    pub fn date(name: impl Into<String>, values: Vec<Option<NaiveDate>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Date(values),
            group: None,
        }
    }

    /// Tag the column with the child table it came from
    #[must_use]
    pub fn with_group(mut self, group: FeatureGroup) -> Self {
        self.group = Some(group);
        self
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the column has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the column holds numbers
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self.values, ColumnValues::Numeric(_))
    }
}
