//! The consolidated one-row-per-referral table

use chrono::NaiveDate;
use rustc_hash::FxHashMap;

use crate::error::{PipelineError, Result};
use crate::table::column::{Column, FeatureGroup};

/// One row per referral with its key columns held apart from the features
///
/// `referral_id`, `client_id` and `taken_date` are never null. Every other
/// column is a named, typed [`Column`] of the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterTable {
    referral_ids: Vec<i64>,
    client_ids: Vec<i64>,
    taken_dates: Vec<NaiveDate>,
    columns: Vec<Column>,
}

impl MasterTable {
    /// Create a table from its key columns
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidValue`] if the key columns differ in length.
    pub fn new(
        referral_ids: Vec<i64>,
        client_ids: Vec<i64>,
        taken_dates: Vec<NaiveDate>,
    ) -> Result<Self> {
        if referral_ids.len() != client_ids.len() || referral_ids.len() != taken_dates.len() {
            return Err(PipelineError::InvalidValue {
                column: "referral keys".to_string(),
                value: format!(
                    "{} ids, {} clients, {} dates",
                    referral_ids.len(),
                    client_ids.len(),
                    taken_dates.len()
                ),
                expected: "key columns of equal length",
            });
        }
        Ok(Self {
            referral_ids,
            client_ids,
            taken_dates,
            columns: Vec::new(),
        })
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.referral_ids.len()
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn referral_ids(&self) -> &[i64] {
        &self.referral_ids
    }

    #[must_use]
    pub fn client_ids(&self) -> &[i64] {
        &self.client_ids
    }

    #[must_use]
    pub fn taken_dates(&self) -> &[NaiveDate] {
        &self.taken_dates
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in table order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    /// Look up a column by name
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Columns carrying one of the given group tags, in table order
    pub fn columns_in_groups<'a>(
        &'a self,
        groups: &'a [FeatureGroup],
    ) -> impl Iterator<Item = &'a Column> + 'a {
        self.columns
            .iter()
            .filter(|column| column.group.is_some_and(|group| groups.contains(&group)))
    }

    /// Add a column, replacing any existing column of the same name in place
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidValue`] if the column length does not
    /// match the table.
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if column.len() != self.num_rows() {
            let value = format!("{} rows", column.len());
            return Err(PipelineError::InvalidValue {
                column: column.name,
                value,
                expected: "a column matching the table length",
            });
        }
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    /// Add several columns in order
    pub fn extend_columns(&mut self, columns: impl IntoIterator<Item = Column>) -> Result<()> {
        for column in columns {
            self.push_column(column)?;
        }
        Ok(())
    }

    /// Remove every column matching the predicate, returning them in table order
    pub fn drain_columns(&mut self, mut predicate: impl FnMut(&Column) -> bool) -> Vec<Column> {
        let (taken, kept): (Vec<Column>, Vec<Column>) = std::mem::take(&mut self.columns)
            .into_iter()
            .partition(|column| predicate(column));
        self.columns = kept;
        taken
    }

    /// Consume the table into its key columns and feature columns
    #[must_use]
    pub fn into_parts(self) -> (Vec<i64>, Vec<i64>, Vec<NaiveDate>, Vec<Column>) {
        (
            self.referral_ids,
            self.client_ids,
            self.taken_dates,
            self.columns,
        )
    }

    /// Row indices sorted ascending by (taken date, referral id)
    #[must_use]
    pub fn time_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.num_rows()).collect();
        order.sort_by_key(|&row| (self.taken_dates[row], self.referral_ids[row]));
        order
    }

    /// Reorder rows so that row `i` of the result is row `order[i]` of this table
    pub fn reorder(&mut self, order: &[usize]) {
        self.referral_ids = order.iter().map(|&row| self.referral_ids[row]).collect();
        self.client_ids = order.iter().map(|&row| self.client_ids[row]).collect();
        self.taken_dates = order.iter().map(|&row| self.taken_dates[row]).collect();
        for column in &mut self.columns {
            column.values = column.values.take(order);
        }
    }

    /// Sort rows ascending by (taken date, referral id)
    pub fn sort_by_time(&mut self) {
        let order = self.time_order();
        if order.iter().enumerate().any(|(position, &row)| position != row) {
            self.reorder(&order);
        }
    }

    /// Each client's rows in (taken date, referral id) order
    ///
    /// Clients appear in the order of their first referral.
    #[must_use]
    pub fn client_histories(&self) -> Vec<Vec<usize>> {
        let mut slots: FxHashMap<i64, usize> = FxHashMap::default();
        let mut histories: Vec<Vec<usize>> = Vec::new();
        for row in self.time_order() {
            let slot = *slots.entry(self.client_ids[row]).or_insert_with(|| {
                histories.push(Vec::new());
                histories.len() - 1
            });
            histories[slot].push(row);
        }
        histories
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, day).unwrap()
    }

    #[test]
    fn histories_follow_time_order_per_client() {
        let master = MasterTable::new(
            vec![10, 11, 12, 13],
            vec![1, 2, 1, 2],
            vec![date(5), date(1), date(2), date(1)],
        )
        .unwrap();

        assert_eq!(master.time_order(), vec![1, 3, 2, 0]);
        assert_eq!(master.client_histories(), vec![vec![1, 3], vec![2, 0]]);
    }

    #[test]
    fn push_column_replaces_and_checks_length() {
        let mut master = MasterTable::new(vec![1, 2], vec![1, 1], vec![date(1), date(2)]).unwrap();
        master
            .push_column(Column::numeric("a", vec![Some(1.0), None]))
            .unwrap();
        master
            .push_column(Column::numeric("a", vec![Some(2.0), Some(3.0)]))
            .unwrap();

        assert_eq!(master.num_columns(), 1);
        assert_eq!(
            master.column("a").unwrap().values.as_numeric().unwrap(),
            &[Some(2.0), Some(3.0)]
        );
        match master.push_column(Column::numeric("b", vec![None])) {
            Err(PipelineError::InvalidValue { column, value, .. }) => {
                assert_eq!(column, "b");
                assert_eq!(value, "1 rows");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn sort_by_time_moves_every_column() {
        let mut master =
            MasterTable::new(vec![2, 1], vec![7, 8], vec![date(3), date(3)]).unwrap();
        master
            .push_column(Column::text("t", vec![Some("b".into()), Some("a".into())]))
            .unwrap();
        master.sort_by_time();

        assert_eq!(master.referral_ids(), &[1, 2]);
        assert_eq!(master.client_ids(), &[8, 7]);
        assert_eq!(
            master.column("t").unwrap().values,
            crate::table::ColumnValues::Text(vec![Some("a".into()), Some("b".into())])
        );
    }
}
