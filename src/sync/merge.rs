//! Keep-last merge of incoming rows into the stored set

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::store::StoreRow;

#[derive(Debug)]
pub struct MergeOutcome<R> {
    /// The whole merged set, split by grant year
    pub rows_by_year: BTreeMap<i32, Vec<R>>,
    /// Years whose partition content changed and must be rewritten
    pub dirty_years: BTreeSet<i32>,
    pub total_rows: usize,
}

impl<R> MergeOutcome<R> {
    /// Rows of `year`; empty when every row left that year
    pub fn partition(&self, year: i32) -> &[R] {
        self.rows_by_year.get(&year).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl<R: StoreRow> MergeOutcome<R> {
    /// Drop rows granted before `oldest`. Years that lose rows become dirty
    /// so their partitions are rewritten (header-only when emptied). Returns
    /// the number of rows dropped.
    pub fn prune_before(&mut self, oldest: NaiveDate) -> usize {
        let mut pruned = 0;
        for (year, rows) in self.rows_by_year.iter_mut() {
            let before = rows.len();
            rows.retain(|row| row.patent_date() >= oldest);
            if rows.len() < before {
                pruned += before - rows.len();
                self.dirty_years.insert(*year);
            }
        }
        self.rows_by_year.retain(|_, rows| !rows.is_empty());
        self.total_rows -= pruned;
        pruned
    }
}

/// Combine `existing` and `incoming`, dropping duplicates on the row key and
/// keeping the last occurrence.
///
/// A year is dirty when it gained a row, when one of its rows was superseded
/// (the replacement may live in a different year after an upstream date
/// correction), or when it already held duplicate keys.
pub fn merge_rows<R: StoreRow>(existing: Vec<R>, incoming: Vec<R>) -> MergeOutcome<R> {
    let mut merged: Vec<R> = Vec::with_capacity(existing.len() + incoming.len());
    let mut position: HashMap<R::Key, usize> = HashMap::with_capacity(merged.capacity());
    let mut dirty_years = BTreeSet::new();

    let tagged = existing
        .into_iter()
        .map(|row| (row, false))
        .chain(incoming.into_iter().map(|row| (row, true)));

    for (row, is_new) in tagged {
        let year = row.grant_year();
        match position.get(&row.key()) {
            Some(&idx) => {
                dirty_years.insert(merged[idx].grant_year());
                dirty_years.insert(year);
                merged[idx] = row;
            }
            None => {
                if is_new {
                    dirty_years.insert(year);
                }
                position.insert(row.key(), merged.len());
                merged.push(row);
            }
        }
    }

    let total_rows = merged.len();
    let mut rows_by_year: BTreeMap<i32, Vec<R>> = BTreeMap::new();
    for row in merged {
        rows_by_year.entry(row.grant_year()).or_default().push(row);
    }

    MergeOutcome {
        rows_by_year,
        dirty_years,
        total_rows,
    }
}
