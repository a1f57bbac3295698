//! Ranked per-company aggregates

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::RollupSettings;
use crate::store::{PartitionStore, PatentAssigneeRecord};

/// One ranked company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyRollup {
    pub company_id: String,
    pub display_name: String,
    pub patent_count: usize,
    pub total_citations: u64,
    pub citations_per_patent: f64,
    pub cpc_breadth: usize,
}

#[derive(Debug, Clone)]
pub struct RollupOptions {
    pub top_n: usize,
    pub corporate_type_codes: Vec<String>,
}

impl RollupOptions {
    pub fn from_settings(settings: &RollupSettings) -> Self {
        Self {
            top_n: settings.top_n,
            corporate_type_codes: settings.corporate_type_codes.clone(),
        }
    }
}

impl Default for RollupOptions {
    fn default() -> Self {
        Self::from_settings(&RollupSettings::default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RollupOutput {
    /// Rank order, at most `top_n`
    pub companies: Vec<CompanyRollup>,
    /// Filtered rows, one per (company, patent)
    pub rows: Vec<PatentAssigneeRecord>,
    /// False when the corporate filter would have emptied the set
    pub corporate_filter_applied: bool,
}

impl RollupOutput {
    /// A company's patents, most recent first
    pub fn patents_for(&self, company_id: &str) -> Vec<&PatentAssigneeRecord> {
        let mut patents: Vec<&PatentAssigneeRecord> = self
            .rows
            .iter()
            .filter(|r| r.canonical_company_id == company_id)
            .collect();
        patents.sort_by(|a, b| {
            b.patent_date
                .cmp(&a.patent_date)
                .then_with(|| b.patent_id.cmp(&a.patent_id))
        });
        patents
    }
}

/// Rank every company in a sector's pair store
pub fn build(store: &PartitionStore, options: &RollupOptions) -> RollupOutput {
    rank(store.read_all::<PatentAssigneeRecord>(), options)
}

#[derive(Default)]
struct Accumulator {
    display_name: String,
    patents: usize,
    citations: u64,
    cpc: BTreeSet<String>,
}

/// Filter, dedup and aggregate pair rows into a ranked list.
///
/// Ties on patent count go to the higher citation total; remaining ties keep
/// company id order, so identical input always ranks identically.
pub fn rank(rows: Vec<PatentAssigneeRecord>, options: &RollupOptions) -> RollupOutput {
    let total = rows.len();
    let (rows, corporate_filter_applied) = corporate_only(rows, &options.corporate_type_codes);
    if !corporate_filter_applied && total > 0 {
        tracing::warn!(
            rows = total,
            codes = ?options.corporate_type_codes,
            "no rows carry a corporate assignee type; ranking all assignees"
        );
    }

    // one row per (company, patent), last wins
    let mut position: HashMap<(String, String), usize> = HashMap::new();
    let mut deduped: Vec<PatentAssigneeRecord> = Vec::with_capacity(rows.len());
    for row in rows {
        let key = (row.canonical_company_id.clone(), row.patent_id.clone());
        match position.get(&key) {
            Some(&idx) => deduped[idx] = row,
            None => {
                position.insert(key, deduped.len());
                deduped.push(row);
            }
        }
    }

    let mut groups: BTreeMap<&str, Accumulator> = BTreeMap::new();
    for row in &deduped {
        let acc = groups.entry(row.canonical_company_id.as_str()).or_default();
        acc.display_name = row.display_name.clone();
        acc.patents += 1;
        acc.citations += row.citations();
        acc.cpc.extend(row.cpc_subclass_ids.iter().cloned());
    }

    let mut companies: Vec<CompanyRollup> = groups
        .into_iter()
        .map(|(company_id, acc)| CompanyRollup {
            company_id: company_id.to_string(),
            display_name: acc.display_name,
            patent_count: acc.patents,
            total_citations: acc.citations,
            citations_per_patent: if acc.patents == 0 {
                0.0
            } else {
                acc.citations as f64 / acc.patents as f64
            },
            cpc_breadth: acc.cpc.len(),
        })
        .collect();

    companies.sort_by(|a, b| {
        b.patent_count
            .cmp(&a.patent_count)
            .then_with(|| b.total_citations.cmp(&a.total_citations))
    });
    companies.truncate(options.top_n);

    tracing::info!(
        companies = companies.len(),
        rows = deduped.len(),
        "rollup built"
    );

    RollupOutput {
        companies,
        rows: deduped,
        corporate_filter_applied,
    }
}

fn corporate_only(
    rows: Vec<PatentAssigneeRecord>,
    codes: &[String],
) -> (Vec<PatentAssigneeRecord>, bool) {
    let is_corporate = |row: &PatentAssigneeRecord| codes.iter().any(|c| c == row.assignee_type.trim());
    if rows.iter().any(is_corporate) {
        (rows.into_iter().filter(is_corporate).collect(), true)
    } else {
        (rows, false)
    }
}
