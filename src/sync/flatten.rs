//! Flattening upstream patents into store rows
//!
//! One pair row per (patent, assignee) and one inventor row per
//! (patent, canonical company, inventor). Keys already seen in this run are
//! dropped (first occurrence wins) so a record repeated across pages never
//! reaches the merge twice.

use chrono::NaiveDate;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};

use crate::canonical::{resolve, CanonicalLookup};
use crate::patentsview::{ApiCpc, ApiPatent};
use crate::store::{
    InventorKey, PairKey, PatentAssigneeRecord, PatentInventorRecord, StoreRow,
};

#[derive(Debug, Default)]
pub struct FlattenedBatch {
    pub pairs: Vec<PatentAssigneeRecord>,
    pub inventors: Vec<PatentInventorRecord>,
    /// Upstream records dropped for a missing id or unparsable date
    pub skipped_records: usize,
    /// Latest grant date absorbed so far
    pub last_patent_date: Option<NaiveDate>,
    seen_pairs: HashSet<PairKey>,
    seen_inventors: HashSet<InventorKey>,
}

impl FlattenedBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten one raw `/patent` record into the batch
    pub fn absorb(&mut self, sector_id: &str, raw: &Value, lookup: &dyn CanonicalLookup) {
        let patent: ApiPatent = match serde_json::from_value(raw.clone()) {
            Ok(p) => p,
            Err(e) => {
                self.skip(raw, &format!("undecodable record: {}", e));
                return;
            }
        };

        let Some(patent_id) = non_blank(patent.patent_id.as_deref()) else {
            self.skip(raw, "missing patent_id");
            return;
        };
        let Some(patent_date) = patent.patent_date.as_deref().and_then(parse_grant_date) else {
            self.skip(raw, "missing or unparsable patent_date");
            return;
        };

        self.last_patent_date = self.last_patent_date.max(Some(patent_date));

        let cpc = patent.cpc_current.as_deref().unwrap_or_default();
        let cpc_subclass_ids = collect_codes(cpc, |c| c.cpc_subclass_id.as_deref());
        let cpc_group_ids = collect_codes(cpc, |c| c.cpc_group_id.as_deref());
        let title = patent.patent_title.as_deref().unwrap_or("").trim().to_string();

        // canonical ids in first-seen order, for the inventor fan-out
        let mut companies: Vec<String> = Vec::new();

        for assignee in patent.assignees.as_deref().unwrap_or_default() {
            let Some(assignee_id) = non_blank(assignee.assignee_id.as_deref()) else {
                continue;
            };
            let organization = assignee
                .assignee_organization
                .as_deref()
                .unwrap_or("")
                .trim()
                .to_string();
            let (canonical_company_id, display_name) = resolve(&assignee_id, &organization, lookup);

            if !companies.contains(&canonical_company_id) {
                companies.push(canonical_company_id.clone());
            }

            let row = PatentAssigneeRecord {
                sector_id: sector_id.to_string(),
                patent_id: patent_id.clone(),
                patent_date,
                patent_title: title.clone(),
                patent_num_times_cited_by_us_patents: patent.patent_num_times_cited_by_us_patents,
                cpc_subclass_ids: cpc_subclass_ids.clone(),
                cpc_group_ids: cpc_group_ids.clone(),
                assignee_id,
                assignee_type: assignee.assignee_type.as_deref().unwrap_or("").trim().to_string(),
                assignee_organization: organization,
                canonical_company_id,
                display_name,
            };
            if self.seen_pairs.insert(row.key()) {
                self.pairs.push(row);
            }
        }

        for inventor in patent.inventors.as_deref().unwrap_or_default() {
            let Some(inventor_id) = non_blank(inventor.inventor_id.as_deref()) else {
                continue;
            };
            let first = inventor.inventor_name_first.as_deref().unwrap_or("").trim();
            let last = inventor.inventor_name_last.as_deref().unwrap_or("").trim();
            let full = format!("{} {}", first, last).trim().to_string();

            for company in &companies {
                let row = PatentInventorRecord {
                    sector_id: sector_id.to_string(),
                    patent_id: patent_id.clone(),
                    patent_date,
                    canonical_company_id: company.clone(),
                    inventor_id: inventor_id.clone(),
                    inventor_name_first: first.to_string(),
                    inventor_name_last: last.to_string(),
                    inventor_full_name: full.clone(),
                };
                if self.seen_inventors.insert(row.key()) {
                    self.inventors.push(row);
                }
            }
        }
    }

    fn skip(&mut self, raw: &Value, reason: &str) {
        self.skipped_records += 1;
        let patent_id = raw.get("patent_id").map(ToString::to_string).unwrap_or_default();
        tracing::debug!(
            patent_id = %patent_id,
            reason,
            "skipping upstream record"
        );
    }
}

/// `2024-05-07`, tolerating a trailing time component
pub fn parse_grant_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn collect_codes<F>(cpc: &[ApiCpc], pick: F) -> BTreeSet<String>
where
    F: Fn(&ApiCpc) -> Option<&str>,
{
    cpc.iter()
        .filter_map(|c| pick(c))
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .collect()
}
