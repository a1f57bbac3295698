//! Store row types
//!
//! Column names match the historical CSV layout so older partitions load
//! unchanged; classification sets are stored pipe-delimited.

use chrono::{Datelike, NaiveDate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::hash::Hash;

use super::partition::PartitionKind;

/// A row type that lives in year partitions and has a composite identity
pub trait StoreRow: Serialize + DeserializeOwned + Clone {
    type Key: Eq + Hash + Clone;

    const KIND: PartitionKind;
    const COLUMNS: &'static [&'static str];

    fn key(&self) -> Self::Key;

    fn patent_date(&self) -> NaiveDate;

    fn grant_year(&self) -> i32 {
        self.patent_date().year()
    }
}

/// (sector, patent, canonical company, raw assignee)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    pub sector_id: String,
    pub patent_id: String,
    pub canonical_company_id: String,
    pub assignee_id: String,
}

/// (sector, patent, canonical company, inventor)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InventorKey {
    pub sector_id: String,
    pub patent_id: String,
    pub canonical_company_id: String,
    pub inventor_id: String,
}

/// One patent-assignee pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatentAssigneeRecord {
    pub sector_id: String,
    pub patent_id: String,
    pub patent_date: NaiveDate,
    pub patent_title: String,
    pub patent_num_times_cited_by_us_patents: Option<u64>,
    #[serde(with = "pipe_set")]
    pub cpc_subclass_ids: BTreeSet<String>,
    #[serde(with = "pipe_set", default)]
    pub cpc_group_ids: BTreeSet<String>,
    pub assignee_id: String,
    pub assignee_type: String,
    pub assignee_organization: String,
    pub canonical_company_id: String,
    pub display_name: String,
}

impl PatentAssigneeRecord {
    pub fn citations(&self) -> u64 {
        self.patent_num_times_cited_by_us_patents.unwrap_or(0)
    }
}

impl StoreRow for PatentAssigneeRecord {
    type Key = PairKey;

    const KIND: PartitionKind = PartitionKind::Pairs;
    const COLUMNS: &'static [&'static str] = &[
        "sector_id",
        "patent_id",
        "patent_date",
        "patent_title",
        "patent_num_times_cited_by_us_patents",
        "cpc_subclass_ids",
        "cpc_group_ids",
        "assignee_id",
        "assignee_type",
        "assignee_organization",
        "canonical_company_id",
        "display_name",
    ];

    fn key(&self) -> PairKey {
        PairKey {
            sector_id: self.sector_id.clone(),
            patent_id: self.patent_id.clone(),
            canonical_company_id: self.canonical_company_id.clone(),
            assignee_id: self.assignee_id.clone(),
        }
    }

    fn patent_date(&self) -> NaiveDate {
        self.patent_date
    }
}

/// One inventor credited on a patent held by a canonical company
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatentInventorRecord {
    pub sector_id: String,
    pub patent_id: String,
    pub patent_date: NaiveDate,
    pub canonical_company_id: String,
    pub inventor_id: String,
    pub inventor_name_first: String,
    pub inventor_name_last: String,
    pub inventor_full_name: String,
}

impl StoreRow for PatentInventorRecord {
    type Key = InventorKey;

    const KIND: PartitionKind = PartitionKind::Inventors;
    const COLUMNS: &'static [&'static str] = &[
        "sector_id",
        "patent_id",
        "patent_date",
        "canonical_company_id",
        "inventor_id",
        "inventor_name_first",
        "inventor_name_last",
        "inventor_full_name",
    ];

    fn key(&self) -> InventorKey {
        InventorKey {
            sector_id: self.sector_id.clone(),
            patent_id: self.patent_id.clone(),
            canonical_company_id: self.canonical_company_id.clone(),
            inventor_id: self.inventor_id.clone(),
        }
    }

    fn patent_date(&self) -> NaiveDate {
        self.patent_date
    }
}

/// `BTreeSet<String>` <-> `"A61K|C12N"`
pub mod pipe_set {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeSet;

    pub fn serialize<S: Serializer>(set: &BTreeSet<String>, s: S) -> Result<S::Ok, S::Error> {
        let joined = set.iter().map(String::as_str).collect::<Vec<_>>().join("|");
        s.serialize_str(&joined)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeSet<String>, D::Error> {
        let raw = Option::<String>::deserialize(d)?.unwrap_or_default();
        Ok(split(&raw))
    }

    pub fn split(raw: &str) -> BTreeSet<String> {
        raw.split('|')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}
