//! `/patent` query construction

use serde_json::{json, Value};

use super::window::SyncWindow;
use crate::config::SectorConfig;
use crate::patentsview::SortKey;

pub const PATENT_ENDPOINT: &str = "patent";

/// Fields requested for every patent; nested lists come back as arrays
pub const PATENT_FIELDS: &[&str] = &[
    "patent_id",
    "patent_title",
    "patent_date",
    "patent_num_times_cited_by_us_patents",
    "cpc_current.cpc_subclass_id",
    "cpc_current.cpc_group_id",
    "assignees.assignee_id",
    "assignees.assignee_organization",
    "assignees.assignee_type",
    "inventors.inventor_id",
    "inventors.inventor_name_first",
    "inventors.inventor_name_last",
];

/// Grant date, then patent id. The cursor depends on this being a total order.
pub fn patent_sort() -> Vec<SortKey> {
    vec![SortKey::asc("patent_date"), SortKey::asc("patent_id")]
}

/// Any current CPC subclass beginning with any of the prefixes
pub fn build_cpc_query(prefixes: &[String]) -> Value {
    let any: Vec<Value> = prefixes
        .iter()
        .map(|p| json!({"_begins": {"cpc_current.cpc_subclass_id": p}}))
        .collect();
    json!({ "_or": any })
}

/// Utility patents of the sector granted in `(window.start, window.end]`
pub fn build_patent_query(sector: &SectorConfig, window: &SyncWindow) -> Value {
    json!({
        "_and": [
            {"patent_type": "utility"},
            {"_gt": {"patent_date": window.start.format("%Y-%m-%d").to_string()}},
            {"_lte": {"patent_date": window.end.format("%Y-%m-%d").to_string()}},
            build_cpc_query(&sector.cpc_subclass_prefixes),
        ]
    })
}
