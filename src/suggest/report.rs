//! Candidate duplicate report

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::Path;

use super::normalize::normalize_org_name;
use crate::store::{write_atomic, PartitionStore, PatentAssigneeRecord, StoreError};

/// Ids and names listed per group
const MAX_LISTED: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestionGroup {
    pub normalized_name: String,
    /// Distinct raw assignee ids, sorted, at most 20
    pub assignee_ids: Vec<String>,
    /// Distinct raw organization names, sorted, at most 20
    pub org_names: Vec<String>,
    pub row_count: usize,
}

/// Normalized names shared by two or more raw assignee ids, largest first
pub fn find_candidates(rows: &[PatentAssigneeRecord], limit: usize) -> Vec<SuggestionGroup> {
    #[derive(Default)]
    struct Group<'a> {
        ids: BTreeSet<&'a str>,
        names: BTreeSet<&'a str>,
        rows: usize,
    }

    let mut groups: BTreeMap<String, Group<'_>> = BTreeMap::new();
    for row in rows {
        let normalized = normalize_org_name(&row.assignee_organization);
        if normalized.is_empty() {
            continue;
        }
        let group = groups.entry(normalized).or_default();
        group.ids.insert(row.assignee_id.as_str());
        group.names.insert(row.assignee_organization.as_str());
        group.rows += 1;
    }

    let mut candidates: Vec<SuggestionGroup> = groups
        .into_iter()
        .filter(|(_, g)| g.ids.len() >= 2)
        .map(|(normalized_name, g)| SuggestionGroup {
            normalized_name,
            assignee_ids: g.ids.iter().take(MAX_LISTED).map(|s| s.to_string()).collect(),
            org_names: g.names.iter().take(MAX_LISTED).map(|s| s.to_string()).collect(),
            row_count: g.rows,
        })
        .collect();

    candidates.sort_by(|a, b| b.row_count.cmp(&a.row_count));
    candidates.truncate(limit);
    candidates
}

pub fn render_markdown(groups: &[SuggestionGroup]) -> String {
    let mut out = String::from("# Normalization Suggestions\n\n");
    out.push_str("These are *potential* duplicates based on normalized organization strings.\n");
    out.push_str("Review and (optionally) add mappings in data/normalization/assignee_map.yml.\n\n");

    for group in groups {
        let _ = writeln!(out, "## {} (rows: {})", group.normalized_name, group.row_count);
        let _ = writeln!(out, "- assignee_ids: {}", group.assignee_ids.join(", "));
        let _ = writeln!(out, "- org_names: {}", group.org_names.join(", "));
        out.push('\n');
    }
    out
}

/// Write the report for a sector store. An empty store writes nothing and
/// returns `None`; otherwise returns the number of groups reported.
pub fn write_report(
    store: &PartitionStore,
    path: &Path,
    limit: usize,
) -> Result<Option<usize>, StoreError> {
    let rows = store.read_all::<PatentAssigneeRecord>();
    if rows.is_empty() {
        tracing::info!(store = %store.dir().display(), "empty store; no suggestion report");
        return Ok(None);
    }

    let groups = find_candidates(&rows, limit);
    let markdown = render_markdown(&groups);
    write_atomic(path, |w| {
        w.write_all(markdown.as_bytes())?;
        Ok::<(), StoreError>(())
    })?;

    tracing::info!(path = %path.display(), groups = groups.len(), "wrote normalization suggestions");
    Ok(Some(groups.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn row(patent: &str, assignee: &str, org: &str) -> PatentAssigneeRecord {
        PatentAssigneeRecord {
            sector_id: "biotech".to_string(),
            patent_id: patent.to_string(),
            patent_date: NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
            patent_title: "t".to_string(),
            patent_num_times_cited_by_us_patents: None,
            cpc_subclass_ids: BTreeSet::new(),
            cpc_group_ids: BTreeSet::new(),
            assignee_id: assignee.to_string(),
            assignee_type: "2".to_string(),
            assignee_organization: org.to_string(),
            canonical_company_id: assignee.to_string(),
            display_name: org.to_string(),
        }
    }

    #[test]
    fn test_flags_two_ids_sharing_a_name() {
        let rows = vec![
            row("P1", "A1", "Acme Inc"),
            row("P1", "A2", "Acme Incorporated"),
            row("P2", "B1", "Beta LLC"),
        ];
        let groups = find_candidates(&rows, 200);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].normalized_name, "acme");
        assert_eq!(groups[0].assignee_ids, vec!["A1", "A2"]);
        assert_eq!(groups[0].org_names, vec!["Acme Inc", "Acme Incorporated"]);
        assert_eq!(groups[0].row_count, 2);
    }

    #[test]
    fn test_one_id_with_many_spellings_is_not_flagged() {
        let rows = vec![row("P1", "A1", "Acme Inc"), row("P2", "A1", "ACME, Inc.")];
        assert!(find_candidates(&rows, 200).is_empty());
    }

    #[test]
    fn test_largest_groups_first_and_limited() {
        let mut rows = vec![row("P1", "A1", "Acme"), row("P2", "A2", "Acme Co")];
        for i in 0..5 {
            rows.push(row(&format!("Q{}", i), &format!("G{}", i % 2), "Globex Corporation"));
        }
        let groups = find_candidates(&rows, 1);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].normalized_name, "globex");
    }

    #[test]
    fn test_lists_are_capped() {
        let rows: Vec<_> = (0..25).map(|i| row("P1", &format!("A{:02}", i), "Acme")).collect();
        let groups = find_candidates(&rows, 200);
        assert_eq!(groups[0].assignee_ids.len(), MAX_LISTED);
        assert_eq!(groups[0].row_count, 25);
    }

    #[test]
    fn test_markdown_layout() {
        let groups = vec![SuggestionGroup {
            normalized_name: "acme".to_string(),
            assignee_ids: vec!["A1".to_string(), "A2".to_string()],
            org_names: vec!["Acme Inc".to_string(), "Acme Incorporated".to_string()],
            row_count: 2,
        }];
        let md = render_markdown(&groups);
        assert!(md.starts_with("# Normalization Suggestions\n\n"));
        assert!(md.contains("## acme (rows: 2)\n- assignee_ids: A1, A2\n- org_names: Acme Inc, Acme Incorporated\n"));
    }

    #[test]
    fn test_empty_store_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = PartitionStore::new(dir.path().join("store"));
        let path = dir.path().join("suggestions.md");
        assert_eq!(write_report(&store, &path, 200).unwrap(), None);
        assert!(!path.exists());
    }
}
