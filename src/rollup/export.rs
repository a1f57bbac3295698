//! Public artifacts: companies.json, companies.csv and patents/<company>.csv

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::builder::{CompanyRollup, RollupOutput};
use crate::store::write_atomic;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub companies: usize,
    pub patent_files: usize,
    pub stale_files_removed: usize,
}

#[derive(Serialize)]
struct PatentExportRow<'a> {
    patent_id: &'a str,
    patent_date: NaiveDate,
    patent_title: &'a str,
    patent_num_times_cited_by_us_patents: u64,
    cpc_subclass_ids: String,
}

/// Write every public artifact for one sector under `dir`
pub fn export_all(dir: &Path, output: &RollupOutput) -> Result<ExportSummary, ExportError> {
    write_companies_json(&dir.join("companies.json"), &output.companies)?;
    write_companies_csv(&dir.join("companies.csv"), &output.companies)?;
    let (patent_files, stale_files_removed) = write_company_patents(&dir.join("patents"), output)?;

    tracing::info!(
        dir = %dir.display(),
        companies = output.companies.len(),
        patent_files,
        "exported rollup artifacts"
    );

    Ok(ExportSummary {
        companies: output.companies.len(),
        patent_files,
        stale_files_removed,
    })
}

pub fn write_companies_json(path: &Path, companies: &[CompanyRollup]) -> Result<(), ExportError> {
    write_atomic(path, |w| {
        serde_json::to_writer_pretty(&mut *w, companies)?;
        w.write_all(b"\n")?;
        Ok::<(), ExportError>(())
    })
}

pub fn write_companies_csv(path: &Path, companies: &[CompanyRollup]) -> Result<(), ExportError> {
    write_atomic(path, |w| {
        let mut writer = csv::Writer::from_writer(w);
        for company in companies {
            writer.serialize(company)?;
        }
        writer.flush()?;
        Ok::<(), ExportError>(())
    })
}

/// One CSV per ranked company; files for companies that dropped out of the
/// ranking are removed. Returns (written, removed).
pub fn write_company_patents(
    dir: &Path,
    output: &RollupOutput,
) -> Result<(usize, usize), ExportError> {
    std::fs::create_dir_all(dir)?;

    let mut expected: BTreeSet<PathBuf> = BTreeSet::new();
    for company in &output.companies {
        let path = dir.join(format!("{}.csv", company_file_stem(&company.company_id)));
        let patents = output.patents_for(&company.company_id);

        write_atomic(&path, |w| {
            let mut writer = csv::Writer::from_writer(w);
            for p in &patents {
                writer.serialize(PatentExportRow {
                    patent_id: &p.patent_id,
                    patent_date: p.patent_date,
                    patent_title: &p.patent_title,
                    patent_num_times_cited_by_us_patents: p.citations(),
                    cpc_subclass_ids: p
                        .cpc_subclass_ids
                        .iter()
                        .map(String::as_str)
                        .collect::<Vec<_>>()
                        .join("|"),
                })?;
            }
            writer.flush()?;
            Ok::<(), ExportError>(())
        })?;
        expected.insert(path);
    }

    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_csv = path.extension().map(|e| e == "csv").unwrap_or(false);
        if is_csv && !expected.contains(&path) {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    if removed > 0 {
        tracing::debug!(dir = %dir.display(), removed, "removed stale company files");
    }

    Ok((expected.len(), removed))
}

/// Company ids as file names. Bytes outside `[A-Za-z0-9_-]` (and a leading
/// `.`) are written as `%XX`, so distinct ids never share a file. The empty
/// id maps to a lone `%`, which no escaped id can produce.
pub fn company_file_stem(id: &str) -> String {
    if id.is_empty() {
        return "%".to_string();
    }
    let mut stem = String::with_capacity(id.len());
    for (i, b) in id.bytes().enumerate() {
        let keep = b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || (b == b'.' && i > 0);
        if keep {
            stem.push(char::from(b));
        } else {
            stem.push_str(&format!("%{:02X}", b));
        }
    }
    stem
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rollup::builder::{rank, RollupOptions};
    use crate::store::PatentAssigneeRecord;
    use tempfile::TempDir;

    fn row(company: &str, patent: &str, date: (i32, u32, u32)) -> PatentAssigneeRecord {
        PatentAssigneeRecord {
            sector_id: "biotech".to_string(),
            patent_id: patent.to_string(),
            patent_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            patent_title: "Antibody".to_string(),
            patent_num_times_cited_by_us_patents: Some(2),
            cpc_subclass_ids: ["A61K", "C07K"].iter().map(|s| s.to_string()).collect(),
            cpc_group_ids: BTreeSet::new(),
            assignee_id: company.to_string(),
            assignee_type: "2".to_string(),
            assignee_organization: "Org".to_string(),
            canonical_company_id: company.to_string(),
            display_name: "Org".to_string(),
        }
    }

    #[test]
    fn test_company_file_stem() {
        assert_eq!(company_file_stem("abc-123_x"), "abc-123_x");
        assert_eq!(company_file_stem("acme.bio"), "acme.bio");
        assert_eq!(company_file_stem("../etc/passwd"), "%2E.%2Fetc%2Fpasswd");
        assert_eq!(company_file_stem("a b/c"), "a%20b%2Fc");
        assert_eq!(company_file_stem("100%"), "100%25");
        assert_eq!(company_file_stem(""), "%");
    }

    #[test]
    fn test_company_file_stems_do_not_collide() {
        let ids = ["acme/us", "acme:us", "acme_us", "acme%2Fus", "acme us", " acme us"];
        let stems: BTreeSet<String> = ids.iter().map(|id| company_file_stem(id)).collect();
        assert_eq!(stems.len(), ids.len());
    }

    #[test]
    fn test_punctuation_variants_get_their_own_files() {
        let dir = TempDir::new().unwrap();
        let output = rank(
            vec![row("acme/us", "P1", (2024, 1, 2)), row("acme:us", "P2", (2024, 3, 5))],
            &RollupOptions::default(),
        );

        let (written, removed) = write_company_patents(dir.path(), &output).unwrap();
        assert_eq!((written, removed), (2, 0));

        let slash = std::fs::read_to_string(dir.path().join("acme%2Fus.csv")).unwrap();
        let colon = std::fs::read_to_string(dir.path().join("acme%3Aus.csv")).unwrap();
        assert!(slash.lines().nth(1).unwrap().starts_with("P1,"));
        assert!(colon.lines().nth(1).unwrap().starts_with("P2,"));
    }

    #[test]
    fn test_export_all_writes_artifacts() {
        let dir = TempDir::new().unwrap();
        let output = rank(
            vec![row("c1", "P1", (2024, 1, 2)), row("c1", "P2", (2024, 3, 5)), row("c2", "P3", (2023, 7, 4))],
            &RollupOptions::default(),
        );

        let summary = export_all(dir.path(), &output).unwrap();
        assert_eq!(summary.companies, 2);
        assert_eq!(summary.patent_files, 2);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("companies.json")).unwrap())
                .unwrap();
        assert_eq!(json[0]["companyId"], "c1");
        assert_eq!(json[0]["patentCount"], 2);
        assert_eq!(json[0]["citationsPerPatent"], 2.0);

        let csv = std::fs::read_to_string(dir.path().join("companies.csv")).unwrap();
        assert!(csv.starts_with(
            "companyId,displayName,patentCount,totalCitations,citationsPerPatent,cpcBreadth"
        ));

        let c1 = std::fs::read_to_string(dir.path().join("patents").join("c1.csv")).unwrap();
        let lines: Vec<&str> = c1.lines().collect();
        assert_eq!(
            lines[0],
            "patent_id,patent_date,patent_title,patent_num_times_cited_by_us_patents,cpc_subclass_ids"
        );
        assert!(lines[1].starts_with("P2,2024-03-05,Antibody,2,A61K|C07K"));
        assert!(lines[2].starts_with("P1,"));
    }

    #[test]
    fn test_stale_company_files_are_removed() {
        let dir = TempDir::new().unwrap();
        let patents = dir.path().join("patents");
        std::fs::create_dir_all(&patents).unwrap();
        std::fs::write(patents.join("gone.csv"), "x\n").unwrap();
        std::fs::write(patents.join("README.txt"), "keep\n").unwrap();

        let output = rank(vec![row("c1", "P1", (2024, 1, 2))], &RollupOptions::default());
        let (written, removed) = write_company_patents(&patents, &output).unwrap();

        assert_eq!((written, removed), (1, 1));
        assert!(!patents.join("gone.csv").exists());
        assert!(patents.join("README.txt").exists());
    }
}
