//! Rollup, export, index and suggestion integration tests
//!
//! Each test harvests a small corpus through the pipeline helpers into a
//! temp data root, then checks the derived artifacts.

mod helpers;

use helpers::{date, patent, CorpusApi};
use patent_harvest::config::{HarvestConfig, SectorConfig};
use patent_harvest::pipeline;
use patent_harvest::rollup::{
    self, query_insights, query_patents, query_years, CpcLevel, InsightsQuery, PatentQuery, PatentSort,
    RollupOptions,
};
use patent_harvest::store::PartitionStore;
use patent_harvest::sync::SyncOverrides;
use pretty_assertions::assert_eq;
use serde_json::Value;
use tempfile::TempDir;

fn biotech_config(dir: &TempDir) -> HarvestConfig {
    let mut config = HarvestConfig::default();
    config.paths.data_root = dir.path().to_path_buf();
    config.sectors = vec![SectorConfig::biotech()];
    config
}

async fn harvest(config: &HarvestConfig, patents: Vec<Value>) {
    let api = CorpusApi::new(patents);
    let map = pipeline::load_mapping(config).unwrap();
    let (reports, failures) = pipeline::sync_sectors(
        &api,
        &map,
        config,
        &config.sectors,
        date("2025-01-20"),
        &SyncOverrides::default(),
    )
    .await;
    assert!(failures.is_empty(), "{:?}", failures);
    assert_eq!(reports.len(), config.sectors.len());
}

fn build(config: &HarvestConfig) -> rollup::RollupOutput {
    let store = PartitionStore::new(config.store_dir("biotech"));
    rollup::build(&store, &RollupOptions::from_settings(&config.rollup))
}

#[tokio::test]
async fn test_unmapped_variants_stay_separate_and_are_suggested() {
    let dir = TempDir::new().unwrap();
    let config = biotech_config(&dir);
    harvest(
        &config,
        vec![patent(
            "P1",
            "2024-06-04",
            3,
            &["C12N"],
            &[
                ("A1", "Acme Inc", "2"),
                ("A2", "Acme Incorporated", "2"),
                ("A3", "Globex", "3"),
            ],
        )],
    )
    .await;

    let output = build(&config);
    let ids: Vec<&str> = output.companies.iter().map(|c| c.company_id.as_str()).collect();
    assert_eq!(ids, vec!["A1", "A2", "A3"]);
    assert!(output.companies.iter().all(|c| c.patent_count == 1));
    assert_eq!(output.companies[0].display_name, "Acme Inc");

    let groups = pipeline::write_suggestions(&config, "biotech").unwrap();
    assert_eq!(groups, Some(1));

    let report = std::fs::read_to_string(config.suggestions_path("biotech")).unwrap();
    assert!(report.starts_with("# Normalization Suggestions\n"));
    assert!(report.contains("## acme (rows: 2)\n"));
    assert!(report.contains("- assignee_ids: A1, A2\n"));
    assert!(report.contains("- org_names: Acme Inc, Acme Incorporated\n"));
    assert!(!report.contains("globex"));
}

#[tokio::test]
async fn test_mapping_merges_variants_into_one_company() {
    let dir = TempDir::new().unwrap();
    let config = biotech_config(&dir);
    std::fs::create_dir_all(config.mapping_path().parent().unwrap()).unwrap();
    std::fs::write(
        config.mapping_path(),
        r#"
assignees:
  A1: {display_name: "Acme", canonical_company_id: "acme/holdings"}
  A2: {display_name: "Acme", canonical_company_id: "acme/holdings"}
"#,
    )
    .unwrap();

    harvest(
        &config,
        vec![
            patent("P1", "2024-06-04", 3, &["C12N"], &[("A1", "Acme Inc", "2"), ("A2", "Acme Incorporated", "2")]),
            patent("P2", "2024-07-09", 4, &["A61K"], &[("A2", "Acme Incorporated", "2")]),
        ],
    )
    .await;

    let output = build(&config);
    assert_eq!(output.companies.len(), 1);
    let acme = &output.companies[0];
    assert_eq!(acme.company_id, "acme/holdings");
    assert_eq!(acme.display_name, "Acme");
    // P1 counted once despite two raw assignees
    assert_eq!(acme.patent_count, 2);
    assert_eq!(acme.total_citations, 7);
    assert_eq!(acme.citations_per_patent, 3.5);
    assert_eq!(acme.cpc_breadth, 2);

    let artifacts = pipeline::build_artifacts(&config, "biotech").unwrap();
    assert_eq!(artifacts.patent_files, 1);
    let patents_csv = config
        .public_dir("biotech")
        .join("patents")
        .join("acme%2Fholdings.csv");
    let content = std::fs::read_to_string(patents_csv).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("P2,2024-07-09,"));
}

#[tokio::test]
async fn test_ranking_breaks_ties_deterministically() {
    let dir = TempDir::new().unwrap();
    let config = biotech_config(&dir);
    harvest(
        &config,
        vec![
            patent("P1", "2024-01-02", 1, &["C12N"], &[("X", "Xeno", "2")]),
            patent("P2", "2024-01-09", 1, &["C12N"], &[("X", "Xeno", "2")]),
            patent("P3", "2024-01-16", 5, &["C12N"], &[("Y", "Ypsilon", "2")]),
            patent("P4", "2024-01-23", 0, &["C12N"], &[("Y", "Ypsilon", "2")]),
            patent("P5", "2024-01-30", 100, &["C12N"], &[("Z", "Zed", "2")]),
            patent("P6", "2024-02-06", 1, &["C12N"], &[("W", "Wye", "3")]),
            patent("P7", "2024-02-13", 1, &["C12N"], &[("W", "Wye", "3")]),
        ],
    )
    .await;

    let first = build(&config);
    let ids: Vec<&str> = first.companies.iter().map(|c| c.company_id.as_str()).collect();
    assert_eq!(ids, vec!["Y", "W", "X", "Z"]);

    let second = build(&config);
    assert_eq!(first.companies, second.companies);

    let mut limited = RollupOptions::from_settings(&config.rollup);
    limited.top_n = 2;
    let store = PartitionStore::new(config.store_dir("biotech"));
    let top = rollup::build(&store, &limited);
    assert_eq!(top.companies.len(), 2);
    assert_eq!(top.companies[1].company_id, "W");
}

#[tokio::test]
async fn test_individual_assignees_are_ranked_only_as_fallback() {
    let dir = TempDir::new().unwrap();
    let config = biotech_config(&dir);
    harvest(
        &config,
        vec![
            patent("P1", "2024-03-05", 0, &["C12N"], &[("I1", "Jane Doe", "4")]),
            patent("P2", "2024-03-12", 0, &["C12N"], &[("I1", "Jane Doe", "4")]),
        ],
    )
    .await;

    let output = build(&config);
    assert!(!output.corporate_filter_applied);
    assert_eq!(output.companies.len(), 1);
    assert_eq!(output.companies[0].patent_count, 2);

    // once a corporate assignee appears, individuals drop out
    let dir = TempDir::new().unwrap();
    let config = biotech_config(&dir);
    harvest(
        &config,
        vec![
            patent("P1", "2024-03-05", 0, &["C12N"], &[("I1", "Jane Doe", "4")]),
            patent("P2", "2024-03-12", 0, &["C12N"], &[("C1", "Cyberdyne", "2")]),
        ],
    )
    .await;

    let output = build(&config);
    assert!(output.corporate_filter_applied);
    let ids: Vec<&str> = output.companies.iter().map(|c| c.company_id.as_str()).collect();
    assert_eq!(ids, vec!["C1"]);
}

#[tokio::test]
async fn test_artifacts_replace_stale_company_files() {
    let dir = TempDir::new().unwrap();
    let config = biotech_config(&dir);
    harvest(
        &config,
        vec![
            patent("P1", "2024-03-05", 2, &["C12N"], &[("A1", "Acme Inc", "2")]),
            patent("P2", "2024-03-12", 0, &["G01N"], &[("A2", "Globex", "3")]),
        ],
    )
    .await;

    let patents_dir = config.public_dir("biotech").join("patents");
    std::fs::create_dir_all(&patents_dir).unwrap();
    std::fs::write(patents_dir.join("GONE.csv"), "stale").unwrap();

    let report = pipeline::build_artifacts(&config, "biotech").unwrap();
    assert_eq!(report.companies, 2);
    assert_eq!(report.patent_files, 2);
    assert_eq!(report.index_rows, 2);
    assert!(report.corporate_filter_applied);
    assert!(!patents_dir.join("GONE.csv").exists());
    assert!(patents_dir.join("A1.csv").exists());

    let json: Value = serde_json::from_str(
        &std::fs::read_to_string(config.public_dir("biotech").join("companies.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(json[0]["companyId"], "A1");
    assert_eq!(json[0]["patentCount"], 1);
    assert_eq!(json[0]["totalCitations"], 2);

    let csv = std::fs::read_to_string(config.public_dir("biotech").join("companies.csv")).unwrap();
    assert!(csv.starts_with("companyId,displayName,patentCount,totalCitations,citationsPerPatent,cpcBreadth\n"));
}

#[tokio::test]
async fn test_index_pages_and_filters_company_patents() {
    let dir = TempDir::new().unwrap();
    let config = biotech_config(&dir);

    let mut patents = Vec::new();
    for i in 1..=12u64 {
        let (year, day) = if i <= 5 { (2023, i) } else { (2024, i) };
        let granted = format!("{}-05-{:02}", year, day);
        patents.push(patent(&format!("P{}", i), &granted, i * 3 % 7, &["C12N"], &[("A1", "Acme Inc", "2")]));
    }
    harvest(&config, patents).await;
    pipeline::build_artifacts(&config, "biotech").unwrap();

    let index = config.index_path("biotech");
    assert_eq!(query_years(&index, "A1").unwrap(), vec![2024, 2023]);

    let first = query_patents(&index, &PatentQuery::new("A1")).unwrap();
    assert_eq!(first.total, 12);
    assert_eq!(first.rows.len(), 12);
    assert_eq!(first.rows[0].patent_id, "P12");

    let paged = query_patents(
        &index,
        &PatentQuery {
            page_size: 10,
            page: 1,
            ..PatentQuery::new("A1")
        },
    )
    .unwrap();
    assert_eq!(paged.rows.len(), 2);

    let year = query_patents(
        &index,
        &PatentQuery {
            year: Some(2023),
            ..PatentQuery::new("A1")
        },
    )
    .unwrap();
    assert_eq!(year.total, 5);
    assert!(year.rows.iter().all(|r| r.patent_date.starts_with("2023-")));

    let cited = query_patents(
        &index,
        &PatentQuery {
            sort: PatentSort::Cited,
            ..PatentQuery::new("A1")
        },
    )
    .unwrap();
    let citations: Vec<i64> = cited.rows.iter().map(|r| r.cited_by).collect();
    let mut sorted = citations.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(citations, sorted);

    let titled = query_patents(
        &index,
        &PatentQuery {
            title_like: Some("Patent P1".to_string()),
            ..PatentQuery::new("A1")
        },
    )
    .unwrap();
    assert_eq!(titled.total, 4);

    assert!(query_patents(&index, &PatentQuery::new("nobody"))
        .unwrap()
        .rows
        .is_empty());
}

#[tokio::test]
async fn test_empty_store_writes_no_suggestions() {
    let dir = TempDir::new().unwrap();
    let config = biotech_config(&dir);

    assert_eq!(pipeline::write_suggestions(&config, "biotech").unwrap(), None);
    assert!(!config.suggestions_path("biotech").exists());
}

#[tokio::test]
async fn test_insights_from_built_index() {
    let dir = TempDir::new().unwrap();
    let config = biotech_config(&dir);
    harvest(
        &config,
        vec![
            patent("P1", "2024-06-04", 3, &["C12N"], &[("A1", "Acme Inc", "2"), ("A2", "Globex", "2")]),
            patent("P2", "2024-07-09", 1, &["C12N", "A61K"], &[("A1", "Acme Inc", "2")]),
            patent("P3", "2024-08-13", 0, &["C12N"], &[("A2", "Globex", "2")]),
            patent("P4", "2023-09-05", 2, &["A61K"], &[("A1", "Acme Inc", "2")]),
        ],
    )
    .await;

    std::fs::create_dir_all(config.cpc_titles_dir()).unwrap();
    std::fs::write(
        config.cpc_titles_dir().join("cpc_group.csv"),
        "cpc_group_id,cpc_group_title\nC12N1/00,Microorganisms\n",
    )
    .unwrap();
    std::fs::write(
        config.cpc_titles_dir().join("cpc_subclass.csv"),
        "cpc_subclass_id,cpc_subclass_title\nA61K,Preparations for medical purposes\n",
    )
    .unwrap();
    pipeline::build_artifacts(&config, "biotech").unwrap();

    let index = config.index_path("biotech");
    let insights = query_insights(&index, &InsightsQuery::new("A1", date("2025-01-20"))).unwrap();

    let top: Vec<(&str, i64, &str)> = insights
        .top_cpc
        .iter()
        .map(|c| (c.code.as_str(), c.n, c.title.as_str()))
        .collect();
    assert_eq!(top, vec![("C12N1/00", 2, "Microorganisms"), ("A61K1/00", 1, "")]);

    let trend: Vec<(&str, i64, Option<f64>)> = insights
        .cpc_trend
        .iter()
        .map(|t| (t.code.as_str(), t.delta, t.pct))
        .collect();
    assert_eq!(trend, vec![("C12N1/00", 2, None), ("A61K1/00", 0, Some(0.0))]);

    let competitors: Vec<(&str, i64)> = insights
        .competitors
        .iter()
        .map(|c| (c.company_id.as_str(), c.score))
        .collect();
    assert_eq!(competitors, vec![("A2", 2)]);

    assert_eq!(insights.co_assignees.len(), 1);
    assert_eq!(insights.co_assignees[0].company_id, "A2");
    assert_eq!(insights.co_assignees[0].n, 1);

    assert_eq!(insights.top_inventors.len(), 1);
    assert_eq!(insights.top_inventors[0].name, "Grace Hopper");
    assert_eq!(insights.top_inventors[0].n, 2);

    let subclass = query_insights(
        &index,
        &InsightsQuery {
            level: CpcLevel::Subclass,
            days: 730,
            ..InsightsQuery::new("A1", date("2025-01-20"))
        },
    )
    .unwrap();
    assert_eq!(subclass.top_cpc[0].code, "A61K");
    assert_eq!(subclass.top_cpc[0].n, 2);
    assert_eq!(subclass.top_cpc[0].title, "Preparations for medical purposes");
}
