//! Whole-run orchestration
//!
//! `run_all` is the scheduled job: sync every sector, write its suggestion
//! report, then rebuild the public artifacts. A sector that fails at any
//! stage is recorded and skipped; the others still run.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;

use crate::canonical::{AssigneeMap, CanonicalLookup};
use crate::config::{HarvestConfig, SectorConfig};
use crate::cpc_titles;
use crate::patentsview::SearchApi;
use crate::rollup::{self, RollupOptions};
use crate::store::{CheckpointStore, PartitionStore, PatentInventorRecord};
use crate::suggest;
use crate::sync::{SyncEngine, SyncOptions, SyncOverrides, SyncReport};

#[derive(Debug, Clone, Serialize)]
pub struct SectorFailure {
    pub sector_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ArtifactReport {
    pub sector_id: String,
    pub companies: usize,
    pub patent_files: usize,
    pub index_rows: usize,
    pub corporate_filter_applied: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub syncs: Vec<SyncReport>,
    pub suggestions: Vec<(String, usize)>,
    pub artifacts: Vec<ArtifactReport>,
    pub failures: Vec<SectorFailure>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn record_failure(&mut self, sector_id: &str, stage: &str, error: anyhow::Error) {
        tracing::error!(sector = %sector_id, error = %format!("{:#}", error), "{}", stage);
        self.failures.push(SectorFailure {
            sector_id: sector_id.to_string(),
            error: format!("{}: {:#}", stage, error),
        });
    }
}

/// Sync each sector in order. Failures are collected, never propagated.
pub async fn sync_sectors(
    api: &dyn SearchApi,
    lookup: &dyn CanonicalLookup,
    config: &HarvestConfig,
    sectors: &[SectorConfig],
    today: NaiveDate,
    overrides: &SyncOverrides,
) -> (Vec<SyncReport>, Vec<SectorFailure>) {
    let checkpoints = CheckpointStore::new(config.checkpoint_path());
    let options = SyncOptions::from_config(config, today).with_overrides(overrides.clone());
    let engine = SyncEngine::new(api, lookup, &checkpoints, options);

    let mut reports = Vec::new();
    let mut failures = Vec::new();
    for sector in sectors {
        let store = PartitionStore::new(config.store_dir(&sector.id));
        match engine.sync_sector(sector, &store).await {
            Ok(report) => reports.push(report),
            Err(e) => {
                tracing::error!(sector = %sector.id, error = %e, "sync failed; checkpoint not advanced");
                failures.push(SectorFailure {
                    sector_id: sector.id.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    (reports, failures)
}

/// Write the normalization suggestions for one sector
pub fn write_suggestions(config: &HarvestConfig, sector_id: &str) -> Result<Option<usize>> {
    let store = PartitionStore::new(config.store_dir(sector_id));
    let path = config.suggestions_path(sector_id);
    suggest::write_report(&store, &path, config.rollup.suggestion_limit)
        .with_context(|| format!("Failed to write suggestions to {}", path.display()))
}

/// Rebuild the rollup and every artifact derived from it for one sector
pub fn build_artifacts(config: &HarvestConfig, sector_id: &str) -> Result<ArtifactReport> {
    let store = PartitionStore::new(config.store_dir(sector_id));
    let output = rollup::build(&store, &RollupOptions::from_settings(&config.rollup));

    let public_dir = config.public_dir(sector_id);
    let exported = rollup::export_all(&public_dir, &output)
        .with_context(|| format!("Failed to export artifacts to {}", public_dir.display()))?;

    let inventors: Vec<PatentInventorRecord> = store.read_all();
    let titles = cpc_titles::load_titles(&config.cpc_titles_dir());
    let index_path = config.index_path(sector_id);
    let index_rows = rollup::build_index(&index_path, &output, &inventors, &titles)
        .with_context(|| format!("Failed to build index {}", index_path.display()))?;

    Ok(ArtifactReport {
        sector_id: sector_id.to_string(),
        companies: exported.companies,
        patent_files: exported.patent_files,
        index_rows,
        corporate_filter_applied: output.corporate_filter_applied,
    })
}

/// Load the curated assignee table for this run
pub fn load_mapping(config: &HarvestConfig) -> Result<AssigneeMap> {
    let path = config.mapping_path();
    let map = AssigneeMap::load(&path).context("Failed to load assignee map")?;
    tracing::info!(path = %path.display(), entries = map.len(), "loaded assignee map");
    Ok(map)
}

/// Sync, report and rebuild every configured sector
pub async fn run_all(
    api: &dyn SearchApi,
    config: &HarvestConfig,
    today: NaiveDate,
) -> Result<RunSummary> {
    let map = load_mapping(config)?;

    let (syncs, failures) = sync_sectors(
        api,
        &map,
        config,
        &config.sectors,
        today,
        &SyncOverrides::default(),
    )
    .await;

    let mut summary = RunSummary {
        syncs,
        failures,
        ..RunSummary::default()
    };

    let succeeded: Vec<String> = summary.syncs.iter().map(|r| r.sector_id.clone()).collect();

    for sector_id in &succeeded {
        match write_suggestions(config, sector_id) {
            Ok(Some(groups)) => summary.suggestions.push((sector_id.clone(), groups)),
            Ok(None) => {}
            Err(e) => summary.record_failure(sector_id, "suggestions failed", e),
        }
    }

    for sector_id in &succeeded {
        match build_artifacts(config, sector_id) {
            Ok(report) => summary.artifacts.push(report),
            Err(e) => summary.record_failure(sector_id, "artifact build failed", e),
        }
    }

    tracing::info!(
        synced = summary.syncs.len(),
        failed = summary.failures.len(),
        "update-all finished"
    );
    Ok(summary)
}
