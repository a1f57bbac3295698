//! Per-sector sync driver

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

use super::flatten::FlattenedBatch;
use super::merge::merge_rows;
use super::query::{build_patent_query, patent_sort, PATENT_ENDPOINT, PATENT_FIELDS};
use super::window::{compute_window, SyncOverrides, SyncWindow};
use crate::canonical::CanonicalLookup;
use crate::config::{HarvestConfig, SectorConfig, SyncSettings};
use crate::patentsview::{paginate, ApiError, SearchApi};
use crate::store::{Checkpoint, CheckpointStore, PartitionStore, StoreError, StoreRow};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Everything a sync needs besides its collaborators. `today` is injected
/// so runs are reproducible.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub today: NaiveDate,
    pub settings: SyncSettings,
    pub page_size: usize,
    pub overrides: SyncOverrides,
}

impl SyncOptions {
    pub fn from_config(config: &HarvestConfig, today: NaiveDate) -> Self {
        Self {
            today,
            settings: config.sync.clone(),
            page_size: config.page_size(),
            overrides: SyncOverrides::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: SyncOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub sector_id: String,
    pub window: SyncWindow,
    /// End date recorded in the checkpoint
    pub checkpoint_end: NaiveDate,
    pub pages_fetched: usize,
    pub new_pairs: usize,
    pub new_inventors: usize,
    pub skipped_records: usize,
    pub total_pairs: usize,
    pub total_inventors: usize,
    /// Stored rows dropped for falling behind the lookback start
    pub pruned_rows: usize,
    pub years_rewritten: Vec<i32>,
    /// The page cap stopped pagination early
    pub truncated: bool,
}

pub struct SyncEngine<'a> {
    api: &'a dyn SearchApi,
    lookup: &'a dyn CanonicalLookup,
    checkpoints: &'a CheckpointStore,
    options: SyncOptions,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        api: &'a dyn SearchApi,
        lookup: &'a dyn CanonicalLookup,
        checkpoints: &'a CheckpointStore,
        options: SyncOptions,
    ) -> Self {
        Self {
            api,
            lookup,
            checkpoints,
            options,
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Run one sync pass for `sector` against its partition directory.
    ///
    /// Every page is fetched before anything is written. On error the store
    /// and the checkpoint are left exactly as they were.
    pub async fn sync_sector(
        &self,
        sector: &SectorConfig,
        store: &PartitionStore,
    ) -> Result<SyncReport, SyncError> {
        let previous = self.checkpoints.get(&sector.id);
        let window = compute_window(
            self.options.today,
            &self.options.settings,
            previous.as_ref(),
            &self.options.overrides,
        );

        tracing::info!(
            sector = %sector.id,
            start = %window.start,
            end = %window.end,
            resumed = previous.is_some(),
            "starting sync"
        );

        let (batch, pages_fetched, truncated) = if window.is_empty() {
            tracing::info!(sector = %sector.id, "empty window; nothing to fetch");
            (FlattenedBatch::new(), 0, false)
        } else {
            self.fetch(sector, &window).await?
        };

        // a capped run may have stopped partway through its last grant date,
        // so the next window must include that date again
        let checkpoint_end = if truncated {
            batch
                .last_patent_date
                .and_then(|d| d.pred_opt())
                .unwrap_or(window.start)
                .max(window.start)
                .min(window.end)
        } else {
            window.end
        };

        let new_pairs = batch.pairs.len();
        let new_inventors = batch.inventors.len();

        let oldest = window.lookback_start;
        let pairs = persist(store, batch.pairs, oldest)?;
        let inventors = persist(store, batch.inventors, oldest)?;
        let mut years_rewritten = pairs.years_rewritten;
        years_rewritten.extend(inventors.years_rewritten);
        years_rewritten.sort_unstable();
        years_rewritten.dedup();

        self.checkpoints.save(
            &sector.id,
            Checkpoint {
                last_window_end: checkpoint_end,
                window_start: window.start,
                updated_at: Utc::now(),
            },
        )?;

        let report = SyncReport {
            sector_id: sector.id.clone(),
            window,
            checkpoint_end,
            pages_fetched,
            new_pairs,
            new_inventors,
            skipped_records: batch.skipped_records,
            total_pairs: pairs.total_rows,
            total_inventors: inventors.total_rows,
            pruned_rows: pairs.pruned_rows + inventors.pruned_rows,
            years_rewritten,
            truncated,
        };

        tracing::info!(
            sector = %report.sector_id,
            pages = report.pages_fetched,
            new_pairs = report.new_pairs,
            new_inventors = report.new_inventors,
            skipped = report.skipped_records,
            total_pairs = report.total_pairs,
            checkpoint_end = %report.checkpoint_end,
            truncated = report.truncated,
            "sync complete"
        );

        Ok(report)
    }

    async fn fetch(
        &self,
        sector: &SectorConfig,
        window: &SyncWindow,
    ) -> Result<(FlattenedBatch, usize, bool), ApiError> {
        let mut pager = paginate(
            self.api,
            PATENT_ENDPOINT,
            build_patent_query(sector, window),
            PATENT_FIELDS,
            patent_sort(),
            self.options.page_size,
        )?;

        let mut batch = FlattenedBatch::new();
        let mut truncated = false;

        while let Some(page) = pager.next_page().await? {
            for record in &page.records {
                batch.absorb(&sector.id, record, self.lookup);
            }

            if let Some(cap) = self.options.overrides.max_pages {
                if pager.pages_fetched() >= cap && !pager.is_finished() {
                    tracing::warn!(
                        sector = %sector.id,
                        max_pages = cap,
                        "page cap reached; checkpoint stops short of the last fetched grant date"
                    );
                    truncated = true;
                    break;
                }
            }
        }

        Ok((batch, pager.pages_fetched(), truncated))
    }
}

struct PersistOutcome {
    total_rows: usize,
    pruned_rows: usize,
    years_rewritten: Vec<i32>,
}

/// Merge `incoming` with every stored partition of its kind, drop rows
/// granted before `oldest`, and rewrite the dirty years.
fn persist<R: StoreRow>(
    store: &PartitionStore,
    incoming: Vec<R>,
    oldest: NaiveDate,
) -> Result<PersistOutcome, StoreError> {
    let existing = store.read_all::<R>();
    let mut outcome = merge_rows(existing, incoming);
    let pruned_rows = outcome.prune_before(oldest);
    if pruned_rows > 0 {
        tracing::info!(
            kind = R::KIND.prefix(),
            pruned = pruned_rows,
            oldest = %oldest,
            "pruned rows older than the lookback window"
        );
    }

    for &year in &outcome.dirty_years {
        store.write_partition(year, outcome.partition(year))?;
        tracing::debug!(
            partition = %store.partition_path(R::KIND, year).display(),
            rows = outcome.partition(year).len(),
            "rewrote partition"
        );
    }

    Ok(PersistOutcome {
        total_rows: outcome.total_rows,
        pruned_rows,
        years_rewritten: outcome.dirty_years.into_iter().collect(),
    })
}
