//! patent-harvest - incremental patent harvesting for sector watchlists
//!
//! Pulls newly granted patents for each configured sector from the
//! PatentsView search API, folds them into a year-partitioned CSV store
//! without duplicates, and rebuilds per-company rollups from that store.
//!
//! ## Data flow
//! Paginator -> Sync Engine -> partitioned store -> {Rollup Builder, Suggestion Reporter} -> artifacts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use patent_harvest::canonical::{resolve, AssigneeMap};
//!
//! let map = AssigneeMap::default();
//! let (company_id, display_name) = resolve("a-123", "Acme Inc", &map);
//! assert_eq!(company_id, "a-123");
//! assert_eq!(display_name, "Acme Inc");
//! ```

// Ambient configuration
pub mod config;

// Upstream search API: types, rate limiting, cursor pagination
pub mod patentsview;

// Manual assignee -> company overrides
pub mod canonical;

// Year-partitioned flat-file store and checkpoint state
pub mod store;

// Incremental synchronization (the core)
pub mod sync;

// Derived company rankings and exports
pub mod rollup;

// Duplicate-name diagnostics for manual curation
pub mod suggest;

// Classification title dictionary
pub mod cpc_titles;

// Whole-run orchestration across sectors
pub mod pipeline;

pub use canonical::{resolve, AssigneeMap, AssigneeMapping, CanonicalLookup};
pub use config::{ApiCredentials, HarvestConfig, SectorConfig};
pub use patentsview::{ApiError, HttpSearchClient, Paginator, SearchApi, SearchRequest};
pub use rollup::CompanyRollup;
pub use store::{Checkpoint, CheckpointStore, PartitionStore, PatentAssigneeRecord, PatentInventorRecord};
pub use sync::{SyncEngine, SyncError, SyncOptions, SyncOverrides, SyncReport};
