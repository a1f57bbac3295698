//! Incremental sector synchronization
//!
//! One pass per sector: compute the fetch window from the checkpoint, page
//! through the search API, flatten and canonicalize into store rows, merge
//! with the existing partitions (new rows win), rewrite the affected years
//! atomically, and only then advance the checkpoint. Any API failure aborts
//! before the first write, so the next run retries the same window.

pub mod engine;
pub mod flatten;
pub mod merge;
pub mod query;
pub mod window;

pub use engine::{SyncEngine, SyncError, SyncOptions, SyncReport};
pub use flatten::FlattenedBatch;
pub use merge::{merge_rows, MergeOutcome};
pub use query::{build_cpc_query, build_patent_query, patent_sort, PATENT_FIELDS};
pub use window::{compute_window, SyncOverrides, SyncWindow};
