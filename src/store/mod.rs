//! Sector store
//!
//! One directory per sector holding year-sliced CSV partitions
//! (`pairs_<year>.csv`, `inventors_<year>.csv`), plus the shared checkpoint
//! document. Every file is replaced atomically (temp file + rename) so a
//! concurrent reader never observes a truncated partition.

pub mod atomic;
pub mod checkpoint;
pub mod partition;
pub mod records;

pub use atomic::write_atomic;
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use partition::{PartitionKind, PartitionStore};
pub use records::{InventorKey, PairKey, PatentAssigneeRecord, PatentInventorRecord, StoreRow};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
