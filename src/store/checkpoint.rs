//! Per-sector sync checkpoints
//!
//! A single JSON document keyed by sector id. Each entry is overwritten on
//! every successful sync; losing the file only costs a full-window re-sync.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::atomic::write_atomic;
use super::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    #[serde(alias = "last_success_date")]
    pub last_window_end: NaiveDate,
    #[serde(alias = "window_start")]
    pub window_start: NaiveDate,
    #[serde(alias = "updated_at")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All readable entries; anything missing or undecodable is absent
    pub fn load_all(&self) -> BTreeMap<String, Checkpoint> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.path.display(), error = %e, "checkpoint file unreadable; starting from full window");
                }
                return BTreeMap::new();
            }
        };

        let raw: BTreeMap<String, Value> = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "checkpoint file malformed; starting from full window");
                return BTreeMap::new();
            }
        };

        raw.into_iter()
            .filter_map(|(sector, value)| match serde_json::from_value(value) {
                Ok(checkpoint) => Some((sector, checkpoint)),
                Err(e) => {
                    tracing::warn!(sector = %sector, error = %e, "ignoring malformed checkpoint entry");
                    None
                }
            })
            .collect()
    }

    pub fn get(&self, sector_id: &str) -> Option<Checkpoint> {
        self.load_all().remove(sector_id)
    }

    /// Overwrite one sector's entry, preserving the others.
    ///
    /// This is a read-modify-write of the whole document with no lock. Sectors
    /// are synced one after another within a process, and only one scheduled
    /// run touches a data root at a time; concurrent savers would lose
    /// each other's entries.
    pub fn save(&self, sector_id: &str, checkpoint: Checkpoint) -> Result<(), StoreError> {
        let mut all = self.load_all();
        all.insert(sector_id.to_string(), checkpoint);

        write_atomic(&self.path, |w| {
            serde_json::to_writer_pretty(&mut *w, &all)?;
            w.write_all(b"\n")?;
            Ok::<(), StoreError>(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn checkpoint(end: (i32, u32, u32)) -> Checkpoint {
        Checkpoint {
            last_window_end: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
            window_start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_missing_file_has_no_checkpoints() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("state").join("last_run.json"));
        assert!(store.load_all().is_empty());
        assert!(store.get("tech").is_none());
    }

    #[test]
    fn test_save_overwrites_one_sector_only() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("last_run.json"));

        store.save("biotech", checkpoint((2025, 1, 1))).unwrap();
        store.save("tech", checkpoint((2025, 2, 1))).unwrap();
        store.save("biotech", checkpoint((2025, 3, 1))).unwrap();

        let all = store.load_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all["biotech"], checkpoint((2025, 3, 1)));
        assert_eq!(all["tech"], checkpoint((2025, 2, 1)));
    }

    #[test]
    fn test_document_uses_camel_case_keys() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("last_run.json"));
        store.save("tech", checkpoint((2025, 2, 1))).unwrap();

        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["tech"]["lastWindowEnd"], "2025-02-01");
        assert_eq!(raw["tech"]["windowStart"], "2020-01-01");
        assert!(raw["tech"]["updatedAt"].is_string());
    }

    #[test]
    fn test_legacy_snake_case_entries_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("last_run.json");
        std::fs::write(
            &path,
            r#"{"biotech": {"last_success_date": "2024-06-01", "window_start": "2019-06-01", "updated_at": "2024-06-01T03:00:00Z"}}"#,
        )
        .unwrap();

        let store = CheckpointStore::new(&path);
        let cp = store.get("biotech").unwrap();
        assert_eq!(cp.last_window_end, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
    }

    #[test]
    fn test_garbage_file_is_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("last_run.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(CheckpointStore::new(&path).load_all().is_empty());
    }
}
