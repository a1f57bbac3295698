//! Year-partitioned CSV files for one sector

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::atomic::write_atomic;
use super::records::StoreRow;
use super::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionKind {
    Pairs,
    Inventors,
}

impl PartitionKind {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Pairs => "pairs",
            Self::Inventors => "inventors",
        }
    }

    pub fn file_name(self, year: i32) -> String {
        format!("{}_{}.csv", self.prefix(), year)
    }

    /// `pairs_2024.csv` -> `Some(2024)`
    pub fn parse_year(self, file_name: &str) -> Option<i32> {
        file_name
            .strip_prefix(self.prefix())?
            .strip_prefix('_')?
            .strip_suffix(".csv")?
            .parse()
            .ok()
    }
}

/// A sector's partition directory
#[derive(Debug, Clone)]
pub struct PartitionStore {
    dir: PathBuf,
}

impl PartitionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn partition_path(&self, kind: PartitionKind, year: i32) -> PathBuf {
        self.dir.join(kind.file_name(year))
    }

    /// Years that currently have a partition file, ascending
    pub fn years(&self, kind: PartitionKind) -> Vec<i32> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let years: BTreeSet<i32> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| kind.parse_year(&entry.file_name().to_string_lossy()))
            .collect();
        years.into_iter().collect()
    }

    /// Read one partition. Missing or unreadable files are empty; rows that
    /// fail to decode are skipped.
    pub fn read_partition<R: StoreRow>(&self, year: i32) -> Vec<R> {
        let path = self.partition_path(R::KIND, year);
        let mut reader = match csv::Reader::from_path(&path) {
            Ok(reader) => reader,
            Err(e) => {
                if !is_not_found(&e) {
                    tracing::warn!(path = %path.display(), error = %e, "partition unreadable; treating as empty");
                }
                return Vec::new();
            }
        };

        let mut rows = Vec::new();
        let mut skipped = 0usize;
        for (idx, result) in reader.deserialize::<R>().enumerate() {
            match result {
                Ok(row) => rows.push(row),
                Err(e) => {
                    skipped += 1;
                    tracing::debug!(path = %path.display(), row = idx + 1, error = %e, "skipping malformed row");
                }
            }
        }
        if skipped > 0 {
            tracing::warn!(path = %path.display(), skipped, "skipped malformed partition rows");
        }
        rows
    }

    /// Every row of `R` across all years, oldest partition first
    pub fn read_all<R: StoreRow>(&self) -> Vec<R> {
        self.years(R::KIND)
            .into_iter()
            .flat_map(|year| self.read_partition::<R>(year))
            .collect()
    }

    /// Replace a partition in full. An empty slice leaves a header-only file.
    pub fn write_partition<R: StoreRow>(&self, year: i32, rows: &[R]) -> Result<(), StoreError> {
        let path = self.partition_path(R::KIND, year);
        write_atomic(&path, |w| {
            let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(w);
            writer.write_record(R::COLUMNS)?;
            for row in rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
            Ok::<(), StoreError>(())
        })
    }
}

fn is_not_found(e: &csv::Error) -> bool {
    matches!(e.kind(), csv::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::NotFound)
}
