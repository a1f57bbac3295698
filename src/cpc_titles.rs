//! CPC title dictionary
//!
//! Collects every classification code present in the sector stores, looks
//! up the titles from the classification endpoints and writes one
//! `<id>,<title>` table per level.

use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

use crate::patentsview::{paginate, value_at_path, ApiError, SearchApi, SortKey};
use crate::store::{write_atomic, PartitionStore, PatentAssigneeRecord, StoreError};

/// Ids per lookup request
pub const TITLE_BATCH_SIZE: usize = 200;

#[derive(Debug, Error)]
pub enum CpcTitlesError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// One classification level and where its titles live
#[derive(Debug, Clone, Copy)]
pub struct TitleLevel {
    pub endpoint: &'static str,
    pub id_field: &'static str,
    pub title_field: &'static str,
    pub file_name: &'static str,
}

pub const GROUP_LEVEL: TitleLevel = TitleLevel {
    endpoint: "cpc_group",
    id_field: "cpc_group_id",
    title_field: "cpc_group_title",
    file_name: "cpc_group.csv",
};

pub const SUBCLASS_LEVEL: TitleLevel = TitleLevel {
    endpoint: "cpc_subclass",
    id_field: "cpc_subclass_id",
    title_field: "cpc_subclass_title",
    file_name: "cpc_subclass.csv",
};

pub const CLASS_LEVEL: TitleLevel = TitleLevel {
    endpoint: "cpc_class",
    id_field: "cpc_class_id",
    title_field: "cpc_class_title",
    file_name: "cpc_class.csv",
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpcCodes {
    /// Groups plus their main groups (`A61K31/00`)
    pub groups: BTreeSet<String>,
    pub subclasses: BTreeSet<String>,
    pub classes: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleSummary {
    pub groups: usize,
    pub subclasses: usize,
    pub classes: usize,
}

/// `A61K31/4439` -> `A61K31/00`; codes without a slash are returned as is
pub fn derive_main_group(group_id: &str) -> String {
    let group_id = group_id.trim().to_uppercase();
    match group_id.split_once('/') {
        Some((main, _)) => format!("{}/00", main),
        None => group_id,
    }
}

pub fn collect_codes(stores: &[PartitionStore]) -> CpcCodes {
    let mut codes = CpcCodes::default();
    for store in stores {
        for row in store.read_all::<PatentAssigneeRecord>() {
            for group in &row.cpc_group_ids {
                let group = group.trim().to_uppercase();
                if group.is_empty() {
                    continue;
                }
                codes.groups.insert(derive_main_group(&group));
                codes.groups.insert(group);
            }
            for subclass in &row.cpc_subclass_ids {
                let subclass = subclass.trim().to_uppercase();
                if subclass.is_empty() {
                    continue;
                }
                if let Some(class) = subclass.get(..3) {
                    codes.classes.insert(class.to_string());
                }
                codes.subclasses.insert(subclass);
            }
        }
    }
    codes
}

/// Titles for `ids`, fetched in batches; ids without a title are absent
pub async fn fetch_titles(
    api: &dyn SearchApi,
    level: TitleLevel,
    ids: &[String],
) -> Result<BTreeMap<String, String>, ApiError> {
    let mut titles = BTreeMap::new();

    for batch in ids.chunks(TITLE_BATCH_SIZE) {
        let mut pager = paginate(
            api,
            level.endpoint,
            json!({ level.id_field: batch }),
            &[level.id_field, level.title_field],
            vec![SortKey::asc(level.id_field)],
            crate::config::MAX_PAGE_SIZE,
        )?;

        while let Some(page) = pager.next_page().await? {
            for record in &page.records {
                let id = text_at(record, level.id_field).to_uppercase();
                let title = text_at(record, level.title_field);
                if !id.is_empty() && !title.is_empty() {
                    titles.insert(id, title);
                }
            }
        }
    }

    tracing::info!(endpoint = level.endpoint, requested = ids.len(), found = titles.len(), "fetched CPC titles");
    Ok(titles)
}

fn text_at(record: &Value, field: &str) -> String {
    match value_at_path(record, field) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

pub fn write_titles(
    path: &Path,
    level: TitleLevel,
    titles: &BTreeMap<String, String>,
) -> Result<(), StoreError> {
    write_atomic(path, |w| {
        let mut writer = csv::Writer::from_writer(w);
        writer.write_record([level.id_field, level.title_field])?;
        for (id, title) in titles {
            writer.write_record([id.as_str(), title.as_str()])?;
        }
        writer.flush()?;
        Ok::<(), StoreError>(())
    })
}

/// Titles read back from the tables `refresh` writes, keyed by upper-case id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpcTitleTables {
    pub groups: BTreeMap<String, String>,
    pub subclasses: BTreeMap<String, String>,
    pub classes: BTreeMap<String, String>,
}

/// Load every title table under `dir`. A missing table is empty, so the
/// index can be built before titles were ever refreshed.
pub fn load_titles(dir: &Path) -> CpcTitleTables {
    CpcTitleTables {
        groups: read_titles(&dir.join(GROUP_LEVEL.file_name)),
        subclasses: read_titles(&dir.join(SUBCLASS_LEVEL.file_name)),
        classes: read_titles(&dir.join(CLASS_LEVEL.file_name)),
    }
}

fn read_titles(path: &Path) -> BTreeMap<String, String> {
    let mut reader = match csv::Reader::from_path(path) {
        Ok(reader) => reader,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "no CPC title table");
            return BTreeMap::new();
        }
    };

    let mut titles = BTreeMap::new();
    for result in reader.records() {
        match result {
            Ok(record) => {
                let id = record.get(0).unwrap_or_default().trim().to_uppercase();
                let title = record.get(1).unwrap_or_default().trim();
                if !id.is_empty() && !title.is_empty() {
                    titles.insert(id, title.to_string());
                }
            }
            Err(e) => tracing::debug!(path = %path.display(), error = %e, "skipping malformed title row"),
        }
    }
    titles
}

/// Rebuild all three title tables under `out_dir`
pub async fn refresh(
    api: &dyn SearchApi,
    stores: &[PartitionStore],
    out_dir: &Path,
) -> Result<TitleSummary, CpcTitlesError> {
    let codes = collect_codes(stores);
    tracing::info!(
        groups = codes.groups.len(),
        subclasses = codes.subclasses.len(),
        classes = codes.classes.len(),
        "collected CPC codes"
    );

    let mut summary = TitleSummary::default();
    for (level, ids, count) in [
        (GROUP_LEVEL, &codes.groups, &mut summary.groups),
        (SUBCLASS_LEVEL, &codes.subclasses, &mut summary.subclasses),
        (CLASS_LEVEL, &codes.classes, &mut summary.classes),
    ] {
        let ids: Vec<String> = ids.iter().cloned().collect();
        let titles = fetch_titles(api, level, &ids).await?;
        write_titles(&out_dir.join(level.file_name), level, &titles)?;
        *count = titles.len();
    }

    Ok(summary)
}
