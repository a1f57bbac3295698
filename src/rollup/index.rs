//! Queryable SQLite index of ranked companies and their patents
//!
//! Built from scratch at a temp path and renamed into place, so readers see
//! either the previous index or the new one. The read helpers back the
//! `query` subcommand and follow the web front end's paging rules. The
//! inventor and CPC title tables feed [`super::insights`].

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use super::builder::RollupOutput;
use crate::cpc_titles::CpcTitleTables;
use crate::store::PatentInventorRecord;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to move index into place: {0}")]
    Persist(#[from] tempfile::PathPersistError),

    #[error("Index not found: {0}")]
    Missing(PathBuf),
}

const SCHEMA: &str = r#"
CREATE TABLE companies (
    rank INTEGER NOT NULL,
    company_id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    patent_count INTEGER NOT NULL,
    total_citations INTEGER NOT NULL,
    citations_per_patent REAL NOT NULL,
    cpc_breadth INTEGER NOT NULL
);
CREATE TABLE patents (
    company_id TEXT NOT NULL,
    patent_id TEXT NOT NULL,
    patent_date TEXT NOT NULL,
    patent_year INTEGER NOT NULL,
    patent_title TEXT NOT NULL,
    cited_by INTEGER NOT NULL,
    cpc_subclass_ids TEXT NOT NULL,
    cpc_group_ids TEXT NOT NULL,
    PRIMARY KEY (company_id, patent_id)
);
CREATE INDEX idx_patents_company_year ON patents(company_id, patent_year);
CREATE INDEX idx_patents_company_cited ON patents(company_id, cited_by);
CREATE INDEX idx_patents_patent ON patents(patent_id);
CREATE TABLE patent_inventors (
    company_id TEXT NOT NULL,
    patent_id TEXT NOT NULL,
    patent_date TEXT NOT NULL,
    inventor_id TEXT NOT NULL,
    inventor_name TEXT NOT NULL,
    PRIMARY KEY (company_id, patent_id, inventor_id)
);
CREATE INDEX idx_patent_inventors_company ON patent_inventors(company_id, patent_date);
CREATE TABLE cpc_titles (
    level TEXT NOT NULL,
    code TEXT NOT NULL,
    title TEXT NOT NULL,
    PRIMARY KEY (level, code)
);
"#;

/// Replace the index at `path` with the ranked companies, their patents,
/// the inventors on those patents and the CPC titles. Returns the number of
/// patent rows written.
pub fn build_index(
    path: &Path,
    output: &RollupOutput,
    inventors: &[PatentInventorRecord],
    titles: &CpcTitleTables,
) -> Result<usize, IndexError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let tmp = tempfile::Builder::new()
        .prefix(".index-")
        .suffix(".sqlite")
        .tempfile_in(dir)?
        .into_temp_path();

    let mut patent_rows = 0usize;
    let mut inventor_rows = 0usize;
    {
        let mut conn = Connection::open(&tmp)?;
        conn.execute_batch(SCHEMA)?;

        let tx = conn.transaction()?;
        {
            let mut insert_company = tx.prepare(
                "INSERT INTO companies (rank, company_id, display_name, patent_count, total_citations, citations_per_patent, cpc_breadth)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            let mut insert_patent = tx.prepare(
                "INSERT INTO patents (company_id, patent_id, patent_date, patent_year, patent_title, cited_by, cpc_subclass_ids, cpc_group_ids)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            let mut insert_inventor = tx.prepare(
                "INSERT OR IGNORE INTO patent_inventors (company_id, patent_id, patent_date, inventor_id, inventor_name)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let mut insert_title =
                tx.prepare("INSERT OR REPLACE INTO cpc_titles (level, code, title) VALUES (?1, ?2, ?3)")?;

            let mut indexed: HashSet<(&str, &str)> = HashSet::new();

            for (idx, company) in output.companies.iter().enumerate() {
                insert_company.execute(params![
                    (idx + 1) as i64,
                    company.company_id,
                    company.display_name,
                    company.patent_count as i64,
                    company.total_citations as i64,
                    company.citations_per_patent,
                    company.cpc_breadth as i64,
                ])?;

                for p in output.patents_for(&company.company_id) {
                    insert_patent.execute(params![
                        company.company_id,
                        p.patent_id,
                        p.patent_date.format("%Y-%m-%d").to_string(),
                        chrono::Datelike::year(&p.patent_date),
                        p.patent_title,
                        p.citations() as i64,
                        join_codes(&p.cpc_subclass_ids),
                        join_codes(&p.cpc_group_ids),
                    ])?;
                    indexed.insert((company.company_id.as_str(), p.patent_id.as_str()));
                    patent_rows += 1;
                }
            }

            // inventors only for patents that made it into the ranking
            for inventor in inventors {
                let key = (inventor.canonical_company_id.as_str(), inventor.patent_id.as_str());
                if !indexed.contains(&key) {
                    continue;
                }
                inventor_rows += insert_inventor.execute(params![
                    inventor.canonical_company_id,
                    inventor.patent_id,
                    inventor.patent_date.format("%Y-%m-%d").to_string(),
                    inventor.inventor_id,
                    inventor_name(inventor),
                ])?;
            }

            for (level, table) in [
                ("group", &titles.groups),
                ("subclass", &titles.subclasses),
                ("class", &titles.classes),
            ] {
                for (code, title) in table {
                    insert_title.execute(params![level, code, title])?;
                }
            }
        }
        tx.commit()?;
    }

    tmp.persist(path)?;
    tracing::info!(
        path = %path.display(),
        companies = output.companies.len(),
        patents = patent_rows,
        inventors = inventor_rows,
        "index built"
    );
    Ok(patent_rows)
}

fn join_codes<'a>(codes: impl IntoIterator<Item = &'a String>) -> String {
    codes.into_iter().map(String::as_str).collect::<Vec<_>>().join("|")
}

fn inventor_name(inventor: &PatentInventorRecord) -> String {
    let full = inventor.inventor_full_name.trim();
    if !full.is_empty() {
        return full.to_string();
    }
    format!("{} {}", inventor.inventor_name_first.trim(), inventor.inventor_name_last.trim())
        .trim()
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatentSort {
    #[default]
    Recent,
    Cited,
}

impl FromStr for PatentSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recent" => Ok(Self::Recent),
            "cited" => Ok(Self::Cited),
            other => Err(format!("unknown sort '{}' (expected recent or cited)", other)),
        }
    }
}

impl PatentSort {
    fn order_by(self) -> &'static str {
        match self {
            Self::Recent => "ORDER BY patent_date DESC, patent_id DESC",
            Self::Cited => "ORDER BY cited_by DESC, patent_date DESC, patent_id DESC",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PatentQuery {
    pub company_id: String,
    pub year: Option<i32>,
    /// Substring match on the title
    pub title_like: Option<String>,
    pub sort: PatentSort,
    pub page: usize,
    pub page_size: usize,
    /// Row ceiling in all-years mode
    pub cap: usize,
}

impl PatentQuery {
    pub fn new(company_id: impl Into<String>) -> Self {
        Self {
            company_id: company_id.into(),
            year: None,
            title_like: None,
            sort: PatentSort::Recent,
            page: 0,
            page_size: 100,
            cap: 500,
        }
    }

    fn safe_page_size(&self) -> usize {
        self.page_size.clamp(10, 200)
    }

    fn safe_cap(&self) -> usize {
        self.cap.clamp(50, 500)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedPatent {
    pub patent_id: String,
    pub patent_date: String,
    pub patent_title: String,
    pub cited_by: i64,
    pub cpc_subclass_ids: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatentPage {
    /// Matching rows, capped in all-years mode so paging stays honest
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub sort: PatentSort,
    pub year: Option<i32>,
    pub rows: Vec<IndexedPatent>,
}

pub(crate) fn open_read_only(path: &Path) -> Result<Connection, IndexError> {
    if !path.exists() {
        return Err(IndexError::Missing(path.to_path_buf()));
    }
    Ok(Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?)
}

/// One page of a company's patents
pub fn query_patents(path: &Path, query: &PatentQuery) -> Result<PatentPage, IndexError> {
    let conn = open_read_only(path)?;
    let page_size = query.safe_page_size();

    let mut conditions = vec!["company_id = ?"];
    let mut binds: Vec<SqlValue> = vec![SqlValue::Text(query.company_id.clone())];
    if let Some(year) = query.year {
        conditions.push("patent_year = ?");
        binds.push(SqlValue::Integer(i64::from(year)));
    }
    if let Some(q) = query.title_like.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        conditions.push("patent_title LIKE ?");
        binds.push(SqlValue::Text(format!("%{}%", q)));
    }
    let where_sql = format!("WHERE {}", conditions.join(" AND "));

    let cap = query.year.is_none().then(|| query.safe_cap());
    let base_sql = format!(
        "SELECT patent_id, patent_date, patent_title, cited_by, cpc_subclass_ids FROM patents {} {}{}",
        where_sql,
        query.sort.order_by(),
        cap.map(|c| format!(" LIMIT {}", c)).unwrap_or_default(),
    );
    let paged_sql = format!("SELECT * FROM ({}) LIMIT ? OFFSET ?", base_sql);

    let mut paged_binds = binds.clone();
    paged_binds.push(SqlValue::Integer(page_size as i64));
    paged_binds.push(SqlValue::Integer((query.page * page_size) as i64));

    let mut stmt = conn.prepare(&paged_sql)?;
    let rows = stmt
        .query_map(params_from_iter(paged_binds.iter()), |row| {
            Ok(IndexedPatent {
                patent_id: row.get(0)?,
                patent_date: row.get(1)?,
                patent_title: row.get(2)?,
                cited_by: row.get(3)?,
                cpc_subclass_ids: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let raw_total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM patents {}", where_sql),
        params_from_iter(binds.iter()),
        |row| row.get(0),
    )?;
    let raw_total = usize::try_from(raw_total).unwrap_or(0);
    let total = cap.map(|c| raw_total.min(c)).unwrap_or(raw_total);

    Ok(PatentPage {
        total,
        page: query.page,
        page_size,
        sort: query.sort,
        year: query.year,
        rows,
    })
}

/// Grant years with at least one patent for the company, newest first
pub fn query_years(path: &Path, company_id: &str) -> Result<Vec<i32>, IndexError> {
    let conn = open_read_only(path)?;
    let mut stmt = conn.prepare(
        "SELECT DISTINCT patent_year FROM patents WHERE company_id = ?1 ORDER BY patent_year DESC",
    )?;
    let years = stmt
        .query_map(params![company_id], |row| row.get::<_, i32>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(years)
}
