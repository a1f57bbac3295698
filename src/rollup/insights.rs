//! Company insights read from the index
//!
//! Everything is measured over a trailing window of grant dates ending at
//! `as_of`: the company's CPC topic mix, how that mix moved against the
//! window before it, which ranked companies patent in the same groups,
//! who co-owns its patents and its most frequent inventors.

use chrono::{Duration, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::str::FromStr;

use super::index::{open_read_only, IndexError};
use crate::cpc_titles::derive_main_group;

pub const DEFAULT_DAYS: u32 = 365;
const MIN_DAYS: u32 = 30;
const MAX_DAYS: u32 = 3650;

const TOP_CPC_LIMIT: usize = 20;
const TREND_LIMIT: usize = 20;
/// Groups of the company that competitors are scored against
const COMPETITOR_GROUPS: usize = 6;
const COMPANY_LIMIT: usize = 15;
const INVENTOR_LIMIT: usize = 15;

/// Granularity CPC group codes are rolled up to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CpcLevel {
    #[default]
    Group,
    MainGroup,
    Subclass,
    Class,
}

impl FromStr for CpcLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "group" => Ok(Self::Group),
            "main_group" => Ok(Self::MainGroup),
            "subclass" => Ok(Self::Subclass),
            "class" => Ok(Self::Class),
            other => Err(format!(
                "unknown level '{}' (expected group, main_group, subclass or class)",
                other
            )),
        }
    }
}

impl CpcLevel {
    /// `A61K31/4439` -> `A61K31/4439`, `A61K31/00`, `A61K` or `A61`
    pub fn roll_up(self, group_id: &str) -> Option<String> {
        let code = group_id.trim().to_uppercase();
        if code.is_empty() {
            return None;
        }
        Some(match self {
            Self::Group => code,
            Self::MainGroup => derive_main_group(&code),
            Self::Subclass => code.chars().take(4).collect(),
            Self::Class => code.chars().take(3).collect(),
        })
    }

    /// Title table level; main groups are titled from the group table
    fn title_level(self) -> &'static str {
        match self {
            Self::Group | Self::MainGroup => "group",
            Self::Subclass => "subclass",
            Self::Class => "class",
        }
    }
}

#[derive(Debug, Clone)]
pub struct InsightsQuery {
    pub company_id: String,
    /// Window length; clamped to 30..=3650
    pub days: u32,
    pub level: CpcLevel,
    /// Last day of the current window
    pub as_of: NaiveDate,
}

impl InsightsQuery {
    pub fn new(company_id: impl Into<String>, as_of: NaiveDate) -> Self {
        Self {
            company_id: company_id.into(),
            days: DEFAULT_DAYS,
            level: CpcLevel::Group,
            as_of,
        }
    }

    fn safe_days(&self) -> u32 {
        self.days.clamp(MIN_DAYS, MAX_DAYS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpcCount {
    pub code: String,
    pub title: String,
    pub n: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpcTrend {
    pub code: String,
    pub title: String,
    pub prev_n: i64,
    pub cur_n: i64,
    pub delta: i64,
    /// Percent change, two decimals; absent when the code is new
    pub pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Competitor {
    pub company_id: String,
    pub display_name: String,
    /// Patents overlapping the company's top groups, summed over groups
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoAssignee {
    pub company_id: String,
    pub display_name: String,
    pub n: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventorCount {
    pub name: String,
    pub n: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyInsights {
    pub company_id: String,
    pub days: u32,
    pub level: CpcLevel,
    pub as_of: NaiveDate,
    pub top_cpc: Vec<CpcCount>,
    pub cpc_trend: Vec<CpcTrend>,
    pub competitors: Vec<Competitor>,
    pub co_assignees: Vec<CoAssignee>,
    pub top_inventors: Vec<InventorCount>,
}

/// Insights for one company. An unknown company yields empty lists.
pub fn query_insights(path: &Path, query: &InsightsQuery) -> Result<CompanyInsights, IndexError> {
    let conn = open_read_only(path)?;
    let days = query.safe_days();
    let current_from = query.as_of - Duration::days(i64::from(days));
    let previous_from = current_from - Duration::days(i64::from(days));

    let current = company_groups(&conn, &query.company_id, current_from, None)?;
    let previous = company_groups(&conn, &query.company_id, previous_from, Some(current_from))?;

    let current_counts = count_codes(&current, query.level);
    let previous_counts = count_codes(&previous, query.level);

    let mut titles = TitleLookup::new(&conn, query.level);

    let mut top: Vec<(&String, &i64)> = current_counts.iter().collect();
    top.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    let top_cpc = top
        .into_iter()
        .take(TOP_CPC_LIMIT)
        .map(|(code, n)| {
            Ok(CpcCount {
                title: titles.get(code)?,
                code: code.clone(),
                n: *n,
            })
        })
        .collect::<Result<Vec<_>, IndexError>>()?;

    let cpc_trend = trend(&current_counts, &previous_counts, &mut titles)?;

    let top_groups = top_codes(&count_codes(&current, CpcLevel::Group), COMPETITOR_GROUPS);
    let competitors = competitors(&conn, &query.company_id, current_from, &top_groups)?;
    let co_assignees = co_assignees(&conn, &query.company_id, current_from)?;
    let top_inventors = top_inventors(&conn, &query.company_id, current_from)?;

    tracing::debug!(
        company = %query.company_id,
        days,
        level = ?query.level,
        codes = current_counts.len(),
        competitors = competitors.len(),
        "computed company insights"
    );

    Ok(CompanyInsights {
        company_id: query.company_id.clone(),
        days,
        level: query.level,
        as_of: query.as_of,
        top_cpc,
        cpc_trend,
        competitors,
        co_assignees,
        top_inventors,
    })
}

fn day(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn split_codes(joined: &str) -> impl Iterator<Item = &str> {
    joined.split('|').map(str::trim).filter(|c| !c.is_empty())
}

/// Group codes of each company patent granted in `[from, until)`
fn company_groups(
    conn: &Connection,
    company_id: &str,
    from: NaiveDate,
    until: Option<NaiveDate>,
) -> Result<Vec<String>, IndexError> {
    let until = until.map(day).unwrap_or_else(|| "9999-12-31".to_string());
    let mut stmt = conn.prepare(
        "SELECT cpc_group_ids FROM patents
         WHERE company_id = ?1 AND patent_date >= ?2 AND patent_date < ?3 AND cpc_group_ids <> ''",
    )?;
    let rows = stmt
        .query_map(params![company_id, day(from), until], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Occurrences of each rolled-up code; two groups of one patent that roll up
/// to the same code count twice
fn count_codes(patents: &[String], level: CpcLevel) -> BTreeMap<String, i64> {
    let mut counts = BTreeMap::new();
    for joined in patents {
        for code in split_codes(joined).filter_map(|c| level.roll_up(c)) {
            *counts.entry(code).or_insert(0) += 1;
        }
    }
    counts
}

fn top_codes(counts: &BTreeMap<String, i64>, limit: usize) -> BTreeSet<String> {
    let mut ranked: Vec<(&String, &i64)> = counts.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().take(limit).map(|(code, _)| code.clone()).collect()
}

fn trend(
    current: &BTreeMap<String, i64>,
    previous: &BTreeMap<String, i64>,
    titles: &mut TitleLookup<'_>,
) -> Result<Vec<CpcTrend>, IndexError> {
    let codes: BTreeSet<&String> = current.keys().chain(previous.keys()).collect();

    let mut rows: Vec<(String, i64, i64)> = codes
        .into_iter()
        .map(|code| {
            let cur_n = current.get(code).copied().unwrap_or(0);
            let prev_n = previous.get(code).copied().unwrap_or(0);
            (code.clone(), prev_n, cur_n)
        })
        .filter(|(_, prev_n, cur_n)| *prev_n > 0 || *cur_n > 0)
        .collect();
    rows.sort_by(|a, b| {
        (b.2 - b.1)
            .cmp(&(a.2 - a.1))
            .then_with(|| b.2.cmp(&a.2))
            .then_with(|| a.0.cmp(&b.0))
    });

    rows.into_iter()
        .take(TREND_LIMIT)
        .map(|(code, prev_n, cur_n)| {
            let delta = cur_n - prev_n;
            let pct = (prev_n != 0)
                .then(|| ((100.0 * delta as f64 / prev_n as f64) * 100.0).round() / 100.0);
            Ok(CpcTrend {
                title: titles.get(&code)?,
                code,
                prev_n,
                cur_n,
                delta,
                pct,
            })
        })
        .collect()
}

/// Other companies scored by how many of their current-window patents carry
/// each of `groups`
fn competitors(
    conn: &Connection,
    company_id: &str,
    from: NaiveDate,
    groups: &BTreeSet<String>,
) -> Result<Vec<Competitor>, IndexError> {
    if groups.is_empty() {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT company_id, cpc_group_ids FROM patents
         WHERE company_id <> ?1 AND patent_date >= ?2 AND cpc_group_ids <> ''",
    )?;
    let mut rows = stmt.query(params![company_id, day(from)])?;

    let mut scores: HashMap<String, i64> = HashMap::new();
    while let Some(row) = rows.next()? {
        let other: String = row.get(0)?;
        let joined: String = row.get(1)?;
        let overlap = split_codes(&joined)
            .map(str::to_uppercase)
            .filter(|code| groups.contains(code))
            .collect::<BTreeSet<_>>()
            .len() as i64;
        if overlap > 0 {
            *scores.entry(other).or_insert(0) += overlap;
        }
    }

    let mut ranked: Vec<(String, i64)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(COMPANY_LIMIT);

    let mut competitors = ranked
        .into_iter()
        .map(|(company_id, score)| {
            Ok(Competitor {
                display_name: display_name(conn, &company_id)?,
                company_id,
                score,
            })
        })
        .collect::<Result<Vec<_>, IndexError>>()?;
    competitors.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.display_name.cmp(&b.display_name))
    });
    Ok(competitors)
}

fn display_name(conn: &Connection, company_id: &str) -> Result<String, IndexError> {
    let name: Option<String> = conn
        .query_row(
            "SELECT display_name FROM companies WHERE company_id = ?1",
            params![company_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(name.unwrap_or_else(|| company_id.to_string()))
}

/// Ranked companies sharing patents with this one
fn co_assignees(
    conn: &Connection,
    company_id: &str,
    from: NaiveDate,
) -> Result<Vec<CoAssignee>, IndexError> {
    let mut stmt = conn.prepare(
        "SELECT p2.company_id, COALESCE(c.display_name, p2.company_id) AS name, COUNT(DISTINCT p2.patent_id) AS n
         FROM patents p1
         JOIN patents p2 ON p2.patent_id = p1.patent_id
         LEFT JOIN companies c ON c.company_id = p2.company_id
         WHERE p1.company_id = ?1 AND p2.company_id <> ?1 AND p1.patent_date >= ?2
         GROUP BY p2.company_id
         ORDER BY n DESC, name ASC, p2.company_id ASC
         LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(params![company_id, day(from), COMPANY_LIMIT as i64], |row| {
            Ok(CoAssignee {
                company_id: row.get(0)?,
                display_name: row.get(1)?,
                n: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn top_inventors(
    conn: &Connection,
    company_id: &str,
    from: NaiveDate,
) -> Result<Vec<InventorCount>, IndexError> {
    let mut stmt = conn.prepare(
        "SELECT inventor_name, COUNT(DISTINCT patent_id) AS n
         FROM patent_inventors
         WHERE company_id = ?1 AND patent_date >= ?2 AND inventor_name <> ''
         GROUP BY inventor_name
         ORDER BY n DESC, inventor_name ASC
         LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(params![company_id, day(from), INVENTOR_LIMIT as i64], |row| {
            Ok(InventorCount {
                name: row.get(0)?,
                n: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Memoized title lookups for one level; unknown codes have an empty title
struct TitleLookup<'c> {
    conn: &'c Connection,
    level: &'static str,
    cache: HashMap<String, String>,
}

impl<'c> TitleLookup<'c> {
    fn new(conn: &'c Connection, level: CpcLevel) -> Self {
        Self {
            conn,
            level: level.title_level(),
            cache: HashMap::new(),
        }
    }

    fn get(&mut self, code: &str) -> Result<String, IndexError> {
        if let Some(title) = self.cache.get(code) {
            return Ok(title.clone());
        }
        let title: Option<String> = self
            .conn
            .query_row(
                "SELECT title FROM cpc_titles WHERE level = ?1 AND code = ?2",
                params![self.level, code],
                |row| row.get(0),
            )
            .optional()?;
        let title = title.unwrap_or_default();
        self.cache.insert(code.to_string(), title.clone());
        Ok(title)
    }
}
