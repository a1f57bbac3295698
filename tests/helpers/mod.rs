//! Shared fixtures for integration tests
//!
//! `CorpusApi` is an in-memory stand-in for the `/patent` endpoint. It
//! evaluates the date bounds and CPC prefixes of the query, serves records in
//! (grant date, patent id) order and honours the `o.after` cursor, so the
//! real paginator and sync engine run unmodified against it.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use patent_harvest::patentsview::{value_at_path, ApiError, SearchApi, SearchPage, SearchRequest};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

pub struct CorpusApi {
    patents: Mutex<Vec<Value>>,
    requests: Mutex<Vec<SearchRequest>>,
    fail_on_call: Mutex<Option<usize>>,
}

impl CorpusApi {
    pub fn new(patents: Vec<Value>) -> Self {
        Self {
            patents: Mutex::new(patents),
            requests: Mutex::new(Vec::new()),
            fail_on_call: Mutex::new(None),
        }
    }

    /// Fail the `n`th request from now on (1-based) with HTTP 500
    pub fn fail_on_call(&self, n: usize) {
        let already = self.requests.lock().unwrap().len();
        *self.fail_on_call.lock().unwrap() = Some(already + n);
    }

    pub fn clear_failure(&self) {
        *self.fail_on_call.lock().unwrap() = None;
    }

    pub fn push(&self, patent: Value) {
        self.patents.lock().unwrap().push(patent);
    }

    /// Mutate the upstream copy of a patent in place
    pub fn update(&self, patent_id: &str, f: impl FnOnce(&mut Value)) {
        let mut patents = self.patents.lock().unwrap();
        let patent = patents
            .iter_mut()
            .find(|p| p["patent_id"] == patent_id)
            .expect("patent in corpus");
        f(patent);
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl SearchApi for CorpusApi {
    async fn request(&self, request: &SearchRequest) -> Result<SearchPage, ApiError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };
        if *self.fail_on_call.lock().unwrap() == Some(call) {
            return Err(ApiError::Status {
                status: 500,
                body: "upstream exploded".to_string(),
                reason: "test".to_string(),
            });
        }

        let bounds = QueryBounds::from_query(&request.query);
        let mut matching: Vec<Value> = self
            .patents
            .lock()
            .unwrap()
            .iter()
            .filter(|p| bounds.matches(p))
            .cloned()
            .collect();
        matching.sort_by_key(sort_key);

        let options = request.options.clone().unwrap_or_default();
        let after = options.after.as_ref().map(|a| {
            (
                a[0].as_str().unwrap_or_default().to_string(),
                a[1].as_str().unwrap_or_default().to_string(),
            )
        });

        let total_hits = matching.len() as u64;
        let records: Vec<Value> = matching
            .into_iter()
            .filter(|p| after.as_ref().map(|a| sort_key(p) > *a).unwrap_or(true))
            .take(options.size)
            .collect();

        Ok(SearchPage {
            total_hits,
            count: records.len() as u64,
            records,
        })
    }
}

fn sort_key(patent: &Value) -> (String, String) {
    (
        patent["patent_date"].as_str().unwrap_or_default().to_string(),
        patent["patent_id"].as_str().unwrap_or_default().to_string(),
    )
}

/// The subset of the query language the sync engine emits
#[derive(Debug, Default)]
struct QueryBounds {
    after: Option<String>,
    until: Option<String>,
    prefixes: Vec<String>,
}

impl QueryBounds {
    fn from_query(query: &Value) -> Self {
        let mut bounds = Self::default();
        for clause in query["_and"].as_array().cloned().unwrap_or_default() {
            if let Some(d) = value_at_path(&clause, "_gt.patent_date").and_then(Value::as_str) {
                bounds.after = Some(d.to_string());
            }
            if let Some(d) = value_at_path(&clause, "_lte.patent_date").and_then(Value::as_str) {
                bounds.until = Some(d.to_string());
            }
            if let Some(any) = clause["_or"].as_array() {
                bounds.prefixes = any
                    .iter()
                    .filter_map(|c| c["_begins"]["cpc_current.cpc_subclass_id"].as_str())
                    .map(str::to_string)
                    .collect();
            }
        }
        bounds
    }

    fn matches(&self, patent: &Value) -> bool {
        let date = patent["patent_date"].as_str().unwrap_or_default();
        if self.after.as_deref().map(|a| date <= a).unwrap_or(false) {
            return false;
        }
        if self.until.as_deref().map(|u| date > u).unwrap_or(false) {
            return false;
        }
        if self.prefixes.is_empty() {
            return true;
        }
        patent["cpc_current"]
            .as_array()
            .map(|cpcs| {
                cpcs.iter().any(|c| {
                    let subclass = c["cpc_subclass_id"].as_str().unwrap_or_default();
                    self.prefixes.iter().any(|p| subclass.starts_with(p.as_str()))
                })
            })
            .unwrap_or(false)
    }
}

// ============================================================================
// Builders
// ============================================================================

/// `(assignee_id, organization, type)`
pub type Assignee<'a> = (&'a str, &'a str, &'a str);

pub fn patent(id: &str, date: &str, cited: u64, cpc: &[&str], assignees: &[Assignee<'_>]) -> Value {
    json!({
        "patent_id": id,
        "patent_title": format!("Patent {}", id),
        "patent_date": date,
        "patent_num_times_cited_by_us_patents": cited,
        "cpc_current": cpc
            .iter()
            .map(|c| json!({"cpc_subclass_id": c, "cpc_group_id": format!("{}1/00", c)}))
            .collect::<Vec<_>>(),
        "assignees": assignees
            .iter()
            .map(|(id, org, kind)| json!({
                "assignee_id": id,
                "assignee_organization": org,
                "assignee_type": kind
            }))
            .collect::<Vec<_>>(),
        "inventors": [
            {"inventor_id": format!("inv-{}", id), "inventor_name_first": "Grace", "inventor_name_last": "Hopper"}
        ]
    })
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Every file under `dir` with its bytes, for before/after comparisons
pub fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let rel = path.strip_prefix(dir).unwrap().display().to_string();
                files.insert(rel, std::fs::read(&path).unwrap());
            }
        }
    }
    files
}
