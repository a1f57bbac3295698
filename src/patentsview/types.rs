//! PatentSearch API request and response types
//!
//! Reference: https://search.patentsview.org/docs/

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One entry of the `s` parameter, rendered as `{"<field>": "asc"}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert(self.field.clone(), json!(self.direction));
        Value::Object(map)
    }
}

/// The `o` parameter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageOptions {
    pub size: usize,
    pub after: Option<Value>,
}

impl PageOptions {
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("size".to_string(), json!(self.size));
        if let Some(after) = &self.after {
            map.insert("after".to_string(), after.clone());
        }
        Value::Object(map)
    }
}

/// A single PatentSearch call: endpoint plus the q/f/s/o parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub endpoint: String,
    pub query: Value,
    pub fields: Vec<String>,
    pub sort: Vec<SortKey>,
    pub options: Option<PageOptions>,
}

impl SearchRequest {
    pub fn new(endpoint: impl Into<String>, query: Value) -> Self {
        Self {
            endpoint: endpoint.into(),
            query,
            fields: Vec::new(),
            sort: Vec::new(),
            options: None,
        }
    }

    pub fn with_fields<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.fields = fields.iter().map(|f| f.as_ref().to_string()).collect();
        self
    }

    pub fn with_sort(mut self, sort: Vec<SortKey>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_options(mut self, options: PageOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// `q` is mandatory and must be a non-empty object
    pub fn validate(&self) -> Result<(), ApiError> {
        match &self.query {
            Value::Object(map) if !map.is_empty() => Ok(()),
            _ => Err(ApiError::InvalidRequest(
                "q is required and must be a non-empty object".to_string(),
            )),
        }
    }

    /// Compact JSON encodings of q/f/s/o, in that order, omitting unset ones
    pub fn encoded_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("q", self.query.to_string())];
        if !self.fields.is_empty() {
            params.push(("f", json!(self.fields).to_string()));
        }
        if !self.sort.is_empty() {
            let sort: Vec<Value> = self.sort.iter().map(SortKey::to_json).collect();
            params.push(("s", Value::Array(sort).to_string()));
        }
        if let Some(options) = &self.options {
            params.push(("o", options.to_json().to_string()));
        }
        params
    }

    /// The same parameters as a JSON document, for POST
    pub fn json_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("q".to_string(), self.query.clone());
        if !self.fields.is_empty() {
            body.insert("f".to_string(), json!(self.fields));
        }
        if !self.sort.is_empty() {
            body.insert(
                "s".to_string(),
                Value::Array(self.sort.iter().map(SortKey::to_json).collect()),
            );
        }
        if let Some(options) = &self.options {
            body.insert("o".to_string(), options.to_json());
        }
        Value::Object(body)
    }

    pub fn endpoint_name(&self) -> &str {
        self.endpoint.trim_matches('/')
    }
}

/// Plural response key holding the record list for an endpoint
pub fn records_key(endpoint: &str) -> String {
    match endpoint.trim_matches('/') {
        "patent" => "patents".to_string(),
        "assignee" => "assignees".to_string(),
        "inventor" => "inventors".to_string(),
        "cpc_class" => "cpc_classes".to_string(),
        "cpc_subclass" => "cpc_subclasses".to_string(),
        "cpc_group" => "cpc_groups".to_string(),
        other => format!("{}s", other),
    }
}

/// One page of results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub total_hits: u64,
    /// Server-reported record count for this page
    pub count: u64,
    pub records: Vec<Value>,
}

impl SearchPage {
    /// Interpret a decoded response body
    pub fn from_body(endpoint: &str, body: Value) -> Result<Self, ApiError> {
        let Value::Object(mut map) = body else {
            return Err(ApiError::Malformed(
                "response body is not a JSON object".to_string(),
            ));
        };

        if error_flag_set(map.get("error")) {
            let body = Value::Object(map).to_string();
            return Err(ApiError::ErrorFlag(body.chars().take(300).collect()));
        }

        let key = records_key(endpoint);
        let records = match map.remove(&key) {
            Some(Value::Array(records)) => records,
            Some(Value::Null) | None => map
                .values()
                .find_map(|v| v.as_array().cloned())
                .unwrap_or_default(),
            Some(other) => {
                return Err(ApiError::Malformed(format!(
                    "'{}' is not an array: {}",
                    key, other
                )))
            }
        };

        let count = map
            .get("count")
            .and_then(value_as_u64)
            .unwrap_or(records.len() as u64);
        let total_hits = map.get("total_hits").and_then(value_as_u64).unwrap_or(0);

        Ok(Self {
            total_hits,
            count,
            records,
        })
    }
}

fn error_flag_set(flag: Option<&Value>) -> bool {
    match flag {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Resolve a dotted path (`cpc_current.cpc_subclass_id`) against a record
pub fn value_at_path<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = record;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

// ============================================================================
// Record shapes returned by the patent endpoint
// ============================================================================

/// A patent as returned by `/patent` with the fields we request.
///
/// Everything is optional: a record missing a required identifier is
/// skipped downstream instead of failing the whole page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiPatent {
    #[serde(default, deserialize_with = "loose_string")]
    pub patent_id: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub patent_title: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub patent_date: Option<String>,
    #[serde(default, deserialize_with = "loose_u64")]
    pub patent_num_times_cited_by_us_patents: Option<u64>,
    #[serde(default)]
    pub cpc_current: Option<Vec<ApiCpc>>,
    #[serde(default)]
    pub assignees: Option<Vec<ApiAssignee>>,
    #[serde(default)]
    pub inventors: Option<Vec<ApiInventor>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiCpc {
    #[serde(default, deserialize_with = "loose_string")]
    pub cpc_subclass_id: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub cpc_group_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiAssignee {
    #[serde(default, deserialize_with = "loose_string")]
    pub assignee_id: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub assignee_organization: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub assignee_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiInventor {
    #[serde(default, deserialize_with = "loose_string")]
    pub inventor_id: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub inventor_name_first: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub inventor_name_last: Option<String>,
}

/// Accepts a string, a number or null; numbers are rendered as text
fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected string, found {}",
            other
        ))),
    }
}

/// Accepts a non-negative integer, a numeric string, or null
fn loose_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("expected integer, found '{}'", s))),
        Some(other) => Err(de::Error::custom(format!(
            "expected integer, found {}",
            other
        ))),
    }
}
