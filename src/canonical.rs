//! Assignee canonicalization
//!
//! Maps a raw PatentsView assignee to the company identity we report on.
//! The only source of truth is a hand-curated override table; anything not
//! in the table is its own company. No fuzzy matching happens here - the
//! suggestion report exists to help a human grow the table instead.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Failed to parse assignee map {path}: {message}")]
    Parse { path: String, message: String },
}

/// One curated override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssigneeMapping {
    pub display_name: String,
    pub canonical_company_id: String,
    #[serde(default)]
    pub notes: String,
}

/// Read-only key-value view of the override table
pub trait CanonicalLookup: Send + Sync {
    fn lookup(&self, assignee_id: &str) -> Option<&AssigneeMapping>;
}

impl CanonicalLookup for HashMap<String, AssigneeMapping> {
    fn lookup(&self, assignee_id: &str) -> Option<&AssigneeMapping> {
        self.get(assignee_id)
    }
}

/// The override table as loaded from `assignee_map.yml`
#[derive(Debug, Clone, Default)]
pub struct AssigneeMap {
    entries: HashMap<String, AssigneeMapping>,
}

impl CanonicalLookup for AssigneeMap {
    fn lookup(&self, assignee_id: &str) -> Option<&AssigneeMapping> {
        self.entries.get(assignee_id)
    }
}

impl FromIterator<(String, AssigneeMapping)> for AssigneeMap {
    fn from_iter<T: IntoIterator<Item = (String, AssigneeMapping)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl AssigneeMap {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load the table; a missing or unreadable file is an empty table
    pub fn load(path: &Path) -> Result<Self, MappingError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no assignee map; every assignee is its own company");
                return Ok(Self::default());
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "assignee map unreadable; using empty table");
                return Ok(Self::default());
            }
        };

        Self::load_from_str(&content).map_err(|message| MappingError::Parse {
            path: path.display().to_string(),
            message,
        })
    }

    /// Parse `assignees: { <assignee_id>: {display_name, canonical_company_id, notes} }`
    pub fn load_from_str(yaml: &str) -> Result<Self, String> {
        let root: serde_yaml::Value = serde_yaml::from_str(yaml).map_err(|e| e.to_string())?;

        let assignees = match root.get("assignees") {
            None | Some(serde_yaml::Value::Null) => return Ok(Self::default()),
            Some(serde_yaml::Value::Mapping(m)) => m,
            Some(_) => return Err("'assignees' must be a mapping".to_string()),
        };

        let mut entries = HashMap::with_capacity(assignees.len());
        for (key, cfg) in assignees {
            let Some(assignee_id) = scalar_text(key) else {
                return Err(format!("unsupported assignee key: {:?}", key));
            };
            let field = |name: &str| {
                cfg.get(name)
                    .and_then(scalar_text)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default()
            };

            let display_name = non_empty_or(field("display_name"), &assignee_id);
            let canonical_company_id = non_empty_or(field("canonical_company_id"), &assignee_id);
            let notes = field("notes");

            entries.insert(
                assignee_id,
                AssigneeMapping {
                    display_name,
                    canonical_company_id,
                    notes,
                },
            );
        }

        Ok(Self { entries })
    }
}

fn scalar_text(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

/// Returns `(canonical_company_id, display_name)`.
///
/// Total: an unmapped assignee resolves to itself, displayed under its raw
/// organization name (or its id when the name is blank).
pub fn resolve<L>(assignee_id: &str, raw_org_name: &str, table: &L) -> (String, String)
where
    L: CanonicalLookup + ?Sized,
{
    if let Some(mapping) = table.lookup(assignee_id) {
        return (
            mapping.canonical_company_id.clone(),
            mapping.display_name.clone(),
        );
    }

    let display = raw_org_name.trim();
    let display = if display.is_empty() {
        assignee_id
    } else {
        display
    };
    (assignee_id.to_string(), display.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MAP_YAML: &str = r#"
assignees:
  a-100:
    display_name: "Genentech"
    canonical_company_id: "roche"
    notes: "subsidiary"
  a-200:
    display_name: ""
    canonical_company_id: ""
  12345:
    canonical_company_id: "numeric"
"#;

    #[test]
    fn test_mapped_assignee_returns_entry_verbatim() {
        let map = AssigneeMap::load_from_str(MAP_YAML).unwrap();
        assert_eq!(
            resolve("a-100", "GENENTECH, INC.", &map),
            ("roche".to_string(), "Genentech".to_string())
        );
    }

    #[test]
    fn test_blank_fields_fall_back_to_assignee_id() {
        let map = AssigneeMap::load_from_str(MAP_YAML).unwrap();
        assert_eq!(
            resolve("a-200", "Whatever", &map),
            ("a-200".to_string(), "a-200".to_string())
        );
        assert_eq!(resolve("12345", "", &map).0, "numeric");
    }

    #[test]
    fn test_unmapped_assignee_is_its_own_company() {
        let map = AssigneeMap::default();
        assert_eq!(
            resolve("a-9", "  Acme Inc ", &map),
            ("a-9".to_string(), "Acme Inc".to_string())
        );
        assert_eq!(
            resolve("a-9", "   ", &map),
            ("a-9".to_string(), "a-9".to_string())
        );
    }

    #[test]
    fn test_plain_hashmap_is_a_lookup() {
        let mut table = HashMap::new();
        table.insert(
            "x".to_string(),
            AssigneeMapping {
                display_name: "X Corp".to_string(),
                canonical_company_id: "x-corp".to_string(),
                notes: String::new(),
            },
        );
        assert_eq!(resolve("x", "", &table).0, "x-corp");
        assert_eq!(resolve("y", "Y", &table).0, "y");
    }

    #[test]
    fn test_missing_file_is_empty_table() {
        let dir = TempDir::new().unwrap();
        let map = AssigneeMap::load(&dir.path().join("nope.yml")).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_empty_document_is_empty_table() {
        assert!(AssigneeMap::load_from_str("").unwrap().is_empty());
        assert!(AssigneeMap::load_from_str("assignees:\n").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_yaml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("assignee_map.yml");
        std::fs::write(&path, "assignees: [unclosed").unwrap();
        assert!(matches!(
            AssigneeMap::load(&path),
            Err(MappingError::Parse { .. })
        ));
    }
}
