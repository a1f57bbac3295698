//! Harvest Configuration
//!
//! Loads sector definitions, API pacing, sync windowing and rollup settings
//! from an optional YAML file. Every field has a default, so a bare run with
//! only `PATENTSVIEW_API_KEY` set works out of the box.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://search.patentsview.org/api/v1";
pub const API_KEY_ENV: &str = "PATENTSVIEW_API_KEY";

/// Hard ceiling imposed by the API on `o.size`
pub const MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing {0} env var")]
    MissingCredentials(&'static str),

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// A named slice of the patent space, defined by CPC subclass prefixes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorConfig {
    pub id: String,
    pub cpc_subclass_prefixes: Vec<String>,
}

impl SectorConfig {
    pub fn new(id: impl Into<String>, prefixes: &[&str]) -> Self {
        Self {
            id: id.into(),
            cpc_subclass_prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn biotech() -> Self {
        Self::new(
            "biotech",
            &["A61K", "A61P", "C07K", "C12N", "C12P", "C12Q", "C12Y", "G01N"],
        )
    }

    pub fn tech() -> Self {
        Self::new(
            "tech",
            &["G06F", "G06Q", "G06T", "G06N", "H04L", "H04W", "H04N", "H01L"],
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    /// Self-imposed ceiling; the service hard-limits at 45/min per key
    pub requests_per_minute: u32,
    pub timeout_secs: u64,
    pub page_size: usize,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            requests_per_minute: 40,
            timeout_secs: 60,
            page_size: MAX_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub lookback_years: u32,
    pub overlap_days: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            lookback_years: 5,
            overlap_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RollupSettings {
    pub top_n: usize,
    /// PatentsView assignee_type codes counted as companies (2 = US, 3 = foreign)
    pub corporate_type_codes: Vec<String>,
    pub suggestion_limit: usize,
}

impl Default for RollupSettings {
    fn default() -> Self {
        Self {
            top_n: 200,
            corporate_type_codes: vec!["2".to_string(), "3".to_string()],
            suggestion_limit: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub data_root: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub api: ApiSettings,
    pub sync: SyncSettings,
    pub rollup: RollupSettings,
    pub paths: PathSettings,
    pub sectors: Vec<SectorConfig>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            api: ApiSettings::default(),
            sync: SyncSettings::default(),
            rollup: RollupSettings::default(),
            paths: PathSettings::default(),
            sectors: vec![SectorConfig::biotech(), SectorConfig::tech()],
        }
    }
}

impl HarvestConfig {
    /// Load from a YAML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::load_from_str(&content)
    }

    /// Load from a YAML string
    pub fn load_from_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise use defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load_from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.requests_per_minute == 0 {
            return Err(ConfigError::Invalid(
                "api.requests_per_minute must be positive".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for sector in &self.sectors {
            if sector.id.trim().is_empty() {
                return Err(ConfigError::Invalid("sector id must not be empty".to_string()));
            }
            if !seen.insert(sector.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate sector id '{}'",
                    sector.id
                )));
            }
            if sector.cpc_subclass_prefixes.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "sector '{}' has no cpc_subclass_prefixes",
                    sector.id
                )));
            }
        }
        Ok(())
    }

    pub fn sector(&self, id: &str) -> Option<&SectorConfig> {
        self.sectors.iter().find(|s| s.id == id)
    }

    /// Effective page size, clamped to what the API accepts
    pub fn page_size(&self) -> usize {
        self.api.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn store_dir(&self, sector_id: &str) -> PathBuf {
        self.paths.data_root.join("store").join(sector_id)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.paths.data_root.join("state").join("last_run.json")
    }

    pub fn mapping_path(&self) -> PathBuf {
        self.paths
            .data_root
            .join("normalization")
            .join("assignee_map.yml")
    }

    pub fn suggestions_path(&self, sector_id: &str) -> PathBuf {
        self.paths
            .data_root
            .join("state")
            .join(format!("normalization_suggestions_{}.md", sector_id))
    }

    pub fn public_dir(&self, sector_id: &str) -> PathBuf {
        self.paths.data_root.join("public").join(sector_id)
    }

    pub fn index_path(&self, sector_id: &str) -> PathBuf {
        self.paths
            .data_root
            .join("db")
            .join(format!("{}.sqlite", sector_id))
    }

    pub fn cpc_titles_dir(&self) -> PathBuf {
        self.paths.data_root.join("state").join("cpc")
    }
}

/// Secrets are never part of the YAML config
#[derive(Clone)]
pub struct ApiCredentials {
    api_key: String,
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl ApiCredentials {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ConfigError> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(ConfigError::MissingCredentials(API_KEY_ENV));
        }
        Ok(Self { api_key })
    }

    /// Read `PATENTSVIEW_API_KEY` (call `dotenvy::dotenv()` first to honor `.env`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = std::env::var(API_KEY_ENV).unwrap_or_default();
        Self::new(raw)
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}
