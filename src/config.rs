//! TOML configuration parsing and validation.
//!
//! ```toml
//! sources_file = "./data/data_sources_metadata.json"
//!
//! [db]
//! path = "./data/harvest.sqlite"
//!
//! [index]
//! alias = "repos"
//! document_type = "repo"
//! retention_days = 7
//!
//! [harvest]
//! max_concurrent_fetches = 16
//! timeout_secs = 30
//! user_agent = "code.gov"
//!
//! [report]
//! output_dir = "./data/status"
//!
//! [logging]
//! level = "info"
//!
//! [[sources]]
//! acronym = "AA"
//! name = "Agency of Examples"
//! catalog_url = "https://aa.example.gov/code.json"
//! compliance_tracked = true
//!
//! [sources.requirements]
//! agency_wide_policy = 1
//! open_source_requirement = 0.5
//! inventory_requirement = 1
//! ```
//!
//! Sources may come from `sources_file` (a JSON array in the data-sources
//! metadata format), from inline `[[sources]]` tables, or both. Inline
//! entries replace file entries with the same acronym.

use anyhow::{bail, Context, Result};
use catalog_harvester_core::models::Source;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const DEFAULT_MAPPING: &str = include_str!("../assets/index/repos_mapping.json");
const DEFAULT_SETTINGS: &str = include_str!("../assets/index/repos_settings.json");

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub sources_file: Option<PathBuf>,
    #[serde(default)]
    pub sources: Vec<Source>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_alias")]
    pub alias: String,
    #[serde(default = "default_document_type")]
    pub document_type: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default)]
    pub mapping_path: Option<PathBuf>,
    #[serde(default)]
    pub settings_path: Option<PathBuf>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            alias: default_alias(),
            document_type: default_document_type(),
            retention_days: default_retention_days(),
            mapping_path: None,
            settings_path: None,
        }
    }
}

fn default_alias() -> String {
    "repos".to_string()
}
fn default_document_type() -> String {
    "repo".to_string()
}
fn default_retention_days() -> u32 {
    7
}

#[derive(Debug, Deserialize, Clone)]
pub struct HarvestConfig {
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_max_concurrent_fetches() -> usize {
    16
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    "code.gov".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./data/status")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// The index mapping: `index.mapping_path` if set, else the bundled one.
    pub fn index_mapping(&self) -> Result<Value> {
        read_json_or_default(self.index.mapping_path.as_deref(), DEFAULT_MAPPING)
            .context("Failed to load index mapping")
    }

    /// The index settings: `index.settings_path` if set, else the bundled one.
    pub fn index_settings(&self) -> Result<Value> {
        read_json_or_default(self.index.settings_path.as_deref(), DEFAULT_SETTINGS)
            .context("Failed to load index settings")
    }

    /// Restrict sources to `acronyms` (case-insensitive), keeping config order.
    ///
    /// An empty list selects every source. Unknown acronyms are an error.
    pub fn select_sources(&self, acronyms: &[String]) -> Result<Vec<Source>> {
        if acronyms.is_empty() {
            return Ok(self.sources.clone());
        }
        let known: HashSet<String> = self
            .sources
            .iter()
            .map(|s| s.acronym.to_uppercase())
            .collect();
        let wanted: HashSet<String> = acronyms.iter().map(|a| a.to_uppercase()).collect();
        let mut unknown: Vec<&String> = wanted.iter().filter(|a| !known.contains(*a)).collect();
        if !unknown.is_empty() {
            unknown.sort();
            bail!(
                "Unknown source(s): {}",
                unknown
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Ok(self
            .sources
            .iter()
            .filter(|s| wanted.contains(&s.acronym.to_uppercase()))
            .cloned()
            .collect())
    }
}

fn read_json_or_default(path: Option<&Path>, bundled: &str) -> Result<Value> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))
        }
        None => Ok(serde_json::from_str(bundled)?),
    }
}

fn load_sources_file(path: &Path) -> Result<Vec<Source>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sources file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse sources file: {}", path.display()))
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate index
    if config.index.alias.trim().is_empty() {
        bail!("index.alias must not be empty");
    }
    if config.index.document_type.trim().is_empty() {
        bail!("index.document_type must not be empty");
    }

    // Validate harvest
    if config.harvest.max_concurrent_fetches == 0 {
        bail!("harvest.max_concurrent_fetches must be > 0");
    }
    if config.harvest.timeout_secs == 0 {
        bail!("harvest.timeout_secs must be > 0");
    }

    // Validate logging
    const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];
    if !LEVELS.contains(&config.logging.level.to_lowercase().as_str()) {
        bail!(
            "Unknown logging.level '{}'. Expected one of: {}",
            config.logging.level,
            LEVELS.join(", ")
        );
    }

    // Validate inline sources before merging in the file
    let mut seen = HashSet::new();
    for source in &config.sources {
        if !seen.insert(source.acronym.to_uppercase()) {
            bail!("Duplicate source acronym: '{}'", source.acronym);
        }
    }

    if let Some(ref file) = config.sources_file {
        let mut merged: Vec<Source> = load_sources_file(file)?
            .into_iter()
            .filter(|s| !seen.contains(&s.acronym.to_uppercase()))
            .collect();
        merged.append(&mut config.sources);
        config.sources = merged;
    }

    for source in &config.sources {
        if source.acronym.trim().is_empty() {
            bail!("Every source needs a non-empty acronym");
        }
        if source.catalog_url.trim().is_empty() {
            bail!("Source '{}' has an empty catalog URL", source.acronym);
        }
        let r = &source.requirements;
        for (name, value) in [
            ("agency_wide_policy", r.agency_wide_policy),
            ("open_source_requirement", r.open_source_requirement),
            ("inventory_requirement", r.inventory_requirement),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!(
                    "Source '{}': requirements.{} must be in [0.0, 1.0]",
                    source.acronym,
                    name
                );
            }
        }
    }

    Ok(config)
}
