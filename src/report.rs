//! Per-source status report.
//!
//! The collector accumulates one entry per compliance-tracked source while a
//! run progresses and is flushed to `<output_dir>/report.json` at the end,
//! whether or not the run succeeded. The file is rewritten in full on every
//! run:
//!
//! ```json
//! {
//!   "timestamp": "2026-03-09T14:05:07Z",
//!   "statuses": {
//!     "AA": {
//!       "status": "FULLY_COMPLIANT",
//!       "issues": [],
//!       "version": "2.0.0",
//!       "metadata": {
//!         "agency": {
//!           "id": "aa", "name": "...", "acronym": "AA", "website": "...", "codeUrl": "..."
//!         }
//!       },
//!       "requirements": { "agencyWidePolicy": 1.0, "...": "..." }
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use catalog_harvester_core::merge::ReleaseSet;
use catalog_harvester_core::models::{Requirements, Source};

const COMPONENT: &str = "reporter";

pub const REPORT_FILE: &str = "report.json";
pub const RELEASES_FILE: &str = "releases.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgencyMetadata {
    pub id: Option<String>,
    pub name: String,
    pub acronym: String,
    pub website: Option<String>,
    #[serde(rename = "codeUrl")]
    pub code_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportMetadata {
    pub agency: AgencyMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportEntry {
    pub status: String,
    pub issues: Vec<String>,
    pub version: String,
    pub metadata: ReportMetadata,
    pub requirements: Requirements,
}

#[derive(Debug, Serialize)]
struct ReportDocument<'a> {
    timestamp: String,
    statuses: &'a BTreeMap<String, ReportEntry>,
}

#[derive(Debug, Default)]
pub struct ReportCollector {
    statuses: BTreeMap<String, ReportEntry>,
}

impl ReportCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, acronym: &str) -> &mut ReportEntry {
        self.statuses.entry(acronym.to_string()).or_default()
    }

    pub fn record_status(&mut self, acronym: &str, status: impl Into<String>) {
        self.entry(acronym).status = status.into();
    }

    pub fn record_issues(&mut self, acronym: &str, issues: impl IntoIterator<Item = String>) {
        self.entry(acronym).issues.extend(issues);
    }

    pub fn record_version(&mut self, acronym: &str, version: impl Into<String>) {
        self.entry(acronym).version = version.into();
    }

    pub fn record_metadata(&mut self, source: &Source) {
        self.entry(&source.acronym).metadata = ReportMetadata {
            agency: AgencyMetadata {
                id: source.id.clone(),
                name: source.display_name.clone(),
                acronym: source.acronym.clone(),
                website: source.website.clone(),
                code_url: source.catalog_url.clone(),
            },
        };
    }

    pub fn record_requirements(&mut self, acronym: &str, requirements: Requirements) {
        self.entry(acronym).requirements = requirements;
    }

    pub fn get(&self, acronym: &str) -> Option<&ReportEntry> {
        self.statuses.get(acronym)
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// Write `report.json` into `output_dir`, stamped with the current time.
    pub fn flush(&self, output_dir: &Path) -> Result<PathBuf> {
        let document = ReportDocument {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            statuses: &self.statuses,
        };
        let path = output_dir.join(REPORT_FILE);
        write_json_atomic(&path, &document)?;
        tracing::info!(
            component = COMPONENT,
            path = %path.display(),
            entries = self.statuses.len(),
            "report written"
        );
        Ok(path)
    }
}

/// Write the merged release set to `releases.json` in `output_dir`.
pub fn write_releases(output_dir: &Path, releases: &ReleaseSet) -> Result<PathBuf> {
    let path = output_dir.join(RELEASES_FILE);
    write_json_atomic(&path, releases)?;
    tracing::info!(
        component = COMPONENT,
        path = %path.display(),
        releases = releases.len(),
        "releases written"
    );
    Ok(path)
}

/// Serialize `value` to a sibling temp file, then rename it over `path`.
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}
