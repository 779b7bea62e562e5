//! Harvest orchestration.
//!
//! Coordinates one full run:
//!
//! 1. Open a fresh index generation (fatal on failure).
//! 2. Fan out one task per source, at most `max_concurrent_fetches` at a
//!    time: fetch → parse → detect version → validate → normalize →
//!    decode releases. Every failure in this stage is per-source.
//! 3. Join the tasks in configuration order. For each source: write its
//!    releases to the new index, merge the written ones into the
//!    [`ReleaseSet`], score compliance and record the report entry.
//! 4. Finalize the index (optimize, alias swap, retire).
//!
//! Because results are consumed in configuration order, a release id
//! published by two sources resolves to the one configured later.
//!
//! The outcome is returned as a value ([`HarvestOutcome`]); there are no
//! process-wide counters. [`run_harvest`] wires the configured SQLite backend
//! and HTTP fetcher together and writes the run outputs. The report is written
//! even when the run cannot be set up.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::Semaphore;

use catalog_harvester_core::backend::{IndexDescriptor, SearchBackend};
use catalog_harvester_core::compliance;
use catalog_harvester_core::merge::{stamp, ReleaseSet};
use catalog_harvester_core::models::{Release, Source};
use catalog_harvester_core::normalize::{normalize, Catalog, SchemaVersion};

use crate::config::Config;
use crate::error::{HarvestError, IndexWriteError, LifecycleError, SourceError};
use crate::fetch::{CatalogFetcher, HttpFetcher};
use crate::lifecycle::{FinalizeReport, IndexLifecycleManager};
use crate::report::{self, ReportCollector};
use crate::sqlite_backend::SqliteBackend;
use crate::validate::{CatalogValidator, ValidationResult};

const COMPONENT: &str = "harvest";

/// Version recorded for sources whose catalog never got that far.
pub const UNKNOWN_VERSION: &str = "N/A";

/// A source's catalog after the concurrent stage.
#[derive(Debug)]
struct PreparedCatalog {
    source_version: SchemaVersion,
    validation: ValidationResult,
    /// Empty when validation failed.
    releases: Vec<Release>,
    release_issues: Vec<String>,
}

/// Counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    pub sources_total: usize,
    pub sources_harvested: usize,
    pub sources_failed: usize,
    pub sources_invalid: usize,
    pub releases_indexed: u64,
    /// Releases that passed validation but could not be decoded.
    pub releases_rejected: u64,
    pub write_failures: u64,
}

/// Everything a run produced, successful or not.
#[derive(Debug)]
pub struct HarvestOutcome {
    pub summary: HarvestSummary,
    pub report: ReportCollector,
    pub releases: ReleaseSet,
    pub result: Result<FinalizeReport, HarvestError>,
}

impl HarvestOutcome {
    /// True when the run completed but something along the way failed.
    pub fn is_degraded(&self) -> bool {
        self.summary.sources_failed > 0
            || self.summary.sources_invalid > 0
            || self.summary.releases_rejected > 0
            || self.summary.write_failures > 0
            || matches!(&self.result, Ok(r) if r.retirement_error.is_some())
    }

    /// 0 clean, 2 degraded, 1 fatal.
    pub fn exit_code(&self) -> u8 {
        match &self.result {
            Err(_) => 1,
            Ok(_) if self.is_degraded() => 2,
            Ok(_) => 0,
        }
    }

    /// Write `report.json` and, if the run completed, `releases.json`.
    pub fn write_outputs(&self, output_dir: &Path) -> Result<()> {
        self.report.flush(output_dir)?;
        if self.result.is_ok() {
            report::write_releases(output_dir, &self.releases)?;
        }
        Ok(())
    }
}

pub struct HarvestPipeline {
    backend: Arc<dyn SearchBackend>,
    fetcher: Arc<dyn CatalogFetcher>,
    validator: Arc<CatalogValidator>,
    max_concurrent_fetches: usize,
    retention_days: u32,
}

/// What the coordinator accumulates while consuming source results.
#[derive(Default)]
struct Collected {
    summary: HarvestSummary,
    report: ReportCollector,
    releases: ReleaseSet,
}

impl Collected {
    fn finish(self, result: Result<FinalizeReport, HarvestError>) -> HarvestOutcome {
        HarvestOutcome {
            summary: self.summary,
            report: self.report,
            releases: self.releases,
            result,
        }
    }
}

impl HarvestPipeline {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        fetcher: Arc<dyn CatalogFetcher>,
        validator: Arc<CatalogValidator>,
    ) -> Self {
        Self {
            backend,
            fetcher,
            validator,
            max_concurrent_fetches: 16,
            retention_days: 7,
        }
    }

    pub fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.max_concurrent_fetches = max.max(1);
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    /// Harvest `sources` into a new generation described by `descriptor`.
    pub async fn run(&self, sources: &[Source], descriptor: IndexDescriptor) -> HarvestOutcome {
        let mut collected = Collected {
            summary: HarvestSummary {
                sources_total: sources.len(),
                ..Default::default()
            },
            ..Default::default()
        };

        let mut manager =
            IndexLifecycleManager::new(Arc::clone(&self.backend), self.retention_days);
        if let Err(e) = manager.open(descriptor).await {
            return collected.finish(Err(e.into()));
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_fetches));
        let handles: Vec<_> = sources
            .iter()
            .cloned()
            .map(|source| {
                let semaphore = Arc::clone(&semaphore);
                let fetcher = Arc::clone(&self.fetcher);
                let validator = Arc::clone(&self.validator);
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.map_err(|e| {
                        SourceError::Fetch(format!("fetch slot unavailable: {}", e))
                    })?;
                    prepare_source(fetcher.as_ref(), validator.as_ref(), &source).await
                })
            })
            .collect();

        let mut fatal = None;
        for (source, handle) in sources.iter().zip(handles) {
            if fatal.is_some() {
                handle.abort();
                continue;
            }
            let prepared = match handle.await {
                Ok(result) => result,
                Err(e) => Err(SourceError::Fetch(format!("source task failed: {}", e))),
            };
            if let Err(e) = self
                .process_source(source, prepared, &mut manager, &mut collected)
                .await
            {
                tracing::error!(
                    component = COMPONENT,
                    error = %e,
                    "run aborted while populating"
                );
                fatal = Some(e);
            }
        }
        if let Some(e) = fatal {
            return collected.finish(Err(e.into()));
        }

        let result = manager.finalize().await.map_err(HarvestError::from);
        match &result {
            Ok(finalized) => tracing::info!(
                component = COMPONENT,
                index = %finalized.index,
                documents = finalized.documents,
                retired = finalized.retired.len(),
                "run complete"
            ),
            Err(e) => tracing::error!(component = COMPONENT, error = %e, "finalize failed"),
        }
        collected.finish(result)
    }

    /// Index, score and report one source. Only lifecycle errors escape.
    async fn process_source(
        &self,
        source: &Source,
        prepared: Result<PreparedCatalog, SourceError>,
        manager: &mut IndexLifecycleManager,
        collected: &mut Collected,
    ) -> Result<(), LifecycleError> {
        let acronym = source.acronym.as_str();
        let mut requirements = source.requirements;
        let mut issues = Vec::new();
        let mut failure_status = None;
        let mut version = UNKNOWN_VERSION.to_string();

        match prepared {
            Err(e) => {
                tracing::warn!(
                    component = COMPONENT,
                    source = %acronym,
                    error = %e,
                    "source skipped"
                );
                collected.summary.sources_failed += 1;
                failure_status = e.status();
                issues = e.issues();
            }
            Ok(prepared) => {
                version = prepared.source_version.to_string();
                collected.summary.releases_rejected += prepared.release_issues.len() as u64;
                issues.extend(prepared.release_issues);

                if prepared.validation.is_valid() {
                    requirements.schema_format = Some(1.0);
                    collected.summary.sources_harvested += 1;
                } else {
                    requirements.schema_format = Some(0.0);
                    collected.summary.sources_invalid += 1;
                    let invalid = SourceError::Validation(prepared.validation.into_issues());
                    tracing::warn!(
                        component = COMPONENT,
                        source = %acronym,
                        error = %invalid,
                        "catalog failed validation, not indexed"
                    );
                    issues.extend(invalid.issues());
                }

                let mut written = 0u64;
                for release in prepared.releases {
                    let releases = &mut collected.releases;
                    match index_release(acronym, release, manager, releases).await {
                        Ok(()) => written += 1,
                        Err(IndexWriteError::Lifecycle(e)) => return Err(e),
                        Err(e) => {
                            tracing::warn!(
                                component = COMPONENT,
                                source = %acronym,
                                error = %e,
                                "document write failed"
                            );
                            collected.summary.write_failures += 1;
                            issues.push(e.to_string());
                        }
                    }
                }
                collected.summary.releases_indexed += written;
                tracing::info!(
                    component = COMPONENT,
                    source = %acronym,
                    %version,
                    releases = written,
                    "source harvested"
                );
            }
        }

        let score = compliance::score(&mut requirements);
        let status = failure_status
            .map(str::to_string)
            .unwrap_or_else(|| score.status.as_str().to_string());

        if source.compliance_tracked {
            let report = &mut collected.report;
            report.record_metadata(source);
            report.record_status(acronym, status);
            report.record_issues(acronym, issues);
            report.record_version(acronym, version);
            report.record_requirements(acronym, requirements);
        } else {
            tracing::debug!(
                component = COMPONENT,
                source = %acronym,
                %status,
                overall_compliance = score.overall_compliance,
                "source not tracked for compliance"
            );
        }
        Ok(())
    }
}

/// Write `release`, stamped with `agency` and its id, to the index. Only a
/// written release is merged into `releases`.
async fn index_release(
    agency: &str,
    mut release: Release,
    manager: &mut IndexLifecycleManager,
    releases: &mut ReleaseSet,
) -> Result<(), IndexWriteError> {
    stamp(agency, &mut release);
    let document = release
        .to_document()
        .map_err(|e| IndexWriteError::Serialize {
            id: release.id.clone(),
            message: e.to_string(),
        })?;
    manager.index(&document).await?;

    let id = release.id.clone();
    if releases.merge(agency, release).is_some() {
        tracing::debug!(component = COMPONENT, %id, "release replaced by a later duplicate");
    }
    Ok(())
}

/// The per-source concurrent stage.
async fn prepare_source(
    fetcher: &dyn CatalogFetcher,
    validator: &CatalogValidator,
    source: &Source,
) -> Result<PreparedCatalog, SourceError> {
    let raw = fetcher.fetch(source).await?;
    let catalog = Catalog::from_value(raw)?;
    let validation = validator.validate(&catalog)?;
    let canonical = normalize(catalog)?;

    let mut releases = Vec::new();
    let mut release_issues = Vec::new();
    if validation.is_valid() {
        for (i, value) in canonical.releases().iter().enumerate() {
            match Release::from_value(value.clone()) {
                Ok(release) => releases.push(release),
                Err(e) => release_issues.push(format!("/releases/{}: {}", i, e)),
            }
        }
    }

    Ok(PreparedCatalog {
        source_version: canonical.source_version(),
        validation,
        releases,
        release_issues,
    })
}

/// Build the pipeline and index descriptor for `config`.
async fn setup(config: &Config) -> Result<(HarvestPipeline, IndexDescriptor)> {
    let backend: Arc<dyn SearchBackend> = Arc::new(SqliteBackend::open(config).await?);
    let fetcher: Arc<dyn CatalogFetcher> = Arc::new(HttpFetcher::new(&config.harvest)?);
    let validator = Arc::new(CatalogValidator::new()?);

    let descriptor = IndexDescriptor::new(
        config.index.alias.clone(),
        config.index.document_type.clone(),
        config.index_mapping()?,
        config.index_settings()?,
        Utc::now(),
    );

    let pipeline = HarvestPipeline::new(backend, fetcher, validator)
        .with_max_concurrent_fetches(config.harvest.max_concurrent_fetches)
        .with_retention_days(config.index.retention_days);
    Ok((pipeline, descriptor))
}

/// Run a full harvest against the configured SQLite backend and write the
/// report (always) and merged releases into `output_dir`.
///
/// If the run cannot be set up, an empty report is still written before the
/// error is returned.
pub async fn run_harvest(
    config: &Config,
    sources: &[Source],
    output_dir: &Path,
) -> Result<HarvestOutcome> {
    let (pipeline, descriptor) = match setup(config).await {
        Ok(ready) => ready,
        Err(e) => {
            tracing::error!(
                component = COMPONENT,
                error = %format!("{:#}", e),
                "harvest setup failed"
            );
            if let Err(flush) = ReportCollector::new().flush(output_dir) {
                tracing::warn!(
                    component = COMPONENT,
                    error = %format!("{:#}", flush),
                    "report could not be written"
                );
            }
            return Err(e);
        }
    };

    tracing::info!(
        component = COMPONENT,
        sources = sources.len(),
        index = %descriptor.index,
        alias = %descriptor.alias,
        "starting harvest"
    );
    let outcome = pipeline.run(sources, descriptor).await;
    outcome.write_outputs(output_dir)?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use catalog_harvester_core::backend::memory::InMemoryBackend;
    use catalog_harvester_core::backend::AliasAction;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    /// Serves canned responses keyed by catalog URL.
    struct MapFetcher(HashMap<String, Result<Value, SourceError>>);

    #[async_trait]
    impl CatalogFetcher for MapFetcher {
        async fn fetch(&self, source: &Source) -> Result<Value, SourceError> {
            self.0
                .get(&source.catalog_url)
                .cloned()
                .unwrap_or_else(|| Err(SourceError::Fetch("404 Not Found".to_string())))
        }
    }

    fn source(acronym: &str, tracked: bool) -> Source {
        serde_json::from_value(json!({
            "acronym": acronym,
            "name": format!("{} Agency", acronym),
            "codeUrl": format!("https://{}.example.gov/code.json", acronym.to_lowercase()),
            "complianceDashboard": tracked,
            "requirements": {
                "agencyWidePolicy": 1,
                "openSourceRequirement": 0,
                "inventoryRequirement": 1
            }
        }))
        .unwrap()
    }

    fn release(name: &str, extra: Value) -> Value {
        let mut r = json!({
            "name": name,
            "permissions": {
                "licenses": [{"URL": "https://opensource.org/licenses/MIT", "name": "MIT"}],
                "usageType": "openSource",
                "exemptionText": null
            }
        });
        if let (Some(fields), Some(extra)) = (r.as_object_mut(), extra.as_object()) {
            fields.extend(extra.clone());
        }
        r
    }

    fn pipeline(
        backend: Arc<InMemoryBackend>,
        responses: Vec<(&str, Result<Value, SourceError>)>,
    ) -> HarvestPipeline {
        let fetcher = MapFetcher(
            responses
                .into_iter()
                .map(|(acr, r)| {
                    let url = format!("https://{}.example.gov/code.json", acr.to_lowercase());
                    (url, r)
                })
                .collect(),
        );
        HarvestPipeline::new(
            backend,
            Arc::new(fetcher),
            Arc::new(CatalogValidator::new().unwrap()),
        )
        .with_max_concurrent_fetches(2)
    }

    fn descriptor() -> IndexDescriptor {
        IndexDescriptor::new("repos", "repo", json!({}), json!({}), Utc::now())
    }

    #[tokio::test]
    async fn test_mixed_sources() {
        let backend = Arc::new(InMemoryBackend::new());
        let pipeline = pipeline(
            backend.clone(),
            vec![
                ("AA", Ok(json!({
                    "version": "2.0.0",
                    "agency": "AA",
                    "releases": [release("X", json!({}))]
                }))),
                ("BB", Ok(json!({"agency": "BB", "releases": [{"name": "broken"}]}))),
                ("CC", Ok(json!({"agency": "CC"}))),
                ("DD", Err(SourceError::Parse("expected value".to_string()))),
            ],
        );
        let sources = vec![
            source("AA", true),
            source("BB", true),
            source("CC", true),
            source("DD", true),
            source("EE", true),
        ];

        let outcome = pipeline.run(&sources, descriptor()).await;
        let finalized = outcome.result.as_ref().unwrap();
        assert_eq!(finalized.documents, 1);
        assert_eq!(outcome.summary.sources_harvested, 1);
        assert_eq!(outcome.summary.sources_invalid, 1);
        assert_eq!(outcome.summary.sources_failed, 3);
        assert_eq!(outcome.exit_code(), 2);

        let aa = outcome.report.get("AA").unwrap();
        assert_eq!(aa.status, "PARTIALLY_COMPLIANT");
        assert_eq!(aa.version, "2.0.0");
        assert_eq!(aa.requirements.schema_format, Some(1.0));
        assert!((aa.requirements.overall_compliance.unwrap() - 2.0 / 3.0).abs() < 1e-9);

        let bb = outcome.report.get("BB").unwrap();
        assert_eq!(bb.status, "PARTIALLY_COMPLIANT");
        assert_eq!(bb.requirements.schema_format, Some(0.0));
        assert!(!bb.issues.is_empty());

        assert_eq!(outcome.report.get("CC").unwrap().status, "SCHEMA_ERROR");
        assert_eq!(outcome.report.get("CC").unwrap().version, "N/A");
        assert_eq!(outcome.report.get("DD").unwrap().status, "PARSE_ERROR");
        assert_eq!(outcome.report.get("EE").unwrap().status, "FETCH_ERROR");

        assert_eq!(
            backend.get_alias_bindings("repos").await.unwrap(),
            vec![finalized.index.clone()]
        );
        let doc = backend.document(&finalized.index, "AA/X").unwrap();
        assert_eq!(doc["agency"], "AA");
    }

    #[tokio::test]
    async fn test_untracked_sources_are_indexed_but_not_reported() {
        let backend = Arc::new(InMemoryBackend::new());
        let pipeline = pipeline(
            backend.clone(),
            vec![("AA", Ok(json!({"agency": "AA", "releases": [release("X", json!({}))]})))],
        );
        let outcome = pipeline.run(&[source("AA", false)], descriptor()).await;
        assert!(outcome.report.is_empty());
        assert_eq!(outcome.releases.len(), 1);
        assert_eq!(outcome.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_later_source_wins_on_id_collision() {
        let backend = Arc::new(InMemoryBackend::new());
        let pipeline = pipeline(
            backend.clone(),
            vec![
                ("AA", Ok(json!({"agency": "AA", "releases": [
                    release("X", json!({"description": "first"})),
                    release("X", json!({"description": "second", "vcs": "git"}))
                ]}))),
            ],
        );
        let outcome = pipeline.run(&[source("AA", true)], descriptor()).await;
        let finalized = outcome.result.as_ref().unwrap();
        let doc = backend.document(&finalized.index, "AA/X").unwrap();
        assert_eq!(doc["description"], "second");
        assert_eq!(backend.count_documents(&finalized.index).await.unwrap(), 1);
        assert_eq!(outcome.releases.get("AA/X").unwrap().vcs.as_deref(), Some("git"));
    }

    #[tokio::test]
    async fn test_legacy_catalog_is_upgraded_and_indexed() {
        let backend = Arc::new(InMemoryBackend::new());
        let pipeline = pipeline(
            backend.clone(),
            vec![("AA", Ok(json!({
                "version": "1.0.1",
                "agency": "AA",
                "projects": [{
                    "name": "Old",
                    "description": "An old project",
                    "license": "https://opensource.org/licenses/MIT",
                    "openSourceProject": 0,
                    "governmentWideReuseProject": 0,
                    "exemption": 2,
                    "repository": "https://example.com/old"
                }]
            })))],
        );
        let outcome = pipeline.run(&[source("AA", true)], descriptor()).await;
        assert_eq!(outcome.report.get("AA").unwrap().version, "1.0.1");
        let finalized = outcome.result.as_ref().unwrap();
        let doc = backend.document(&finalized.index, "AA/Old").unwrap();
        assert_eq!(doc["permissions"]["usageType"], "exemptByNationalSecurity");
        assert_eq!(doc["repositoryURL"], "https://example.com/old");
    }

    #[tokio::test]
    async fn test_no_documents_is_fatal_and_keeps_previous_alias() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.create_index("repos_previous", &json!({})).await.unwrap();
        backend
            .update_aliases(&[AliasAction::add("repos_previous", "repos")])
            .await
            .unwrap();

        let pipeline = pipeline(backend.clone(), vec![]);
        let outcome = pipeline.run(&[source("AA", true)], descriptor()).await;
        assert!(matches!(
            outcome.result,
            Err(HarvestError::Lifecycle(LifecycleError::EmptyIndex { .. }))
        ));
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(outcome.report.get("AA").unwrap().status, "FETCH_ERROR");
        assert_eq!(
            backend.get_alias_bindings("repos").await.unwrap(),
            vec!["repos_previous"]
        );
    }

    #[tokio::test]
    async fn test_write_outputs_skips_releases_on_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = Arc::new(InMemoryBackend::new());
        let pipeline = pipeline(backend, vec![]);
        let outcome = pipeline.run(&[source("AA", true)], descriptor()).await;
        outcome.write_outputs(dir.path()).unwrap();
        assert!(dir.path().join(report::REPORT_FILE).exists());
        assert!(!dir.path().join(report::RELEASES_FILE).exists());
    }

    #[tokio::test]
    async fn test_legacy_catalog_violating_its_schema_is_not_indexed() {
        let backend = Arc::new(InMemoryBackend::new());
        let pipeline = pipeline(
            backend.clone(),
            vec![
                ("AA", Ok(json!({"agency": "AA", "releases": [release("X", json!({}))]}))),
                ("OO", Ok(json!({
                    "version": "1.0.1",
                    "agency": "OO",
                    "projects": [{"name": "Old", "exemption": "1"}]
                }))),
            ],
        );
        let outcome = pipeline
            .run(&[source("AA", true), source("OO", true)], descriptor())
            .await;
        let finalized = outcome.result.as_ref().unwrap();

        let oo = outcome.report.get("OO").unwrap();
        assert_eq!(oo.version, "1.0.1");
        assert_eq!(oo.requirements.schema_format, Some(0.0));
        assert!(oo.issues.iter().any(|i| i.contains("openSourceProject")));
        assert_eq!(outcome.summary.sources_invalid, 1);
        assert!(backend.document(&finalized.index, "OO/Old").is_none());
        assert!(outcome.releases.get("OO/Old").is_none());
    }

    #[tokio::test]
    async fn test_undecodable_release_degrades_the_run() {
        let backend = Arc::new(InMemoryBackend::new());
        let pipeline = pipeline(
            backend.clone(),
            vec![("AA", Ok(json!({"agency": "AA", "releases": [
                release("X", json!({})),
                release("Y", json!({"id": 5}))
            ]})))],
        );
        let outcome = pipeline.run(&[source("AA", true)], descriptor()).await;

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.summary.releases_indexed, 1);
        assert_eq!(outcome.summary.releases_rejected, 1);
        assert_eq!(outcome.exit_code(), 2);
        let aa = outcome.report.get("AA").unwrap();
        assert!(aa.issues.iter().any(|i| i.starts_with("/releases/1: ")));
    }

    #[tokio::test]
    async fn test_failed_write_is_not_merged() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut manager = IndexLifecycleManager::new(backend.clone(), 7);
        manager.open(descriptor()).await.unwrap();
        let mut releases = ReleaseSet::new();

        let x = Release::from_value(release("X", json!({}))).unwrap();
        index_release("AA", x, &mut manager, &mut releases)
            .await
            .unwrap();
        assert!(releases.get("AA/X").is_some());

        let index = manager.index_name().unwrap().to_string();
        backend.delete_index(&index).await.unwrap();
        let y = Release::from_value(release("Y", json!({}))).unwrap();
        let err = index_release("AA", y, &mut manager, &mut releases)
            .await
            .unwrap_err();

        assert!(matches!(err, IndexWriteError::Backend { ref id, .. } if id == "AA/Y"));
        assert!(releases.get("AA/Y").is_none());
        assert_eq!(releases.len(), 1);
    }

    #[tokio::test]
    async fn test_setup_failure_still_writes_report() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join("harvest.toml");
        // A directory cannot be opened as a database.
        std::fs::write(
            &config_path,
            format!("[db]\npath = \"{}\"\n", dir.path().display()),
        )
        .unwrap();
        let config = crate::config::load_config(&config_path).unwrap();
        let output_dir = dir.path().join("status");

        let err = run_harvest(&config, &[source("AA", true)], &output_dir)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to open database"));

        let written: Value = serde_json::from_str(
            &std::fs::read_to_string(output_dir.join(report::REPORT_FILE)).unwrap(),
        )
        .unwrap();
        assert!(written["timestamp"].is_string());
        assert!(written["statuses"].as_object().unwrap().is_empty());
        assert!(!output_dir.join(report::RELEASES_FILE).exists());
    }
}
