//! Operator views over the index generations of the configured alias.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use catalog_harvester_core::backend::SearchBackend;

use crate::config::Config;
use crate::lifecycle::{is_generation_of, retire_aged_indices};
use crate::sqlite_backend::SqliteBackend;

#[derive(Debug, Clone, PartialEq)]
pub struct IndexRow {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub documents: u64,
    pub aliased: bool,
}

/// Every generation of `alias`, oldest first.
pub async fn index_rows(backend: &dyn SearchBackend, alias: &str) -> Result<Vec<IndexRow>> {
    let bound = backend.get_alias_bindings(alias).await?;
    let mut rows = Vec::new();
    for (name, created_at) in backend.get_index_creation_times(alias).await? {
        if !is_generation_of(alias, &name) {
            continue;
        }
        let documents = backend.count_documents(&name).await?;
        rows.push(IndexRow {
            aliased: bound.contains(&name),
            name,
            created_at,
            documents,
        });
    }
    rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
    Ok(rows)
}

pub async fn list_indices(config: &Config) -> Result<()> {
    let backend = SqliteBackend::open(config).await?;
    let rows = index_rows(&backend, &config.index.alias).await?;

    if rows.is_empty() {
        println!("No indices found for alias '{}'.", config.index.alias);
        return Ok(());
    }

    println!("{:<28} {:<22} {:>8} ALIASED", "INDEX", "CREATED", "DOCS");
    for row in &rows {
        println!(
            "{:<28} {:<22} {:>8} {}",
            row.name,
            row.created_at.format("%Y-%m-%d %H:%M:%S"),
            row.documents,
            if row.aliased { "yes" } else { "" }
        );
    }

    backend.pool().close().await;
    Ok(())
}

/// Run only the retirement pass. `days` overrides `index.retention_days`.
pub async fn run_retire(config: &Config, days: Option<u32>) -> Result<Vec<String>> {
    let backend = SqliteBackend::open(config).await?;
    let retention = Duration::days(i64::from(days.unwrap_or(config.index.retention_days)));
    let retired = retire_aged_indices(&backend, &config.index.alias, retention, Utc::now()).await?;

    println!("retire {}", config.index.alias);
    for name in &retired {
        println!("  deleted: {}", name);
    }
    println!("  retired: {} index(es)", retired.len());
    println!("ok");

    backend.pool().close().await;
    Ok(retired)
}
