//! Idempotent schema migrations for the SQLite search backend.
//!
//! | Table | Holds |
//! |-------|-------|
//! | `indices` | One row per concrete index: name, creation time (ms), settings |
//! | `index_mappings` | Field mapping per (index, document type) |
//! | `aliases` | (alias, index) bindings |
//! | `documents` | Indexed documents keyed by (index, id) |
//! | `documents_fts` | FTS5 table over the mapped text fields of each document |

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index that does not exist yet.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS indices (
            name TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            settings_json TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_mappings (
            index_name TEXT NOT NULL,
            doc_type TEXT NOT NULL,
            mapping_json TEXT NOT NULL,
            PRIMARY KEY (index_name, doc_type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS aliases (
            alias TEXT NOT NULL,
            index_name TEXT NOT NULL,
            PRIMARY KEY (alias, index_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            index_name TEXT NOT NULL,
            id TEXT NOT NULL,
            doc_type TEXT NOT NULL,
            body_json TEXT NOT NULL,
            dedup_hash TEXT NOT NULL,
            indexed_at INTEGER NOT NULL,
            PRIMARY KEY (index_name, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='documents_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE documents_fts USING fts5(
                index_name UNINDEXED,
                doc_id UNINDEXED,
                text
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_aliases_index_name ON aliases(index_name)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_indices_created_at ON indices(created_at)")
        .execute(pool)
        .await?;

    Ok(())
}
