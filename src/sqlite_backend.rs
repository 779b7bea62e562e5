//! SQLite-backed [`SearchBackend`] implementation.
//!
//! Maps each backend operation onto the tables created by
//! [`migrate`](crate::migrate): concrete indices, their mappings, alias
//! bindings, stored documents and an FTS5 table over each document's mapped
//! text fields. Multi-row operations (alias batches, bulk deletes, document
//! upserts) run inside one transaction so they apply completely or not at all.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use catalog_harvester_core::backend::{document_id, AliasAction, BackendError, SearchBackend};

use crate::config::Config;
use crate::{db, migrate};

/// SQLite implementation of the [`SearchBackend`] trait.
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create an index with an explicit creation time.
    pub async fn create_index_at(
        &self,
        name: &str,
        settings: &Value,
        created_at: DateTime<Utc>,
    ) -> Result<(), BackendError> {
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO indices (name, created_at, settings_json) VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(created_at.timestamp_millis())
        .bind(settings.to_string())
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if inserted.rows_affected() == 0 {
            return Err(BackendError::IndexAlreadyExists(name.to_string()));
        }
        Ok(())
    }

    async fn require_index(&self, name: &str) -> Result<(), BackendError> {
        if self.index_exists(name).await? {
            Ok(())
        } else {
            Err(BackendError::IndexNotFound(name.to_string()))
        }
    }
}

fn storage(err: sqlx::Error) -> BackendError {
    BackendError::Storage(err.to_string())
}

fn dedup_hash(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Field paths whose mapping `type` is `text`, e.g. `["permissions", "licenses", "name"]`.
fn text_paths(mapping: &Value) -> Vec<Vec<String>> {
    let mut out = Vec::new();
    collect_text_paths(mapping, &mut Vec::new(), &mut out);
    out
}

fn collect_text_paths(node: &Value, prefix: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
    let Some(properties) = node.get("properties").and_then(Value::as_object) else {
        return;
    };
    for (field, spec) in properties {
        prefix.push(field.clone());
        if spec.get("type").and_then(Value::as_str) == Some("text") {
            out.push(prefix.clone());
        }
        collect_text_paths(spec, prefix, out);
        prefix.pop();
    }
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if !s.is_empty() => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

fn collect_strings_at(value: &Value, path: &[String], out: &mut Vec<String>) {
    if let Value::Array(items) = value {
        for item in items {
            collect_strings_at(item, path, out);
        }
        return;
    }
    match path.split_first() {
        None => collect_strings(value, out),
        Some((head, rest)) => {
            if let Some(child) = value.get(head) {
                collect_strings_at(child, rest, out);
            }
        }
    }
}

/// Full-text content of `doc`: the values of the mapping's text fields, or
/// every string leaf when there is no mapping (or it declares no text fields).
pub fn extract_text(mapping: Option<&Value>, doc: &Value) -> String {
    let paths = mapping.map(text_paths).unwrap_or_default();
    let mut parts = Vec::new();
    if paths.is_empty() {
        collect_strings(doc, &mut parts);
    } else {
        for path in &paths {
            collect_strings_at(doc, path, &mut parts);
        }
    }
    parts.join("\n")
}

#[async_trait]
impl SearchBackend for SqliteBackend {
    async fn index_exists(&self, name: &str) -> Result<bool, BackendError> {
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM indices WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(storage)
    }

    async fn create_index(&self, name: &str, settings: &Value) -> Result<(), BackendError> {
        self.create_index_at(name, settings, Utc::now()).await
    }

    async fn delete_index(&self, name: &str) -> Result<(), BackendError> {
        self.delete_indices(&[name.to_string()]).await
    }

    async fn put_mapping(
        &self,
        name: &str,
        doc_type: &str,
        mapping: &Value,
    ) -> Result<(), BackendError> {
        self.require_index(name).await?;
        sqlx::query(
            r#"
            INSERT INTO index_mappings (index_name, doc_type, mapping_json)
            VALUES (?, ?, ?)
            ON CONFLICT(index_name, doc_type) DO UPDATE SET
                mapping_json = excluded.mapping_json
            "#,
        )
        .bind(name)
        .bind(doc_type)
        .bind(mapping.to_string())
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn index_document(
        &self,
        name: &str,
        doc_type: &str,
        doc: &Value,
    ) -> Result<(), BackendError> {
        let id = document_id(doc)?;
        self.require_index(name).await?;

        let mapping_json: Option<String> = sqlx::query_scalar(
            "SELECT mapping_json FROM index_mappings WHERE index_name = ? AND doc_type = ?",
        )
        .bind(name)
        .bind(doc_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        let mapping = mapping_json
            .map(|m| serde_json::from_str::<Value>(&m))
            .transpose()
            .map_err(|e| BackendError::Storage(format!("stored mapping is corrupt: {}", e)))?;

        let body = doc.to_string();
        let text = extract_text(mapping.as_ref(), doc);
        let hash = dedup_hash(&body);

        let stored: Option<(String, String)> = sqlx::query_as(
            "SELECT doc_type, dedup_hash FROM documents WHERE index_name = ? AND id = ?",
        )
        .bind(name)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        if stored.is_some_and(|(stored_type, stored_hash)| {
            stored_type == doc_type && stored_hash == hash
        }) {
            // Unchanged; the stored row and its FTS entry are current.
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(storage)?;

        sqlx::query(
            r#"
            INSERT INTO documents (index_name, id, doc_type, body_json, dedup_hash, indexed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(index_name, id) DO UPDATE SET
                doc_type = excluded.doc_type,
                body_json = excluded.body_json,
                dedup_hash = excluded.dedup_hash,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(name)
        .bind(id)
        .bind(doc_type)
        .bind(&body)
        .bind(&hash)
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        sqlx::query("DELETE FROM documents_fts WHERE index_name = ? AND doc_id = ?")
            .bind(name)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        sqlx::query("INSERT INTO documents_fts (index_name, doc_id, text) VALUES (?, ?, ?)")
            .bind(name)
            .bind(id)
            .bind(&text)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn force_merge(&self, name: &str, _max_segments: u32) -> Result<(), BackendError> {
        self.require_index(name).await?;
        // FTS5 optimize always merges down to a single b-tree.
        sqlx::query("INSERT INTO documents_fts(documents_fts) VALUES('optimize')")
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn get_alias_bindings(&self, alias: &str) -> Result<Vec<String>, BackendError> {
        sqlx::query_scalar("SELECT index_name FROM aliases WHERE alias = ? ORDER BY index_name")
            .bind(alias)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)
    }

    async fn alias_exists(&self, alias: &str) -> Result<bool, BackendError> {
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM aliases WHERE alias = ?")
            .bind(alias)
            .fetch_one(&self.pool)
            .await
            .map_err(storage)
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), BackendError> {
        // Dropping the transaction on an early return rolls the batch back.
        let mut tx = self.pool.begin().await.map_err(storage)?;

        for action in actions {
            match action {
                AliasAction::Add { index, alias } => {
                    let exists: bool =
                        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM indices WHERE name = ?")
                            .bind(index)
                            .fetch_one(&mut *tx)
                            .await
                            .map_err(storage)?;
                    if !exists {
                        return Err(BackendError::IndexNotFound(index.clone()));
                    }
                    sqlx::query("INSERT OR IGNORE INTO aliases (alias, index_name) VALUES (?, ?)")
                        .bind(alias)
                        .bind(index)
                        .execute(&mut *tx)
                        .await
                        .map_err(storage)?;
                }
                AliasAction::Remove { index, alias } => {
                    let removed =
                        sqlx::query("DELETE FROM aliases WHERE alias = ? AND index_name = ?")
                            .bind(alias)
                            .bind(index)
                            .execute(&mut *tx)
                            .await
                            .map_err(storage)?;
                    if removed.rows_affected() == 0 {
                        return Err(BackendError::AliasNotFound {
                            alias: alias.clone(),
                            index: index.clone(),
                        });
                    }
                }
            }
        }

        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn get_index_creation_times(
        &self,
        prefix: &str,
    ) -> Result<BTreeMap<String, DateTime<Utc>>, BackendError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT name, created_at FROM indices WHERE substr(name, 1, length(?)) = ?",
        )
        .bind(prefix)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.into_iter()
            .map(|(name, millis)| {
                DateTime::from_timestamp_millis(millis)
                    .map(|at| (name.clone(), at))
                    .ok_or_else(|| {
                        BackendError::Storage(format!(
                            "index {} has an invalid creation time: {}",
                            name, millis
                        ))
                    })
            })
            .collect()
    }

    async fn delete_indices(&self, names: &[String]) -> Result<(), BackendError> {
        if names.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(storage)?;

        for name in names {
            let deleted = sqlx::query("DELETE FROM indices WHERE name = ?")
                .bind(name)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
            if deleted.rows_affected() == 0 {
                return Err(BackendError::IndexNotFound(name.clone()));
            }
            for table in ["documents_fts", "documents", "index_mappings", "aliases"] {
                let sql = format!("DELETE FROM {} WHERE index_name = ?", table);
                sqlx::query(&sql)
                    .bind(name)
                    .execute(&mut *tx)
                    .await
                    .map_err(storage)?;
            }
        }

        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn count_documents(&self, name: &str) -> Result<u64, BackendError> {
        self.require_index(name).await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE index_name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_paths_follow_nested_properties() {
        let mapping = json!({
            "properties": {
                "id": {"type": "keyword"},
                "name": {"type": "text"},
                "permissions": {
                    "properties": {
                        "licenses": {"properties": {"name": {"type": "text"}}}
                    }
                }
            }
        });
        let paths = text_paths(&mapping);
        assert_eq!(
            paths,
            vec![
                vec!["name".to_string()],
                vec![
                    "permissions".to_string(),
                    "licenses".to_string(),
                    "name".to_string()
                ],
            ]
        );
    }

    #[test]
    fn test_extract_text_uses_mapped_fields_only() {
        let mapping = json!({
            "properties": {
                "name": {"type": "text"},
                "tags": {"type": "text"},
                "repositoryURL": {"type": "keyword"},
                "permissions": {
                    "properties": {"licenses": {"properties": {"name": {"type": "text"}}}}
                }
            }
        });
        let doc = json!({
            "id": "AA/X",
            "name": "Widget",
            "tags": ["alpha", "beta"],
            "repositoryURL": "https://example.com/x",
            "permissions": {"licenses": [{"name": "MIT"}, {"name": "Apache-2.0"}]}
        });
        let text = extract_text(Some(&mapping), &doc);
        assert!(text.contains("Widget"));
        assert!(text.contains("beta"));
        assert!(text.contains("Apache-2.0"));
        assert!(!text.contains("example.com"));
    }

    #[test]
    fn test_extract_text_without_mapping_takes_all_strings() {
        let doc = json!({"id": "AA/X", "nested": {"note": "hello"}, "n": 4});
        let text = extract_text(None, &doc);
        assert!(text.contains("AA/X"));
        assert!(text.contains("hello"));
    }

    #[test]
    fn test_dedup_hash_is_stable() {
        assert_eq!(dedup_hash("{}"), dedup_hash("{}"));
        assert_ne!(dedup_hash("{}"), dedup_hash("[]"));
        assert_eq!(dedup_hash("{}").len(), 64);
    }
}
