//! Search-index backend abstraction.
//!
//! The [`SearchBackend`] trait is the full set of index, alias, and document
//! operations the index lifecycle needs. Implementations must give the same
//! observable semantics (see each method) so the lifecycle's guarantees hold
//! on any backend: the SQLite/FTS5 backend in the `catalog-harvester` crate,
//! or the [`memory::InMemoryBackend`] used in tests.
//!
//! All operations are async (via `async-trait`) and fail with a typed
//! [`BackendError`], so callers can apply a per-operation failure policy.

pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Failure reported by a [`SearchBackend`] call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("index already exists: {0}")]
    IndexAlreadyExists(String),

    #[error("alias {alias} is not bound to index {index}")]
    AliasNotFound { alias: String, index: String },

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// One step of an atomic alias update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasAction {
    Add { index: String, alias: String },
    Remove { index: String, alias: String },
}

impl AliasAction {
    pub fn add(index: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::Add {
            index: index.into(),
            alias: alias.into(),
        }
    }

    pub fn remove(index: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::Remove {
            index: index.into(),
            alias: alias.into(),
        }
    }
}

/// Everything needed to create one generation of an aliased index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDescriptor {
    /// Stable name readers query (e.g. `"repos"`).
    pub alias: String,
    /// Concrete index name: alias + creation timestamp.
    pub index: String,
    pub document_type: String,
    pub mapping: Value,
    pub settings: Value,
}

impl IndexDescriptor {
    /// Build a descriptor whose concrete name is `alias` + `YYYYMMDD_HHMMSS`.
    pub fn new(
        alias: impl Into<String>,
        document_type: impl Into<String>,
        mapping: Value,
        settings: Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        let alias = alias.into();
        let index = format!("{}{}", alias, created_at.format("%Y%m%d_%H%M%S"));
        Self {
            alias,
            index,
            document_type: document_type.into(),
            mapping,
            settings,
        }
    }
}

/// Abstract search-index backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`index_exists`](SearchBackend::index_exists) | Does a concrete index exist |
/// | [`create_index`](SearchBackend::create_index) | Create an empty index with settings |
/// | [`delete_index`](SearchBackend::delete_index) | Drop one index and its alias bindings |
/// | [`put_mapping`](SearchBackend::put_mapping) | Attach a field mapping for a document type |
/// | [`index_document`](SearchBackend::index_document) | Upsert one document by its `id` |
/// | [`force_merge`](SearchBackend::force_merge) | Collapse segments for stable scoring |
/// | [`get_alias_bindings`](SearchBackend::get_alias_bindings) | Indices an alias points at |
/// | [`alias_exists`](SearchBackend::alias_exists) | Is an alias bound anywhere |
/// | [`update_aliases`](SearchBackend::update_aliases) | Apply add/remove actions atomically |
/// | [`get_index_creation_times`](SearchBackend::get_index_creation_times) | Creation times under a prefix |
/// | [`delete_indices`](SearchBackend::delete_indices) | Drop several indices in one call |
/// | [`count_documents`](SearchBackend::count_documents) | Number of documents in an index |
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn index_exists(&self, name: &str) -> Result<bool, BackendError>;

    /// Fails with [`BackendError::IndexAlreadyExists`] if `name` exists.
    async fn create_index(&self, name: &str, settings: &Value) -> Result<(), BackendError>;

    /// Fails with [`BackendError::IndexNotFound`] if `name` does not exist.
    async fn delete_index(&self, name: &str) -> Result<(), BackendError>;

    async fn put_mapping(
        &self,
        name: &str,
        doc_type: &str,
        mapping: &Value,
    ) -> Result<(), BackendError>;

    /// Upsert `doc` keyed by its string `id` field. A document with the same
    /// id is replaced entirely.
    async fn index_document(
        &self,
        name: &str,
        doc_type: &str,
        doc: &Value,
    ) -> Result<(), BackendError>;

    async fn force_merge(&self, name: &str, max_segments: u32) -> Result<(), BackendError>;

    /// Sorted names of every index `alias` is bound to.
    async fn get_alias_bindings(&self, alias: &str) -> Result<Vec<String>, BackendError>;

    async fn alias_exists(&self, alias: &str) -> Result<bool, BackendError>;

    /// Apply every action or none. An `Add` to a missing index or a `Remove`
    /// of a binding that does not exist rejects the whole batch.
    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), BackendError>;

    async fn get_index_creation_times(
        &self,
        prefix: &str,
    ) -> Result<BTreeMap<String, DateTime<Utc>>, BackendError>;

    /// Delete every named index or none. An empty list is a no-op.
    async fn delete_indices(&self, names: &[String]) -> Result<(), BackendError>;

    async fn count_documents(&self, name: &str) -> Result<u64, BackendError>;
}

/// Extract the `id` every indexed document must carry.
pub fn document_id(doc: &Value) -> Result<&str, BackendError> {
    doc.get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| BackendError::InvalidDocument("document has no string `id`".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_descriptor_index_name() {
        let at = Utc.with_ymd_and_hms(2026, 3, 9, 14, 5, 7).unwrap();
        let d = IndexDescriptor::new("repos", "repo", json!({}), json!({}), at);
        assert_eq!(d.index, "repos20260309_140507");
        assert!(d.index.starts_with(&d.alias));
    }

    #[test]
    fn test_document_id() {
        assert_eq!(document_id(&json!({"id": "AA/X"})).unwrap(), "AA/X");
        assert!(document_id(&json!({"id": 4})).is_err());
        assert!(document_id(&json!({"id": ""})).is_err());
        assert!(document_id(&json!({"name": "X"})).is_err());
    }
}
