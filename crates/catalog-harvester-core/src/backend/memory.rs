//! In-memory [`SearchBackend`] implementation for testing and dry runs.
//!
//! All state sits behind one `std::sync::RwLock`, so alias batches and
//! multi-index deletes are atomic with respect to every other call. Each
//! indexed document adds a segment; [`force_merge`](SearchBackend::force_merge)
//! collapses them, which lets tests observe that optimization happened.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{document_id, AliasAction, BackendError, SearchBackend};

struct StoredIndex {
    created_at: DateTime<Utc>,
    _settings: Value,
    mappings: BTreeMap<String, Value>,
    documents: BTreeMap<String, Value>,
    segments: u32,
}

#[derive(Default)]
struct State {
    indices: BTreeMap<String, StoredIndex>,
    aliases: BTreeMap<String, BTreeSet<String>>,
}

/// In-memory backend for tests and dry runs.
#[derive(Default)]
pub struct InMemoryBackend {
    state: RwLock<State>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, BackendError> {
        self.state
            .read()
            .map_err(|_| BackendError::Storage("in-memory state lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, BackendError> {
        self.state
            .write()
            .map_err(|_| BackendError::Storage("in-memory state lock poisoned".to_string()))
    }

    /// Create an index with an explicit creation time (to seed aged indices).
    pub fn create_index_at(
        &self,
        name: &str,
        settings: &Value,
        created_at: DateTime<Utc>,
    ) -> Result<(), BackendError> {
        let mut state = self.write()?;
        if state.indices.contains_key(name) {
            return Err(BackendError::IndexAlreadyExists(name.to_string()));
        }
        state.indices.insert(
            name.to_string(),
            StoredIndex {
                created_at,
                _settings: settings.clone(),
                mappings: BTreeMap::new(),
                documents: BTreeMap::new(),
                segments: 0,
            },
        );
        Ok(())
    }

    /// Current segment count for `name`, if it exists.
    pub fn segment_count(&self, name: &str) -> Option<u32> {
        self.read()
            .ok()
            .and_then(|s| s.indices.get(name).map(|i| i.segments))
    }

    /// The stored document `id` in index `name`.
    pub fn document(&self, name: &str, id: &str) -> Option<Value> {
        self.read()
            .ok()
            .and_then(|s| s.indices.get(name).and_then(|i| i.documents.get(id).cloned()))
    }

    /// The mapping stored for `doc_type` on index `name`.
    pub fn mapping(&self, name: &str, doc_type: &str) -> Option<Value> {
        self.read()
            .ok()
            .and_then(|s| s.indices.get(name).and_then(|i| i.mappings.get(doc_type).cloned()))
    }

    pub fn index_names(&self) -> Vec<String> {
        self.read()
            .map(|s| s.indices.keys().cloned().collect())
            .unwrap_or_default()
    }
}

fn unbind_everywhere(state: &mut State, index: &str) {
    for bound in state.aliases.values_mut() {
        bound.remove(index);
    }
    state.aliases.retain(|_, bound| !bound.is_empty());
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    async fn index_exists(&self, name: &str) -> Result<bool, BackendError> {
        Ok(self.read()?.indices.contains_key(name))
    }

    async fn create_index(&self, name: &str, settings: &Value) -> Result<(), BackendError> {
        self.create_index_at(name, settings, Utc::now())
    }

    async fn delete_index(&self, name: &str) -> Result<(), BackendError> {
        let mut state = self.write()?;
        if state.indices.remove(name).is_none() {
            return Err(BackendError::IndexNotFound(name.to_string()));
        }
        unbind_everywhere(&mut *state, name);
        Ok(())
    }

    async fn put_mapping(
        &self,
        name: &str,
        doc_type: &str,
        mapping: &Value,
    ) -> Result<(), BackendError> {
        let mut state = self.write()?;
        let index = state
            .indices
            .get_mut(name)
            .ok_or_else(|| BackendError::IndexNotFound(name.to_string()))?;
        index.mappings.insert(doc_type.to_string(), mapping.clone());
        Ok(())
    }

    async fn index_document(
        &self,
        name: &str,
        _doc_type: &str,
        doc: &Value,
    ) -> Result<(), BackendError> {
        let id = document_id(doc)?.to_string();
        let mut state = self.write()?;
        let index = state
            .indices
            .get_mut(name)
            .ok_or_else(|| BackendError::IndexNotFound(name.to_string()))?;
        index.documents.insert(id, doc.clone());
        index.segments += 1;
        Ok(())
    }

    async fn force_merge(&self, name: &str, max_segments: u32) -> Result<(), BackendError> {
        let mut state = self.write()?;
        let index = state
            .indices
            .get_mut(name)
            .ok_or_else(|| BackendError::IndexNotFound(name.to_string()))?;
        index.segments = index.segments.min(max_segments.max(1));
        Ok(())
    }

    async fn get_alias_bindings(&self, alias: &str) -> Result<Vec<String>, BackendError> {
        Ok(self
            .read()?
            .aliases
            .get(alias)
            .map(|bound| bound.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn alias_exists(&self, alias: &str) -> Result<bool, BackendError> {
        Ok(self
            .read()?
            .aliases
            .get(alias)
            .is_some_and(|bound| !bound.is_empty()))
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), BackendError> {
        let mut state = self.write()?;

        // Apply to a scratch copy so a rejected batch leaves nothing behind.
        let mut aliases = state.aliases.clone();
        for action in actions {
            match action {
                AliasAction::Add { index, alias } => {
                    if !state.indices.contains_key(index) {
                        return Err(BackendError::IndexNotFound(index.clone()));
                    }
                    aliases
                        .entry(alias.clone())
                        .or_default()
                        .insert(index.clone());
                }
                AliasAction::Remove { index, alias } => {
                    let removed = aliases
                        .get_mut(alias)
                        .map(|bound| bound.remove(index))
                        .unwrap_or(false);
                    if !removed {
                        return Err(BackendError::AliasNotFound {
                            alias: alias.clone(),
                            index: index.clone(),
                        });
                    }
                }
            }
        }
        aliases.retain(|_, bound| !bound.is_empty());
        state.aliases = aliases;
        Ok(())
    }

    async fn get_index_creation_times(
        &self,
        prefix: &str,
    ) -> Result<BTreeMap<String, DateTime<Utc>>, BackendError> {
        Ok(self
            .read()?
            .indices
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, index)| (name.clone(), index.created_at))
            .collect())
    }

    async fn delete_indices(&self, names: &[String]) -> Result<(), BackendError> {
        let mut state = self.write()?;
        if let Some(missing) = names.iter().find(|n| !state.indices.contains_key(*n)) {
            return Err(BackendError::IndexNotFound(missing.clone()));
        }
        for name in names {
            state.indices.remove(name);
            unbind_everywhere(&mut *state, name);
        }
        Ok(())
    }

    async fn count_documents(&self, name: &str) -> Result<u64, BackendError> {
        self.read()?
            .indices
            .get(name)
            .map(|i| i.documents.len() as u64)
            .ok_or_else(|| BackendError::IndexNotFound(name.to_string()))
    }
}
