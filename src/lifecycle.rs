//! Index lifecycle: create → populate → optimize → alias swap → retire.
//!
//! [`IndexLifecycleManager`] owns one generation of an aliased index. Readers
//! always query the alias, which keeps pointing at the previous generation
//! until the single batched alias update in [`finalize`] flips it.
//!
//! ```text
//! Absent ─open─▶ Creating ─▶ Populating ─finalize─▶ Optimizing ─▶ Swapping ─▶ Retiring ─▶ Done
//!                   │                                    │             │
//!                   └────────────────────────────────────┴─────────────┴──▶ Failed
//! ```
//!
//! Failures while creating, optimizing or swapping are fatal
//! ([`LifecycleError`]). Failures while retiring are logged and reported in
//! [`FinalizeReport::retirement_error`]; the swap has already happened.
//!
//! [`finalize`]: IndexLifecycleManager::finalize

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde_json::Value;

use catalog_harvester_core::backend::{
    document_id, AliasAction, BackendError, IndexDescriptor, SearchBackend,
};

use crate::error::{IndexWriteError, LifecycleError, RetirementError};

const COMPONENT: &str = "index-lifecycle";
const SWAP_COMPONENT: &str = "alias-swapper";
const CLEANER_COMPONENT: &str = "index-cleaner";

/// Suffix appended to the alias to name each generation.
pub const INDEX_SUFFIX_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Absent,
    Creating,
    Populating,
    Optimizing,
    Swapping,
    Retiring,
    Done,
    Failed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "ABSENT",
            Self::Creating => "CREATING",
            Self::Populating => "POPULATING",
            Self::Optimizing => "OPTIMIZING",
            Self::Swapping => "SWAPPING",
            Self::Retiring => "RETIRING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful [`IndexLifecycleManager::finalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeReport {
    /// The index the alias now points at.
    pub index: String,
    pub documents: u64,
    /// Indices the alias was bound to before the swap.
    pub previous: Vec<String>,
    /// Aged indices deleted by the retirement pass.
    pub retired: Vec<String>,
    pub retirement_error: Option<RetirementError>,
}

pub struct IndexLifecycleManager {
    backend: Arc<dyn SearchBackend>,
    retention: Duration,
    state: LifecycleState,
    descriptor: Option<IndexDescriptor>,
    documents_written: u64,
}

impl IndexLifecycleManager {
    pub fn new(backend: Arc<dyn SearchBackend>, retention_days: u32) -> Self {
        Self {
            backend,
            retention: Duration::days(i64::from(retention_days)),
            state: LifecycleState::Absent,
            descriptor: None,
            documents_written: 0,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Name of the index being built, once [`open`](Self::open) was called.
    pub fn index_name(&self) -> Option<&str> {
        self.descriptor.as_ref().map(|d| d.index.as_str())
    }

    pub fn documents_written(&self) -> u64 {
        self.documents_written
    }

    fn guard(
        &self,
        operation: &'static str,
        expected: LifecycleState,
    ) -> Result<(), LifecycleError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(LifecycleError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn fail(&mut self, step: &'static str, index: &str, source: BackendError) -> LifecycleError {
        self.state = LifecycleState::Failed;
        tracing::error!(
            component = COMPONENT,
            %index,
            step,
            error = %source,
            "index lifecycle failed"
        );
        LifecycleError::Backend {
            step,
            index: index.to_string(),
            source,
        }
    }

    /// Create a fresh index for `descriptor` and apply its mapping.
    ///
    /// An index with the same concrete name is deleted first.
    pub async fn open(&mut self, descriptor: IndexDescriptor) -> Result<(), LifecycleError> {
        self.guard("open", LifecycleState::Absent)?;
        self.state = LifecycleState::Creating;
        let index = descriptor.index.clone();
        let backend = Arc::clone(&self.backend);

        match backend.index_exists(&index).await {
            Ok(true) => {
                tracing::info!(
                    component = COMPONENT,
                    %index,
                    "index already exists, deleting it first"
                );
                if let Err(e) = backend.delete_index(&index).await {
                    return Err(self.fail("delete existing index", &index, e));
                }
            }
            Ok(false) => {}
            Err(e) => return Err(self.fail("check index existence", &index, e)),
        }

        if let Err(e) = backend.create_index(&index, &descriptor.settings).await {
            return Err(self.fail("create index", &index, e));
        }
        if let Err(e) = backend
            .put_mapping(&index, &descriptor.document_type, &descriptor.mapping)
            .await
        {
            return Err(self.fail("put mapping", &index, e));
        }

        tracing::info!(component = COMPONENT, %index, alias = %descriptor.alias, "index created");
        self.descriptor = Some(descriptor);
        self.state = LifecycleState::Populating;
        Ok(())
    }

    /// Write one document into the index being built.
    ///
    /// Backend failures are returned as recoverable
    /// [`IndexWriteError::Backend`]; the manager stays in `Populating`.
    pub async fn index(&mut self, doc: &Value) -> Result<(), IndexWriteError> {
        self.guard("index a document", LifecycleState::Populating)?;
        let Some(descriptor) = self.descriptor.as_ref() else {
            return Err(LifecycleError::InvalidState {
                operation: "index a document",
                state: self.state,
            }
            .into());
        };

        match self
            .backend
            .index_document(&descriptor.index, &descriptor.document_type, doc)
            .await
        {
            Ok(()) => {
                self.documents_written += 1;
                Ok(())
            }
            Err(source) => Err(IndexWriteError::Backend {
                index: descriptor.index.clone(),
                id: document_id(doc).unwrap_or("<missing id>").to_string(),
                source,
            }),
        }
    }

    /// Optimize, swap the alias onto the new index, then retire aged indices.
    pub async fn finalize(&mut self) -> Result<FinalizeReport, LifecycleError> {
        self.guard("finalize", LifecycleState::Populating)?;
        let Some(descriptor) = self.descriptor.clone() else {
            return Err(LifecycleError::InvalidState {
                operation: "finalize",
                state: self.state,
            });
        };
        let index = descriptor.index.as_str();
        if self.documents_written == 0 {
            return Err(LifecycleError::EmptyIndex {
                index: index.to_string(),
            });
        }
        let backend = Arc::clone(&self.backend);

        self.state = LifecycleState::Optimizing;
        if let Err(e) = backend.force_merge(index, 1).await {
            return Err(self.fail("force merge", index, e));
        }
        tracing::info!(component = COMPONENT, %index, "index optimized");

        self.state = LifecycleState::Swapping;
        let previous = match swap_alias(backend.as_ref(), &descriptor.alias, index).await {
            Ok(previous) => previous,
            Err(e) => return Err(self.fail("alias swap", index, e)),
        };

        self.state = LifecycleState::Retiring;
        let retirement =
            retire_aged_indices(backend.as_ref(), &descriptor.alias, self.retention, Utc::now())
                .await;
        let (retired, retirement_error) = match retirement {
            Ok(retired) => (retired, None),
            Err(e) => {
                tracing::warn!(
                    component = CLEANER_COMPONENT,
                    error = %e,
                    "retirement failed; will retry next run"
                );
                (Vec::new(), Some(e))
            }
        };

        self.state = LifecycleState::Done;
        Ok(FinalizeReport {
            index: index.to_string(),
            documents: self.documents_written,
            previous,
            retired,
            retirement_error,
        })
    }
}

/// Point `alias` at `index` alone, in one batched update.
///
/// Returns the indices the alias was bound to before.
pub async fn swap_alias(
    backend: &dyn SearchBackend,
    alias: &str,
    index: &str,
) -> Result<Vec<String>, BackendError> {
    let previous = if backend.alias_exists(alias).await? {
        backend.get_alias_bindings(alias).await?
    } else {
        tracing::info!(component = SWAP_COMPONENT, %alias, "alias does not exist yet");
        Vec::new()
    };

    let mut actions: Vec<AliasAction> = previous
        .iter()
        .filter(|bound| bound.as_str() != index)
        .map(|bound| AliasAction::remove(bound.as_str(), alias))
        .collect();
    actions.push(AliasAction::add(index, alias));

    backend.update_aliases(&actions).await?;
    tracing::info!(
        component = SWAP_COMPONENT,
        %alias,
        %index,
        previous = ?previous,
        "alias swapped"
    );
    Ok(previous)
}

/// Whether `name` is a generation of `alias`: the alias followed by a
/// creation timestamp. Used to list generations; retirement matches on the
/// prefix alone.
pub fn is_generation_of(alias: &str, name: &str) -> bool {
    name.strip_prefix(alias)
        .is_some_and(|suffix| NaiveDateTime::parse_from_str(suffix, INDEX_SUFFIX_FORMAT).is_ok())
}

/// Delete every index whose name starts with `alias`, created before
/// `now - retention`, that the alias is not currently bound to.
///
/// Returns the deleted index names.
pub async fn retire_aged_indices(
    backend: &dyn SearchBackend,
    alias: &str,
    retention: Duration,
    now: DateTime<Utc>,
) -> Result<Vec<String>, RetirementError> {
    let created = backend
        .get_index_creation_times(alias)
        .await
        .map_err(|source| RetirementError::List {
            prefix: alias.to_string(),
            source,
        })?;
    let bound: BTreeSet<String> = backend
        .get_alias_bindings(alias)
        .await
        .map_err(|source| RetirementError::Bindings {
            alias: alias.to_string(),
            source,
        })?
        .into_iter()
        .collect();

    let cutoff = now - retention;
    let aged: Vec<String> = created
        .into_iter()
        .filter(|(name, created_at)| *created_at < cutoff && !bound.contains(name))
        .map(|(name, _)| name)
        .collect();

    if aged.is_empty() {
        tracing::debug!(component = CLEANER_COMPONENT, %alias, "no aged indices to retire");
        return Ok(aged);
    }

    backend
        .delete_indices(&aged)
        .await
        .map_err(|source| RetirementError::Delete {
            indices: aged.clone(),
            source,
        })?;
    tracing::info!(component = CLEANER_COMPONENT, %alias, retired = ?aged, "aged indices deleted");
    Ok(aged)
}
