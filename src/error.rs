//! Error taxonomy for a harvest run.
//!
//! | Error | Scope | Effect |
//! |-------|-------|--------|
//! | [`SourceError`] | one source | recorded in the report, run continues |
//! | [`IndexWriteError`] | one document | logged, run continues |
//! | [`RetirementError`] | cleanup | logged, run continues |
//! | [`LifecycleError`] | whole run | run aborts with a non-zero exit |
//! | [`HarvestError`] | whole run | wraps every pipeline-fatal failure |

use catalog_harvester_core::backend::BackendError;
use catalog_harvester_core::normalize::SchemaDetectionError;

use crate::lifecycle::LifecycleState;
use crate::validate::ValidationIssue;

/// A per-source failure. Never propagates past the source boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("catalog could not be parsed: {0}")]
    Parse(String),

    #[error(transparent)]
    SchemaDetection(#[from] SchemaDetectionError),

    #[error("catalog failed schema validation with {} error(s)", .0.len())]
    Validation(Vec<ValidationIssue>),
}

impl SourceError {
    /// Report status for failures that leave no usable catalog.
    ///
    /// `None` for validation failures: the catalog was obtained, so the
    /// source still gets a compliance status.
    pub fn status(&self) -> Option<&'static str> {
        match self {
            Self::Fetch(_) => Some("FETCH_ERROR"),
            Self::Parse(_) => Some("PARSE_ERROR"),
            Self::SchemaDetection(_) => Some("SCHEMA_ERROR"),
            Self::Validation(_) => None,
        }
    }

    /// Human-readable issue lines for the report.
    pub fn issues(&self) -> Vec<String> {
        match self {
            Self::Validation(issues) => issues.iter().map(ToString::to_string).collect(),
            other => vec![other.to_string()],
        }
    }
}

/// A fatal index lifecycle failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LifecycleError {
    #[error("cannot {operation} while the index lifecycle is {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },

    #[error("refusing to finalize {index}: no documents were written")]
    EmptyIndex { index: String },

    #[error("{step} failed for index {index}: {source}")]
    Backend {
        step: &'static str,
        index: String,
        #[source]
        source: BackendError,
    },
}

/// Cleanup of aged indices failed. The alias swap has already happened.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetirementError {
    #[error("listing indices under prefix {prefix} failed: {source}")]
    List {
        prefix: String,
        #[source]
        source: BackendError,
    },

    #[error("listing alias bindings for {alias} failed: {source}")]
    Bindings {
        alias: String,
        #[source]
        source: BackendError,
    },

    #[error("deleting {} aged index(es) failed: {source}", .indices.len())]
    Delete {
        indices: Vec<String>,
        #[source]
        source: BackendError,
    },
}

/// One document could not be written.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndexWriteError {
    /// The manager is not accepting writes. Fatal for the run.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("failed to write document {id} to {index}: {source}")]
    Backend {
        index: String,
        id: String,
        #[source]
        source: BackendError,
    },

    #[error("failed to serialize release {id}: {message}")]
    Serialize { id: String, message: String },
}

/// A failure that aborts the whole run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HarvestError {
    #[error("index lifecycle failed: {0}")]
    Lifecycle(#[from] LifecycleError),
}
