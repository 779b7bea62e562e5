//! Structural validation of catalogs against the bundled code.json schemas.
//!
//! Both schema documents are compiled once in [`CatalogValidator::new`].
//! A catalog is checked as published, against the schema of its detected
//! version, before it is upgraded: a 1.0.1 catalog must satisfy the 1.0.1
//! schema. A non-conformant catalog yields a [`ValidationResult`] carrying
//! every issue found, never a Rust error.

use anyhow::{Context, Result};
use jsonschema::Validator;
use serde::Serialize;
use serde_json::Value;

use catalog_harvester_core::normalize::{Catalog, SchemaDetectionError, SchemaVersion};

const SCHEMA_1_0_1: &str = include_str!("../assets/schemas/code_1_0_1.json");
const SCHEMA_2_0_0: &str = include_str!("../assets/schemas/code_2_0_0.json");

/// One schema violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// JSON pointer to the offending value (`""` for the document root).
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "/: {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// `errors` is `None` on success and a non-empty list otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub errors: Option<Vec<ValidationIssue>>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_none()
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        self.errors.as_deref().unwrap_or(&[])
    }

    pub fn into_issues(self) -> Vec<ValidationIssue> {
        self.errors.unwrap_or_default()
    }
}

pub struct CatalogValidator {
    v101: Validator,
    v200: Validator,
}

impl CatalogValidator {
    /// Compile the bundled schemas.
    pub fn new() -> Result<Self> {
        Ok(Self {
            v101: compile(SCHEMA_1_0_1).context("code.json 1.0.1 schema")?,
            v200: compile(SCHEMA_2_0_0).context("code.json 2.0.0 schema")?,
        })
    }

    fn schema_for(&self, version: SchemaVersion) -> &Validator {
        match version {
            SchemaVersion::V101 => &self.v101,
            SchemaVersion::V200 => &self.v200,
        }
    }

    /// Validate a fetched catalog against the schema of its detected version.
    pub fn validate(&self, catalog: &Catalog) -> Result<ValidationResult, SchemaDetectionError> {
        let version = catalog.detect_version()?;
        let document = Value::Object(catalog.as_map().clone());
        Ok(self.validate_document(version, &document))
    }

    /// Validate an arbitrary document against the schema for `version`.
    pub fn validate_document(&self, version: SchemaVersion, document: &Value) -> ValidationResult {
        let issues: Vec<ValidationIssue> = self
            .schema_for(version)
            .iter_errors(document)
            .map(|e| ValidationIssue {
                path: e.instance_path.to_string(),
                message: e.to_string(),
            })
            .collect();

        ValidationResult {
            errors: if issues.is_empty() { None } else { Some(issues) },
        }
    }
}

fn compile(schema: &str) -> Result<Validator> {
    let schema: Value = serde_json::from_str(schema)?;
    jsonschema::validator_for(&schema).map_err(|e| anyhow::anyhow!("Invalid schema: {}", e))
}
