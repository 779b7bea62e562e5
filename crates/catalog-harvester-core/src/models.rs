//! Core data models used throughout Catalog Harvester.
//!
//! These types represent the configured sources, the per-source compliance
//! requirements, and the canonical (2.0.0) release records that flow from
//! the harvest pipeline into the search index.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An organization publishing a code.json catalog.
///
/// Deserializes from both the data-sources metadata file (`name`, `codeUrl`,
/// `complianceDashboard`) and inline `[[sources]]` config tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(default)]
    pub id: Option<String>,
    pub acronym: String,
    #[serde(rename = "name", alias = "displayName", alias = "display_name")]
    pub display_name: String,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(rename = "codeUrl", alias = "catalogURL", alias = "catalog_url")]
    pub catalog_url: String,
    #[serde(
        default,
        rename = "complianceDashboard",
        alias = "complianceTracked",
        alias = "compliance_tracked"
    )]
    pub compliance_tracked: bool,
    #[serde(default)]
    pub requirements: Requirements,
}

/// Per-source compliance requirement fractions, each in `[0, 1]`.
///
/// `schema_format` and `overall_compliance` are written during a run;
/// the other three come from static configuration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Requirements {
    #[serde(default, alias = "agency_wide_policy")]
    pub agency_wide_policy: f64,
    #[serde(default, alias = "open_source_requirement")]
    pub open_source_requirement: f64,
    #[serde(default, alias = "inventory_requirement")]
    pub inventory_requirement: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_format: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_compliance: Option<f64>,
}

/// A single license entry under `permissions.licenses`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct License {
    #[serde(rename = "URL", default)]
    pub url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    #[serde(default)]
    pub licenses: Vec<License>,
    #[serde(default)]
    pub usage_type: Option<String>,
    #[serde(default)]
    pub exemption_text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseDate {
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub metadata_last_updated: Option<String>,
}

/// Canonical (schema 2.0.0) release record.
///
/// `id` and `agency` are empty until the release is merged into a
/// [`ReleaseSet`](crate::merge::ReleaseSet). Fields without a dedicated
/// member (description, tags, contact, ...) are carried in `extra` so that
/// the indexed document keeps everything the publisher sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub name: String,
    #[serde(rename = "repositoryURL", default)]
    pub repository_url: Option<String>,
    #[serde(rename = "homepageURL", default)]
    pub homepage_url: Option<String>,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default)]
    pub date: ReleaseDate,
    #[serde(default)]
    pub labor_hours: Option<f64>,
    #[serde(default)]
    pub vcs: Option<String>,
    #[serde(default)]
    pub disclaimer_text: Option<String>,
    #[serde(rename = "disclaimerURL", default)]
    pub disclaimer_url: Option<String>,
    #[serde(default)]
    pub related_code: Vec<Value>,
    #[serde(default)]
    pub reused_code: Vec<Value>,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub agency: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Release {
    /// Parse a canonical release record from its JSON form.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    /// Serialize to the JSON document written into the search index.
    pub fn to_document(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}
