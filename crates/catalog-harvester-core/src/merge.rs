//! Release identity and the merged release set.
//!
//! Every release is keyed by `agency/name`, each component URL-escaped.
//! Names are only unique within one source, so prefixing the agency makes
//! the id unique across sources. When two releases share an id the one
//! merged last replaces the earlier one entirely.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::Release;

/// Build the global release id for `agency` and `name`.
pub fn release_id(agency: &str, name: &str) -> String {
    format!(
        "{}/{}",
        urlencoding::encode(agency),
        urlencoding::encode(name)
    )
}

/// Set `release.agency` and the derived `release.id`.
pub fn stamp(agency: &str, release: &mut Release) {
    release.agency = agency.to_string();
    release.id = release_id(agency, &release.name);
}

/// Releases from every harvested source, keyed by id.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ReleaseSet {
    releases: BTreeMap<String, Release>,
}

impl ReleaseSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp `agency` and `id` onto `release` and insert it.
    ///
    /// Returns the release it replaced, if any.
    pub fn merge(&mut self, agency: &str, mut release: Release) -> Option<Release> {
        stamp(agency, &mut release);
        self.releases.insert(release.id.clone(), release)
    }

    pub fn get(&self, id: &str) -> Option<&Release> {
        self.releases.get(id)
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Release> {
        self.releases.values()
    }
}
