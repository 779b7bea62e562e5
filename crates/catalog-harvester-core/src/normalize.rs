//! Catalog schema-version detection and upgrade.
//!
//! Publishers still serve two catalog shapes: the legacy 1.0.x shape with a
//! `projects` array, and the canonical 2.0.0 shape with a `releases` array.
//! [`normalize`] detects which one a document is and rewrites legacy
//! documents into the canonical shape. Canonical documents pass through
//! untouched, so normalizing twice is the same as normalizing once.
//!
//! # Detection precedence
//!
//! 1. An explicit, recognized `version` field.
//! 2. A `projects` field ⇒ 1.0.1.
//! 3. A `releases` field ⇒ 2.0.0.
//! 4. Otherwise [`SchemaDetectionError`].

use serde_json::{json, Map, Value};

/// Version string written into upgraded catalogs.
pub const CANONICAL_VERSION: &str = "2.0.0";

/// The catalog schema versions the harvester understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SchemaVersion {
    /// Legacy `projects` shape (1.0.0 and 1.0.1 share it).
    V101,
    /// Canonical `releases` shape.
    V200,
}

impl SchemaVersion {
    /// Parse an explicit `version` value. Unrecognized values yield `None`.
    pub fn parse(version: &str) -> Option<Self> {
        let version = version.trim();
        let mut parts = version.split('.');
        let major = parts.next()?;
        let rest: Vec<&str> = parts.collect();
        if rest.len() > 2 || rest.iter().any(|p| p.is_empty() || !is_digits(p)) {
            return None;
        }
        match major {
            "2" => Some(Self::V200),
            "1" => match rest.as_slice() {
                [] | ["0"] | ["0", "0"] | ["0", "1"] => Some(Self::V101),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V101 => "1.0.1",
            Self::V200 => "2.0.0",
        }
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_digits(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_digit())
}

/// The catalog's shape could not be determined.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaDetectionError {
    #[error("catalog is not a JSON object")]
    NotAnObject,
    #[error(
        "catalog version could not be determined (version: {}); \
         expected a recognized version, `projects`, or `releases`",
        version.as_deref().unwrap_or("absent")
    )]
    Unrecognized { version: Option<String> },
}

/// A raw fetched catalog document.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    document: Map<String, Value>,
}

impl Catalog {
    pub fn from_value(value: Value) -> Result<Self, SchemaDetectionError> {
        match value {
            Value::Object(document) => Ok(Self { document }),
            _ => Err(SchemaDetectionError::NotAnObject),
        }
    }

    /// The explicit `version` field, if it is a string.
    pub fn version(&self) -> Option<&str> {
        self.document.get("version").and_then(Value::as_str)
    }

    /// The publishing organization's name (`agency`, or legacy `agencyName`).
    pub fn agency_name(&self) -> Option<&str> {
        self.document
            .get("agency")
            .or_else(|| self.document.get("agencyName"))
            .and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.document
    }

    /// Detect the schema version following the documented precedence.
    pub fn detect_version(&self) -> Result<SchemaVersion, SchemaDetectionError> {
        if let Some(version) = self.version().and_then(SchemaVersion::parse) {
            return Ok(version);
        }
        if self.document.contains_key("projects") {
            return Ok(SchemaVersion::V101);
        }
        if self.document.contains_key("releases") {
            return Ok(SchemaVersion::V200);
        }
        Err(SchemaDetectionError::Unrecognized {
            version: self.document.get("version").map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
        })
    }
}

/// A catalog in canonical 2.0.0 shape.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalCatalog {
    source_version: SchemaVersion,
    document: Map<String, Value>,
}

impl CanonicalCatalog {
    /// The version the catalog was published in, before any upgrade.
    pub fn source_version(&self) -> SchemaVersion {
        self.source_version
    }

    /// The shape the document is in now. Always [`SchemaVersion::V200`].
    pub fn version(&self) -> SchemaVersion {
        SchemaVersion::V200
    }

    pub fn agency_name(&self) -> Option<&str> {
        self.document
            .get("agency")
            .or_else(|| self.document.get("agencyName"))
            .and_then(Value::as_str)
    }

    /// The raw release records. Empty when `releases` is absent or not an array.
    pub fn releases(&self) -> &[Value] {
        self.document
            .get("releases")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.document.clone())
    }

    pub fn into_catalog(self) -> Catalog {
        Catalog {
            document: self.document,
        }
    }
}

/// Detect a catalog's version and upgrade it to the canonical shape.
pub fn normalize(catalog: Catalog) -> Result<CanonicalCatalog, SchemaDetectionError> {
    let source_version = catalog.detect_version()?;
    let mut document = catalog.document;

    if source_version == SchemaVersion::V101 {
        let records = document
            .remove("projects")
            .or_else(|| document.remove("releases"))
            .and_then(|v| match v {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .unwrap_or_default();

        let releases = records
            .into_iter()
            .map(|record| match record {
                Value::Object(project) => Value::Object(upgrade_project(project)),
                other => other,
            })
            .collect();

        document.insert("version".to_string(), json!(CANONICAL_VERSION));
        document.insert("releases".to_string(), Value::Array(releases));
    }

    Ok(CanonicalCatalog {
        source_version,
        document,
    })
}

const EXEMPT_BY_LAW: &str = "The sharing of the source code is restricted by law or \
regulation, including\u{2014}but not limited to\u{2014}patent or intellectual property law, the \
Export Asset Regulations, the International Traffic in Arms Regulation, and the Federal laws \
and regulations governing classified information.";
const EXEMPT_BY_NATIONAL_SECURITY: &str = "The sharing of the source code would create an \
identifiable risk to the detriment of national security, confidentiality of Government \
information, or individual privacy.";
const EXEMPT_BY_AGENCY_SYSTEM: &str = "The sharing of the source code would create an \
identifiable risk to the stability, security, or integrity of the agency\u{2019}s systems or \
personnel.";
const EXEMPT_BY_AGENCY_MISSION: &str = "The sharing of the source code would create an \
identifiable risk to agency mission, programs, or operations.";
const EXEMPT_BY_CIO: &str =
    "The CIO believes it is in the national interest to exempt sharing the source code.";

/// Legacy `exemption` code → (usageType, exemptionText).
fn exemption_usage(code: &str) -> Option<(&'static str, &'static str)> {
    match code {
        "1" => Some(("exemptByLaw", EXEMPT_BY_LAW)),
        "2" => Some(("exemptByNationalSecurity", EXEMPT_BY_NATIONAL_SECURITY)),
        "3" => Some(("exemptByAgencySystem", EXEMPT_BY_AGENCY_SYSTEM)),
        "4" => Some(("exemptByAgencyMission", EXEMPT_BY_AGENCY_MISSION)),
        "5" => Some(("exemptByCIO", EXEMPT_BY_CIO)),
        _ => None,
    }
}

/// Render a JSON value the way a JavaScript `String(x)` would for the
/// scalar types publishers put in `exemption`.
fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn is_one(value: Option<&Value>) -> bool {
    value.and_then(Value::as_f64) == Some(1.0)
}

/// Upgrade one 1.0.1 project record to a 2.0.0 release record.
///
/// Every step only fires when its legacy input is present or its canonical
/// output is missing, so a record that is already canonical comes back
/// unchanged.
pub fn upgrade_project(mut project: Map<String, Value>) -> Map<String, Value> {
    if let Some(repository) = project.remove("repository") {
        project.insert("repositoryURL".to_string(), repository);
    }
    if let Some(homepage) = project.remove("homepage") {
        project.insert("homepageURL".to_string(), homepage);
    }

    upgrade_permissions(&mut project);

    if !project.contains_key("laborHours") {
        project.insert("laborHours".to_string(), Value::Null);
    }

    upgrade_updated_to_date(&mut project);
    fill_optional_fields(&mut project);

    project
}

const LEGACY_PERMISSION_KEYS: [&str; 5] = [
    "license",
    "openSourceProject",
    "governmentWideReuseProject",
    "exemption",
    "exemptionText",
];

fn upgrade_permissions(project: &mut Map<String, Value>) {
    let has_legacy = LEGACY_PERMISSION_KEYS
        .iter()
        .any(|k| project.contains_key(*k));
    if project.contains_key("permissions") && !has_legacy {
        return;
    }

    let license_url = match project.get("license") {
        Some(Value::Null) | None => Value::Null,
        Some(Value::String(s)) if s.is_empty() => Value::Null,
        Some(other) => other.clone(),
    };

    let (usage_type, exemption_text) = if is_one(project.get("openSourceProject")) {
        (json!("openSource"), Value::Null)
    } else if is_one(project.get("governmentWideReuseProject")) {
        (json!("governmentWideReuse"), Value::Null)
    } else {
        match project
            .get("exemption")
            .map(coerce_to_string)
            .as_deref()
            .and_then(exemption_usage)
        {
            Some((usage, text)) => (json!(usage), json!(text)),
            None => (Value::Null, Value::Null),
        }
    };

    for key in LEGACY_PERMISSION_KEYS {
        project.remove(key);
    }

    project.insert(
        "permissions".to_string(),
        json!({
            "licenses": [{ "URL": license_url, "name": null }],
            "usageType": usage_type,
            "exemptionText": exemption_text,
        }),
    );
}

fn upgrade_updated_to_date(project: &mut Map<String, Value>) {
    let updated = project.remove("updated");
    if updated.is_none() && project.contains_key("date") {
        return;
    }

    let pick = |key: &str| {
        updated
            .as_ref()
            .and_then(|u| u.get(key))
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| json!(""))
    };

    project.insert(
        "date".to_string(),
        json!({
            "created": "",
            "lastModified": pick("sourceCodeLastModified"),
            "metadataLastUpdated": pick("metadataLastUpdated"),
        }),
    );
}

fn fill_optional_fields(project: &mut Map<String, Value>) {
    for key in ["vcs", "disclaimerText", "disclaimerURL"] {
        project.entry(key).or_insert_with(|| json!(""));
    }
    project
        .entry("relatedCode")
        .or_insert_with(|| json!([{ "codeName": "", "codeURL": "", "isGovernmentRepo": false }]));
    project
        .entry("reusedCode")
        .or_insert_with(|| json!([{ "name": "", "URL": "" }]));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(value: Value) -> Catalog {
        Catalog::from_value(value).unwrap()
    }

    fn legacy_project(extra: Value) -> Map<String, Value> {
        let mut project = json!({
            "name": "Legacy Tool",
            "description": "An old project",
            "repository": "https://example.gov/legacy",
            "homepage": "https://example.gov",
            "license": "https://example.gov/LICENSE",
            "updated": {
                "sourceCodeLastModified": "2016-04-01",
                "metadataLastUpdated": "2016-05-01"
            }
        });
        if let (Value::Object(base), Value::Object(extra)) = (&mut project, extra) {
            base.extend(extra);
        }
        match project {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_version_parse() {
        assert_eq!(SchemaVersion::parse("2.0.0"), Some(SchemaVersion::V200));
        assert_eq!(SchemaVersion::parse("2"), Some(SchemaVersion::V200));
        assert_eq!(SchemaVersion::parse("2.1"), Some(SchemaVersion::V200));
        assert_eq!(SchemaVersion::parse("1.0.1"), Some(SchemaVersion::V101));
        assert_eq!(SchemaVersion::parse("1.0.0"), Some(SchemaVersion::V101));
        assert_eq!(SchemaVersion::parse("3.0.0"), None);
        assert_eq!(SchemaVersion::parse("1.2"), None);
        assert_eq!(SchemaVersion::parse("2.0.0.0"), None);
        assert_eq!(SchemaVersion::parse("v2"), None);
    }

    #[test]
    fn test_detection_precedence() {
        // Explicit version wins over field presence.
        let c = catalog(json!({"version": "2.0.0", "projects": []}));
        assert_eq!(c.detect_version().unwrap(), SchemaVersion::V200);

        // Unrecognized explicit version falls through to fields.
        let c = catalog(json!({"version": "9.9", "projects": []}));
        assert_eq!(c.detect_version().unwrap(), SchemaVersion::V101);

        let c = catalog(json!({"releases": []}));
        assert_eq!(c.detect_version().unwrap(), SchemaVersion::V200);

        let c = catalog(json!({"version": "9.9", "agency": "AA"}));
        assert_eq!(
            c.detect_version(),
            Err(SchemaDetectionError::Unrecognized {
                version: Some("9.9".to_string())
            })
        );
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert_eq!(
            Catalog::from_value(json!([1, 2])),
            Err(SchemaDetectionError::NotAnObject)
        );
    }

    #[test]
    fn test_canonical_catalog_passes_through_unchanged() {
        let raw = json!({
            "version": "2.0.0",
            "agency": "AA",
            "measurementType": {"method": "modules"},
            "releases": [{
                "name": "X",
                "permissions": {"licenses": [], "usageType": "openSource"},
                "tags": ["a"]
            }]
        });
        let normalized = normalize(catalog(raw.clone())).unwrap();
        assert_eq!(normalized.source_version(), SchemaVersion::V200);
        assert_eq!(normalized.as_value(), raw);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let raw = json!({
            "version": "1.0.1",
            "agency": "AA",
            "projects": [Value::Object(legacy_project(json!({"openSourceProject": 1})))]
        });
        let once = normalize(catalog(raw)).unwrap();
        let twice = normalize(once.clone().into_catalog()).unwrap();
        assert_eq!(once.as_value(), twice.as_value());
        assert_eq!(twice.source_version(), SchemaVersion::V200);
    }

    #[test]
    fn test_upgrade_renames_and_restructures() {
        let c = catalog(json!({
            "agency": "AA",
            "projects": [Value::Object(legacy_project(json!({"openSourceProject": 1})))]
        }));
        let normalized = normalize(c).unwrap();
        assert_eq!(normalized.source_version(), SchemaVersion::V101);

        let doc = normalized.as_value();
        assert_eq!(doc["version"], json!("2.0.0"));
        assert!(doc.get("projects").is_none());

        let release = &normalized.releases()[0];
        assert_eq!(release["repositoryURL"], json!("https://example.gov/legacy"));
        assert_eq!(release["homepageURL"], json!("https://example.gov"));
        assert!(release.get("repository").is_none());
        assert!(release.get("homepage").is_none());
        assert!(release.get("license").is_none());
        assert!(release.get("updated").is_none());
        assert!(release.get("openSourceProject").is_none());
        assert_eq!(
            release["permissions"]["licenses"],
            json!([{"URL": "https://example.gov/LICENSE", "name": null}])
        );
        assert_eq!(release["laborHours"], Value::Null);
        assert_eq!(
            release["date"],
            json!({
                "created": "",
                "lastModified": "2016-04-01",
                "metadataLastUpdated": "2016-05-01"
            })
        );
        assert_eq!(release["vcs"], json!(""));
        assert_eq!(release["relatedCode"][0]["isGovernmentRepo"], json!(false));
        assert_eq!(release["reusedCode"], json!([{"name": "", "URL": ""}]));
        assert_eq!(release["description"], json!("An old project"));
    }

    #[test]
    fn test_missing_license_yields_null_entry() {
        let mut project = legacy_project(json!({}));
        project.remove("license");
        let upgraded = upgrade_project(project);
        assert_eq!(
            upgraded["permissions"]["licenses"],
            json!([{"URL": null, "name": null}])
        );
    }

    #[test]
    fn test_exemption_mapping() {
        let upgraded = upgrade_project(legacy_project(json!({"exemption": "2"})));
        assert_eq!(
            upgraded["permissions"]["usageType"],
            json!("exemptByNationalSecurity")
        );
        assert!(upgraded["permissions"]["exemptionText"].is_string());
        assert!(upgraded.get("exemption").is_none());

        // Numeric codes coerce like strings.
        let upgraded = upgrade_project(legacy_project(json!({"exemption": 5})));
        assert_eq!(upgraded["permissions"]["usageType"], json!("exemptByCIO"));
        let upgraded = upgrade_project(legacy_project(json!({"exemption": 3.0})));
        assert_eq!(
            upgraded["permissions"]["usageType"],
            json!("exemptByAgencySystem")
        );
    }

    #[test]
    fn test_open_source_takes_precedence_over_exemption() {
        let upgraded = upgrade_project(legacy_project(json!({
            "openSourceProject": 1,
            "governmentWideReuseProject": 1,
            "exemption": "2"
        })));
        assert_eq!(upgraded["permissions"]["usageType"], json!("openSource"));
        assert_eq!(upgraded["permissions"]["exemptionText"], Value::Null);
    }

    #[test]
    fn test_government_wide_reuse() {
        let upgraded = upgrade_project(legacy_project(json!({
            "openSourceProject": 0,
            "governmentWideReuseProject": 1
        })));
        assert_eq!(
            upgraded["permissions"]["usageType"],
            json!("governmentWideReuse")
        );
    }

    #[test]
    fn test_no_flags_yield_null_usage() {
        let upgraded = upgrade_project(legacy_project(json!({
            "openSourceProject": "1",
            "exemption": "7"
        })));
        assert_eq!(upgraded["permissions"]["usageType"], Value::Null);
        assert_eq!(upgraded["permissions"]["exemptionText"], Value::Null);
    }

    #[test]
    fn test_upgrade_is_idempotent_on_canonical_record() {
        let once = upgrade_project(legacy_project(json!({"exemption": 1})));
        let twice = upgrade_project(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_optional_fields_only_filled_when_absent() {
        let upgraded = upgrade_project(legacy_project(json!({
            "vcs": "git",
            "relatedCode": [{
                "codeName": "Sibling",
                "codeURL": "https://x",
                "isGovernmentRepo": true
            }]
        })));
        assert_eq!(upgraded["vcs"], json!("git"));
        assert_eq!(upgraded["relatedCode"][0]["codeName"], json!("Sibling"));
        assert_eq!(upgraded["disclaimerURL"], json!(""));
    }
}
