//! Per-source compliance scoring.
//!
//! Overall compliance is the arithmetic mean of the three tracked
//! requirement fractions (agency-wide policy, open-source requirement,
//! inventory requirement). The schema-format dimension is recorded alongside
//! but does not enter the mean.

use serde::{Deserialize, Serialize};

use crate::models::Requirements;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    FullyCompliant,
    PartiallyCompliant,
    NotCompliant,
}

impl ComplianceStatus {
    pub fn from_overall(overall: f64) -> Self {
        if overall >= 1.0 {
            Self::FullyCompliant
        } else if overall > 0.0 {
            Self::PartiallyCompliant
        } else {
            Self::NotCompliant
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullyCompliant => "FULLY_COMPLIANT",
            Self::PartiallyCompliant => "PARTIALLY_COMPLIANT",
            Self::NotCompliant => "NOT_COMPLIANT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComplianceScore {
    pub status: ComplianceStatus,
    pub overall_compliance: f64,
}

pub fn overall_compliance(requirements: &Requirements) -> f64 {
    let dimensions = [
        requirements.agency_wide_policy,
        requirements.open_source_requirement,
        requirements.inventory_requirement,
    ];
    dimensions.iter().sum::<f64>() / dimensions.len() as f64
}

/// Score a source and record `overall_compliance` on its requirements.
pub fn score(requirements: &mut Requirements) -> ComplianceScore {
    let overall = overall_compliance(requirements);
    requirements.overall_compliance = Some(overall);
    ComplianceScore {
        status: ComplianceStatus::from_overall(overall),
        overall_compliance: overall,
    }
}
