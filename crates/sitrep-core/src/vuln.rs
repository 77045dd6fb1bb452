//! Normalized vulnerability records.
//!
//! A [`Vulnerability`] is the parsed form of one NVD CVE record: the four
//! CVSS metric versions that may coexist on a record, the aggregated CWE /
//! CPE-type / reference-tag sets, and the classifier-produced impact labels.
//! Absent CVSS versions stay `None` and are never materialized downstream.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// CVSS v2 base metrics plus the NVD-specific privilege flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CvssV2 {
    #[serde(default)]
    pub vector_string: String,
    #[serde(default)]
    pub access_vector: String,
    #[serde(default)]
    pub access_complexity: String,
    #[serde(default)]
    pub authentication: String,
    #[serde(default)]
    pub confidentiality_impact: String,
    #[serde(default)]
    pub integrity_impact: String,
    #[serde(default)]
    pub availability_impact: String,
    #[serde(default)]
    pub base_score: Option<f64>,
    #[serde(default)]
    pub base_severity: String,
    #[serde(default)]
    pub exploitability_score: Option<f64>,
    #[serde(default)]
    pub impact_score: Option<f64>,
    #[serde(default)]
    pub ac_insuf_info: Option<bool>,
    #[serde(default)]
    pub obtain_all_privilege: Option<bool>,
    #[serde(default)]
    pub obtain_user_privilege: Option<bool>,
    #[serde(default)]
    pub obtain_other_privilege: Option<bool>,
    #[serde(default)]
    pub user_interaction_required: Option<bool>,
}

/// CVSS v3.0 / v3.1 base metrics (the two versions share a shape).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CvssV3 {
    #[serde(default)]
    pub vector_string: String,
    #[serde(default)]
    pub attack_vector: String,
    #[serde(default)]
    pub attack_complexity: String,
    #[serde(default)]
    pub privileges_required: String,
    #[serde(default)]
    pub user_interaction: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub confidentiality_impact: String,
    #[serde(default)]
    pub integrity_impact: String,
    #[serde(default)]
    pub availability_impact: String,
    #[serde(default)]
    pub base_score: Option<f64>,
    #[serde(default)]
    pub base_severity: String,
    #[serde(default)]
    pub exploitability_score: Option<f64>,
    #[serde(default)]
    pub impact_score: Option<f64>,
}

/// CVSS v4.0 base metrics with vulnerable/subsequent system split.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CvssV4 {
    #[serde(default)]
    pub vector_string: String,
    #[serde(default)]
    pub attack_vector: String,
    #[serde(default)]
    pub attack_complexity: String,
    #[serde(default)]
    pub attack_requirements: String,
    #[serde(default)]
    pub privileges_required: String,
    #[serde(default)]
    pub user_interaction: String,
    #[serde(default)]
    pub vulnerable_system_confidentiality: String,
    #[serde(default)]
    pub vulnerable_system_integrity: String,
    #[serde(default)]
    pub vulnerable_system_availability: String,
    #[serde(default)]
    pub subsequent_system_confidentiality: String,
    #[serde(default)]
    pub subsequent_system_integrity: String,
    #[serde(default)]
    pub subsequent_system_availability: String,
    #[serde(default)]
    pub exploit_maturity: String,
    #[serde(default)]
    pub base_score: Option<f64>,
    #[serde(default)]
    pub base_severity: String,
}

/// One parsed CVE record, ready for classification and graph upsert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub cve_id: String,
    pub description: String,
    #[serde(default)]
    pub cwe: BTreeSet<String>,
    #[serde(default)]
    pub cvss_v2: Option<CvssV2>,
    #[serde(default)]
    pub cvss_v30: Option<CvssV3>,
    #[serde(default)]
    pub cvss_v31: Option<CvssV3>,
    #[serde(default)]
    pub cvss_v40: Option<CvssV4>,
    /// CPE `part` letters observed on vulnerable configuration entries.
    #[serde(default)]
    pub cpe_type: BTreeSet<String>,
    #[serde(default)]
    pub ref_tags: BTreeSet<String>,
    #[serde(default)]
    pub published: String,
    #[serde(default)]
    pub last_modified: String,
    /// Ordered impact labels produced by the classifier.
    #[serde(default)]
    pub result_impacts: Vec<String>,
    /// Raw `configurations` payload, preserved for CPE-range matching.
    #[serde(default)]
    pub configurations: serde_json::Value,
}

impl Vulnerability {
    /// Description used for the lazily-created Vulnerability graph node.
    pub fn assumed_description(&self) -> String {
        format!("Assumed vulnerability with ID {}", self.cve_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assumed_description() {
        let vuln = Vulnerability {
            cve_id: "CVE-2024-1234".into(),
            ..Default::default()
        };
        assert_eq!(
            vuln.assumed_description(),
            "Assumed vulnerability with ID CVE-2024-1234"
        );
    }

    #[test]
    fn test_serde_round_trip_keeps_absent_cvss_absent() {
        let vuln = Vulnerability {
            cve_id: "CVE-2020-0001".into(),
            description: "test".into(),
            cvss_v31: Some(CvssV3 {
                confidentiality_impact: "HIGH".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let json = serde_json::to_string(&vuln).unwrap();
        let back: Vulnerability = serde_json::from_str(&json).unwrap();
        assert!(back.cvss_v2.is_none());
        assert!(back.cvss_v40.is_none());
        assert_eq!(
            back.cvss_v31.unwrap().confidentiality_impact,
            "HIGH"
        );
    }
}
