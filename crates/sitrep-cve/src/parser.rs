//! Parsing of raw NVD records into [`Vulnerability`] values.
//!
//! For every CVSS version present under `metrics.cvssMetricV{2,30,31,40}`
//! the entry typed `Primary` is preferred, falling back to the first entry.
//! Records without an id or description are skipped with a warning. The raw
//! `configurations` payload is preserved for CPE-range matching.

use serde_json::Value;
use tracing::warn;

use sitrep_core::vuln::{CvssV2, CvssV3, CvssV4, Vulnerability};

use crate::classify::{classify, dedup_impacts};

fn primary_metric(metrics: &[Value]) -> Option<&Value> {
    metrics
        .iter()
        .find(|m| m.get("type").and_then(Value::as_str) == Some("Primary"))
        .or_else(|| metrics.first())
}

fn str_field(value: &Value, pointer: &str) -> String {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn f64_field(value: &Value, pointer: &str) -> Option<f64> {
    value.pointer(pointer).and_then(Value::as_f64)
}

fn bool_field(value: &Value, pointer: &str) -> Option<bool> {
    value.pointer(pointer).and_then(Value::as_bool)
}

fn parse_cvss_v2(metric: &Value) -> CvssV2 {
    CvssV2 {
        vector_string: str_field(metric, "/cvssData/vectorString"),
        access_vector: str_field(metric, "/cvssData/accessVector"),
        access_complexity: str_field(metric, "/cvssData/accessComplexity"),
        authentication: str_field(metric, "/cvssData/authentication"),
        confidentiality_impact: str_field(metric, "/cvssData/confidentialityImpact"),
        integrity_impact: str_field(metric, "/cvssData/integrityImpact"),
        availability_impact: str_field(metric, "/cvssData/availabilityImpact"),
        base_score: f64_field(metric, "/cvssData/baseScore"),
        base_severity: str_field(metric, "/baseSeverity"),
        exploitability_score: f64_field(metric, "/exploitabilityScore"),
        impact_score: f64_field(metric, "/impactScore"),
        ac_insuf_info: bool_field(metric, "/acInsufInfo"),
        obtain_all_privilege: bool_field(metric, "/obtainAllPrivilege"),
        obtain_user_privilege: bool_field(metric, "/obtainUserPrivilege"),
        obtain_other_privilege: bool_field(metric, "/obtainOtherPrivilege"),
        user_interaction_required: bool_field(metric, "/userInteractionRequired"),
    }
}

fn parse_cvss_v3(metric: &Value) -> CvssV3 {
    CvssV3 {
        vector_string: str_field(metric, "/cvssData/vectorString"),
        attack_vector: str_field(metric, "/cvssData/attackVector"),
        attack_complexity: str_field(metric, "/cvssData/attackComplexity"),
        privileges_required: str_field(metric, "/cvssData/privilegesRequired"),
        user_interaction: str_field(metric, "/cvssData/userInteraction"),
        scope: str_field(metric, "/cvssData/scope"),
        confidentiality_impact: str_field(metric, "/cvssData/confidentialityImpact"),
        integrity_impact: str_field(metric, "/cvssData/integrityImpact"),
        availability_impact: str_field(metric, "/cvssData/availabilityImpact"),
        base_score: f64_field(metric, "/cvssData/baseScore"),
        base_severity: str_field(metric, "/cvssData/baseSeverity"),
        exploitability_score: f64_field(metric, "/exploitabilityScore"),
        impact_score: f64_field(metric, "/impactScore"),
    }
}

fn parse_cvss_v4(metric: &Value) -> CvssV4 {
    CvssV4 {
        vector_string: str_field(metric, "/cvssData/vectorString"),
        attack_vector: str_field(metric, "/cvssData/attackVector"),
        attack_complexity: str_field(metric, "/cvssData/attackComplexity"),
        attack_requirements: str_field(metric, "/cvssData/attackRequirements"),
        privileges_required: str_field(metric, "/cvssData/privilegesRequired"),
        user_interaction: str_field(metric, "/cvssData/userInteraction"),
        vulnerable_system_confidentiality: str_field(metric, "/cvssData/vulnConfidentialityImpact"),
        vulnerable_system_integrity: str_field(metric, "/cvssData/vulnIntegrityImpact"),
        vulnerable_system_availability: str_field(metric, "/cvssData/vulnAvailabilityImpact"),
        subsequent_system_confidentiality: str_field(metric, "/cvssData/subConfidentialityImpact"),
        subsequent_system_integrity: str_field(metric, "/cvssData/subIntegrityImpact"),
        subsequent_system_availability: str_field(metric, "/cvssData/subAvailabilityImpact"),
        exploit_maturity: str_field(metric, "/cvssData/exploitMaturity"),
        base_score: f64_field(metric, "/cvssData/baseScore"),
        base_severity: str_field(metric, "/cvssData/baseSeverity"),
    }
}

/// Parse a batch of raw `cve` objects; malformed records are skipped.
pub fn parse_vulnerabilities(records: &[Value]) -> Vec<Vulnerability> {
    let mut vulnerabilities = Vec::new();

    for record in records {
        let Some(cve_id) = record.get("id").and_then(Value::as_str) else {
            warn!("skipping CVE record with missing id");
            continue;
        };
        let Some(description) = record
            .pointer("/descriptions/0/value")
            .and_then(Value::as_str)
        else {
            warn!(cve_id, "skipping CVE record with missing descriptions");
            continue;
        };

        let mut vuln = Vulnerability {
            cve_id: cve_id.to_string(),
            description: description.to_string(),
            published: str_field(record, "/published"),
            last_modified: str_field(record, "/lastModified"),
            ..Default::default()
        };

        if let Some(weaknesses) = record.get("weaknesses").and_then(Value::as_array) {
            for weakness in weaknesses {
                if let Some(descriptions) = weakness.get("description").and_then(Value::as_array) {
                    for entry in descriptions {
                        if let Some(value) = entry.get("value").and_then(Value::as_str) {
                            vuln.cwe.insert(value.to_string());
                        }
                    }
                }
            }
        }

        if let Some(list) = record.pointer("/metrics/cvssMetricV2").and_then(Value::as_array) {
            vuln.cvss_v2 = primary_metric(list).map(parse_cvss_v2);
        }
        if let Some(list) = record.pointer("/metrics/cvssMetricV30").and_then(Value::as_array) {
            vuln.cvss_v30 = primary_metric(list).map(parse_cvss_v3);
        }
        if let Some(list) = record.pointer("/metrics/cvssMetricV31").and_then(Value::as_array) {
            vuln.cvss_v31 = primary_metric(list).map(parse_cvss_v3);
        }
        if let Some(list) = record.pointer("/metrics/cvssMetricV40").and_then(Value::as_array) {
            vuln.cvss_v40 = primary_metric(list).map(parse_cvss_v4);
        }

        if let Some(configurations) = record.get("configurations") {
            if let Some(config_list) = configurations.as_array() {
                for configuration in config_list {
                    for node in configuration
                        .get("nodes")
                        .and_then(Value::as_array)
                        .unwrap_or(&Vec::new())
                    {
                        for cpe in node
                            .get("cpeMatch")
                            .and_then(Value::as_array)
                            .unwrap_or(&Vec::new())
                        {
                            if cpe.get("vulnerable").and_then(Value::as_bool) == Some(true) {
                                if let Some(criteria) = cpe.get("criteria").and_then(Value::as_str)
                                {
                                    if let Some(part) = criteria.split(':').nth(2) {
                                        vuln.cpe_type.insert(part.to_string());
                                    }
                                }
                            }
                        }
                    }
                }
            }
            vuln.configurations = configurations.clone();
        }

        if let Some(references) = record.get("references").and_then(Value::as_array) {
            for reference in references {
                if let Some(tags) = reference.get("tags").and_then(Value::as_array) {
                    for tag in tags {
                        if let Some(tag) = tag.as_str() {
                            vuln.ref_tags.insert(tag.to_string());
                        }
                    }
                }
            }
        }

        vuln.result_impacts = dedup_impacts(classify(&vuln));
        vulnerabilities.push(vuln);
    }

    vulnerabilities
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record() -> Value {
        json!({
            "id": "CVE-2017-9555",
            "descriptions": [
                {"lang": "en", "value": "The router allows remote attackers to execute arbitrary code as root via a crafted request."}
            ],
            "weaknesses": [
                {"description": [{"lang": "en", "value": "CWE-78"}, {"lang": "en", "value": "CWE-287"}]}
            ],
            "metrics": {
                "cvssMetricV2": [{
                    "type": "Primary",
                    "cvssData": {
                        "vectorString": "AV:N/AC:L/Au:N/C:C/I:C/A:C",
                        "accessVector": "NETWORK",
                        "accessComplexity": "LOW",
                        "authentication": "NONE",
                        "confidentialityImpact": "COMPLETE",
                        "integrityImpact": "COMPLETE",
                        "availabilityImpact": "COMPLETE",
                        "baseScore": 10.0
                    },
                    "baseSeverity": "HIGH",
                    "exploitabilityScore": 10.0,
                    "impactScore": 10.0,
                    "obtainAllPrivilege": true
                }],
                "cvssMetricV31": [
                    {
                        "type": "Secondary",
                        "cvssData": {
                            "vectorString": "secondary-vector",
                            "attackVector": "LOCAL",
                            "attackComplexity": "HIGH",
                            "privilegesRequired": "HIGH",
                            "userInteraction": "REQUIRED",
                            "scope": "UNCHANGED",
                            "confidentialityImpact": "LOW",
                            "integrityImpact": "LOW",
                            "availabilityImpact": "LOW",
                            "baseScore": 4.0,
                            "baseSeverity": "MEDIUM"
                        },
                        "exploitabilityScore": 1.0,
                        "impactScore": 1.0
                    },
                    {
                        "type": "Primary",
                        "cvssData": {
                            "vectorString": "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H",
                            "attackVector": "NETWORK",
                            "attackComplexity": "LOW",
                            "privilegesRequired": "NONE",
                            "userInteraction": "NONE",
                            "scope": "UNCHANGED",
                            "confidentialityImpact": "HIGH",
                            "integrityImpact": "HIGH",
                            "availabilityImpact": "HIGH",
                            "baseScore": 9.8,
                            "baseSeverity": "CRITICAL"
                        },
                        "exploitabilityScore": 3.9,
                        "impactScore": 5.9
                    }
                ]
            },
            "configurations": [{
                "nodes": [{
                    "operator": "OR",
                    "cpeMatch": [
                        {"vulnerable": true, "criteria": "cpe:2.3:o:vendorx:router_firmware:1.0:*:*:*:*:*:*:*", "matchCriteriaId": "AAAA"},
                        {"vulnerable": false, "criteria": "cpe:2.3:h:vendorx:router:-:*:*:*:*:*:*:*", "matchCriteriaId": "BBBB"}
                    ]
                }]
            }],
            "published": "2017-06-13T06:29:00.000",
            "lastModified": "2019-10-03T00:03:26.223",
            "references": [
                {"url": "https://example.com/advisory", "tags": ["Vendor Advisory", "Exploit"]}
            ]
        })
    }

    #[test]
    fn test_parse_full_record() {
        let parsed = parse_vulnerabilities(&[sample_record()]);
        assert_eq!(parsed.len(), 1);
        let vuln = &parsed[0];

        assert_eq!(vuln.cve_id, "CVE-2017-9555");
        assert!(vuln.cwe.contains("CWE-78"));
        assert!(vuln.cwe.contains("CWE-287"));

        let v2 = vuln.cvss_v2.as_ref().unwrap();
        assert_eq!(v2.confidentiality_impact, "COMPLETE");
        assert_eq!(v2.base_score, Some(10.0));
        assert_eq!(v2.obtain_all_privilege, Some(true));

        // Primary entry wins over the Secondary listed first.
        let v31 = vuln.cvss_v31.as_ref().unwrap();
        assert_eq!(v31.confidentiality_impact, "HIGH");
        assert_eq!(v31.base_severity, "CRITICAL");

        assert!(vuln.cvss_v30.is_none());
        assert!(vuln.cvss_v40.is_none());

        // only the vulnerable cpeMatch contributes its part
        assert!(vuln.cpe_type.contains("o"));
        assert!(!vuln.cpe_type.contains("h"));

        assert!(vuln.ref_tags.contains("Vendor Advisory"));
        assert_eq!(vuln.published, "2017-06-13T06:29:00.000");

        // the root-execution phrase dominates classification
        assert_eq!(
            vuln.result_impacts,
            vec!["Arbitrary code execution as root/administrator/system"]
        );

        assert!(vuln.configurations.is_array());
    }

    #[test]
    fn test_records_missing_id_or_description_are_skipped() {
        let no_id = json!({"descriptions": [{"value": "text"}]});
        let no_description = json!({"id": "CVE-2024-1111"});
        let parsed = parse_vulnerabilities(&[no_id, no_description, sample_record()]);
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_fallback_to_first_metric_without_primary() {
        let record = json!({
            "id": "CVE-2024-2222",
            "descriptions": [{"value": "plain"}],
            "metrics": {
                "cvssMetricV30": [{
                    "type": "Secondary",
                    "cvssData": {"confidentialityImpact": "LOW", "baseSeverity": "LOW"}
                }]
            }
        });
        let parsed = parse_vulnerabilities(&[record]);
        assert_eq!(
            parsed[0].cvss_v30.as_ref().unwrap().confidentiality_impact,
            "LOW"
        );
    }

    #[test]
    fn test_parse_is_stable_across_invocations() {
        let record = sample_record();
        let first = parse_vulnerabilities(&[record.clone()]);
        let second = parse_vulnerabilities(&[record]);
        assert_eq!(first, second);
    }
}
