//! System CIA-loss rules.
//!
//! Each check consults the CVSS versions in preference order (v4.0, v3.1,
//! v3.0, v2); the first version present decides. A LOW/PARTIAL impact only
//! qualifies when a sufficient-condition phrase backs it up, while
//! HIGH/COMPLETE always qualifies.

use sitrep_core::Vulnerability;

use super::phrases::{
    AVAILABILITY_SUFFICIENT, AVAILABILITY_TOKENS, CONFIDENTIALITY_SUFFICIENT, INTEGRITY_SUFFICIENT,
};
use super::{is_about_system, test_incidence};

pub fn has_system_confidentiality_loss(vuln: &Vulnerability) -> bool {
    if !is_about_system(&vuln.cpe_type) {
        return false;
    }
    if let Some(m) = &vuln.cvss_v40 {
        if m.vulnerable_system_confidentiality == "LOW"
            && test_incidence(&vuln.description, CONFIDENTIALITY_SUFFICIENT)
        {
            return true;
        }
        return m.vulnerable_system_confidentiality == "HIGH";
    }
    if let Some(m) = &vuln.cvss_v31 {
        if m.confidentiality_impact == "LOW"
            && test_incidence(&vuln.description, CONFIDENTIALITY_SUFFICIENT)
        {
            return true;
        }
        return m.confidentiality_impact == "HIGH";
    }
    if let Some(m) = &vuln.cvss_v30 {
        if m.confidentiality_impact == "LOW"
            && test_incidence(&vuln.description, CONFIDENTIALITY_SUFFICIENT)
        {
            return true;
        }
        return m.confidentiality_impact == "HIGH";
    }
    let impact = v2_confidentiality(vuln);
    if impact == "PARTIAL" && test_incidence(&vuln.description, CONFIDENTIALITY_SUFFICIENT) {
        return true;
    }
    impact == "COMPLETE"
}

pub fn has_system_integrity_loss(vuln: &Vulnerability) -> bool {
    if !is_about_system(&vuln.cpe_type) {
        return false;
    }
    if let Some(m) = &vuln.cvss_v40 {
        if m.vulnerable_system_integrity == "LOW"
            && test_incidence(&vuln.description, INTEGRITY_SUFFICIENT)
        {
            return true;
        }
        return m.vulnerable_system_integrity == "HIGH";
    }
    if let Some(m) = &vuln.cvss_v31 {
        if m.integrity_impact == "LOW" && test_incidence(&vuln.description, INTEGRITY_SUFFICIENT) {
            return true;
        }
        return m.integrity_impact == "HIGH";
    }
    if let Some(m) = &vuln.cvss_v30 {
        if m.integrity_impact == "LOW" && test_incidence(&vuln.description, INTEGRITY_SUFFICIENT) {
            return true;
        }
        return m.integrity_impact == "HIGH";
    }
    let impact = v2_integrity(vuln);
    if impact == "PARTIAL" && test_incidence(&vuln.description, INTEGRITY_SUFFICIENT) {
        return true;
    }
    impact == "COMPLETE"
}

pub fn has_system_availability_loss(vuln: &Vulnerability) -> bool {
    if !is_about_system(&vuln.cpe_type) {
        return false;
    }
    for token in AVAILABILITY_TOKENS {
        if vuln.description.contains(token) {
            return true;
        }
    }
    if let Some(m) = &vuln.cvss_v40 {
        if m.vulnerable_system_availability == "LOW"
            && test_incidence(&vuln.description, AVAILABILITY_SUFFICIENT)
        {
            return true;
        }
        if has_system_integrity_loss(vuln) {
            return m.vulnerable_system_availability != "NONE";
        }
        return m.vulnerable_system_availability == "HIGH";
    }
    if let Some(m) = &vuln.cvss_v31 {
        if m.availability_impact == "LOW"
            && test_incidence(&vuln.description, AVAILABILITY_SUFFICIENT)
        {
            return true;
        }
        if has_system_integrity_loss(vuln) {
            return m.availability_impact != "NONE";
        }
        return m.availability_impact == "HIGH";
    }
    if let Some(m) = &vuln.cvss_v30 {
        if m.availability_impact == "LOW"
            && test_incidence(&vuln.description, AVAILABILITY_SUFFICIENT)
        {
            return true;
        }
        if has_system_integrity_loss(vuln) {
            return m.availability_impact != "NONE";
        }
        return m.availability_impact == "HIGH";
    }
    let impact = v2_availability(vuln);
    if impact == "PARTIAL" && test_incidence(&vuln.description, AVAILABILITY_SUFFICIENT) {
        return true;
    }
    if has_system_integrity_loss(vuln) {
        return impact != "NONE" && !impact.is_empty();
    }
    impact == "COMPLETE"
}

// -- scope-change detection --------------------------------------------------

fn remote_system_mentioned(vuln: &Vulnerability) -> bool {
    vuln.description.contains("in the remote system")
}

pub fn system_confidentiality_changed(vuln: &Vulnerability) -> bool {
    if !is_about_system(&vuln.cpe_type) {
        return false;
    }
    if let Some(m) = &vuln.cvss_v40 {
        if !m.subsequent_system_confidentiality.is_empty()
            && m.subsequent_system_confidentiality != m.vulnerable_system_confidentiality
        {
            return true;
        }
        if remote_system_mentioned(vuln) && m.vulnerable_system_confidentiality == "HIGH" {
            return true;
        }
    }
    if let Some(m) = &vuln.cvss_v31 {
        if m.scope == "CHANGED" && m.confidentiality_impact == "HIGH" {
            return true;
        }
        if remote_system_mentioned(vuln) && m.confidentiality_impact == "HIGH" {
            return true;
        }
    }
    if let Some(m) = &vuln.cvss_v30 {
        if m.scope == "CHANGED" && m.confidentiality_impact == "HIGH" {
            return true;
        }
        if remote_system_mentioned(vuln) && m.confidentiality_impact == "HIGH" {
            return true;
        }
    }
    remote_system_mentioned(vuln) && v2_confidentiality(vuln) == "PARTIAL"
}

pub fn system_integrity_changed(vuln: &Vulnerability) -> bool {
    if !is_about_system(&vuln.cpe_type) {
        return false;
    }
    if let Some(m) = &vuln.cvss_v40 {
        if !m.subsequent_system_integrity.is_empty()
            && m.subsequent_system_integrity != m.vulnerable_system_integrity
        {
            return true;
        }
        if remote_system_mentioned(vuln) && m.vulnerable_system_integrity == "HIGH" {
            return true;
        }
    }
    if let Some(m) = &vuln.cvss_v31 {
        if m.scope == "CHANGED" && m.integrity_impact == "HIGH" {
            return true;
        }
        if remote_system_mentioned(vuln) && m.integrity_impact == "HIGH" {
            return true;
        }
    }
    if let Some(m) = &vuln.cvss_v30 {
        if m.scope == "CHANGED" && m.integrity_impact == "HIGH" {
            return true;
        }
        if remote_system_mentioned(vuln) && m.integrity_impact == "HIGH" {
            return true;
        }
    }
    remote_system_mentioned(vuln) && v2_integrity(vuln) == "PARTIAL"
}

pub fn system_availability_changed(vuln: &Vulnerability) -> bool {
    if !is_about_system(&vuln.cpe_type) {
        return false;
    }
    if let Some(m) = &vuln.cvss_v40 {
        if !m.subsequent_system_availability.is_empty()
            && m.subsequent_system_availability != m.vulnerable_system_availability
        {
            return true;
        }
        if remote_system_mentioned(vuln) && m.vulnerable_system_availability == "HIGH" {
            return true;
        }
    }
    if let Some(m) = &vuln.cvss_v31 {
        if m.scope == "CHANGED" && m.availability_impact == "HIGH" {
            return true;
        }
        if remote_system_mentioned(vuln) && m.availability_impact == "HIGH" {
            return true;
        }
    }
    if let Some(m) = &vuln.cvss_v30 {
        if m.scope == "CHANGED" && m.availability_impact == "HIGH" {
            return true;
        }
        if remote_system_mentioned(vuln) && m.availability_impact == "HIGH" {
            return true;
        }
    }
    remote_system_mentioned(vuln) && v2_availability(vuln) == "PARTIAL"
}

// -- fill-in of co-occurring CIA impacts -------------------------------------

/// After initial detection, add missing C/I/A losses where CVSS reports a
/// LOW/PARTIAL impact on a system-class vulnerability.
pub fn add_other_cia_impacts(result_impacts: &mut Vec<String>, vuln: &Vulnerability) {
    let pairs: [(&str, &str, fn(&Vulnerability) -> &str, fn(&Vulnerability) -> &str); 6] = [
        (
            "System integrity loss",
            "System confidentiality loss",
            v3plus_confidentiality_low,
            v2_confidentiality,
        ),
        (
            "System integrity loss",
            "System availability loss",
            v3plus_availability_low,
            v2_availability,
        ),
        (
            "System confidentiality loss",
            "System integrity loss",
            v3plus_integrity_low,
            v2_integrity,
        ),
        (
            "System confidentiality loss",
            "System availability loss",
            v3plus_availability_low,
            v2_availability,
        ),
        (
            "System availability loss",
            "System confidentiality loss",
            v3plus_confidentiality_low,
            v2_confidentiality,
        ),
        (
            "System availability loss",
            "System integrity loss",
            v3plus_integrity_low,
            v2_integrity,
        ),
    ];

    for (present, missing, modern_low, v2_value) in pairs {
        if !result_impacts.iter().any(|i| i == present)
            || result_impacts.iter().any(|i| i == missing)
        {
            continue;
        }
        let has_modern = vuln.cvss_v40.is_some() || vuln.cvss_v31.is_some() || vuln.cvss_v30.is_some();
        let qualifies = if has_modern {
            modern_low(vuln) == "LOW" && is_about_system(&vuln.cpe_type)
        } else {
            v2_value(vuln) == "PARTIAL"
        };
        if qualifies {
            result_impacts.push(missing.to_string());
        }
    }
}

// -- per-version field accessors ---------------------------------------------

fn v2_confidentiality(vuln: &Vulnerability) -> &str {
    vuln.cvss_v2
        .as_ref()
        .map(|m| m.confidentiality_impact.as_str())
        .unwrap_or("")
}

fn v2_integrity(vuln: &Vulnerability) -> &str {
    vuln.cvss_v2
        .as_ref()
        .map(|m| m.integrity_impact.as_str())
        .unwrap_or("")
}

fn v2_availability(vuln: &Vulnerability) -> &str {
    vuln.cvss_v2
        .as_ref()
        .map(|m| m.availability_impact.as_str())
        .unwrap_or("")
}

fn v3plus_confidentiality_low(vuln: &Vulnerability) -> &str {
    if let Some(m) = &vuln.cvss_v40 {
        return m.vulnerable_system_confidentiality.as_str();
    }
    if let Some(m) = &vuln.cvss_v31 {
        return m.confidentiality_impact.as_str();
    }
    if let Some(m) = &vuln.cvss_v30 {
        return m.confidentiality_impact.as_str();
    }
    ""
}

fn v3plus_integrity_low(vuln: &Vulnerability) -> &str {
    if let Some(m) = &vuln.cvss_v40 {
        return m.vulnerable_system_integrity.as_str();
    }
    if let Some(m) = &vuln.cvss_v31 {
        return m.integrity_impact.as_str();
    }
    if let Some(m) = &vuln.cvss_v30 {
        return m.integrity_impact.as_str();
    }
    ""
}

fn v3plus_availability_low(vuln: &Vulnerability) -> &str {
    if let Some(m) = &vuln.cvss_v40 {
        return m.vulnerable_system_availability.as_str();
    }
    if let Some(m) = &vuln.cvss_v31 {
        return m.availability_impact.as_str();
    }
    if let Some(m) = &vuln.cvss_v30 {
        return m.availability_impact.as_str();
    }
    ""
}
