//! Code-execution impact rules.

use sitrep_core::Vulnerability;

use super::phrases::{EXECUTION_NOUNS, EXECUTION_VERBS, ROOT_EXECUTION_PHRASES, USER_EXECUTION_PHRASES};
use super::{is_about_system, test_incidence};

/// Remote code execution with root/system privileges.
///
/// A root-execution phrase in the description is decisive on its own.
/// Otherwise the vulnerability must be system-class, execute code as a user,
/// and carry HIGH (v4.0/v3.1/v3.0) or COMPLETE (v2) impact on all of C, I,
/// and A.
pub fn has_code_execution_as_root(vuln: &Vulnerability) -> bool {
    for phrase in ROOT_EXECUTION_PHRASES {
        if vuln.description.contains(phrase) {
            return true;
        }
    }
    if !is_about_system(&vuln.cpe_type) {
        return false;
    }
    if !has_code_execution_as_user(vuln) {
        return false;
    }
    if let Some(m) = &vuln.cvss_v40 {
        if m.vulnerable_system_confidentiality == "HIGH"
            && m.vulnerable_system_integrity == "HIGH"
            && m.vulnerable_system_availability == "HIGH"
        {
            return true;
        }
    }
    if let Some(m) = &vuln.cvss_v31 {
        if m.confidentiality_impact == "HIGH"
            && m.integrity_impact == "HIGH"
            && m.availability_impact == "HIGH"
        {
            return true;
        }
    }
    if let Some(m) = &vuln.cvss_v30 {
        if m.confidentiality_impact == "HIGH"
            && m.integrity_impact == "HIGH"
            && m.availability_impact == "HIGH"
        {
            return true;
        }
    }
    if let Some(m) = &vuln.cvss_v2 {
        if m.confidentiality_impact == "COMPLETE"
            && m.integrity_impact == "COMPLETE"
            && m.availability_impact == "COMPLETE"
        {
            return true;
        }
    }
    false
}

/// Remote code execution with user-level privileges.
pub fn has_code_execution_as_user(vuln: &Vulnerability) -> bool {
    for phrase in USER_EXECUTION_PHRASES {
        if vuln.description.contains(phrase) {
            return true;
        }
    }

    // SQL injection (non-blind) with high C+I qualifies.
    if vuln.description.contains("sql injection")
        && !vuln.description.contains("blind sql injection")
    {
        if let Some(m) = &vuln.cvss_v40 {
            if m.vulnerable_system_integrity == "HIGH"
                && m.vulnerable_system_confidentiality == "HIGH"
            {
                return true;
            }
        }
        if let Some(m) = &vuln.cvss_v31 {
            if m.integrity_impact == "HIGH" && m.confidentiality_impact == "HIGH" {
                return true;
            }
        }
        if let Some(m) = &vuln.cvss_v30 {
            if m.integrity_impact == "HIGH" && m.confidentiality_impact == "HIGH" {
                return true;
            }
        }
    }

    test_incidence(&vuln.description, EXECUTION_NOUNS)
        && test_incidence(&vuln.description, EXECUTION_VERBS)
}
