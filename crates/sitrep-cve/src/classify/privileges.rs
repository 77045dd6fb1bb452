//! Privilege-gain impact rules.

use sitrep_core::Vulnerability;

use super::phrases::{PRIVILEGE_PHRASES, ROOT_PRIVILEGE_PHRASES, USER_PRIVILEGE_SYSTEM_PHRASES};
use super::{is_about_application, is_about_system, test_incidence};

/// Generic privilege-gain indication in a description.
pub fn test_privileges(description: &str) -> bool {
    if description.contains("gain") && description.contains("privilege") {
        return true;
    }
    if description.contains("bypass authentication")
        && description.contains("during an admin login attempt")
    {
        return true;
    }
    test_incidence(description, PRIVILEGE_PHRASES)
}

/// Root-privilege indication in a description.
pub fn has_root_privileges_description(description: &str) -> bool {
    if description.contains("default")
        && description.contains("password")
        && description.contains("for the root")
    {
        return true;
    }
    test_incidence(description, ROOT_PRIVILEGE_PHRASES)
}

fn privileges_required_not_none(vuln: &Vulnerability) -> bool {
    if let Some(m) = &vuln.cvss_v40 {
        if m.privileges_required != "NONE" {
            return true;
        }
    }
    if let Some(m) = &vuln.cvss_v31 {
        if m.privileges_required != "NONE" {
            return true;
        }
    }
    if let Some(m) = &vuln.cvss_v30 {
        if m.privileges_required != "NONE" {
            return true;
        }
    }
    false
}

fn complete_cia_with_privilege_phrase(vuln: &Vulnerability) -> bool {
    match &vuln.cvss_v2 {
        Some(m) => {
            m.confidentiality_impact == "COMPLETE"
                && m.integrity_impact == "COMPLETE"
                && m.availability_impact == "COMPLETE"
                && test_privileges(&vuln.description)
        }
        None => false,
    }
}

/// Gain of root/system/administrator privileges.
///
/// Requires a system-class vulnerability whose available CVSS v4.0/v3.x
/// metrics do not demand pre-existing privileges; then either the v2
/// `obtainAllPrivilege` flag, a root-privilege phrase, or COMPLETE C/I/A
/// with a privilege-gain phrase decides.
pub fn has_gain_root_privileges(vuln: &Vulnerability) -> bool {
    if !is_about_system(&vuln.cpe_type) {
        return false;
    }
    if privileges_required_not_none(vuln) {
        return false;
    }
    if let Some(m) = &vuln.cvss_v2 {
        if m.obtain_all_privilege == Some(true) {
            return true;
        }
    }
    if has_root_privileges_description(&vuln.description) {
        return true;
    }
    complete_cia_with_privilege_phrase(vuln)
}

/// Privilege escalation on a system (the CVSS-v2-driven variant without the
/// privileges-required gate).
pub fn has_privilege_escalation(vuln: &Vulnerability) -> bool {
    if !is_about_system(&vuln.cpe_type) {
        return false;
    }
    if let Some(m) = &vuln.cvss_v2 {
        if m.obtain_all_privilege == Some(true) {
            return true;
        }
    }
    if has_root_privileges_description(&vuln.description) {
        return true;
    }
    complete_cia_with_privilege_phrase(vuln)
}

/// Application-level privilege gain: the textual indication alone.
pub fn has_gain_application_privileges(description: &str) -> bool {
    test_privileges(description)
}

/// Gain of user-level privileges on a system.
pub fn has_gain_user_privileges(vuln: &Vulnerability) -> bool {
    if !is_about_system(&vuln.cpe_type) {
        return false;
    }
    if let Some(m) = &vuln.cvss_v2 {
        if m.obtain_user_privilege == Some(true) {
            return true;
        }
    }
    for phrase in USER_PRIVILEGE_SYSTEM_PHRASES {
        if vuln.description.contains(phrase) {
            return true;
        }
    }
    !is_about_application(&vuln.cpe_type) && test_privileges(&vuln.description)
}
