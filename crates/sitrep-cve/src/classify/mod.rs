//! Rule-based vulnerability-impact classifier.
//!
//! Classification runs in four stages and returns the first non-empty
//! result:
//!
//! 1. Root-level impacts (code execution as root, root privilege gain,
//!    privilege escalation) - single-label outcomes.
//! 2. System CIA loss, with fill-in of co-occurring impacts.
//! 3. User-level impacts - single-label outcomes.
//! 4. System-vs-application distinction over the remaining CVSS evidence.
//!
//! Stage order and phrase lists are load-bearing; the tests pin expected
//! outputs for representative records.

mod cia;
mod code_execution;
mod phrases;
mod privileges;

use std::collections::BTreeSet;

use sitrep_core::Vulnerability;

use cia::{
    add_other_cia_impacts, has_system_availability_loss, has_system_confidentiality_loss,
    has_system_integrity_loss, system_availability_changed, system_confidentiality_changed,
    system_integrity_changed,
};
use code_execution::{has_code_execution_as_root, has_code_execution_as_user};
use privileges::{
    has_gain_application_privileges, has_gain_root_privileges, has_gain_user_privileges,
    has_privilege_escalation,
};

/// A vulnerability is system-class when its CPE parts include `o` or `h`
/// without `a`.
pub(crate) fn is_about_system(cpe_type: &BTreeSet<String>) -> bool {
    (cpe_type.contains("o") || cpe_type.contains("h")) && !cpe_type.contains("a")
}

/// A vulnerability concerns an application when its CPE parts include `a`.
pub(crate) fn is_about_application(cpe_type: &BTreeSet<String>) -> bool {
    cpe_type.contains("a")
}

/// Case-insensitive check whether any keyword appears in the description.
pub(crate) fn test_incidence(description: &str, keywords: &[&str]) -> bool {
    let description = description.to_lowercase();
    keywords
        .iter()
        .any(|word| description.contains(&word.to_lowercase()))
}

/// Classify a vulnerability into its ordered impact label set.
pub fn classify(vuln: &Vulnerability) -> Vec<String> {
    let impacts = test_root_level_impacts(vuln);
    if !impacts.is_empty() {
        return impacts;
    }
    let impacts = system_cia_loss(vuln);
    if !impacts.is_empty() {
        return impacts;
    }
    let impacts = test_user_level_impacts(vuln);
    if !impacts.is_empty() {
        return impacts;
    }
    distinguish_system_application(vuln)
}

fn test_root_level_impacts(vuln: &Vulnerability) -> Vec<String> {
    if has_code_execution_as_root(vuln) {
        return vec!["Arbitrary code execution as root/administrator/system".to_string()];
    }
    if has_gain_root_privileges(vuln) {
        return vec!["Gain root/system/administrator privileges on system".to_string()];
    }
    if has_privilege_escalation(vuln) {
        return vec!["Privilege escalation on system".to_string()];
    }
    Vec::new()
}

fn system_cia_loss(vuln: &Vulnerability) -> Vec<String> {
    let mut impacts = Vec::new();
    if has_system_confidentiality_loss(vuln) {
        impacts.push("System confidentiality loss".to_string());
    }
    if has_system_integrity_loss(vuln) {
        impacts.push("System integrity loss".to_string());
    }
    if has_system_availability_loss(vuln) {
        impacts.push("System availability loss".to_string());
    }
    add_other_cia_impacts(&mut impacts, vuln);
    impacts
}

fn test_user_level_impacts(vuln: &Vulnerability) -> Vec<String> {
    if has_gain_user_privileges(vuln) {
        return vec!["Gain user privileges on system".to_string()];
    }
    if has_code_execution_as_user(vuln) {
        return vec!["Arbitrary code execution as user of application".to_string()];
    }
    if has_gain_application_privileges(&vuln.description) {
        return vec!["Gain privileges on application".to_string()];
    }
    Vec::new()
}

fn distinguish_system_application(vuln: &Vulnerability) -> Vec<String> {
    let mut impacts = Vec::new();
    if system_confidentiality_changed(vuln) {
        impacts.push("System confidentiality loss".to_string());
    }
    if system_integrity_changed(vuln) {
        impacts.push("System integrity loss".to_string());
    }
    if system_availability_changed(vuln) {
        impacts.push("System availability loss".to_string());
    }
    if !impacts.is_empty() {
        return impacts;
    }

    if let Some(m) = &vuln.cvss_v40 {
        if !m.vulnerable_system_integrity.is_empty() && m.vulnerable_system_integrity != "NONE" {
            impacts.push("Application integrity loss".to_string());
        }
        if !m.vulnerable_system_availability.is_empty() && m.vulnerable_system_availability != "NONE"
        {
            impacts.push("Application availability loss".to_string());
        }
        if !m.vulnerable_system_confidentiality.is_empty()
            && m.vulnerable_system_confidentiality != "NONE"
        {
            impacts.push("Application confidentiality loss".to_string());
        }
    }
    if let Some(m) = &vuln.cvss_v31 {
        if !m.integrity_impact.is_empty() && m.integrity_impact != "NONE" {
            impacts.push("Application integrity loss".to_string());
        }
        if !m.availability_impact.is_empty() && m.availability_impact != "NONE" {
            impacts.push("Application availability loss".to_string());
        }
        if !m.confidentiality_impact.is_empty() && m.confidentiality_impact != "NONE" {
            impacts.push("Application confidentiality loss".to_string());
        }
    }
    if let Some(m) = &vuln.cvss_v30 {
        if !m.integrity_impact.is_empty() && m.integrity_impact != "NONE" {
            impacts.push("Application integrity loss".to_string());
        }
        if !m.availability_impact.is_empty() && m.availability_impact != "NONE" {
            impacts.push("Application availability loss".to_string());
        }
        if !m.confidentiality_impact.is_empty() && m.confidentiality_impact != "NONE" {
            impacts.push("Application confidentiality loss".to_string());
        }
    }
    impacts
}

/// De-duplicate labels while keeping first-occurrence order.
pub fn dedup_impacts(impacts: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    impacts
        .into_iter()
        .filter(|impact| seen.insert(impact.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitrep_core::vuln::{CvssV2, CvssV3, CvssV4};

    fn system_vuln(description: &str) -> Vulnerability {
        Vulnerability {
            cve_id: "CVE-2024-0001".into(),
            description: description.into(),
            cpe_type: ["o".to_string()].into_iter().collect(),
            ..Default::default()
        }
    }

    fn app_vuln(description: &str) -> Vulnerability {
        Vulnerability {
            cve_id: "CVE-2024-0002".into(),
            description: description.into(),
            cpe_type: ["a".to_string()].into_iter().collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_root_execution_phrase_wins_regardless_of_cvss() {
        let vuln = app_vuln("A crafted request lets attackers execute arbitrary code as root.");
        assert_eq!(
            classify(&vuln),
            vec!["Arbitrary code execution as root/administrator/system"]
        );
    }

    #[test]
    fn test_system_class_user_execution_with_high_cia_escalates_to_root() {
        let mut vuln = system_vuln("The flaw allows an attacker to execute arbitrary code.");
        vuln.cvss_v31 = Some(CvssV3 {
            confidentiality_impact: "HIGH".into(),
            integrity_impact: "HIGH".into(),
            availability_impact: "HIGH".into(),
            privileges_required: "NONE".into(),
            ..Default::default()
        });
        assert_eq!(
            classify(&vuln),
            vec!["Arbitrary code execution as root/administrator/system"]
        );
    }

    #[test]
    fn test_obtain_all_privilege_flag_grants_root() {
        let mut vuln = system_vuln("An unrelated description.");
        vuln.cvss_v2 = Some(CvssV2 {
            obtain_all_privilege: Some(true),
            ..Default::default()
        });
        assert_eq!(
            classify(&vuln),
            vec!["Gain root/system/administrator privileges on system"]
        );
    }

    #[test]
    fn test_privilege_escalation_when_privileges_required() {
        // privilegesRequired != NONE blocks the root-gain rule; the
        // escalation rule (no such gate) still fires on the v2 flag.
        let mut vuln = system_vuln("An unrelated description.");
        vuln.cvss_v31 = Some(CvssV3 {
            privileges_required: "LOW".into(),
            ..Default::default()
        });
        vuln.cvss_v2 = Some(CvssV2 {
            obtain_all_privilege: Some(true),
            ..Default::default()
        });
        assert_eq!(classify(&vuln), vec!["Privilege escalation on system"]);
    }

    #[test]
    fn test_system_cia_loss_high_values() {
        let mut vuln = system_vuln("Traffic to the device may be disclosed.");
        vuln.cvss_v31 = Some(CvssV3 {
            confidentiality_impact: "HIGH".into(),
            integrity_impact: "NONE".into(),
            availability_impact: "NONE".into(),
            privileges_required: "LOW".into(),
            ..Default::default()
        });
        assert_eq!(classify(&vuln), vec!["System confidentiality loss"]);
    }

    #[test]
    fn test_low_impact_needs_sufficient_phrase() {
        let mut vuln = system_vuln("An attacker can read kernel memory on the device.");
        vuln.cvss_v31 = Some(CvssV3 {
            confidentiality_impact: "LOW".into(),
            integrity_impact: "NONE".into(),
            availability_impact: "NONE".into(),
            privileges_required: "LOW".into(),
            ..Default::default()
        });
        assert_eq!(classify(&vuln), vec!["System confidentiality loss"]);

        let mut plain = system_vuln("Some minor information disclosure.");
        plain.cvss_v31 = vuln.cvss_v31.clone();
        assert!(!classify(&plain).contains(&"System confidentiality loss".to_string()));
    }

    #[test]
    fn test_add_other_cia_impacts_fills_low_partner() {
        let mut vuln = system_vuln("Settings on the device can be altered.");
        vuln.cvss_v31 = Some(CvssV3 {
            confidentiality_impact: "LOW".into(),
            integrity_impact: "HIGH".into(),
            availability_impact: "NONE".into(),
            privileges_required: "LOW".into(),
            ..Default::default()
        });
        let impacts = classify(&vuln);
        assert!(impacts.contains(&"System integrity loss".to_string()));
        assert!(impacts.contains(&"System confidentiality loss".to_string()));
    }

    #[test]
    fn test_availability_token_alone_is_decisive() {
        let mut vuln = system_vuln("A malformed packet causes a device crash.");
        vuln.cvss_v31 = Some(CvssV3 {
            confidentiality_impact: "NONE".into(),
            integrity_impact: "NONE".into(),
            availability_impact: "NONE".into(),
            privileges_required: "LOW".into(),
            ..Default::default()
        });
        assert_eq!(classify(&vuln), vec!["System availability loss"]);
    }

    #[test]
    fn test_user_privilege_gain_on_system() {
        let mut vuln =
            system_vuln("Attackers may log in to the affected device using default credentials.");
        vuln.cvss_v31 = Some(CvssV3 {
            confidentiality_impact: "NONE".into(),
            integrity_impact: "NONE".into(),
            availability_impact: "NONE".into(),
            privileges_required: "LOW".into(),
            ..Default::default()
        });
        assert_eq!(classify(&vuln), vec!["Gain user privileges on system"]);
    }

    #[test]
    fn test_application_code_execution() {
        let mut vuln = app_vuln("A template flaw allows attackers to execute arbitrary code.");
        vuln.cvss_v31 = Some(CvssV3 {
            confidentiality_impact: "NONE".into(),
            integrity_impact: "NONE".into(),
            availability_impact: "NONE".into(),
            ..Default::default()
        });
        assert_eq!(
            classify(&vuln),
            vec!["Arbitrary code execution as user of application"]
        );
    }

    #[test]
    fn test_application_privilege_gain() {
        let vuln = app_vuln("The portal may leak credentials, leading to account takeover.");
        assert_eq!(classify(&vuln), vec!["Gain privileges on application"]);
    }

    #[test]
    fn test_application_cia_fallback() {
        let mut vuln = app_vuln("A quiet bug.");
        vuln.cvss_v31 = Some(CvssV3 {
            confidentiality_impact: "LOW".into(),
            integrity_impact: "NONE".into(),
            availability_impact: "LOW".into(),
            ..Default::default()
        });
        let impacts = classify(&vuln);
        assert_eq!(
            impacts,
            vec!["Application availability loss", "Application confidentiality loss"]
        );
    }

    #[test]
    fn test_scope_change_emits_system_loss() {
        let mut vuln = system_vuln("A quiet bug.");
        vuln.cvss_v31 = Some(CvssV3 {
            scope: "CHANGED".into(),
            confidentiality_impact: "HIGH".into(),
            integrity_impact: "NONE".into(),
            availability_impact: "NONE".into(),
            privileges_required: "HIGH".into(),
            ..Default::default()
        });
        // stage 2 already reports the HIGH confidentiality loss
        assert_eq!(classify(&vuln), vec!["System confidentiality loss"]);
    }

    #[test]
    fn test_v40_subsequent_differs_marks_system_loss() {
        let mut vuln = system_vuln("A quiet bug.");
        vuln.cvss_v40 = Some(CvssV4 {
            vulnerable_system_confidentiality: "LOW".into(),
            subsequent_system_confidentiality: "HIGH".into(),
            vulnerable_system_integrity: "NONE".into(),
            subsequent_system_integrity: "NONE".into(),
            vulnerable_system_availability: "NONE".into(),
            subsequent_system_availability: "NONE".into(),
            privileges_required: "HIGH".into(),
            ..Default::default()
        });
        assert_eq!(classify(&vuln), vec!["System confidentiality loss"]);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let mut vuln = system_vuln("Settings on the device can be altered.");
        vuln.cvss_v31 = Some(CvssV3 {
            confidentiality_impact: "LOW".into(),
            integrity_impact: "HIGH".into(),
            availability_impact: "LOW".into(),
            privileges_required: "LOW".into(),
            ..Default::default()
        });
        let first = classify(&vuln);
        for _ in 0..5 {
            assert_eq!(classify(&vuln), first);
        }
    }

    #[test]
    fn test_dedup_preserves_first_occurrence_order() {
        let impacts = dedup_impacts(vec![
            "B".to_string(),
            "A".to_string(),
            "B".to_string(),
            "C".to_string(),
        ]);
        assert_eq!(impacts, vec!["B", "A", "C"]);
    }
}
