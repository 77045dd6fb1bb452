//! CPE-range matching: linking a CVE's configurations to stored software
//! versions.
//!
//! Version comparison uses semantic versioning where both sides parse
//! (missing components are padded), and falls back to string equality
//! otherwise - equality satisfies inclusive bounds only.

use semver::Version;
use serde_json::Value;
use tracing::{info, warn};

use sitrep_core::cpe::CpeIdentifier;
use sitrep_core::error::{Error, Result};
use sitrep_graph::CveStore;

use crate::client::NvdApi;

const RANGE_BOUND_KEYS: [&str; 4] = [
    "versionStartIncluding",
    "versionStartExcluding",
    "versionEndIncluding",
    "versionEndExcluding",
];

/// Parse a version string leniently: strip a leading `v`, pad missing
/// minor/patch components with zero. `None` when any component is not
/// numeric.
pub fn lenient_semver(version: &str) -> Option<Version> {
    let trimmed = version.trim().trim_start_matches('v');
    if trimmed.is_empty() {
        return None;
    }
    let mut numbers = [0u64; 3];
    let parts: Vec<&str> = trimmed.split('.').collect();
    if parts.len() > 3 {
        return None;
    }
    for (slot, part) in numbers.iter_mut().zip(parts.iter()) {
        *slot = part.parse().ok()?;
    }
    Some(Version::new(numbers[0], numbers[1], numbers[2]))
}

/// Check version-range bounds on a `cpeMatch` entry.
///
/// Returns `None` when the entry carries no bounds at all; otherwise whether
/// `version` falls inside the declared interval.
pub fn check_range_bounds(cpe_match: &Value, version: &str) -> Option<bool> {
    if !RANGE_BOUND_KEYS
        .iter()
        .any(|key| cpe_match.get(*key).is_some())
    {
        return None;
    }

    let current = lenient_semver(version);
    let mut inside = false;

    for key in RANGE_BOUND_KEYS {
        let Some(bound) = cpe_match.get(key).and_then(Value::as_str) else {
            continue;
        };
        match (&current, lenient_semver(bound)) {
            (Some(current), Some(bound_version)) => {
                let ok = match key {
                    "versionStartIncluding" => *current >= bound_version,
                    "versionStartExcluding" => *current > bound_version,
                    "versionEndIncluding" => *current <= bound_version,
                    _ => *current < bound_version,
                };
                if !ok {
                    return Some(false);
                }
                inside = true;
            }
            // Non-semver fallback: string equality satisfies inclusive
            // bounds only.
            _ => {
                let inclusive = key.ends_with("Including");
                if inclusive && version == bound {
                    inside = true;
                } else {
                    return Some(false);
                }
            }
        }
    }
    Some(inside)
}

/// Full range check: declared bounds when present, otherwise the
/// match-criteria expansion endpoint.
pub async fn check_ranges(nvd: &dyn NvdApi, cpe_match: &Value, version: &str) -> Result<bool> {
    let criteria = cpe_match
        .get("criteria")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::BadInput("cpeMatch without criteria".into()))?;
    let cpe: CpeIdentifier = criteria.parse()?;
    if cpe.version != "*" {
        return Err(Error::BadInput(format!(
            "range check on a cpeMatch with a concrete version: {criteria}"
        )));
    }

    if let Some(result) = check_range_bounds(cpe_match, version) {
        return Ok(result);
    }

    let Some(match_criteria_id) = cpe_match.get("matchCriteriaId").and_then(Value::as_str) else {
        return Ok(false);
    };
    let names = nvd.match_criteria_versions(match_criteria_id).await?;
    for name in names {
        if let Ok(expanded) = name.parse::<CpeIdentifier>() {
            if expanded.version == version {
                info!(version, criteria, "match-criteria expansion confirmed version");
                return Ok(true);
            }
        }
    }
    Ok(false)
}

async fn ensure_vulnerability(
    store: &dyn CveStore,
    description: &str,
    created: &mut bool,
) -> Result<()> {
    if !*created {
        store.create_vulnerability(description).await?;
        *created = true;
    }
    Ok(())
}

/// Process one `cpeMatch`: link the vulnerability to every stored software
/// version the entry covers. Returns whether the vulnerability node now
/// exists.
pub async fn process_cpe_match(
    store: &dyn CveStore,
    nvd: &dyn NvdApi,
    cpe_match: &Value,
    vul_description: &str,
    flag: bool,
) -> Result<bool> {
    let mut created = flag;

    let criteria = cpe_match
        .get("criteria")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::BadInput("cpeMatch without criteria".into()))?;
    let cpe: CpeIdentifier = criteria.parse()?;

    if cpe.version != "*" {
        // A three-component version also gets a major.minor candidate.
        if cpe.version.matches('.').count() >= 2 {
            let mut components = cpe.version.splitn(3, '.');
            let major = components.next().unwrap_or_default();
            let minor = components.next().unwrap_or_default();
            let shortened = format!("{}:{}:{major}.{minor}", cpe.vendor, cpe.product);
            if store.software_version_exists(&shortened).await? {
                ensure_vulnerability(store, vul_description, &mut created).await?;
                store
                    .link_vulnerability_to_software_version(vul_description, &shortened)
                    .await?;
            }
        }

        for key in [
            cpe.vendor_product_version(),
            format!("{}:{}:*", cpe.vendor, cpe.product),
            format!("{}:*:*", cpe.vendor),
        ] {
            if store.software_version_exists(&key).await? {
                ensure_vulnerability(store, vul_description, &mut created).await?;
                store
                    .link_vulnerability_to_software_version(vul_description, &key)
                    .await?;
            }
        }
        return Ok(created);
    }

    // ANY version: enumerate the stored versions of the product and keep
    // those the range covers.
    let stored = store.get_versions_of_product(&cpe.vendor_product()).await?;
    for stored_version in stored {
        let Ok(stored_cpe) = stored_version.parse::<CpeIdentifier>() else {
            continue;
        };
        if check_ranges(nvd, cpe_match, &stored_cpe.version).await? {
            ensure_vulnerability(store, vul_description, &mut created).await?;
            let key = format!(
                "{}:{}:{}",
                cpe.vendor, cpe.product, stored_cpe.version
            );
            store
                .link_vulnerability_to_software_version(vul_description, &key)
                .await?;
        }
    }

    Ok(created)
}

/// Walk a CVE `configurations` payload, handling `AND` pairs and plain `OR`
/// nodes, and link every covered software version. Errors on individual
/// entries are logged and skipped.
pub async fn check_configurations(
    store: &dyn CveStore,
    nvd: &dyn NvdApi,
    configurations: &Value,
    vul_description: &str,
    flag: bool,
) -> Result<bool> {
    let mut created = flag;
    let Some(configurations) = configurations.as_array() else {
        return Ok(created);
    };

    for configuration in configurations {
        let nodes = configuration
            .get("nodes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        if configuration.get("operator").and_then(Value::as_str) == Some("AND") {
            if nodes.len() != 2 {
                warn!(
                    count = nodes.len(),
                    "expected two nodes in AND configuration"
                );
                continue;
            }
            let first_vulnerable = nodes[0]
                .pointer("/cpeMatch/0/vulnerable")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let (vuln_node, other_node) = if first_vulnerable {
                (&nodes[0], &nodes[1])
            } else {
                (&nodes[1], &nodes[0])
            };
            if vuln_node.get("operator").and_then(Value::as_str) != Some("OR")
                || other_node.get("operator").and_then(Value::as_str) != Some("OR")
            {
                warn!("invalid recursion depth in AND configuration");
                continue;
            }
            for cpe_match in vuln_node
                .get("cpeMatch")
                .and_then(Value::as_array)
                .unwrap_or(&Vec::new())
            {
                match process_cpe_match(store, nvd, cpe_match, vul_description, created).await {
                    Ok(updated) => created = updated,
                    Err(e) => warn!(error = %e, "skipping CPE match"),
                }
            }
        } else {
            for node in &nodes {
                if node.get("operator").and_then(Value::as_str) != Some("OR") {
                    continue;
                }
                for cpe_match in node
                    .get("cpeMatch")
                    .and_then(Value::as_array)
                    .unwrap_or(&Vec::new())
                {
                    match process_cpe_match(store, nvd, cpe_match, vul_description, created).await
                    {
                        Ok(updated) => created = updated,
                        Err(e) => warn!(error = %e, "skipping CPE match"),
                    }
                }
            }
        }
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lenient_semver_pads_components() {
        assert_eq!(lenient_semver("1.5"), Some(Version::new(1, 5, 0)));
        assert_eq!(lenient_semver("2"), Some(Version::new(2, 0, 0)));
        assert_eq!(lenient_semver("v1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(lenient_semver("1.2.3.4"), None);
        assert_eq!(lenient_semver("1.2b"), None);
        assert_eq!(lenient_semver(""), None);
    }

    #[test]
    fn test_check_range_bounds_interval() {
        let bounds = json!({
            "versionStartIncluding": "1.0",
            "versionEndExcluding": "2.0"
        });
        assert_eq!(check_range_bounds(&bounds, "1.5"), Some(true));
        assert_eq!(check_range_bounds(&bounds, "2.0"), Some(false));
        assert_eq!(check_range_bounds(&bounds, "0.9"), Some(false));
        assert_eq!(check_range_bounds(&bounds, "1.0"), Some(true));
    }

    #[test]
    fn test_check_range_bounds_exclusive_start() {
        let bounds = json!({"versionStartExcluding": "1.0"});
        assert_eq!(check_range_bounds(&bounds, "1.0"), Some(false));
        assert_eq!(check_range_bounds(&bounds, "1.0.1"), Some(true));
    }

    #[test]
    fn test_check_range_bounds_absent() {
        let no_bounds = json!({"criteria": "cpe:2.3:a:x:y:*:*:*:*:*:*:*:*"});
        assert_eq!(check_range_bounds(&no_bounds, "1.0"), None);
    }

    #[test]
    fn test_check_range_bounds_non_semver_equality_fallback() {
        let bounds = json!({"versionEndIncluding": "2021-sp1"});
        assert_eq!(check_range_bounds(&bounds, "2021-sp1"), Some(true));
        assert_eq!(check_range_bounds(&bounds, "2020-sp3"), Some(false));
    }
}
