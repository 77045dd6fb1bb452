//! In-memory fakes for storage traits (testing only).
//!
//! [`MemoryCveStore`] satisfies the [`CveStore`] contract without a running
//! graph store, including the `vendor:product:version` key matching against
//! stored CPE 2.3 strings.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;

use sitrep_core::cpe::CpeIdentifier;
use sitrep_core::error::Result;
use sitrep_core::vuln::Vulnerability;

use crate::cve::{CveStore, SoftwareVersionRow};

#[derive(Debug, Default)]
struct Inner {
    /// version string -> watermark
    software_versions: BTreeMap<String, Option<String>>,
    cves: BTreeMap<String, Vulnerability>,
    updated_cves: Vec<String>,
    vulnerabilities: BTreeSet<String>,
    /// (vulnerability description, matched stored version)
    in_links: BTreeSet<(String, String)>,
    /// (description, cve id)
    refers_to: BTreeSet<(String, String)>,
}

/// In-memory CVE store backed by maps and sets.
#[derive(Debug, Default)]
pub struct MemoryCveStore {
    inner: Mutex<Inner>,
}

fn key_matches(stored_version: &str, key: &str) -> bool {
    let Ok(cpe) = stored_version.parse::<CpeIdentifier>() else {
        return false;
    };
    let parts: Vec<&str> = key.splitn(3, ':').collect();
    let wanted = [parts.first(), parts.get(1), parts.get(2)];
    let actual = [&cpe.vendor, &cpe.product, &cpe.version];
    wanted
        .iter()
        .zip(actual.iter())
        .all(|(want, have)| match want {
            Some(value) if ***value != *"*" => value == have,
            _ => true,
        })
}

impl MemoryCveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed stored software versions (full CPE 2.3 strings) with no
    /// watermark.
    pub fn with_versions(versions: &[&str]) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock().unwrap();
            for version in versions {
                inner.software_versions.insert((*version).to_string(), None);
            }
        }
        store
    }

    /// CVE ids inserted via `create_cve`, in insertion order of the map.
    pub fn created_cve_ids(&self) -> Vec<String> {
        self.inner.lock().unwrap().cves.keys().cloned().collect()
    }

    /// CVE ids that went through `update_cve`.
    pub fn updated_cve_ids(&self) -> Vec<String> {
        self.inner.lock().unwrap().updated_cves.clone()
    }

    /// Stored copy of a CVE record.
    pub fn cve(&self, cve_id: &str) -> Option<Vulnerability> {
        self.inner.lock().unwrap().cves.get(cve_id).cloned()
    }

    /// Stored versions a vulnerability is linked to.
    pub fn linked_versions(&self, description: &str) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .in_links
            .iter()
            .filter(|(desc, _)| desc == description)
            .map(|(_, version)| version.clone())
            .collect()
    }

    /// `REFERS_TO` pairs (description, cve id).
    pub fn refers_to_pairs(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().refers_to.iter().cloned().collect()
    }

    /// Current watermark of a stored version.
    pub fn watermark(&self, version: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .software_versions
            .get(version)
            .cloned()
            .flatten()
    }

    /// Vulnerability node descriptions present in the store.
    pub fn vulnerability_descriptions(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .vulnerabilities
            .iter()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CveStore for MemoryCveStore {
    async fn cve_exists(&self, cve_id: &str) -> Result<bool> {
        Ok(self.inner.lock().unwrap().cves.contains_key(cve_id))
    }

    async fn software_version_exists(&self, key: &str) -> Result<bool> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .software_versions
            .keys()
            .any(|stored| key_matches(stored, key)))
    }

    async fn get_versions_of_product(&self, vendor_and_product: &str) -> Result<Vec<String>> {
        let key = format!("{vendor_and_product}:*");
        Ok(self
            .inner
            .lock()
            .unwrap()
            .software_versions
            .keys()
            .filter(|stored| key_matches(stored, &key))
            .cloned()
            .collect())
    }

    async fn get_all_software_versions(&self) -> Result<Vec<SoftwareVersionRow>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .software_versions
            .iter()
            .map(|(version, watermark)| SoftwareVersionRow {
                version: version.clone(),
                cve_timestamp: watermark.clone(),
            })
            .collect())
    }

    async fn create_cve(&self, vuln: &Vulnerability) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .cves
            .insert(vuln.cve_id.clone(), vuln.clone());
        Ok(())
    }

    async fn update_cve(&self, vuln: &Vulnerability) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.cves.insert(vuln.cve_id.clone(), vuln.clone());
        inner.updated_cves.push(vuln.cve_id.clone());
        Ok(())
    }

    async fn create_vulnerability(&self, description: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .vulnerabilities
            .insert(description.to_string());
        Ok(())
    }

    async fn link_vulnerability_to_software_version(
        &self,
        description: &str,
        key: &str,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let matched: Vec<String> = inner
            .software_versions
            .keys()
            .filter(|stored| key_matches(stored, key))
            .cloned()
            .collect();
        for version in matched {
            inner
                .in_links
                .insert((description.to_string(), version));
        }
        Ok(())
    }

    async fn link_cve_to_vulnerability(&self, cve_id: &str, description: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .refers_to
            .insert((description.to_string(), cve_id.to_string()));
        Ok(())
    }

    async fn set_cve_watermark(&self, version: &str, timestamp: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .software_versions
            .insert(version.to_string(), Some(timestamp.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_matches_exact_and_wildcard() {
        let stored = "cpe:2.3:a:nginx:nginx:1.24:*:*:*:*:*:*:*";
        assert!(key_matches(stored, "nginx:nginx:1.24"));
        assert!(key_matches(stored, "nginx:nginx:*"));
        assert!(key_matches(stored, "nginx:*:*"));
        assert!(!key_matches(stored, "apache:nginx:1.24"));
        assert!(!key_matches(stored, "nginx:nginx:1.25"));
    }

    #[test]
    fn test_key_matches_rejects_non_cpe_storage() {
        assert!(!key_matches("not a cpe", "nginx:nginx:*"));
    }

    #[tokio::test]
    async fn test_version_lookup_and_links() {
        let store = MemoryCveStore::with_versions(&[
            "cpe:2.3:a:nginx:nginx:1.24:*:*:*:*:*:*:*",
            "cpe:2.3:a:nginx:nginx:1.25:*:*:*:*:*:*:*",
        ]);
        assert!(store.software_version_exists("nginx:nginx:1.24").await.unwrap());
        assert!(!store.software_version_exists("nginx:nginx:2.0").await.unwrap());

        let versions = store.get_versions_of_product("nginx:nginx").await.unwrap();
        assert_eq!(versions.len(), 2);

        store.create_vulnerability("vuln-a").await.unwrap();
        store
            .link_vulnerability_to_software_version("vuln-a", "nginx:nginx:1.24")
            .await
            .unwrap();
        assert_eq!(
            store.linked_versions("vuln-a"),
            vec!["cpe:2.3:a:nginx:nginx:1.24:*:*:*:*:*:*:*".to_string()]
        );
    }

    #[tokio::test]
    async fn test_watermark_round_trip() {
        let store =
            MemoryCveStore::with_versions(&["cpe:2.3:a:nginx:nginx:1.24:*:*:*:*:*:*:*"]);
        store
            .set_cve_watermark(
                "cpe:2.3:a:nginx:nginx:1.24:*:*:*:*:*:*:*",
                "2024-05-01T00:00:00Z",
            )
            .await
            .unwrap();
        assert_eq!(
            store.watermark("cpe:2.3:a:nginx:nginx:1.24:*:*:*:*:*:*:*"),
            Some("2024-05-01T00:00:00Z".to_string())
        );
    }
}
