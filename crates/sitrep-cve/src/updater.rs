//! The CVE updater sweep.
//!
//! Walks every stored software version, pages the NVD version search from
//! the per-version `last_modified` watermark, parses and classifies each
//! record, upserts CVEs with their `IN`/`REFERS_TO` relationships, and
//! finally advances the watermark to the workflow start time. Failures on
//! one version are logged and the sweep continues with the next.

use std::time::Duration;

use tracing::{error, info, warn};

use sitrep_core::cpe::CpeIdentifier;
use sitrep_core::error::Result;
use sitrep_graph::{CveStore, SoftwareVersionRow};

use crate::client::{NvdApi, VersionPage, VersionQuery};
use crate::matcher::check_configurations;
use crate::parser::parse_vulnerabilities;

const MAX_REQUEST_ATTEMPTS: u32 = 5;
const REQUEST_RETRY_DELAY: Duration = Duration::from_secs(6);
const PAGE_STRIDE: i64 = 2000;
const UPSERT_CHUNK: usize = 100;

/// Totals of one completed sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub versions_processed: usize,
    pub cves_created: usize,
    pub cves_updated: usize,
}

/// CVE updater over a graph store and the NVD API.
pub struct CveUpdater<'a> {
    store: &'a dyn CveStore,
    nvd: &'a dyn NvdApi,
    retry_delay: Duration,
}

impl<'a> CveUpdater<'a> {
    pub fn new(store: &'a dyn CveStore, nvd: &'a dyn NvdApi) -> Self {
        CveUpdater {
            store,
            nvd,
            retry_delay: REQUEST_RETRY_DELAY,
        }
    }

    /// Shorten the inter-attempt delay (testing).
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Run one full sweep. `workflow_start` is the watermark written for
    /// every successfully processed version.
    pub async fn run_sweep(&self, workflow_start: &str) -> Result<SweepSummary> {
        let versions = self.store.get_all_software_versions().await?;
        if versions.is_empty() {
            info!("no software versions stored, nothing to sweep");
            return Ok(SweepSummary::default());
        }
        info!(count = versions.len(), "starting CVE sweep");

        let mut summary = SweepSummary::default();
        for row in &versions {
            match self.sweep_version(row, workflow_start, &mut summary).await {
                Ok(()) => summary.versions_processed += 1,
                Err(e) => {
                    error!(version = %row.version, error = %e, "version sweep failed, continuing");
                }
            }
        }
        info!(
            versions = summary.versions_processed,
            created = summary.cves_created,
            updated = summary.cves_updated,
            "CVE sweep finished"
        );
        Ok(summary)
    }

    async fn sweep_version(
        &self,
        row: &SoftwareVersionRow,
        workflow_start: &str,
        summary: &mut SweepSummary,
    ) -> Result<()> {
        let cpe: CpeIdentifier = row.version.parse()?;
        info!(version = %row.version, "processing CVEs for version");

        let mut start_index = 0i64;
        loop {
            let query = VersionQuery {
                version: cpe.vendor_product_version(),
                part: cpe.part.clone(),
                start_index,
                is_vulnerable: true,
                last_mod_start_date: row.cve_timestamp.clone(),
                last_mod_end_date: None,
            };
            let page = self.fetch_page(&query).await?;

            if page.vulnerabilities.is_empty() {
                info!(version = %row.version, "no CVEs found for version");
                break;
            }

            let parsed = parse_vulnerabilities(&page.vulnerabilities);
            info!(count = parsed.len(), version = %row.version, "parsed CVE page");

            for chunk in parsed.chunks(UPSERT_CHUNK) {
                for vuln in chunk {
                    let description = vuln.assumed_description();
                    if self.store.cve_exists(&vuln.cve_id).await? {
                        self.store.update_cve(vuln).await?;
                        summary.cves_updated += 1;
                    } else {
                        self.store.create_cve(vuln).await?;
                        summary.cves_created += 1;
                    }

                    self.store.create_vulnerability(&description).await?;
                    self.store
                        .link_vulnerability_to_software_version(
                            &description,
                            &cpe.vendor_product_version(),
                        )
                        .await?;
                    if let Err(e) = check_configurations(
                        self.store,
                        self.nvd,
                        &vuln.configurations,
                        &description,
                        true,
                    )
                    .await
                    {
                        warn!(cve = %vuln.cve_id, error = %e, "configuration matching failed");
                    }
                    self.store
                        .link_cve_to_vulnerability(&vuln.cve_id, &description)
                        .await?;
                }
            }

            if page.is_last() {
                break;
            }
            // TODO: the stride assumes the NVD default of 2000 results per
            // page; revisit if the vendor changes pagination.
            start_index += PAGE_STRIDE;
        }

        self.store
            .set_cve_watermark(&row.version, workflow_start)
            .await
    }

    async fn fetch_page(&self, query: &VersionQuery) -> Result<VersionPage> {
        let mut attempt = 1;
        loop {
            match self.nvd.search_by_version(query).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() && attempt < MAX_REQUEST_ATTEMPTS => {
                    warn!(
                        version = %query.version,
                        attempt,
                        error = %e,
                        "version search failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::{json, Value};

    use sitrep_core::error::Error;
    use sitrep_graph::fakes::MemoryCveStore;

    struct FakeNvd {
        pages: HashMap<i64, VersionPage>,
        calls: Mutex<Vec<i64>>,
        failures_before_success: Mutex<u32>,
    }

    impl FakeNvd {
        fn new(pages: Vec<VersionPage>) -> Self {
            FakeNvd {
                pages: pages.into_iter().map(|p| (p.start_index, p)).collect(),
                calls: Mutex::new(Vec::new()),
                failures_before_success: Mutex::new(0),
            }
        }

        fn failing_first(mut self, failures: u32) -> Self {
            self.failures_before_success = Mutex::new(failures);
            self
        }
    }

    #[async_trait]
    impl NvdApi for FakeNvd {
        async fn search_by_date_range(
            &self,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> sitrep_core::Result<Vec<Value>> {
            Ok(vec![])
        }

        async fn search_by_id(&self, _cve_id: &str) -> sitrep_core::Result<Vec<Value>> {
            Ok(vec![])
        }

        async fn search_by_version(
            &self,
            query: &VersionQuery,
        ) -> sitrep_core::Result<VersionPage> {
            {
                let mut failures = self.failures_before_success.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(Error::TransientNetwork("flaky".into()));
                }
            }
            self.calls.lock().unwrap().push(query.start_index);
            self.pages
                .get(&query.start_index)
                .cloned()
                .ok_or_else(|| Error::BadInput(format!("no page at {}", query.start_index)))
        }

        async fn match_criteria_versions(
            &self,
            _match_criteria_id: &str,
        ) -> sitrep_core::Result<Vec<String>> {
            Ok(vec![])
        }
    }

    fn record(id: &str) -> Value {
        json!({
            "id": id,
            "descriptions": [{"value": format!("Description of {id}")}],
        })
    }

    const STORED_VERSION: &str = "cpe:2.3:a:nginx:nginx:1.24:*:*:*:*:*:*:*";

    #[tokio::test]
    async fn test_sweep_pages_with_2000_stride() {
        let store = MemoryCveStore::with_versions(&[STORED_VERSION]);
        let nvd = FakeNvd::new(vec![
            VersionPage {
                start_index: 0,
                results_per_page: 2000,
                total_results: 3500,
                vulnerabilities: vec![record("CVE-2024-0001")],
            },
            VersionPage {
                start_index: 2000,
                results_per_page: 1500,
                total_results: 3500,
                vulnerabilities: vec![record("CVE-2024-0002")],
            },
        ]);

        let updater =
            CveUpdater::new(&store, &nvd).with_retry_delay(Duration::from_millis(1));
        let summary = updater.run_sweep("2024-05-01T00:00:00Z").await.unwrap();

        assert_eq!(*nvd.calls.lock().unwrap(), vec![0, 2000]);
        assert_eq!(summary.versions_processed, 1);
        assert_eq!(summary.cves_created, 2);
        assert_eq!(summary.cves_updated, 0);
        assert_eq!(
            store.watermark(STORED_VERSION),
            Some("2024-05-01T00:00:00Z".to_string())
        );
    }

    #[tokio::test]
    async fn test_sweep_updates_existing_cves() {
        let store = MemoryCveStore::with_versions(&[STORED_VERSION]);
        let page = VersionPage {
            start_index: 0,
            results_per_page: 2000,
            total_results: 1,
            vulnerabilities: vec![record("CVE-2024-0001")],
        };
        let nvd = FakeNvd::new(vec![page.clone()]);
        let updater =
            CveUpdater::new(&store, &nvd).with_retry_delay(Duration::from_millis(1));
        updater.run_sweep("2024-05-01T00:00:00Z").await.unwrap();

        let nvd = FakeNvd::new(vec![page]);
        let updater =
            CveUpdater::new(&store, &nvd).with_retry_delay(Duration::from_millis(1));
        let summary = updater.run_sweep("2024-05-02T00:00:00Z").await.unwrap();
        assert_eq!(summary.cves_created, 0);
        assert_eq!(summary.cves_updated, 1);
    }

    #[tokio::test]
    async fn test_sweep_links_vulnerability_and_cve() {
        let store = MemoryCveStore::with_versions(&[STORED_VERSION]);
        let nvd = FakeNvd::new(vec![VersionPage {
            start_index: 0,
            results_per_page: 2000,
            total_results: 1,
            vulnerabilities: vec![record("CVE-2024-0001")],
        }]);
        let updater =
            CveUpdater::new(&store, &nvd).with_retry_delay(Duration::from_millis(1));
        updater.run_sweep("2024-05-01T00:00:00Z").await.unwrap();

        let description = "Assumed vulnerability with ID CVE-2024-0001";
        assert_eq!(
            store.linked_versions(description),
            vec![STORED_VERSION.to_string()]
        );
        assert_eq!(
            store.refers_to_pairs(),
            vec![(description.to_string(), "CVE-2024-0001".to_string())]
        );
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let store = MemoryCveStore::with_versions(&[STORED_VERSION]);
        let nvd = FakeNvd::new(vec![VersionPage {
            start_index: 0,
            results_per_page: 2000,
            total_results: 1,
            vulnerabilities: vec![record("CVE-2024-0001")],
        }])
        .failing_first(2);
        let updater =
            CveUpdater::new(&store, &nvd).with_retry_delay(Duration::from_millis(1));
        let summary = updater.run_sweep("2024-05-01T00:00:00Z").await.unwrap();
        assert_eq!(summary.cves_created, 1);
    }

    #[tokio::test]
    async fn test_failed_version_does_not_abort_sweep() {
        // Second stored version has no pages -> BadInput from the fake; the
        // sweep still processes the other version.
        let store = MemoryCveStore::with_versions(&[
            STORED_VERSION,
            "cpe:2.3:a:broken:product:9.9:*:*:*:*:*:*:*",
        ]);
        let nvd = FakeNvd::new(vec![VersionPage {
            start_index: 0,
            results_per_page: 2000,
            total_results: 1,
            vulnerabilities: vec![record("CVE-2024-0001")],
        }]);
        let updater =
            CveUpdater::new(&store, &nvd).with_retry_delay(Duration::from_millis(1));
        let summary = updater.run_sweep("2024-05-01T00:00:00Z").await.unwrap();
        assert_eq!(summary.versions_processed, 1);
    }

    #[tokio::test]
    async fn test_empty_store_is_a_noop() {
        let store = MemoryCveStore::new();
        let nvd = FakeNvd::new(vec![]);
        let updater = CveUpdater::new(&store, &nvd);
        let summary = updater.run_sweep("2024-05-01T00:00:00Z").await.unwrap();
        assert_eq!(summary, SweepSummary::default());
    }
}
