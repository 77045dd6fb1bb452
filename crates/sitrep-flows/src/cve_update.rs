//! CVE update workflow.
//!
//! One activity with a 90-minute budget and a single attempt: a duplicate
//! full sweep costs more than a missed tick, the next schedule fire catches
//! up via the per-version watermarks.

use std::time::Duration;

use chrono::{SecondsFormat, Utc};

use sitrep_core::config::Config;
use sitrep_core::error::Result;
use sitrep_cve::{CveUpdater, HttpNvdClient};
use sitrep_graph::GraphClient;

use crate::runtime::{execute_activity, ActivityOptions, RetryPolicy};

const SWEEP_TIMEOUT: Duration = Duration::from_secs(90 * 60);

/// Run one CVE sweep against the configured graph store and the NVD API.
pub async fn run_cve_update_workflow(config: &Config) -> Result<String> {
    let options = ActivityOptions::new(SWEEP_TIMEOUT, RetryPolicy::no_retry());
    execute_activity("cve_database_update", &options, move || async move {
        let graph = GraphClient::connect(&config.neo4j).await?;
        let nvd = HttpNvdClient::new(config.cve_connector.nvd_api_key.clone());
        let workflow_start = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let summary = CveUpdater::new(&graph, &nvd).run_sweep(&workflow_start).await?;
        Ok(format!(
            "Executed CVE download for {} software versions ({} created, {} updated).",
            summary.versions_processed, summary.cves_created, summary.cves_updated
        ))
    })
    .await
}
