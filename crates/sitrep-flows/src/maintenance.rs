//! Retention maintenance workflow.

use std::time::Duration;

use sitrep_core::config::Config;
use sitrep_core::error::Result;
use sitrep_graph::cleaner::DEFAULT_RETENTION_DAYS;
use sitrep_graph::GraphClient;

use crate::runtime::{execute_activity, ActivityOptions, RetryPolicy};

const CLEANUP_TIMEOUT: Duration = Duration::from_secs(1800);

/// Reap lifecycle-closed edges and aged security events past the retention
/// window.
pub async fn run_cleanup_workflow(config: &Config) -> Result<String> {
    let options = ActivityOptions::new(CLEANUP_TIMEOUT, RetryPolicy::publish());
    execute_activity("retention_cleanup", &options, move || async move {
        let graph = GraphClient::connect(&config.neo4j).await?;
        let vulnerabilities = graph
            .clean_old_vulnerabilities(DEFAULT_RETENTION_DAYS)
            .await?;
        let host_layer = graph.clean_host_layer(DEFAULT_RETENTION_DAYS).await?;
        let network_layer = graph.clean_network_layer(DEFAULT_RETENTION_DAYS).await?;
        let events = graph.clean_security_events(DEFAULT_RETENTION_DAYS).await?;
        Ok(format!(
            "Removed {vulnerabilities} vulnerability links, {host_layer} host-layer edges, \
             {network_layer} network-layer edges, {events} security events."
        ))
    })
    .await
}
