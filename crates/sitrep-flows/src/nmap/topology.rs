//! Topology discovery: traceroute sweep and centrality trigger.

use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use tracing::{info, warn};

use sitrep_core::config::NmapTopologyConfig;
use sitrep_core::dto::TracerouteResult;
use sitrep_core::error::{Error, Result};
use sitrep_core::net::validate_target;
use sitrep_core::process::run_command;

use crate::isim::IsimClient;
use crate::nmap::parser::parse_traceroute_xml;
use crate::nmap::scan_retry;
use crate::runtime::{execute_activity, ActivityOptions, RetryPolicy};

const VALIDATE_TIMEOUT: Duration = Duration::from_secs(300);
const SCAN_TIMEOUT: Duration = Duration::from_secs(3600);
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(3600);

/// Validate a topology-scan request.
pub fn validate_topology_input(config: &NmapTopologyConfig) -> Result<NmapTopologyConfig> {
    if config.targets.is_empty() {
        return Err(Error::BadInput("at least one scan target is required".into()));
    }
    if !config.targets.iter().all(|t| validate_target(t)) {
        return Err(Error::BadInput("invalid targets".into()));
    }
    Ok(config.clone())
}

/// The public source address of this machine, or empty when unknown.
pub async fn get_public_ip() -> String {
    match reqwest::get("https://ident.me").await {
        Ok(response) => response.text().await.unwrap_or_default().trim().to_string(),
        Err(e) => {
            warn!(error = %e, "cannot determine public source IP");
            String::new()
        }
    }
}

/// Run a ping+traceroute sweep over every target and collect hop paths.
pub async fn run_traceroute_scan(targets: &[String]) -> Result<TracerouteResult> {
    let source_ip = get_public_ip().await;
    let mut result = TracerouteResult {
        time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        data: Vec::new(),
    };

    for target in targets {
        info!(target = %target, "topology scan started");
        let command = vec![
            "nmap".to_string(),
            "-sn".to_string(),
            "-n".to_string(),
            "--traceroute".to_string(),
            "-oX".to_string(),
            "-".to_string(),
            target.clone(),
        ];
        let output = run_command(&command, SCAN_TIMEOUT, None).await?;
        if !output.success() {
            return Err(Error::EnumerationTool(format!(
                "nmap traceroute failed with status code {} and error {}, command={command:?}",
                output.exit_code, output.stderr
            )));
        }
        result
            .data
            .extend(parse_traceroute_xml(&output.stdout, &source_ip)?);
        info!(target = %target, "topology scan succeeded");
    }
    Ok(result)
}

/// Topology workflow: validate, traceroute, publish, trigger centrality.
pub struct NmapTopologyWorkflow<'a> {
    isim: &'a IsimClient,
}

impl<'a> NmapTopologyWorkflow<'a> {
    pub fn new(isim: &'a IsimClient) -> Self {
        NmapTopologyWorkflow { isim }
    }

    pub async fn run(&self, config: &NmapTopologyConfig) -> Result<String> {
        let config = execute_activity(
            "nmap_topology_validate_input",
            &ActivityOptions::new(VALIDATE_TIMEOUT, RetryPolicy::no_retry()),
            move || async move { validate_topology_input(config) },
        )
        .await?;

        let targets = &config.targets;
        let traceroute = execute_activity(
            "run_nmap_traceroute_scan",
            &ActivityOptions::new(SCAN_TIMEOUT, scan_retry()),
            move || run_traceroute_scan(targets),
        )
        .await?;

        let isim = self.isim;
        let traceroute = &traceroute;
        let response = execute_activity(
            "publish_traceroute",
            &ActivityOptions::new(PUBLISH_TIMEOUT, RetryPolicy::publish()),
            move || isim.post_traceroute(traceroute),
        )
        .await?;

        execute_activity(
            "trigger_centrality",
            &ActivityOptions::new(PUBLISH_TIMEOUT, RetryPolicy::publish()),
            move || async move {
                let betweenness = isim.compute_betweenness_centrality().await?;
                let degree = isim.compute_degree_centrality().await?;
                Ok(format!("{betweenness}; {degree}"))
            },
        )
        .await?;

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_topology_targets() {
        let config = NmapTopologyConfig {
            targets: vec!["10.0.0.0/24".to_string()],
            arguments: "-sn -n --traceroute".to_string(),
        };
        assert!(validate_topology_input(&config).is_ok());

        let bad = NmapTopologyConfig {
            targets: vec!["??".to_string()],
            arguments: String::new(),
        };
        assert!(validate_topology_input(&bad).is_err());
    }
}
