//! Nmap workflows: basic service scan and topology discovery.

pub mod parser;
pub mod topology;

use std::time::Duration;

use tracing::info;

use sitrep_core::config::NmapBasicConfig;
use sitrep_core::dto::{NmapResults, OrgUnitAsset};
use sitrep_core::error::{Error, Result};
use sitrep_core::net::validate_target;
use sitrep_core::process::run_command;

use crate::isim::IsimClient;
use crate::runtime::{execute_activity, ActivityOptions, RetryPolicy};

const VALIDATE_TIMEOUT: Duration = Duration::from_secs(300);
const SCAN_TIMEOUT: Duration = Duration::from_secs(1800);
const PARSE_TIMEOUT: Duration = Duration::from_secs(300);
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(300);

/// Five attempts; tool failures and bad input are terminal.
pub(crate) fn scan_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        initial_interval: Duration::from_secs(1),
        max_interval: Duration::from_secs(2),
        backoff_coefficient: 2.0,
        non_retryable_error_kinds: vec!["BadInput", "EnumerationToolError"],
    }
}

/// Validate a basic-scan request: every target must be an IP, CIDR range,
/// or hostname.
pub fn validate_basic_input(config: &NmapBasicConfig) -> Result<NmapBasicConfig> {
    if config.targets.is_empty() {
        return Err(Error::BadInput("at least one scan target is required".into()));
    }
    if !config.targets.iter().all(|t| validate_target(t)) {
        return Err(Error::BadInput("invalid targets".into()));
    }
    Ok(config.clone())
}

/// Run nmap with the configured arguments and return its XML output.
pub async fn run_basic_nmap_scan(targets: &[String], arguments: &str) -> Result<String> {
    let mut command = vec!["nmap".to_string()];
    command.extend(arguments.split_whitespace().map(str::to_string));
    command.extend(["-oX".to_string(), "-".to_string()]);
    command.extend(targets.iter().cloned());

    let output = run_command(&command, SCAN_TIMEOUT, None).await?;
    if !output.success() {
        return Err(Error::EnumerationTool(format!(
            "nmap run failed with status code {} and error {}, command={command:?}",
            output.exit_code, output.stderr
        )));
    }
    Ok(output.stdout)
}

/// Basic workflow: validate, scan, parse, publish to `/assets`.
pub struct NmapBasicWorkflow<'a> {
    isim: &'a IsimClient,
}

impl<'a> NmapBasicWorkflow<'a> {
    pub fn new(isim: &'a IsimClient) -> Self {
        NmapBasicWorkflow { isim }
    }

    pub async fn run(&self, config: &NmapBasicConfig) -> Result<String> {
        let config = execute_activity(
            "nmap_basic_validate_input",
            &ActivityOptions::new(VALIDATE_TIMEOUT, RetryPolicy::no_retry()),
            move || async move { validate_basic_input(config) },
        )
        .await?;

        let targets = &config.targets;
        let arguments = &config.arguments;
        let xml = execute_activity(
            "run_basic_nmap_scan",
            &ActivityOptions::new(SCAN_TIMEOUT, scan_retry()),
            move || run_basic_nmap_scan(targets, arguments),
        )
        .await?;

        let xml = &xml;
        let tag = &config.tag;
        let results = execute_activity(
            "parse_nmap_xml",
            &ActivityOptions::new(PARSE_TIMEOUT, RetryPolicy::publish()),
            move || async move { parser::parse_nmap_xml(xml, tag) },
        )
        .await?;
        let results = attach_org_unit(results, &config.org_unit_name);
        info!(
            hosts = results.hosts.len(),
            software_versions = results.software_versions.len(),
            "nmap scan parsed"
        );

        let isim = self.isim;
        let results = &results;
        execute_activity(
            "send_result_to_api",
            &ActivityOptions::new(PUBLISH_TIMEOUT, RetryPolicy::publish()),
            move || isim.post_assets(results),
        )
        .await
    }
}

/// Attribute discovered subnets to the configured organization unit.
fn attach_org_unit(mut results: NmapResults, org_unit_name: &str) -> NmapResults {
    if org_unit_name.is_empty() {
        return results;
    }
    for subnet in &mut results.subnets {
        subnet.org_units = vec![org_unit_name.to_string()];
    }
    results.org_units.push(OrgUnitAsset {
        name: org_unit_name.to_string(),
        ..Default::default()
    });
    results
}
