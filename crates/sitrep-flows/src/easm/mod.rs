//! External attack-surface management workflows.
//!
//! The parent workflow chains passive enumeration, optional active
//! enumeration, HTTP service fingerprinting, and the REST publish. The two
//! enumeration phases are child workflows of their own so they can be
//! retried and reasoned about independently.

pub mod enumeration;
pub mod probe;

use std::time::Duration;

use tracing::info;

use sitrep_core::blob::BlobStore;
use sitrep_core::config::EasmScannerConfig;
use sitrep_core::error::{Error, Result};
use sitrep_core::net::validate_domain;

use crate::isim::IsimClient;
use crate::runtime::{execute_activity, ActivityOptions, RetryPolicy};

const VALIDATE_TIMEOUT: Duration = Duration::from_secs(300);
const ENUMERATION_TIMEOUT: Duration = Duration::from_secs(600);
const BRUTEFORCE_TIMEOUT: Duration = Duration::from_secs(300);
const PERMUTATION_TIMEOUT: Duration = Duration::from_secs(1800);
const MERGE_TIMEOUT: Duration = Duration::from_secs(60);
const PROBE_TIMEOUT: Duration = Duration::from_secs(3600);
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(300);

/// Validate an EASM scan request: known mode, wordlist for complete mode,
/// and well-formed seed domains.
pub fn validate_easm_input(config: &EasmScannerConfig) -> Result<EasmScannerConfig> {
    config.validate()?;
    if config.domains.is_empty() {
        return Err(Error::BadInput("at least one seed domain is required".into()));
    }
    for domain in &config.domains {
        if !validate_domain(domain) {
            return Err(Error::BadInput(format!("invalid seed domain: {domain}")));
        }
    }
    Ok(config.clone())
}

/// Parent EASM workflow.
pub struct EasmWorkflow<'a> {
    blob: &'a dyn BlobStore,
    isim: &'a IsimClient,
}

impl<'a> EasmWorkflow<'a> {
    pub fn new(blob: &'a dyn BlobStore, isim: &'a IsimClient) -> Self {
        EasmWorkflow { blob, isim }
    }

    /// Run the full pipeline and return the publish response body.
    pub async fn run(&self, config: &EasmScannerConfig) -> Result<String> {
        let config = execute_activity(
            "validate_input",
            &ActivityOptions::new(VALIDATE_TIMEOUT, RetryPolicy::no_retry()),
            move || async move { validate_easm_input(config) },
        )
        .await?;

        let mut domains_key = self.passive_enumeration(&config.domains).await?;

        if config.complete() {
            let wordlist = config
                .wordlist_path
                .as_deref()
                .ok_or_else(|| Error::BadInput("wordlist_path missing".into()))?;
            domains_key = self
                .active_enumeration(&domains_key, wordlist, config.threads)
                .await?;
        }

        let blob = self.blob;
        let domains_key = &domains_key;
        let httpx_path = &config.httpx_path;
        let httpx_key = execute_activity(
            "run_httpx",
            &ActivityOptions::new(PROBE_TIMEOUT, RetryPolicy::enumeration()),
            move || probe::run_httpx(blob, domains_key, httpx_path),
        )
        .await?;

        let httpx_key = &httpx_key;
        execute_activity(
            "parse_and_publish",
            &ActivityOptions::new(PUBLISH_TIMEOUT, RetryPolicy::publish()),
            move || self.parse_and_publish(httpx_key),
        )
        .await
    }

    /// Child workflow: subfinder and amass in parallel, results merged into
    /// a unique set. An empty merge fails the workflow.
    pub async fn passive_enumeration(&self, domains: &[String]) -> Result<String> {
        let blob = self.blob;
        let subfinder_opts = ActivityOptions::new(ENUMERATION_TIMEOUT, RetryPolicy::no_retry());
        let subfinder = execute_activity(
            "run_subfinder",
            &subfinder_opts,
            move || enumeration::run_subfinder(domains, blob),
        );
        let amass_opts = ActivityOptions::new(ENUMERATION_TIMEOUT, RetryPolicy::no_retry());
        let amass = execute_activity(
            "run_amass",
            &amass_opts,
            move || enumeration::run_amass(domains, blob),
        );
        let (subfinder_key, amass_key) = tokio::try_join!(subfinder, amass)?;
        let keys = vec![subfinder_key, amass_key];

        let keys = &keys;
        execute_activity(
            "get_unique_subdomains",
            &ActivityOptions::new(MERGE_TIMEOUT, RetryPolicy::enumeration()),
            move || enumeration::get_unique_subdomains(blob, keys),
        )
        .await
    }

    /// Child workflow: dnsx bruteforce, alterx permutations, dnsx resolve.
    pub async fn active_enumeration(
        &self,
        passive_key: &str,
        wordlist: &str,
        threads: u32,
    ) -> Result<String> {
        let blob = self.blob;
        let bruteforce_key = execute_activity(
            "run_dnsx_bruteforce",
            &ActivityOptions::new(BRUTEFORCE_TIMEOUT, RetryPolicy::enumeration()),
            move || enumeration::run_dnsx_bruteforce(blob, passive_key, wordlist, threads),
        )
        .await?;

        let bruteforce_key = &bruteforce_key;
        let alterx_key = execute_activity(
            "run_alterx",
            &ActivityOptions::new(PERMUTATION_TIMEOUT, RetryPolicy::enumeration()),
            move || enumeration::run_alterx(blob, bruteforce_key),
        )
        .await?;

        let alterx_key = &alterx_key;
        execute_activity(
            "run_dnsx_resolver",
            &ActivityOptions::new(ENUMERATION_TIMEOUT, RetryPolicy::enumeration()),
            move || enumeration::run_dnsx_resolver(blob, alterx_key),
        )
        .await
    }

    async fn parse_and_publish(&self, httpx_key: &str) -> Result<String> {
        let jsonl = self.blob.get(httpx_key).await?;
        let records = probe::parse_httpx_output(&jsonl);
        info!(records = records.len(), "publishing EASM records");
        self.isim.post_easm(&records).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: &str) -> EasmScannerConfig {
        EasmScannerConfig {
            domains: vec!["example.com".to_string()],
            mode: mode.to_string(),
            threads: 100,
            httpx_path: "httpx".to_string(),
            wordlist_path: None,
        }
    }

    #[test]
    fn test_validate_accepts_fast_mode() {
        assert!(validate_easm_input(&config("fast")).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_domain() {
        let mut cfg = config("fast");
        cfg.domains = vec!["not a domain".to_string()];
        assert_eq!(
            validate_easm_input(&cfg).unwrap_err().kind(),
            "BadInput"
        );
    }

    #[test]
    fn test_validate_rejects_empty_domains() {
        let mut cfg = config("fast");
        cfg.domains.clear();
        assert!(validate_easm_input(&cfg).is_err());
    }

    #[test]
    fn test_validate_complete_mode_requires_wordlist() {
        assert!(validate_easm_input(&config("complete")).is_err());

        let wordlist = tempfile::NamedTempFile::new().unwrap();
        let mut cfg = config("complete");
        cfg.wordlist_path = Some(wordlist.path().display().to_string());
        assert!(validate_easm_input(&cfg).is_ok());
    }
}
