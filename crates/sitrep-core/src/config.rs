//! Process configuration.
//!
//! One YAML mapping describes the whole pipeline. The file is loaded once in
//! `main`, environment overrides are applied, and the resulting [`Config`] is
//! passed by reference into the components that need it.

use std::env;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Durable-workflow runtime connection and task-queue names.
#[derive(Debug, Clone, Deserialize)]
pub struct TemporalConfig {
    pub url: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_easm_queue")]
    pub easm_task_queue: String,
    #[serde(default = "default_nmap_queue")]
    pub nmap_task_queue: String,
    #[serde(default = "default_cve_queue")]
    pub cve_connector_task_queue: String,
    #[serde(default = "default_slp_queue")]
    pub slp_enrichment_task_queue: String,
    #[serde(default = "default_csa_queue")]
    pub csa_task_queue: String,
}

fn default_namespace() -> String {
    "default".into()
}
fn default_easm_queue() -> String {
    "easm".into()
}
fn default_nmap_queue() -> String {
    "nmap".into()
}
fn default_cve_queue() -> String {
    "cve_connector".into()
}
fn default_slp_queue() -> String {
    "slp_enrichment".into()
}
fn default_csa_queue() -> String {
    "csa".into()
}

/// Neo4j bolt connection parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct Neo4jConfig {
    pub bolt: String,
    #[serde(default = "default_neo4j_user")]
    pub user: String,
    pub password: String,
}

fn default_neo4j_user() -> String {
    "neo4j".into()
}

/// Redis blob-store connection parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_redis_port() -> u16 {
    6379
}

impl RedisConfig {
    /// Connection URL for the redis client.
    pub fn url(&self) -> String {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!("redis://{user}:{pass}@{}:{}/0", self.host, self.port),
            (None, Some(pass)) => format!("redis://:{pass}@{}:{}/0", self.host, self.port),
            _ => format!("redis://{}:{}/0", self.host, self.port),
        }
    }
}

/// Basic Nmap scan defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct NmapBasicConfig {
    pub targets: Vec<String>,
    pub arguments: String,
    #[serde(default)]
    pub tag: Vec<String>,
    #[serde(default = "default_org_unit")]
    pub org_unit_name: String,
}

fn default_org_unit() -> String {
    "Internal IT".into()
}

/// Topology (traceroute) scan defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct NmapTopologyConfig {
    pub targets: Vec<String>,
    pub arguments: String,
}

/// REST collaborator base URL.
#[derive(Debug, Clone, Deserialize)]
pub struct IsimConfig {
    pub url: String,
}

/// EASM scanner defaults and mode.
#[derive(Debug, Clone, Deserialize)]
pub struct EasmScannerConfig {
    pub domains: Vec<String>,
    pub mode: String,
    #[serde(default = "default_threads")]
    pub threads: u32,
    #[serde(default = "default_httpx_path")]
    pub httpx_path: String,
    #[serde(default)]
    pub wordlist_path: Option<String>,
}

fn default_threads() -> u32 {
    100
}
fn default_httpx_path() -> String {
    "httpx".into()
}

impl EasmScannerConfig {
    /// Whether the workflow should run the active enumeration phase.
    pub fn complete(&self) -> bool {
        self.mode == "complete"
    }

    /// Validate mode and the wordlist requirement for complete mode.
    pub fn validate(&self) -> Result<()> {
        if self.mode != "fast" && self.mode != "complete" {
            return Err(Error::BadInput(format!(
                "invalid mode: {:?} (expected 'fast' or 'complete')",
                self.mode
            )));
        }
        if self.complete() {
            let path = self.wordlist_path.as_deref().ok_or_else(|| {
                Error::BadInput("wordlist_path is required when mode == 'complete'".into())
            })?;
            if !Path::new(path).is_file() {
                return Err(Error::BadInput(format!(
                    "wordlist path does not exist or is not a file: {path:?}"
                )));
            }
        }
        Ok(())
    }
}

/// SLP enrichment API key.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SlpEnrichmentConfig {
    #[serde(default)]
    pub x_api_key: String,
}

/// CVE connector options.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CveConnectorConfig {
    #[serde(default)]
    pub nvd_api_key: Option<String>,
}

/// Top-level configuration mapping.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub temporal: TemporalConfig,
    pub neo4j: Neo4jConfig,
    pub redis: RedisConfig,
    pub nmap_basic: NmapBasicConfig,
    pub nmap_topology: NmapTopologyConfig,
    pub isim: IsimConfig,
    pub easm_scanner: EasmScannerConfig,
    #[serde(default)]
    pub slp_enrichment: SlpEnrichmentConfig,
    #[serde(default)]
    pub cve_connector: CveConnectorConfig,
}

impl Config {
    /// Load the configuration from a YAML file and apply environment
    /// overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::BadInput(format!("cannot read config {}: {e}", path.display())))?;
        Self::from_yaml(&raw)
    }

    /// Parse the configuration from a YAML string and apply environment
    /// overrides.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(raw)?;
        config.apply_env();
        config.easm_scanner.validate()?;
        Ok(config)
    }

    /// Environment variables take precedence over file values.
    ///
    /// `NEO4J_BOLT`/`NEO4J_USER`/`NEO4J_PASSWORD` override the graph store,
    /// `TEMPORAL_HOST`+`TEMPORAL_PORT` override the runtime address, and
    /// `NVD_KEY` is the fallback for `cve_connector.nvd_api_key`.
    fn apply_env(&mut self) {
        if let Ok(bolt) = env::var("NEO4J_BOLT") {
            self.neo4j.bolt = bolt;
        }
        if let Ok(user) = env::var("NEO4J_USER") {
            self.neo4j.user = user;
        }
        if let Ok(password) = env::var("NEO4J_PASSWORD") {
            self.neo4j.password = password;
        }
        if let (Ok(host), Ok(port)) = (env::var("TEMPORAL_HOST"), env::var("TEMPORAL_PORT")) {
            self.temporal.url = format!("{host}:{port}");
        }
        if self.cve_connector.nvd_api_key.is_none() {
            self.cve_connector.nvd_api_key = env::var("NVD_KEY").ok();
        }
    }
}

/// Fail fast when any of the named environment variables is unset or empty.
pub fn require_env(vars: &[&str]) -> Result<()> {
    let missing: Vec<&str> = vars
        .iter()
        .copied()
        .filter(|var| env::var(var).map(|v| v.is_empty()).unwrap_or(true))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::BadInput(format!(
            "missing required environment variables: {}",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_YAML: &str = r#"
temporal:
  url: "localhost:7233"
neo4j:
  bolt: "bolt://localhost:7687"
  password: "secret"
redis:
  host: "localhost"
nmap_basic:
  targets: ["192.168.1.0/24"]
  arguments: "-sV"
  tag: ["CASM"]
nmap_topology:
  targets: ["192.168.1.0/24"]
  arguments: "-sn -n --traceroute"
isim:
  url: "http://localhost:8000"
easm_scanner:
  domains: ["example.com"]
  mode: "fast"
"#;

    #[test]
    fn test_minimal_config_parses_with_defaults() {
        let config = Config::from_yaml(MINIMAL_YAML).expect("config should parse");
        assert_eq!(config.temporal.namespace, "default");
        assert_eq!(config.temporal.easm_task_queue, "easm");
        assert_eq!(config.temporal.cve_connector_task_queue, "cve_connector");
        assert_eq!(config.neo4j.user, "neo4j");
        assert_eq!(config.redis.port, 6379);
        assert_eq!(config.easm_scanner.threads, 100);
        assert!(!config.easm_scanner.complete());
    }

    #[test]
    fn test_complete_mode_requires_wordlist() {
        let yaml = MINIMAL_YAML.replace("mode: \"fast\"", "mode: \"complete\"");
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, Error::BadInput(_)), "got {err:?}");
    }

    #[test]
    fn test_complete_mode_with_existing_wordlist() {
        let wordlist = tempfile::NamedTempFile::new().unwrap();
        let yaml = MINIMAL_YAML.replace(
            "mode: \"fast\"",
            &format!(
                "mode: \"complete\"\n  wordlist_path: \"{}\"",
                wordlist.path().display()
            ),
        );
        let config = Config::from_yaml(&yaml).expect("config should parse");
        assert!(config.easm_scanner.complete());
    }

    #[test]
    fn test_invalid_mode_rejected() {
        let yaml = MINIMAL_YAML.replace("mode: \"fast\"", "mode: \"turbo\"");
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_redis_url_shapes() {
        let plain = RedisConfig {
            host: "cache".into(),
            port: 6379,
            username: None,
            password: None,
        };
        assert_eq!(plain.url(), "redis://cache:6379/0");

        let auth = RedisConfig {
            password: Some("pw".into()),
            ..plain.clone()
        };
        assert_eq!(auth.url(), "redis://:pw@cache:6379/0");
    }

    #[test]
    fn test_require_env_reports_missing() {
        let err = require_env(&["SITREP_TEST_SURELY_UNSET_VAR"]).unwrap_err();
        assert!(err.to_string().contains("SITREP_TEST_SURELY_UNSET_VAR"));
    }
}
