//! HTTP service fingerprinting with httpx and technology-to-CPE mapping.

use std::collections::HashMap;
use std::io::Write;
use std::sync::OnceLock;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use sitrep_core::blob::BlobStore;
use sitrep_core::dto::{EasmRecord, TechnologyVersion};
use sitrep_core::error::{Error, Result};
use sitrep_core::process::run_command;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3600);

/// Technology name -> `vendor:product` CPE template, from the bundled
/// fingerprint table.
fn fingerprints() -> &'static HashMap<String, String> {
    static TABLE: OnceLock<HashMap<String, String>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let raw = include_str!("../../assets/fingerprints.json");
        let parsed: HashMap<String, String> =
            serde_json::from_str(raw).expect("bundled fingerprint table is valid JSON");
        parsed
            .into_iter()
            .map(|(name, cpe)| (name.to_lowercase(), cpe))
            .collect()
    })
}

/// Probe the domains stored under `domains_key` with httpx and store its
/// JSONL output under a new key.
pub async fn run_httpx(
    blob: &dyn BlobStore,
    domains_key: &str,
    httpx_path: &str,
) -> Result<String> {
    let domains = blob.get(domains_key).await?;

    let mut input = tempfile::Builder::new()
        .suffix(".txt")
        .tempfile()
        .map_err(|e| Error::EnumerationTool(format!("cannot create temp file: {e}")))?;
    input
        .write_all(domains.as_bytes())
        .map_err(|e| Error::EnumerationTool(format!("cannot write temp file: {e}")))?;
    input
        .flush()
        .map_err(|e| Error::EnumerationTool(format!("cannot flush temp file: {e}")))?;

    let command = vec![
        httpx_path.to_string(),
        "-l".to_string(),
        input.path().display().to_string(),
        "-silent".to_string(),
        "-td".to_string(),
        "-j".to_string(),
    ];
    let output = run_command(&command, PROBE_TIMEOUT, None).await?;
    if !output.success() {
        return Err(Error::EnumerationTool(format!(
            "httpx run failed with status code {} and error {}, command={command:?}",
            output.exit_code, output.stderr
        )));
    }

    blob.put("httpx", &output.stdout).await
}

/// Parse httpx JSON Lines into EASM records; failed probes and malformed
/// lines are skipped.
pub fn parse_httpx_output(jsonl: &str) -> Vec<EasmRecord> {
    let mut records = Vec::new();
    for line in jsonl.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "skipping malformed httpx line");
                continue;
            }
        };
        if entry.get("failed").and_then(Value::as_bool).unwrap_or(false) {
            continue;
        }

        let host_ip = entry.get("host").and_then(Value::as_str).unwrap_or("");
        let input_domain = entry.get("input").and_then(Value::as_str).unwrap_or("");
        if host_ip.is_empty() && input_domain.is_empty() {
            continue;
        }
        let port = entry
            .get("port")
            .and_then(|p| {
                p.as_u64()
                    .or_else(|| p.as_str().and_then(|s| s.parse().ok()))
            })
            .unwrap_or(80) as u16;
        let scheme = entry
            .get("scheme")
            .and_then(Value::as_str)
            .unwrap_or("http")
            .to_string();
        let technologies: Vec<String> = entry
            .get("tech")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        records.push(EasmRecord {
            ip: (!host_ip.is_empty()).then(|| host_ip.to_string()),
            domain_name: (!input_domain.is_empty()).then(|| input_domain.to_string()),
            port,
            protocol: scheme.clone(),
            service: scheme,
            software_versions: determine_software_versions(&technologies),
        });
    }
    records
}

/// Map detected technology strings (optionally `name:version`) onto
/// concrete CPE 2.3 strings using the fingerprint table.
pub fn determine_software_versions(technologies: &[String]) -> Vec<TechnologyVersion> {
    let mut results: Vec<TechnologyVersion> = Vec::new();
    for tech in technologies {
        let (name, version) = match tech.split_once(':') {
            Some((name, version)) => (name.trim(), Some(version.trim())),
            None => (tech.trim(), None),
        };
        let Some(template) = fingerprints().get(&name.to_lowercase()) else {
            continue;
        };
        let Some((vendor, product)) = template.split_once(':') else {
            continue;
        };
        let cpe_version = version.filter(|v| !v.is_empty()).unwrap_or("*");
        let entry = TechnologyVersion {
            name: tech.clone(),
            version: format!("cpe:2.3:a:{vendor}:{product}:{cpe_version}:*:*:*:*:*:*:*"),
        };
        if !results.contains(&entry) {
            results.push(entry);
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_httpx_line_with_technology() {
        let jsonl = concat!(
            r#"{"input":"a.example.com","host":"93.184.216.34","port":443,"scheme":"https","tech":["nginx:1.24"]}"#,
            "\n",
            r#"{"input":"b.example.com","host":"93.184.216.35","port":443,"scheme":"https","tech":["nginx:1.24"]}"#,
            "\n",
        );
        let records = parse_httpx_output(jsonl);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].port, 443);
        assert_eq!(records[0].protocol, "https");
        assert_eq!(records[0].domain_name.as_deref(), Some("a.example.com"));
        assert_eq!(
            records[0].software_versions[0].version,
            "cpe:2.3:a:nginx:nginx:1.24:*:*:*:*:*:*:*"
        );
    }

    #[test]
    fn test_parse_httpx_skips_failed_and_malformed() {
        let jsonl = concat!(
            r#"{"input":"down.example.com","failed":true}"#,
            "\n",
            "not json at all\n",
            r#"{"input":"up.example.com","host":"10.0.0.1"}"#,
            "\n",
        );
        let records = parse_httpx_output(jsonl);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].domain_name.as_deref(), Some("up.example.com"));
        // defaults apply when port/scheme are missing
        assert_eq!(records[0].port, 80);
        assert_eq!(records[0].protocol, "http");
    }

    #[test]
    fn test_determine_software_versions_without_version_wildcards() {
        let versions = determine_software_versions(&["Apache".to_string()]);
        assert_eq!(
            versions[0].version,
            "cpe:2.3:a:apache:http_server:*:*:*:*:*:*:*:*"
        );
    }

    #[test]
    fn test_determine_software_versions_unknown_technology_is_dropped() {
        assert!(determine_software_versions(&["ObscureFramework:9".to_string()]).is_empty());
    }

    #[test]
    fn test_determine_software_versions_deduplicates() {
        let versions = determine_software_versions(&[
            "nginx:1.24".to_string(),
            "nginx:1.24".to_string(),
        ]);
        assert_eq!(versions.len(), 1);
    }
}
