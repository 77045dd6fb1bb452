//! External enumeration tool activities.
//!
//! Each wrapper reads its input from the blob store when given a key, runs
//! the tool with a bounded lifetime, and stores the output under a fresh
//! key so workflow steps only carry references.

use std::io::Write;
use std::time::Duration;

use tracing::info;

use sitrep_core::blob::BlobStore;
use sitrep_core::error::{Error, Result};
use sitrep_core::process::{run_command, unique_lines};

const PASSIVE_TOOL_TIMEOUT: Duration = Duration::from_secs(600);
const BRUTEFORCE_TIMEOUT: Duration = Duration::from_secs(300);
const PERMUTATION_TIMEOUT: Duration = Duration::from_secs(1800);
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(600);

fn write_temp_input(data: &str) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .suffix(".txt")
        .tempfile()
        .map_err(|e| Error::EnumerationTool(format!("cannot create temp file: {e}")))?;
    file.write_all(data.as_bytes())
        .map_err(|e| Error::EnumerationTool(format!("cannot write temp file: {e}")))?;
    file.flush()
        .map_err(|e| Error::EnumerationTool(format!("cannot flush temp file: {e}")))?;
    Ok(file)
}

/// Passively enumerate subdomains with subfinder.
pub async fn run_subfinder(domains: &[String], blob: &dyn BlobStore) -> Result<String> {
    let mut command = vec!["subfinder".to_string(), "-d".to_string()];
    command.extend(domains.iter().cloned());
    command.push("-silent".to_string());

    let output = run_command(&command, PASSIVE_TOOL_TIMEOUT, None).await?;
    if !output.success() {
        return Err(Error::EnumerationTool(format!(
            "subfinder run failed with status code {} and error {}, command={command:?}",
            output.exit_code, output.stderr
        )));
    }
    blob.put("subfinder", &output.stdout).await
}

/// Passively enumerate subdomains with amass.
pub async fn run_amass(domains: &[String], blob: &dyn BlobStore) -> Result<String> {
    let mut command = vec!["amass".to_string(), "enum".to_string(), "-d".to_string()];
    command.extend(domains.iter().cloned());
    command.push("-passive".to_string());

    let output = run_command(&command, PASSIVE_TOOL_TIMEOUT, None).await?;
    if !output.success() {
        return Err(Error::EnumerationTool(format!(
            "amass run failed with status code {} and error {}, command={command:?}",
            output.exit_code, output.stderr
        )));
    }
    blob.put("amass", &output.stdout).await
}

/// Merge several enumeration outputs into a unique subdomain set.
pub async fn get_unique_subdomains(blob: &dyn BlobStore, keys: &[String]) -> Result<String> {
    let mut outputs = Vec::with_capacity(keys.len());
    for key in keys {
        outputs.push(blob.get(key).await?);
    }
    let refs: Vec<&str> = outputs.iter().map(String::as_str).collect();
    let merged = unique_lines(&refs);
    if merged.is_empty() {
        return Err(Error::NoDomainsFound(
            "subfinder and amass did not find any domains".into(),
        ));
    }
    info!(subdomains = merged.len(), "merged unique subdomains");
    blob.put("unique_subdomains", &merged.join("\n")).await
}

/// Bruteforce additional subdomains with dnsx over a wordlist.
pub async fn run_dnsx_bruteforce(
    blob: &dyn BlobStore,
    domains_key: &str,
    wordlist: &str,
    threads: u32,
) -> Result<String> {
    let domains = blob.get(domains_key).await?;
    let input = write_temp_input(&domains)?;

    let command = vec![
        "dnsx".to_string(),
        "-d".to_string(),
        input.path().display().to_string(),
        "-silent".to_string(),
        "-w".to_string(),
        wordlist.to_string(),
        "-a".to_string(),
        "-cname".to_string(),
        "-aaaa".to_string(),
        "t".to_string(),
        threads.to_string(),
    ];
    let output = run_command(&command, BRUTEFORCE_TIMEOUT, None).await?;
    if !output.success() {
        return Err(Error::EnumerationTool(format!(
            "dnsx run failed with status code {} and error {}, command={command:?}",
            output.exit_code, output.stderr
        )));
    }
    if output.stdout.is_empty() {
        return Err(Error::NoDomainsFound(format!(
            "dnsx bruteforce returned no results, command={command:?}"
        )));
    }

    let unique = unique_lines(&[&output.stdout]).join("\n");
    blob.put("dnsx-bruteforce", &unique).await
}

/// Generate candidate permutations with alterx.
pub async fn run_alterx(blob: &dyn BlobStore, domains_key: &str) -> Result<String> {
    let domains = blob.get(domains_key).await?;
    let input = write_temp_input(&domains)?;
    let output_file = tempfile::Builder::new()
        .suffix(".txt")
        .tempfile()
        .map_err(|e| Error::EnumerationTool(format!("cannot create temp file: {e}")))?;

    let command = vec![
        "alterx".to_string(),
        "-l".to_string(),
        input.path().display().to_string(),
        "-silent".to_string(),
        "-o".to_string(),
        output_file.path().display().to_string(),
    ];
    let output = run_command(&command, PERMUTATION_TIMEOUT, None).await?;
    if !output.success() {
        return Err(Error::EnumerationTool(format!(
            "alterx run failed with status code {}, command={command:?}",
            output.exit_code
        )));
    }

    let permutations = std::fs::read_to_string(output_file.path())
        .map_err(|e| Error::EnumerationTool(format!("cannot read alterx output: {e}")))?;
    blob.put("alterx", &permutations).await
}

/// Resolve candidate subdomains with dnsx.
pub async fn run_dnsx_resolver(blob: &dyn BlobStore, domains_key: &str) -> Result<String> {
    let domains = blob.get(domains_key).await?;
    let input = write_temp_input(&domains)?;

    let command = vec![
        "dnsx".to_string(),
        "-l".to_string(),
        input.path().display().to_string(),
        "-silent".to_string(),
        "-a".to_string(),
        "-aaaa".to_string(),
        "-cname".to_string(),
    ];
    let output = run_command(&command, RESOLVE_TIMEOUT, None).await?;
    if !output.success() {
        return Err(Error::EnumerationTool(format!(
            "dnsx run failed with status code {} and error {}, command={command:?}",
            output.exit_code, output.stderr
        )));
    }
    if output.stdout.is_empty() {
        return Err(Error::NoDomainsFound(format!(
            "dnsx resolver returned no results, command={command:?}"
        )));
    }

    let unique = unique_lines(&[&output.stdout]).join("\n");
    blob.put("dnsx-resolver", &unique).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitrep_core::blob::MemoryBlobStore;

    #[tokio::test]
    async fn test_get_unique_subdomains_merges_blobs() {
        let blob = MemoryBlobStore::new();
        blob.insert("subfinder-1", "a.example.com\nb.example.com\n");
        blob.insert("amass-1", "b.example.com\nc.example.com\n");
        let key = get_unique_subdomains(
            &blob,
            &["subfinder-1".to_string(), "amass-1".to_string()],
        )
        .await
        .unwrap();
        let merged = blob.get(&key).await.unwrap();
        assert_eq!(merged, "a.example.com\nb.example.com\nc.example.com");
    }

    #[tokio::test]
    async fn test_empty_merge_is_no_domains_found() {
        let blob = MemoryBlobStore::new();
        blob.insert("subfinder-1", "");
        blob.insert("amass-1", "\n\n");
        let err = get_unique_subdomains(
            &blob,
            &["subfinder-1".to_string(), "amass-1".to_string()],
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "NoDomainsFoundError");
    }

    #[tokio::test]
    async fn test_missing_blob_key_propagates() {
        let blob = MemoryBlobStore::new();
        let err = get_unique_subdomains(&blob, &["gone".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "BadInput");
    }
}
