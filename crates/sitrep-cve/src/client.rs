//! Rate-limited client for the NVD CVE and CPE-match APIs.
//!
//! Every request is followed by a 6-second asynchronous sleep, as the vendor
//! documentation recommends. HTTP 429 surfaces as `RateLimited`; connection
//! failures, timeouts, and 5xx responses surface as `TransientNetwork` so
//! callers can retry within their budget.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use tracing::{info, warn};

use sitrep_core::error::{Error, Result};

const CVE_API_URL: &str = "https://services.nvd.nist.gov/rest/json/cves/2.0";
const CPE_MATCH_API_URL: &str = "https://services.nvd.nist.gov/rest/json/cpematch/2.0";

/// Post-request pacing delay mandated by the vendor documentation.
pub const REQUEST_PACING: Duration = Duration::from_secs(6);

/// Query for CVEs affecting one product version.
#[derive(Debug, Clone, Default)]
pub struct VersionQuery {
    /// `vendor:product:version` triple.
    pub version: String,
    /// CPE part: `a`, `h`, or `o`.
    pub part: String,
    pub start_index: i64,
    pub is_vulnerable: bool,
    pub last_mod_start_date: Option<String>,
    pub last_mod_end_date: Option<String>,
}

/// One page of version-search results.
#[derive(Debug, Clone, Default)]
pub struct VersionPage {
    pub start_index: i64,
    pub results_per_page: i64,
    pub total_results: i64,
    /// Raw `cve` objects, one per vulnerability.
    pub vulnerabilities: Vec<Value>,
}

impl VersionPage {
    /// Whether this page is the last one of the result set.
    pub fn is_last(&self) -> bool {
        self.start_index + self.results_per_page >= self.total_results
    }
}

/// NVD API surface consumed by the updater and the CPE-range matcher.
#[async_trait]
pub trait NvdApi: Send + Sync {
    /// CVEs published inside a date range (raw `cve` objects).
    async fn search_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Value>>;

    /// A single CVE by id (raw `cve` objects, zero or one entry).
    async fn search_by_id(&self, cve_id: &str) -> Result<Vec<Value>>;

    /// One page of CVEs affecting a product version.
    async fn search_by_version(&self, query: &VersionQuery) -> Result<VersionPage>;

    /// Concrete CPE names a match-criteria id expands to.
    async fn match_criteria_versions(&self, match_criteria_id: &str) -> Result<Vec<String>>;
}

/// Validate the `CVE-YYYY-NNNN+` identifier shape.
pub fn is_valid_cve_id(cve_id: &str) -> bool {
    let Some(rest) = cve_id.strip_prefix("CVE-") else {
        return false;
    };
    let mut parts = rest.splitn(2, '-');
    let year = parts.next().unwrap_or("");
    let Some(number) = parts.next() else {
        return false;
    };
    year.len() == 4
        && year.chars().all(|c| c.is_ascii_digit())
        && number.len() >= 4
        && number.chars().all(|c| c.is_ascii_digit())
}

/// HTTP implementation of [`NvdApi`].
pub struct HttpNvdClient {
    http: reqwest::Client,
    api_key: Option<String>,
    cve_url: String,
    cpe_match_url: String,
    pacing: Duration,
}

impl HttpNvdClient {
    pub fn new(api_key: Option<String>) -> Self {
        HttpNvdClient {
            http: reqwest::Client::new(),
            api_key,
            cve_url: CVE_API_URL.to_string(),
            cpe_match_url: CPE_MATCH_API_URL.to_string(),
            pacing: REQUEST_PACING,
        }
    }

    /// Point the client at a non-default endpoint (testing).
    pub fn with_endpoints(mut self, cve_url: &str, cpe_match_url: &str, pacing: Duration) -> Self {
        self.cve_url = cve_url.to_string();
        self.cpe_match_url = cpe_match_url.to_string();
        self.pacing = pacing;
        self
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let mut request = self.http.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("apiKey", key);
        }
        let response = request.send().await;
        tokio::time::sleep(self.pacing).await;

        let response = response.map_err(|e| {
            if e.is_timeout() {
                Error::TransientNetwork(format!("request timed out: {e}"))
            } else {
                Error::TransientNetwork(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(Error::RateLimited(format!("rate limit exceeded for {url}")));
        }
        if status.is_server_error() {
            return Err(Error::TransientNetwork(format!("HTTP {status} from {url}")));
        }
        if !status.is_success() {
            return Err(Error::BadInput(format!("HTTP {status} from {url}")));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| Error::TransientNetwork(format!("invalid JSON response: {e}")))
    }
}

fn extract_cves(data: &Value) -> Vec<Value> {
    data.get("vulnerabilities")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("cve").cloned())
                .collect()
        })
        .unwrap_or_default()
}

fn encode_timestamp(value: &str) -> String {
    value.replace('+', "%2B")
}

#[async_trait]
impl NvdApi for HttpNvdClient {
    async fn search_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Value>> {
        if start > end {
            return Err(Error::BadInput(
                "start date must not be after end date".into(),
            ));
        }
        let url = format!(
            "{}?pubStartDate={}&pubEndDate={}",
            self.cve_url,
            encode_timestamp(&start.to_rfc3339()),
            encode_timestamp(&end.to_rfc3339()),
        );
        let data = self.get_json(&url).await?;
        Ok(extract_cves(&data))
    }

    async fn search_by_id(&self, cve_id: &str) -> Result<Vec<Value>> {
        if !is_valid_cve_id(cve_id) {
            return Err(Error::BadInput(format!("invalid CVE id: {cve_id}")));
        }
        let url = format!("{}?cveId={cve_id}", self.cve_url);
        let data = self.get_json(&url).await?;
        Ok(extract_cves(&data))
    }

    async fn search_by_version(&self, query: &VersionQuery) -> Result<VersionPage> {
        if query.version.matches(':').count() < 2 {
            return Err(Error::BadInput(format!(
                "invalid version {:?} (expected vendor:product:version)",
                query.version
            )));
        }
        if !matches!(query.part.as_str(), "a" | "h" | "o") {
            return Err(Error::BadInput(format!(
                "invalid CPE part {:?} (expected a, h, or o)",
                query.part
            )));
        }

        let mut url = format!(
            "{}?cpeName=cpe:2.3:{}:{}&startIndex={}",
            self.cve_url, query.part, query.version, query.start_index
        );
        if query.is_vulnerable {
            url.push_str("&isVulnerable");
        }
        if let Some(start) = &query.last_mod_start_date {
            url.push_str(&format!("&lastModStartDate={}", encode_timestamp(start)));
            let end = query
                .last_mod_end_date
                .clone()
                .unwrap_or_else(|| (Utc::now() + ChronoDuration::hours(1)).to_rfc3339());
            url.push_str(&format!("&lastModEndDate={}", encode_timestamp(&end)));
        }

        info!(version = %query.version, part = %query.part, start_index = query.start_index,
              "searching CVEs by version");
        let data = self.get_json(&url).await?;

        let page = VersionPage {
            start_index: data["startIndex"].as_i64().unwrap_or(query.start_index),
            results_per_page: data["resultsPerPage"].as_i64().unwrap_or(0),
            total_results: data["totalResults"].as_i64().unwrap_or(0),
            vulnerabilities: extract_cves(&data),
        };
        info!(total = page.total_results, "version search page fetched");
        Ok(page)
    }

    async fn match_criteria_versions(&self, match_criteria_id: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}?matchCriteriaId={match_criteria_id}",
            self.cpe_match_url
        );
        let data = self.get_json(&url).await?;

        let mut names = Vec::new();
        let Some(match_strings) = data.get("matchStrings").and_then(Value::as_array) else {
            warn!(match_criteria_id, "match-criteria response without matchStrings");
            return Ok(names);
        };
        for entry in match_strings {
            let matches = entry
                .pointer("/matchString/matches")
                .and_then(Value::as_array);
            if let Some(matches) = matches {
                names.extend(
                    matches
                        .iter()
                        .filter_map(|m| m.get("cpeName").and_then(Value::as_str))
                        .map(str::to_string),
                );
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cve_id_validation() {
        assert!(is_valid_cve_id("CVE-2021-12345"));
        assert!(is_valid_cve_id("CVE-2024-0001"));
        assert!(!is_valid_cve_id("CVE-21-12345"));
        assert!(!is_valid_cve_id("CVE-2021-123"));
        assert!(!is_valid_cve_id("cve-2021-12345"));
        assert!(!is_valid_cve_id("CVE-2021-12a45"));
        assert!(!is_valid_cve_id("CVE-2021"));
    }

    #[tokio::test]
    async fn test_date_range_validation() {
        let client = HttpNvdClient::new(None);
        let now = Utc::now();
        let err = client
            .search_by_date_range(now, now - ChronoDuration::days(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "BadInput");
    }

    #[tokio::test]
    async fn test_version_query_validation() {
        let client = HttpNvdClient::new(None);
        let err = client
            .search_by_version(&VersionQuery {
                version: "nginx".into(),
                part: "a".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "BadInput");

        let err = client
            .search_by_version(&VersionQuery {
                version: "nginx:nginx:1.24".into(),
                part: "x".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "BadInput");
    }

    #[tokio::test]
    async fn test_invalid_cve_id_rejected_before_any_request() {
        let client = HttpNvdClient::new(None);
        let err = client.search_by_id("CVE-bogus").await.unwrap_err();
        assert_eq!(err.kind(), "BadInput");
    }

    #[test]
    fn test_version_page_is_last() {
        let page = VersionPage {
            start_index: 2000,
            results_per_page: 2000,
            total_results: 3500,
            vulnerabilities: vec![],
        };
        assert!(page.is_last());
        let first = VersionPage {
            start_index: 0,
            results_per_page: 2000,
            total_results: 3500,
            vulnerabilities: vec![],
        };
        assert!(!first.is_last());
    }

    #[test]
    fn test_extract_cves_unwraps_envelope() {
        let data = serde_json::json!({
            "vulnerabilities": [
                {"cve": {"id": "CVE-2024-0001"}},
                {"cve": {"id": "CVE-2024-0002"}}
            ]
        });
        let cves = extract_cves(&data);
        assert_eq!(cves.len(), 2);
        assert_eq!(cves[0]["id"], "CVE-2024-0001");
    }

    #[test]
    fn test_timestamp_encoding() {
        assert_eq!(
            encode_timestamp("2024-05-01T00:00:00+02:00"),
            "2024-05-01T00:00:00%2B02:00"
        );
    }
}
