//! Client for the REST collaborator that fronts the graph store.
//!
//! Workflows publish scan facts and trigger graph-side computations through
//! these endpoints instead of holding a bolt connection themselves.
//! Validation failures (HTTP 422) map to `BadInput`, store failures (5xx)
//! to `StoreTransient`, connection problems to `TransientNetwork`.

use serde::Serialize;
use serde_json::Value;

use sitrep_core::dto::{
    EasmRecord, HostCriticality, MissionRecord, NmapResults, SlpRecord, TracerouteResult,
};
use sitrep_core::error::{Error, Result};

/// HTTP client for the asset-management REST API.
pub struct IsimClient {
    http: reqwest::Client,
    base_url: String,
}

impl IsimClient {
    pub fn new(base_url: &str) -> Self {
        IsimClient {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<String> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::TransientNetwork(format!("POST {url} failed: {e}")))?;
        Self::read_response(url, response).await
    }

    async fn post_empty(&self, path: &str) -> Result<String> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| Error::TransientNetwork(format!("POST {url} failed: {e}")))?;
        Self::read_response(url, response).await
    }

    async fn read_response(url: String, response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if status.as_u16() == 422 {
            return Err(Error::BadInput(format!("{url}: {text}")));
        }
        if status.is_server_error() {
            return Err(Error::StoreTransient(format!("{url}: HTTP {status}: {text}")));
        }
        if !status.is_success() {
            return Err(Error::TransientNetwork(format!(
                "{url}: HTTP {status}: {text}"
            )));
        }
        Ok(text)
    }

    /// POST parsed Nmap results to `/assets`.
    pub async fn post_assets(&self, results: &NmapResults) -> Result<String> {
        self.post_json("/assets", results).await
    }

    /// POST EASM probe records to `/easm`.
    pub async fn post_easm(&self, records: &[EasmRecord]) -> Result<String> {
        self.post_json("/easm", records).await
    }

    /// POST traceroute output to `/traceroute`.
    pub async fn post_traceroute(&self, result: &TracerouteResult) -> Result<String> {
        self.post_json("/traceroute", result).await
    }

    /// POST SLP enrichment records to `/slp_enrichment`.
    pub async fn post_slp_enrichment(&self, records: &[SlpRecord]) -> Result<String> {
        self.post_json("/slp_enrichment", records).await
    }

    /// GET all missions.
    pub async fn get_missions(&self) -> Result<Vec<MissionRecord>> {
        let url = format!("{}/missions", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::TransientNetwork(format!("GET {url} failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::TransientNetwork(format!(
                "{url}: HTTP {}",
                response.status()
            )));
        }
        response
            .json::<Vec<MissionRecord>>()
            .await
            .map_err(|e| Error::BadInput(format!("invalid missions payload: {e}")))
    }

    /// GET a page of IP asset rows. Each row is a positional tuple of
    /// related entities (IP, subnet, domain, ...), kept untyped here.
    pub async fn get_ips(&self, limit: i64, offset: i64) -> Result<Vec<Value>> {
        let url = format!("{}/ips?limit={limit}&offset={offset}", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::TransientNetwork(format!("GET {url} failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::TransientNetwork(format!(
                "{url}: HTTP {}",
                response.status()
            )));
        }
        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| Error::BadInput(format!("invalid ips payload: {e}")))
    }

    /// Trigger betweenness centrality computation.
    pub async fn compute_betweenness_centrality(&self) -> Result<String> {
        self.post_empty("/nodes/betweenness_centrality").await
    }

    /// Trigger degree centrality computation.
    pub async fn compute_degree_centrality(&self) -> Result<String> {
        self.post_empty("/nodes/degree_centrality").await
    }

    /// Store propagated mission criticalities.
    pub async fn store_criticality(&self, values: &[HostCriticality]) -> Result<String> {
        self.post_json("/nodes/store_criticality", values).await
    }

    /// Fuse centralities and mission criticality into the final score.
    pub async fn combine_criticality(&self) -> Result<String> {
        self.post_empty("/nodes/combine_criticality").await
    }

    /// Trigger an IP/subnet hierarchy resynchronization.
    pub async fn sync_ip_hierarchy(&self) -> Result<String> {
        self.post_empty("/ip-hierarchy-sync").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_normalized() {
        let client = IsimClient::new("http://isim:8000/");
        assert_eq!(client.base_url, "http://isim:8000");
    }
}
