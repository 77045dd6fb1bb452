//! SLP enrichment workflow.
//!
//! Pulls not-yet-enriched IP assets from the REST collaborator, queries the
//! SLP bulk ip2asn API for reverse domains, subnets, and risk scores, and
//! stores the merged result. Database pairs the API did not confirm are
//! re-tagged `SLP_no` so they are retried on a later sweep.

use std::time::Duration;

use serde_json::Value;
use tracing::info;

use sitrep_core::dto::SlpRecord;
use sitrep_core::error::{Error, Result};

use crate::isim::IsimClient;
use crate::runtime::{execute_activity, ActivityOptions, RetryPolicy};

const SLP_API_URL: &str = "https://api.silentpush.com/api/v1/merge-api/explore/bulk/ip2asn/ipv4";
const ACTIVITY_TIMEOUT: Duration = Duration::from_secs(3600);
const BATCH_TARGET: usize = 100;

/// An IP/domain/subnet triple already present in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbAssetPair {
    pub ip: String,
    pub domain: String,
    pub subnet: String,
}

/// Extract asset pairs from the positional `/ips` rows, skipping loopback
/// and rows already tagged `SLP`.
pub fn collect_asset_pairs(rows: &[Value]) -> Vec<DbAssetPair> {
    let mut pairs = Vec::new();
    for row in rows {
        let Some(ip_entry) = row.get(0) else { continue };
        let Some(address) = ip_entry.get("address").and_then(Value::as_str) else {
            continue;
        };
        if address == "127.0.0.1" {
            // cannot obtain external information about localhost
            continue;
        }
        let already_tagged = ip_entry
            .get("tag")
            .and_then(Value::as_array)
            .map(|tags| tags.iter().any(|t| t.as_str() == Some("SLP")))
            .unwrap_or(false);
        if already_tagged {
            continue;
        }
        let subnet = row
            .get(1)
            .and_then(|s| s.get("range"))
            .and_then(Value::as_str)
            .unwrap_or("0.0.0.0/0")
            .to_string();
        let domain = row
            .get(2)
            .and_then(|d| d.get("domain_name"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        pairs.push(DbAssetPair {
            ip: address.to_string(),
            domain,
            subnet,
        });
    }
    pairs
}

/// Merge API answers with the database pairs: answered records keep the
/// `SLP` tag, unconfirmed database pairs are emitted with `SLP_no` and a
/// `"null"` risk score.
pub fn merge_slp_records(pairs: &[DbAssetPair], api_records: Vec<SlpRecord>) -> Vec<SlpRecord> {
    let mut records = api_records;

    for pair in pairs {
        let confirmed = records
            .iter()
            .any(|r| r.ip == pair.ip && r.domain == pair.domain);
        if confirmed {
            continue;
        }
        let fallback = SlpRecord {
            ip: pair.ip.clone(),
            domain: pair.domain.clone(),
            subnet: pair.subnet.clone(),
            sp_risk_score: Value::String("null".into()),
            tag: "SLP_no".into(),
        };
        if !records.contains(&fallback) {
            records.push(fallback);
        }
    }
    records
}

fn parse_slp_response(body: &Value) -> Result<Vec<SlpRecord>> {
    let status = body.get("status_code").and_then(Value::as_i64).unwrap_or(0);
    let error = body.get("error").map(|e| !e.is_null()).unwrap_or(false);
    if status != 200 || error {
        return Err(Error::TransientNetwork(format!(
            "SLP API reported status {status}"
        )));
    }

    let mut records = Vec::new();
    if let Some(entries) = body.pointer("/response/ip2asn").and_then(Value::as_array) {
        for entry in entries {
            let Some(ip) = entry.get("ip").and_then(Value::as_str) else {
                continue;
            };
            records.push(SlpRecord {
                ip: ip.to_string(),
                domain: entry
                    .get("ip_ptr")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
                subnet: entry
                    .get("subnet")
                    .and_then(Value::as_str)
                    .unwrap_or("0.0.0.0/0")
                    .to_string(),
                sp_risk_score: entry
                    .get("sp_risk_score")
                    .cloned()
                    .unwrap_or_else(|| Value::String("null".into())),
                tag: "SLP".into(),
            });
        }
    }
    Ok(records)
}

/// Three-activity workflow: fetch assets, enrich via SLP, store.
pub struct SlpEnrichmentWorkflow<'a> {
    isim: &'a IsimClient,
    x_api_key: &'a str,
}

impl<'a> SlpEnrichmentWorkflow<'a> {
    pub fn new(isim: &'a IsimClient, x_api_key: &'a str) -> Self {
        SlpEnrichmentWorkflow { isim, x_api_key }
    }

    /// Page `/ips` until enough unprocessed assets are collected or the
    /// listing is exhausted.
    pub async fn get_asset_info(&self) -> Result<Vec<DbAssetPair>> {
        let limit = BATCH_TARGET as i64;
        let mut offset = 0i64;
        let mut pairs: Vec<DbAssetPair> = Vec::new();
        loop {
            let rows = self.isim.get_ips(limit, offset).await?;
            let exhausted = (rows.len() as i64) < limit;
            let mut page_pairs = collect_asset_pairs(&rows);
            let room = BATCH_TARGET.saturating_sub(pairs.len());
            page_pairs.truncate(room);
            pairs.extend(page_pairs);
            if pairs.len() >= BATCH_TARGET || exhausted {
                break;
            }
            offset += limit;
        }
        Ok(pairs)
    }

    /// Query the SLP bulk API and merge against the database pairs.
    pub async fn get_data_from_slp(&self, pairs: &[DbAssetPair]) -> Result<Vec<SlpRecord>> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        let ips: Vec<&str> = pairs.iter().map(|p| p.ip.as_str()).collect();
        let response = reqwest::Client::new()
            .post(SLP_API_URL)
            .header("X-API-KEY", self.x_api_key)
            .json(&serde_json::json!({ "ips": ips }))
            .send()
            .await
            .map_err(|e| Error::TransientNetwork(format!("SLP request failed: {e}")))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::TransientNetwork(format!("invalid SLP response: {e}")))?;
        let api_records = parse_slp_response(&body)?;
        Ok(merge_slp_records(pairs, api_records))
    }

    pub async fn run(&self) -> Result<String> {
        let options = ActivityOptions::new(ACTIVITY_TIMEOUT, RetryPolicy::publish());

        let pairs =
            execute_activity("get_asset_info", &options, move || self.get_asset_info()).await?;
        info!(assets = pairs.len(), "assets selected for SLP enrichment");

        let pairs = &pairs;
        let records = execute_activity("get_data_from_slp", &options, move || {
            self.get_data_from_slp(pairs)
        })
        .await?;

        let isim = self.isim;
        let records = &records;
        execute_activity("store_data_from_slp", &options, move || {
            isim.post_slp_enrichment(records)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(address: &str, tags: Value, subnet: Option<&str>, domain: Option<&str>) -> Value {
        json!([
            {"address": address, "tag": tags},
            subnet.map(|s| json!({"range": s})),
            domain.map(|d| json!({"domain_name": d})),
        ])
    }

    #[test]
    fn test_collect_asset_pairs_filters_tagged_and_loopback() {
        let rows = vec![
            row("10.0.0.1", json!(["CASM"]), Some("10.0.0.0/24"), Some("a.example.com")),
            row("10.0.0.2", json!(["SLP"]), None, None),
            row("127.0.0.1", json!([]), None, None),
        ];
        let pairs = collect_asset_pairs(&rows);
        assert_eq!(
            pairs,
            vec![DbAssetPair {
                ip: "10.0.0.1".into(),
                domain: "a.example.com".into(),
                subnet: "10.0.0.0/24".into(),
            }]
        );
    }

    #[test]
    fn test_collect_asset_pairs_defaults() {
        let rows = vec![row("10.0.0.3", json!([]), None, None)];
        let pairs = collect_asset_pairs(&rows);
        assert_eq!(pairs[0].subnet, "0.0.0.0/0");
        assert_eq!(pairs[0].domain, "");
    }

    #[test]
    fn test_merge_keeps_api_records_and_tags_unconfirmed() {
        let pairs = vec![
            DbAssetPair {
                ip: "10.0.0.1".into(),
                domain: "a.example.com".into(),
                subnet: "10.0.0.0/24".into(),
            },
            DbAssetPair {
                ip: "10.0.0.2".into(),
                domain: "b.example.com".into(),
                subnet: "10.0.0.0/24".into(),
            },
        ];
        let api = vec![SlpRecord {
            ip: "10.0.0.1".into(),
            domain: "a.example.com".into(),
            subnet: "10.0.0.0/25".into(),
            sp_risk_score: json!(42),
            tag: "SLP".into(),
        }];
        let merged = merge_slp_records(&pairs, api);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].tag, "SLP");
        assert_eq!(merged[1].tag, "SLP_no");
        assert_eq!(merged[1].sp_risk_score, json!("null"));
    }

    #[test]
    fn test_parse_slp_response_shapes() {
        let body = json!({
            "status_code": 200,
            "error": null,
            "response": {"ip2asn": [
                {"ip": "10.0.0.1", "ip_ptr": "a.example.com", "subnet": "10.0.0.0/24", "sp_risk_score": 17},
                {"ip": "10.0.0.2"}
            ]}
        });
        let records = parse_slp_response(&body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sp_risk_score, json!(17));
        assert_eq!(records[1].domain, "");
        assert_eq!(records[1].sp_risk_score, json!("null"));
    }

    #[test]
    fn test_parse_slp_response_error_status() {
        let body = json!({"status_code": 500, "error": "boom"});
        assert!(parse_slp_response(&body).is_err());
    }
}
