//! End-to-end shape of the EASM publish payload: httpx JSONL in, the wire
//! document POSTed to the collaborator out.

use serde_json::Value;

use sitrep_core::blob::{BlobStore, MemoryBlobStore};
use sitrep_flows::easm::enumeration::get_unique_subdomains;
use sitrep_flows::easm::probe::parse_httpx_output;

#[tokio::test]
async fn easm_fast_mode_payload_shape() {
    // Passive phase: subfinder and amass each found one subdomain.
    let blob = MemoryBlobStore::new();
    blob.insert("subfinder-seed", "a.example.com\n");
    blob.insert("amass-seed", "b.example.com\n");
    let merged_key = get_unique_subdomains(
        &blob,
        &["subfinder-seed".to_string(), "amass-seed".to_string()],
    )
    .await
    .expect("merge succeeds");
    let merged = blob.get(&merged_key).await.unwrap();
    assert_eq!(merged, "a.example.com\nb.example.com");

    // Probe phase output: one JSONL entry per domain, both on 443 with a
    // versioned nginx.
    let jsonl = concat!(
        r#"{"input":"a.example.com","host":"203.0.113.10","port":443,"scheme":"https","tech":["nginx:1.24"]}"#,
        "\n",
        r#"{"input":"b.example.com","host":"203.0.113.11","port":443,"scheme":"https","tech":["nginx:1.24"]}"#,
        "\n",
    );
    let records = parse_httpx_output(jsonl);
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.port, 443);
        assert_eq!(record.protocol, "https");
        assert_eq!(record.service, "https");
        assert_eq!(
            record.software_versions[0].version,
            "cpe:2.3:a:nginx:nginx:1.24:*:*:*:*:*:*:*"
        );
    }

    // The publish body is the serialized record list.
    let body: Value = serde_json::to_value(&records).unwrap();
    let first = &body[0];
    assert_eq!(first["ip"], "203.0.113.10");
    assert_eq!(first["domain_name"], "a.example.com");
    assert_eq!(first["port"], 443);
    assert_eq!(
        first["software_versions"][0]["version"],
        "cpe:2.3:a:nginx:nginx:1.24:*:*:*:*:*:*:*"
    );
    assert_eq!(first["software_versions"][0]["name"], "nginx:1.24");
}

#[tokio::test]
async fn easm_empty_merge_fails_with_no_domains() {
    let blob = MemoryBlobStore::new();
    blob.insert("subfinder-seed", "");
    blob.insert("amass-seed", "");
    let err = get_unique_subdomains(
        &blob,
        &["subfinder-seed".to_string(), "amass-seed".to_string()],
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), "NoDomainsFoundError");
}
