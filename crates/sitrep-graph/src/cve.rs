//! CVE persistence: the [`CveStore`] trait and its Neo4j implementation.
//!
//! `SoftwareVersion.version` values in the graph are full CPE 2.3 strings.
//! Lookups by the matcher use `vendor:product:version` keys,
//! so the Cypher compares against the corresponding CPE fields; a `*` in the
//! key leaves that field unconstrained.

use async_trait::async_trait;
use neo4rs::{query, Query};
use serde::{Deserialize, Serialize};

use sitrep_core::error::{Error, Result};
use sitrep_core::vuln::{CvssV2, CvssV3, CvssV4, Vulnerability};

use crate::client::{store_err, GraphClient};

/// A stored software version with its CVE sweep watermark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareVersionRow {
    pub version: String,
    pub cve_timestamp: Option<String>,
}

/// Graph operations needed by the CVE updater and the CPE-range matcher.
#[async_trait]
pub trait CveStore: Send + Sync {
    async fn cve_exists(&self, cve_id: &str) -> Result<bool>;

    /// `key` is `vendor:product:version`; `*` fields match anything.
    async fn software_version_exists(&self, key: &str) -> Result<bool>;

    /// All stored versions for a `vendor:product` prefix (full CPE strings).
    async fn get_versions_of_product(&self, vendor_and_product: &str) -> Result<Vec<String>>;

    /// Every stored software version with its watermark.
    async fn get_all_software_versions(&self) -> Result<Vec<SoftwareVersionRow>>;

    /// Insert a CVE with exactly the CVSS children present on the record.
    async fn create_cve(&self, vuln: &Vulnerability) -> Result<()>;

    /// Update a CVE; CVSS kinds absent from the record stay untouched.
    async fn update_cve(&self, vuln: &Vulnerability) -> Result<()>;

    /// Idempotently create a Vulnerability node.
    async fn create_vulnerability(&self, description: &str) -> Result<()>;

    /// Open an `IN` lifecycle edge from a Vulnerability to every matching
    /// software version, unless one is already open.
    async fn link_vulnerability_to_software_version(
        &self,
        description: &str,
        key: &str,
    ) -> Result<()>;

    /// Ensure the `REFERS_TO` edge from a Vulnerability to its CVE.
    async fn link_cve_to_vulnerability(&self, cve_id: &str, description: &str) -> Result<()>;

    /// Advance the per-version `last_modified` sweep watermark.
    async fn set_cve_watermark(&self, version: &str, timestamp: &str) -> Result<()>;
}

/// WHERE fragment matching CPE fields of `v.version` against a
/// `vendor:product[:version]` key. `*` components are unconstrained.
fn version_key_filter(key: &str) -> Result<(String, Vec<(&'static str, String)>)> {
    let parts: Vec<&str> = key.splitn(3, ':').collect();
    if parts.len() < 2 {
        return Err(Error::BadInput(format!(
            "invalid software version key: {key} (expected vendor:product[:version])"
        )));
    }
    let fields = [
        ("vendor", 3usize, parts.first().copied()),
        ("product", 4, parts.get(1).copied()),
        ("version", 5, parts.get(2).copied()),
    ];
    let mut clauses = vec!["v.version STARTS WITH 'cpe:2.3:'".to_string()];
    let mut params = Vec::new();
    for (name, index, value) in fields {
        if let Some(value) = value {
            if value != "*" {
                clauses.push(format!("split(v.version, ':')[{index}] = ${name}"));
                params.push((name, value.to_string()));
            }
        }
    }
    Ok((clauses.join(" AND "), params))
}

fn with_key_params(mut q: Query, params: Vec<(&'static str, String)>) -> Query {
    for (name, value) in params {
        q = q.param(name, value);
    }
    q
}

const CVSS2_PROPS: &str = "\
vector_string: $vector_string_v2, access_vector: $access_vector_v2, \
access_complexity: $access_complexity_v2, authentication: $authentication_v2, \
confidentiality_impact: $confidentiality_impact_v2, integrity_impact: $integrity_impact_v2, \
availability_impact: $availability_impact_v2, base_score: $base_score_v2, \
base_severity: $base_severity_v2, exploitability_score: $exploitability_score_v2, \
impact_score: $impact_score_v2, ac_insuf_info: $ac_insuf_info_v2, \
obtain_all_privilege: $obtain_all_privilege_v2, obtain_user_privilege: $obtain_user_privilege_v2, \
obtain_other_privilege: $obtain_other_privilege_v2, \
user_interaction_required: $user_interaction_required_v2";

fn cvss3_props(suffix: &str) -> String {
    format!(
        "vector_string: $vector_string_{s}, attack_vector: $attack_vector_{s}, \
attack_complexity: $attack_complexity_{s}, privileges_required: $privileges_required_{s}, \
user_interaction: $user_interaction_{s}, scope: $scope_{s}, \
confidentiality_impact: $confidentiality_impact_{s}, integrity_impact: $integrity_impact_{s}, \
availability_impact: $availability_impact_{s}, base_score: $base_score_{s}, \
base_severity: $base_severity_{s}, exploitability_score: $exploitability_score_{s}, \
impact_score: $impact_score_{s}",
        s = suffix
    )
}

const CVSS40_PROPS: &str = "\
vector_string: $vector_string_v40, attack_vector: $attack_vector_v40, \
attack_complexity: $attack_complexity_v40, attack_requirements: $attack_requirements_v40, \
privileges_required: $privileges_required_v40, user_interaction: $user_interaction_v40, \
vulnerable_system_confidentiality: $vulnerable_system_confidentiality_v40, \
vulnerable_system_integrity: $vulnerable_system_integrity_v40, \
vulnerable_system_availability: $vulnerable_system_availability_v40, \
subsequent_system_confidentiality: $subsequent_system_confidentiality_v40, \
subsequent_system_integrity: $subsequent_system_integrity_v40, \
subsequent_system_availability: $subsequent_system_availability_v40, \
exploit_maturity: $exploit_maturity_v40, base_score: $base_score_v40, \
base_severity: $base_severity_v40";

fn bind_cvss2(q: Query, m: &CvssV2) -> Query {
    q.param("vector_string_v2", m.vector_string.clone())
        .param("access_vector_v2", m.access_vector.clone())
        .param("access_complexity_v2", m.access_complexity.clone())
        .param("authentication_v2", m.authentication.clone())
        .param("confidentiality_impact_v2", m.confidentiality_impact.clone())
        .param("integrity_impact_v2", m.integrity_impact.clone())
        .param("availability_impact_v2", m.availability_impact.clone())
        .param("base_score_v2", m.base_score.unwrap_or(0.0))
        .param("base_severity_v2", m.base_severity.clone())
        .param("exploitability_score_v2", m.exploitability_score.unwrap_or(0.0))
        .param("impact_score_v2", m.impact_score.unwrap_or(0.0))
        .param("ac_insuf_info_v2", m.ac_insuf_info.unwrap_or(false))
        .param("obtain_all_privilege_v2", m.obtain_all_privilege.unwrap_or(false))
        .param("obtain_user_privilege_v2", m.obtain_user_privilege.unwrap_or(false))
        .param("obtain_other_privilege_v2", m.obtain_other_privilege.unwrap_or(false))
        .param(
            "user_interaction_required_v2",
            m.user_interaction_required.unwrap_or(false),
        )
}

fn bind_cvss3(q: Query, m: &CvssV3, suffix: &str) -> Query {
    q.param(format!("vector_string_{suffix}").as_str(), m.vector_string.clone())
        .param(format!("attack_vector_{suffix}").as_str(), m.attack_vector.clone())
        .param(
            format!("attack_complexity_{suffix}").as_str(),
            m.attack_complexity.clone(),
        )
        .param(
            format!("privileges_required_{suffix}").as_str(),
            m.privileges_required.clone(),
        )
        .param(
            format!("user_interaction_{suffix}").as_str(),
            m.user_interaction.clone(),
        )
        .param(format!("scope_{suffix}").as_str(), m.scope.clone())
        .param(
            format!("confidentiality_impact_{suffix}").as_str(),
            m.confidentiality_impact.clone(),
        )
        .param(
            format!("integrity_impact_{suffix}").as_str(),
            m.integrity_impact.clone(),
        )
        .param(
            format!("availability_impact_{suffix}").as_str(),
            m.availability_impact.clone(),
        )
        .param(format!("base_score_{suffix}").as_str(), m.base_score.unwrap_or(0.0))
        .param(format!("base_severity_{suffix}").as_str(), m.base_severity.clone())
        .param(
            format!("exploitability_score_{suffix}").as_str(),
            m.exploitability_score.unwrap_or(0.0),
        )
        .param(
            format!("impact_score_{suffix}").as_str(),
            m.impact_score.unwrap_or(0.0),
        )
}

fn bind_cvss40(q: Query, m: &CvssV4) -> Query {
    q.param("vector_string_v40", m.vector_string.clone())
        .param("attack_vector_v40", m.attack_vector.clone())
        .param("attack_complexity_v40", m.attack_complexity.clone())
        .param("attack_requirements_v40", m.attack_requirements.clone())
        .param("privileges_required_v40", m.privileges_required.clone())
        .param("user_interaction_v40", m.user_interaction.clone())
        .param(
            "vulnerable_system_confidentiality_v40",
            m.vulnerable_system_confidentiality.clone(),
        )
        .param(
            "vulnerable_system_integrity_v40",
            m.vulnerable_system_integrity.clone(),
        )
        .param(
            "vulnerable_system_availability_v40",
            m.vulnerable_system_availability.clone(),
        )
        .param(
            "subsequent_system_confidentiality_v40",
            m.subsequent_system_confidentiality.clone(),
        )
        .param(
            "subsequent_system_integrity_v40",
            m.subsequent_system_integrity.clone(),
        )
        .param(
            "subsequent_system_availability_v40",
            m.subsequent_system_availability.clone(),
        )
        .param("exploit_maturity_v40", m.exploit_maturity.clone())
        .param("base_score_v40", m.base_score.unwrap_or(0.0))
        .param("base_severity_v40", m.base_severity.clone())
}

fn bind_cve_attrs(q: Query, vuln: &Vulnerability) -> Query {
    q.param("cve_id", vuln.cve_id.clone())
        .param("description", vuln.description.clone())
        .param("cwe", vuln.cwe.iter().cloned().collect::<Vec<_>>())
        .param("cpe_type", vuln.cpe_type.iter().cloned().collect::<Vec<_>>())
        .param("ref_tags", vuln.ref_tags.iter().cloned().collect::<Vec<_>>())
        .param("published", vuln.published.clone())
        .param("last_modified", vuln.last_modified.clone())
        .param("result_impacts", vuln.result_impacts.clone())
}

/// CVE insert statement; only the CVSS children present on the record are
/// materialized.
fn create_cve_cypher(vuln: &Vulnerability) -> String {
    let mut cypher = String::from(
        "CREATE (cve:CVE {cve_id: $cve_id, description: $description, cwe: $cwe, \
         cpe_type: $cpe_type, ref_tags: $ref_tags, published: $published, \
         last_modified: $last_modified, result_impacts: $result_impacts})\n",
    );
    if vuln.cvss_v2.is_some() {
        cypher.push_str(&format!(
            "CREATE (cvss2:CVSSv2 {{{CVSS2_PROPS}}})\nCREATE (cve)-[:HAS_CVSS_v2]->(cvss2)\n"
        ));
    }
    if vuln.cvss_v30.is_some() {
        cypher.push_str(&format!(
            "CREATE (cvss30:CVSSv30 {{{}}})\nCREATE (cve)-[:HAS_CVSS_v30]->(cvss30)\n",
            cvss3_props("v30")
        ));
    }
    if vuln.cvss_v31.is_some() {
        cypher.push_str(&format!(
            "CREATE (cvss31:CVSSv31 {{{}}})\nCREATE (cve)-[:HAS_CVSS_v31]->(cvss31)\n",
            cvss3_props("v31")
        ));
    }
    if vuln.cvss_v40.is_some() {
        cypher.push_str(&format!(
            "CREATE (cvss40:CVSSv40 {{{CVSS40_PROPS}}})\nCREATE (cve)-[:HAS_CVSS_v40]->(cvss40)\n"
        ));
    }
    cypher
}

/// CVE update statement; CVSS kinds absent from the record are left alone.
fn update_cve_cypher(vuln: &Vulnerability) -> String {
    let mut cypher = String::from(
        "MATCH (cve:CVE {cve_id: $cve_id})\n\
         SET cve.description = $description,\n\
             cve.cwe = $cwe,\n\
             cve.cpe_type = $cpe_type,\n\
             cve.ref_tags = $ref_tags,\n\
             cve.published = $published,\n\
             cve.last_modified = $last_modified,\n\
             cve.result_impacts = $result_impacts\n",
    );
    if vuln.cvss_v2.is_some() {
        cypher.push_str(&format!(
            "WITH cve\nOPTIONAL MATCH (cve)-[:HAS_CVSS_v2]->(cvss2:CVSSv2)\nSET cvss2 = {{{CVSS2_PROPS}}}\n"
        ));
    }
    if vuln.cvss_v30.is_some() {
        cypher.push_str(&format!(
            "WITH cve\nOPTIONAL MATCH (cve)-[:HAS_CVSS_v30]->(cvss30:CVSSv30)\nSET cvss30 = {{{}}}\n",
            cvss3_props("v30")
        ));
    }
    if vuln.cvss_v31.is_some() {
        cypher.push_str(&format!(
            "WITH cve\nOPTIONAL MATCH (cve)-[:HAS_CVSS_v31]->(cvss31:CVSSv31)\nSET cvss31 = {{{}}}\n",
            cvss3_props("v31")
        ));
    }
    if vuln.cvss_v40.is_some() {
        cypher.push_str(&format!(
            "WITH cve\nOPTIONAL MATCH (cve)-[:HAS_CVSS_v40]->(cvss40:CVSSv40)\nSET cvss40 = {{{CVSS40_PROPS}}}\n"
        ));
    }
    cypher
}

fn bind_present_cvss(mut q: Query, vuln: &Vulnerability) -> Query {
    if let Some(m) = &vuln.cvss_v2 {
        q = bind_cvss2(q, m);
    }
    if let Some(m) = &vuln.cvss_v30 {
        q = bind_cvss3(q, m, "v30");
    }
    if let Some(m) = &vuln.cvss_v31 {
        q = bind_cvss3(q, m, "v31");
    }
    if let Some(m) = &vuln.cvss_v40 {
        q = bind_cvss40(q, m);
    }
    q
}

#[async_trait]
impl CveStore for GraphClient {
    async fn cve_exists(&self, cve_id: &str) -> Result<bool> {
        let q = query("MATCH (cve:CVE {cve_id: $cve_id}) RETURN count(cve) AS n")
            .param("cve_id", cve_id);
        let mut rows = self.graph().execute(q).await.map_err(store_err)?;
        match rows.next().await.map_err(store_err)? {
            Some(row) => {
                let n: i64 = row
                    .get("n")
                    .map_err(|e| Error::StoreTransient(format!("row decode failed: {e}")))?;
                Ok(n > 0)
            }
            None => Ok(false),
        }
    }

    async fn software_version_exists(&self, key: &str) -> Result<bool> {
        let (filter, params) = version_key_filter(key)?;
        let cypher = format!("MATCH (v:SoftwareVersion) WHERE {filter} RETURN count(v) AS n");
        let q = with_key_params(query(&cypher), params);
        let mut rows = self.graph().execute(q).await.map_err(store_err)?;
        match rows.next().await.map_err(store_err)? {
            Some(row) => {
                let n: i64 = row
                    .get("n")
                    .map_err(|e| Error::StoreTransient(format!("row decode failed: {e}")))?;
                Ok(n > 0)
            }
            None => Ok(false),
        }
    }

    async fn get_versions_of_product(&self, vendor_and_product: &str) -> Result<Vec<String>> {
        let (filter, params) = version_key_filter(vendor_and_product)?;
        let cypher = format!("MATCH (v:SoftwareVersion) WHERE {filter} RETURN v.version AS version");
        let q = with_key_params(query(&cypher), params);
        let mut rows = self.graph().execute(q).await.map_err(store_err)?;
        let mut versions = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            versions.push(
                row.get::<String>("version")
                    .map_err(|e| Error::StoreTransient(format!("row decode failed: {e}")))?,
            );
        }
        Ok(versions)
    }

    async fn get_all_software_versions(&self) -> Result<Vec<SoftwareVersionRow>> {
        let q = query(
            "MATCH (v:SoftwareVersion) RETURN v.version AS version, v.cve_timestamp AS cve_timestamp",
        );
        let mut rows = self.graph().execute(q).await.map_err(store_err)?;
        let mut versions = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            let read = |e: neo4rs::DeError| {
                Error::StoreTransient(format!("row decode failed: {e}"))
            };
            versions.push(SoftwareVersionRow {
                version: row.get::<String>("version").map_err(read)?,
                cve_timestamp: row.get::<Option<String>>("cve_timestamp").map_err(read)?,
            });
        }
        Ok(versions)
    }

    async fn create_cve(&self, vuln: &Vulnerability) -> Result<()> {
        let cypher = create_cve_cypher(vuln);
        let q = bind_present_cvss(bind_cve_attrs(query(&cypher), vuln), vuln);
        self.run(q).await
    }

    async fn update_cve(&self, vuln: &Vulnerability) -> Result<()> {
        let cypher = update_cve_cypher(vuln);
        let q = bind_present_cvss(bind_cve_attrs(query(&cypher), vuln), vuln);
        self.run(q).await
    }

    async fn create_vulnerability(&self, description: &str) -> Result<()> {
        self.run(
            query("MERGE (vul:Vulnerability {description: $description})")
                .param("description", description),
        )
        .await
    }

    async fn link_vulnerability_to_software_version(
        &self,
        description: &str,
        key: &str,
    ) -> Result<()> {
        let (filter, params) = version_key_filter(key)?;
        let cypher = format!(
            "MATCH (vul:Vulnerability {{description: $description}})\n\
             MATCH (v:SoftwareVersion) WHERE {filter}\n\
             WITH vul, v\n\
             OPTIONAL MATCH (vul)-[open:IN]->(v) WHERE open.end IS NULL\n\
             FOREACH (_ IN CASE WHEN open IS NULL THEN [1] ELSE [] END |\n\
                 CREATE (vul)-[:IN {{start: datetime.truncate('second', datetime())}}]->(v))"
        );
        let q = with_key_params(query(&cypher).param("description", description), params);
        self.run(q).await
    }

    async fn link_cve_to_vulnerability(&self, cve_id: &str, description: &str) -> Result<()> {
        self.run(
            query(
                "MATCH (cve:CVE {cve_id: $cve_id})\n\
                 MATCH (vul:Vulnerability {description: $description})\n\
                 MERGE (vul)-[:REFERS_TO]->(cve)",
            )
            .param("cve_id", cve_id)
            .param("description", description),
        )
        .await
    }

    async fn set_cve_watermark(&self, version: &str, timestamp: &str) -> Result<()> {
        self.run(
            query(
                "MATCH (v:SoftwareVersion) WHERE v.version = $version \
                 SET v.cve_timestamp = $cve_timestamp",
            )
            .param("version", version)
            .param("cve_timestamp", timestamp),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_key_filter_full_key() {
        let (filter, params) = version_key_filter("nginx:nginx:1.24").unwrap();
        assert!(filter.contains("split(v.version, ':')[3] = $vendor"));
        assert!(filter.contains("split(v.version, ':')[5] = $version"));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_version_key_filter_wildcards_unconstrained() {
        let (filter, params) = version_key_filter("nginx:*:*").unwrap();
        assert!(filter.contains("$vendor"));
        assert!(!filter.contains("$product"));
        assert!(!filter.contains("$version"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_version_key_filter_vendor_product_only() {
        let (filter, params) = version_key_filter("huawei:fusioncompute").unwrap();
        assert!(filter.contains("$product"));
        assert!(!filter.contains("$version"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_version_key_filter_rejects_bare_vendor() {
        assert!(version_key_filter("nginx").is_err());
    }

    #[test]
    fn test_create_cypher_materializes_only_present_cvss_children() {
        let vuln = Vulnerability {
            cve_id: "CVE-2024-0001".into(),
            cvss_v31: Some(Default::default()),
            ..Default::default()
        };
        let cypher = create_cve_cypher(&vuln);
        assert!(cypher.contains("CVSSv31"));
        assert!(!cypher.contains("CVSSv2 "));
        assert!(!cypher.contains("CVSSv30"));
        assert!(!cypher.contains("CVSSv40"));
        assert!(cypher.contains("HAS_CVSS_v31"));
    }

    #[test]
    fn test_update_cypher_leaves_absent_cvss_children_alone() {
        let vuln = Vulnerability {
            cve_id: "CVE-2024-0001".into(),
            cvss_v2: Some(Default::default()),
            cvss_v40: Some(Default::default()),
            ..Default::default()
        };
        let cypher = update_cve_cypher(&vuln);
        assert!(cypher.contains("SET cvss2 ="));
        assert!(cypher.contains("SET cvss40 ="));
        assert!(!cypher.contains("cvss30"));
        assert!(!cypher.contains("cvss31"));
    }
}
