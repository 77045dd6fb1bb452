//! Asset and EASM document upserts, default-parent maintenance, and the IP
//! asset information query.
//!
//! Documents are passed to Cypher as one JSON string and exploded with
//! `apoc.convert.fromJsonMap`, so an upsert is a single transaction and is
//! idempotent with respect to re-submission. Lifecycle (`ON`, `RESOLVES_TO`)
//! edges are only created when no open edge exists, so re-observing a fact
//! never produces parallel duplicates.

use neo4rs::query;

use sitrep_core::dto::{EasmRecord, IpAssetInfo, NmapResults, NodeCentrality, SlpRecord};
use sitrep_core::error::Result;

use crate::client::{store_err, GraphClient};

const ASSET_UPDATE_QUERY: &str = r#"
WITH apoc.convert.fromJsonMap($json_string) AS doc

CALL {
    WITH doc
    UNWIND doc.org_units AS ou
    MERGE (unit:OrganizationUnit {name: ou.name})
    FOREACH (parent IN ou.parents |
        MERGE (p:OrganizationUnit {name: parent})
        MERGE (unit)-[:PART_OF]->(p))
    RETURN count(*) AS org_units_done
}

CALL {
    WITH doc
    UNWIND doc.subnets AS subnet
    MERGE (s:Subnet {range: subnet.ip_range})
    ON CREATE SET s.version = CASE WHEN subnet.ip_range CONTAINS ':' THEN 6 ELSE 4 END
    SET s.note = CASE WHEN subnet.note = '' THEN s.note ELSE subnet.note END
    FOREACH (contact IN subnet.contacts |
        MERGE (c:Contact {name: contact})
        MERGE (s)-[:HAS]->(c))
    FOREACH (parent IN subnet.parents |
        MERGE (p:Subnet {range: parent})
        MERGE (s)-[:PART_OF]->(p))
    FOREACH (ou IN subnet.org_units |
        MERGE (o:OrganizationUnit {name: ou})
        MERGE (s)-[:PART_OF]->(o))
    RETURN count(*) AS subnets_done
}

CALL {
    WITH doc
    UNWIND doc.hosts AS host
    MERGE (ip:IP {address: host.ip_address})
    ON CREATE SET ip.version = CASE WHEN host.ip_address CONTAINS ':' THEN 6 ELSE 4 END
    SET ip.tag = CASE
        WHEN ip.tag IS NULL THEN host.tag
        ELSE apoc.coll.toSet(ip.tag + host.tag)
    END
    MERGE (node:Node)-[:HAS_ASSIGNED]->(ip)
    MERGE (h:Host {hostname: coalesce(head(host.domain_names), host.ip_address)})
    MERGE (node)-[:IS_A]->(h)
    FOREACH (subnet IN host.subnets |
        MERGE (s:Subnet {range: subnet})
        MERGE (ip)-[:PART_OF]->(s))
    WITH host, ip
    UNWIND (CASE WHEN host.domain_names = [] THEN [null] ELSE host.domain_names END) AS name
    WITH host, ip, name WHERE name IS NOT NULL
    MERGE (d:DomainName {domain_name: name, tag: host.tag})
    WITH ip, d
    OPTIONAL MATCH (ip)-[open:RESOLVES_TO]->(d) WHERE open.end IS NULL
    FOREACH (_ IN CASE WHEN open IS NULL THEN [1] ELSE [] END |
        CREATE (ip)-[:RESOLVES_TO {start: datetime.truncate('second', datetime())}]->(d))
    RETURN count(*) AS hosts_done
}

CALL {
    WITH doc
    UNWIND doc.devices AS device
    MERGE (dev:Device {name: device.name})
    FOREACH (ou IN device.org_units |
        MERGE (o:OrganizationUnit {name: ou})
        MERGE (dev)-[:PART_OF]->(o))
    WITH device, dev WHERE device.ip_address IS NOT NULL
    MATCH (:IP {address: device.ip_address})<-[:HAS_ASSIGNED]-(:Node)-[:IS_A]->(h:Host)
    MERGE (dev)-[:HAS_IDENTITY]->(h)
    RETURN count(*) AS devices_done
}

CALL {
    WITH doc
    UNWIND doc.software_versions AS sw
    MERGE (v:SoftwareVersion {version: sw.version, tag: sw.tag})
    SET v.description = sw.description
    WITH sw, v
    UNWIND sw.ip_addresses AS address
    MATCH (:IP {address: address})<-[:HAS_ASSIGNED]-(:Node)-[:IS_A]->(h:Host)
    WITH v, h
    OPTIONAL MATCH (v)-[open:ON]->(h) WHERE open.end IS NULL
    FOREACH (_ IN CASE WHEN open IS NULL THEN [1] ELSE [] END |
        CREATE (v)-[:ON {start: datetime.truncate('second', datetime())}]->(h))
    RETURN count(*) AS software_done
}

CALL {
    WITH doc
    UNWIND doc.applications AS app
    MATCH (dev:Device {name: app.device})
    MERGE (a:Application {name: app.name})
    MERGE (a)-[:RUNNING_ON]->(dev)
    RETURN count(*) AS applications_done
}

// A submitted host is a full observation of that host: open edges to facts
// the document no longer contains get their observation window closed.
CALL {
    WITH doc
    UNWIND doc.hosts AS host
    MATCH (:IP {address: host.ip_address})<-[:HAS_ASSIGNED]-(:Node)-[:IS_A]->(h:Host)
    OPTIONAL MATCH (v:SoftwareVersion)-[r:ON]->(h)
    WHERE r.end IS NULL
      AND NOT v.version IN [sw IN doc.software_versions WHERE host.ip_address IN sw.ip_addresses | sw.version]
    FOREACH (_ IN CASE WHEN r IS NULL THEN [] ELSE [1] END |
        SET r.end = datetime.truncate('second', datetime()))
    RETURN count(*) AS closed_software
}

CALL {
    WITH doc
    UNWIND doc.hosts AS host
    MATCH (ip:IP {address: host.ip_address})
    OPTIONAL MATCH (ip)-[r:RESOLVES_TO]->(d:DomainName)
    WHERE r.end IS NULL AND NOT d.domain_name IN host.domain_names
    FOREACH (_ IN CASE WHEN r IS NULL THEN [] ELSE [1] END |
        SET r.end = datetime.truncate('second', datetime()))
    RETURN count(*) AS closed_domains
}

RETURN 1
"#;

const EASM_UPDATE_QUERY: &str = r#"
WITH apoc.convert.fromJsonList($json_string) AS records
UNWIND records AS record

CALL {
    WITH record
    WITH record WHERE record.ip IS NOT NULL
    MERGE (ip:IP {address: record.ip})
    ON CREATE SET ip.version = CASE WHEN record.ip CONTAINS ':' THEN 6 ELSE 4 END
    SET ip.tag = CASE
        WHEN ip.tag IS NULL THEN ['CASM']
        ELSE apoc.coll.toSet(ip.tag + ['CASM'])
    END
    MERGE (node:Node)-[:HAS_ASSIGNED]->(ip)
    MERGE (h:Host {hostname: coalesce(record.domain_name, record.ip)})
    MERGE (node)-[:IS_A]->(h)

    MERGE (svc:NetworkService {service: record.service, tag: ['CASM']})
    SET svc.port = record.port, svc.protocol = record.protocol
    WITH record, ip, h, svc
    OPTIONAL MATCH (svc)-[open_svc:ON]->(h) WHERE open_svc.end IS NULL
    FOREACH (_ IN CASE WHEN open_svc IS NULL THEN [1] ELSE [] END |
        CREATE (svc)-[:ON {start: datetime.truncate('second', datetime())}]->(h))

    WITH record, ip, h
    FOREACH (ignored IN CASE WHEN record.domain_name IS NULL THEN [] ELSE [1] END |
        MERGE (d:DomainName {domain_name: record.domain_name, tag: ['CASM']}))
    WITH record, ip, h
    OPTIONAL MATCH (d:DomainName {domain_name: record.domain_name, tag: ['CASM']})
    OPTIONAL MATCH (ip)-[open_dom:RESOLVES_TO]->(d) WHERE open_dom.end IS NULL
    FOREACH (_ IN CASE WHEN d IS NOT NULL AND open_dom IS NULL THEN [1] ELSE [] END |
        CREATE (ip)-[:RESOLVES_TO {start: datetime.truncate('second', datetime())}]->(d))

    WITH record, h
    UNWIND (CASE WHEN record.software_versions = [] THEN [null] ELSE record.software_versions END) AS sw
    WITH h, sw WHERE sw IS NOT NULL
    MERGE (v:SoftwareVersion {version: sw.version, tag: ['CASM']})
    SET v.description = sw.name
    WITH h, v
    OPTIONAL MATCH (v)-[open_sw:ON]->(h) WHERE open_sw.end IS NULL
    FOREACH (_ IN CASE WHEN open_sw IS NULL THEN [1] ELSE [] END |
        CREATE (v)-[:ON {start: datetime.truncate('second', datetime())}]->(h))
    RETURN count(*) AS record_done
}

RETURN 1
"#;

// A probe batch is a full observation of the probed hosts: open edges to
// CASM-tagged facts the batch no longer contains get closed.
const EASM_CLOSE_QUERY: &str = r#"
WITH apoc.convert.fromJsonList($json_string) AS records
UNWIND [record IN records WHERE record.ip IS NOT NULL] AS record
WITH record.ip AS address,
     collect(DISTINCT record.service) AS services,
     collect([sw IN record.software_versions | sw.version]) AS version_lists
WITH address, services,
     reduce(acc = [], versions IN version_lists | acc + versions) AS versions
MATCH (:IP {address: address})<-[:HAS_ASSIGNED]-(:Node)-[:IS_A]->(h:Host)
OPTIONAL MATCH (svc:NetworkService)-[stale_svc:ON]->(h)
WHERE stale_svc.end IS NULL AND svc.tag = ['CASM'] AND NOT svc.service IN services
FOREACH (_ IN CASE WHEN stale_svc IS NULL THEN [] ELSE [1] END |
    SET stale_svc.end = datetime.truncate('second', datetime()))
WITH address, versions, h
OPTIONAL MATCH (v:SoftwareVersion)-[stale_sw:ON]->(h)
WHERE stale_sw.end IS NULL AND v.tag = ['CASM'] AND NOT v.version IN versions
FOREACH (_ IN CASE WHEN stale_sw IS NULL THEN [] ELSE [1] END |
    SET stale_sw.end = datetime.truncate('second', datetime()))
RETURN count(*) AS closed
"#;

const SLP_UPDATE_QUERY: &str = r#"
WITH apoc.convert.fromJsonList($json_string) AS records
UNWIND records AS result
MERGE (d:DomainName {domain_name: result.domain})
ON CREATE SET d.tag = [result.tag]
ON MATCH SET d.tag = CASE
    WHEN d.tag IS NULL THEN [result.tag]
    ELSE apoc.coll.toSet([result.tag] + [x IN d.tag WHERE x <> 'SLP_no'])
END
MERGE (ip:IP {address: result.ip})
ON CREATE SET ip.tag = ['SLP'], ip.version = CASE WHEN result.ip CONTAINS ':' THEN 6 ELSE 4 END
ON MATCH SET ip.tag = CASE
    WHEN ip.tag IS NULL THEN ['SLP']
    ELSE apoc.coll.toSet(['SLP'] + ip.tag)
END
SET ip.sp_risk_score = result.sp_risk_score
WITH result, d, ip
OPTIONAL MATCH (ip)-[open:RESOLVES_TO]->(d) WHERE open.end IS NULL
FOREACH (_ IN CASE WHEN open IS NULL THEN [1] ELSE [] END |
    CREATE (ip)-[:RESOLVES_TO {start: datetime.truncate('second', datetime())}]->(d))
MERGE (s:Subnet {range: result.subnet})
ON CREATE SET s.version = CASE WHEN result.subnet CONTAINS ':' THEN 6 ELSE 4 END
MERGE (ip)-[:PART_OF]->(s)
"#;

impl GraphClient {
    /// Transactional upsert of a full asset document, followed by the
    /// default-parent maintenance pass.
    pub async fn store_assets(&self, doc: &NmapResults) -> Result<()> {
        let mut doc = doc.clone();
        doc.flatten_related_relationships();
        let json_string = serde_json::to_string(&doc)?;
        self.run(query(ASSET_UPDATE_QUERY).param("json_string", json_string))
            .await?;
        self.default_ip_parent_constraint().await?;
        self.default_subnet_parent_constraint().await
    }

    /// Transactional upsert of EASM probe records, followed by the
    /// stale-edge close pass and the default-parent maintenance pass (EASM
    /// records introduce IPs too).
    pub async fn store_easm(&self, records: &[EasmRecord]) -> Result<()> {
        let json_string = serde_json::to_string(records)?;
        self.run_in_txn(vec![
            query(EASM_UPDATE_QUERY).param("json_string", json_string.clone()),
            query(EASM_CLOSE_QUERY).param("json_string", json_string),
        ])
        .await?;
        self.default_ip_parent_constraint().await?;
        self.default_subnet_parent_constraint().await
    }

    /// Upsert SLP enrichment records (domains, risk scores, subnets).
    pub async fn store_slp_data(&self, records: &[SlpRecord]) -> Result<()> {
        let json_string = serde_json::to_string(records)?;
        self.run(query(SLP_UPDATE_QUERY).param("json_string", json_string))
            .await
    }

    /// Attach every parentless IP to the default range of its version and
    /// drop default edges that a more specific parent supersedes.
    pub async fn default_ip_parent_constraint(&self) -> Result<()> {
        let statements = [
            r#"MATCH (ip:IP) WHERE NOT EXISTS ((ip)-[:PART_OF]->(:Subnet)) AND ip.version = 4
               MATCH (s:Subnet {range: "0.0.0.0/0"})
               MERGE (ip)-[:PART_OF]->(s)"#,
            r#"MATCH (internet:Subnet {range: "0.0.0.0/0"})
               MATCH (ip:IP)-[r:PART_OF]->(internet) WHERE count{(ip)-[:PART_OF]->(:Subnet)} > 1
               DELETE r"#,
            r#"MATCH (ip:IP) WHERE NOT EXISTS ((ip)-[:PART_OF]->(:Subnet)) AND ip.version = 6
               MATCH (s:Subnet {range: "::/0"})
               MERGE (ip)-[:PART_OF]->(s)"#,
            r#"MATCH (internet:Subnet {range: "::/0"})
               MATCH (ip:IP)-[r:PART_OF]->(internet) WHERE count{(ip)-[:PART_OF]->(:Subnet)} > 1
               DELETE r"#,
        ];
        for statement in statements {
            self.run(query(statement)).await?;
        }
        Ok(())
    }

    /// Same maintenance for non-default subnets without an explicit parent.
    pub async fn default_subnet_parent_constraint(&self) -> Result<()> {
        let statements = [
            r#"MATCH (s:Subnet)
               WHERE NOT EXISTS ((s)-[:PART_OF]->(:Subnet)) AND s.version = 4 AND s.range <> "0.0.0.0/0"
               MATCH (internet:Subnet {range: "0.0.0.0/0"})
               MERGE (s)-[:PART_OF]->(internet)"#,
            r#"MATCH (internet:Subnet {range: "0.0.0.0/0"})
               MATCH (subnet:Subnet)-[r:PART_OF]->(internet)
               WHERE count{(subnet)-[:PART_OF]->(:Subnet)} > 1
               DELETE r"#,
            r#"MATCH (s:Subnet)
               WHERE NOT EXISTS ((s)-[:PART_OF]->(:Subnet)) AND s.version = 6 AND s.range <> "::/0"
               MATCH (internet:Subnet {range: "::/0"})
               MERGE (s)-[:PART_OF]->(internet)"#,
            r#"MATCH (internet:Subnet {range: "::/0"})
               MATCH (subnet:Subnet)-[r:PART_OF]->(internet)
               WHERE count{(subnet)-[:PART_OF]->(:Subnet)} > 1
               DELETE r"#,
        ];
        for statement in statements {
            self.run(query(statement)).await?;
        }
        Ok(())
    }

    /// Aggregated information for each IP: subnets, contacts, domains,
    /// centrality values of its Nodes, and the missions it supports.
    pub async fn get_ip_asset_info(
        &self,
        ip: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<IpAssetInfo>> {
        let filter = if ip.is_some() { " {address: $ip}" } else { "" };
        let cypher = format!(
            r#"
            MATCH (ip:IP{filter})
            WITH ip, [(ip)-[:PART_OF]->(s:Subnet) | s.range] AS subnets
            WITH ip, subnets,
                 [(ip)-[:PART_OF]->(:Subnet)-[:HAS]->(c:Contact) | c.name] AS contacts
            WITH ip, subnets, contacts,
                 [(ip)-[:RESOLVES_TO]->(d:DomainName) | d.domain_name] AS domains
            WITH ip, subnets, contacts, domains,
                 [(ip)<-[:HAS_ASSIGNED]-(n:Node) | {{
                     degree_centrality: n.degree_centrality,
                     pagerank_centrality: n.pagerank_centrality,
                     topology_betweenness: n.topology_betweenness,
                     topology_degree: n.topology_degree
                 }}] AS nodes
            WITH ip, subnets, contacts, domains, nodes,
                 [(ip)<-[:HAS_ASSIGNED]-(:Node)-[:IS_A]->(:Host)<-[:PROVIDED_BY]-(:Component)-[:SUPPORTS]->(m:Mission) | m.name] AS missions
            RETURN ip.address AS ip, subnets, contacts, domains, nodes, missions
            ORDER BY ip.address
            SKIP $offset
            LIMIT $limit
            "#
        );

        let mut q = query(&cypher).param("limit", limit).param("offset", offset);
        if let Some(address) = ip {
            q = q.param("ip", address);
        }

        let mut rows = self.graph().execute(q).await.map_err(store_err)?;
        let mut infos = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            let read = |e: neo4rs::DeError| {
                sitrep_core::Error::StoreTransient(format!("row decode failed: {e}"))
            };
            let info = IpAssetInfo {
                ip: row.get::<String>("ip").map_err(read)?,
                subnets: row.get::<Vec<String>>("subnets").map_err(read)?,
                contacts: row.get::<Vec<String>>("contacts").map_err(read)?,
                domain_names: row.get::<Vec<String>>("domains").map_err(read)?,
                nodes: row.get::<Vec<NodeCentrality>>("nodes").map_err(read)?,
                missions: row.get::<Vec<String>>("missions").map_err(read)?,
                critical: false,
            }
            .with_critical_flag();
            infos.push(info);
        }
        Ok(infos)
    }
}
