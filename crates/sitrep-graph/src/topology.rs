//! Topology writes from traceroute sweeps.

use neo4rs::query;

use sitrep_core::dto::TracerouteResult;
use sitrep_core::error::Result;

use crate::client::GraphClient;

const TOPOLOGY_QUERY: &str = r#"
WITH apoc.convert.fromJsonMap($nmap_result) AS value
UNWIND value.data AS data
UNWIND data.hops AS hop
WITH value, hop WHERE hop.prev_ip <> '' AND hop.next_ip <> ''
MERGE (prev_ip:IP {address: hop.prev_ip})
ON CREATE SET prev_ip.version = CASE WHEN hop.prev_ip CONTAINS ':' THEN 6 ELSE 4 END
MERGE (prev_node:Node)-[:HAS_ASSIGNED]->(prev_ip)
MERGE (next_ip:IP {address: hop.next_ip})
ON CREATE SET next_ip.version = CASE WHEN hop.next_ip CONTAINS ':' THEN 6 ELSE 4 END
MERGE (next_node:Node)-[:HAS_ASSIGNED]->(next_ip)
MERGE (prev_node)-[rel:IS_CONNECTED_TO {hops: hop.hops}]->(next_node)
SET rel.last_detection = datetime(value.time)
"#;

impl GraphClient {
    /// Upsert the `IS_CONNECTED_TO` topology derived from a traceroute
    /// sweep. Re-observing a connection refreshes `last_detection` without
    /// duplicating the edge.
    pub async fn create_topology(&self, result: &TracerouteResult) -> Result<()> {
        let json = serde_json::to_string(result)?;
        self.run(query(TOPOLOGY_QUERY).param("nmap_result", json))
            .await
    }
}
