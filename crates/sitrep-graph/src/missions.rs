//! Mission reads and mission-criticality writes.

use neo4rs::query;

use sitrep_core::dto::{HostCriticality, MissionRecord};
use sitrep_core::error::Result;

use crate::client::{store_err, GraphClient};

const STORE_CRITICALITY_QUERY: &str = r#"
WITH apoc.convert.fromJsonList($json_string) AS value
UNWIND value AS result
MATCH (ip:IP {address: result.ip})
MATCH (host:Host {hostname: result.hostname})
MATCH (host)<-[:IS_A]-(node:Node)-[:HAS_ASSIGNED]->(ip)
SET node.mission_criticality = result.criticality
"#;

impl GraphClient {
    /// All missions with their requirements and DAG structure.
    pub async fn get_missions(&self, limit: i64) -> Result<Vec<MissionRecord>> {
        let q = query(
            "MATCH (m:Mission)\n\
             RETURN m.name AS name, m.description AS description,\n\
                    m.criticality AS criticality,\n\
                    m.confidentiality_requirement AS confidentiality_requirement,\n\
                    m.integrity_requirement AS integrity_requirement,\n\
                    m.availability_requirement AS availability_requirement,\n\
                    m.structure AS structure\n\
             LIMIT $limit",
        )
        .param("limit", limit);

        let mut rows = self.graph().execute(q).await.map_err(store_err)?;
        let mut missions = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            let read = |e: neo4rs::DeError| {
                sitrep_core::Error::StoreTransient(format!("row decode failed: {e}"))
            };
            missions.push(MissionRecord {
                name: row.get::<String>("name").map_err(read)?,
                description: row.get::<Option<String>>("description").map_err(read)?,
                criticality: row.get::<Option<f64>>("criticality").map_err(read)?,
                confidentiality_requirement: row
                    .get::<Option<f64>>("confidentiality_requirement")
                    .map_err(read)?,
                integrity_requirement: row
                    .get::<Option<f64>>("integrity_requirement")
                    .map_err(read)?,
                availability_requirement: row
                    .get::<Option<f64>>("availability_requirement")
                    .map_err(read)?,
                structure: row.get::<Option<String>>("structure").map_err(read)?,
            });
        }
        Ok(missions)
    }

    /// Write propagated mission criticality onto the Node between each
    /// matched host and IP.
    pub async fn store_mission_criticalities(&self, values: &[HostCriticality]) -> Result<()> {
        let json = serde_json::to_string(values)?;
        self.run(query(STORE_CRITICALITY_QUERY).param("json_string", json))
            .await
    }
}
