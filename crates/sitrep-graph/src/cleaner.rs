//! Age-based cleanup of lifecycle-closed edges and old security events.
//!
//! Deletions run in bounded batches, each committed separately, so a large
//! backlog never holds one long transaction open.

use neo4rs::query;
use tracing::info;

use sitrep_core::error::Result;

use crate::client::GraphClient;

/// Default retention window for closed edges and aged events.
pub const DEFAULT_RETENTION_DAYS: i64 = 21;

/// Per-transaction deletion bound.
const BATCH_LIMIT: i64 = 1000;

impl GraphClient {
    async fn delete_in_batches(&self, cypher: &str, retention_days: i64) -> Result<u64> {
        let mut total = 0u64;
        loop {
            let q = query(cypher)
                .param("days", retention_days)
                .param("limit", BATCH_LIMIT);
            let mut rows = self
                .graph()
                .execute(q)
                .await
                .map_err(crate::client::store_err)?;
            let deleted: i64 = match rows.next().await.map_err(crate::client::store_err)? {
                Some(row) => row.get("deleted").map_err(|e| {
                    sitrep_core::Error::StoreTransient(format!("row decode failed: {e}"))
                })?,
                None => 0,
            };
            total += deleted as u64;
            if deleted < BATCH_LIMIT {
                break;
            }
        }
        Ok(total)
    }

    /// Delete `IN` edges between vulnerabilities and software versions whose
    /// observation window closed before the retention horizon.
    pub async fn clean_old_vulnerabilities(&self, retention_days: i64) -> Result<u64> {
        let deleted = self
            .delete_in_batches(
                "WITH datetime() - duration({days: $days}) AS popTime\n\
                 MATCH (:Vulnerability)-[r:IN]->(:SoftwareVersion)\n\
                 WHERE r.end < popTime\n\
                 WITH r LIMIT $limit\n\
                 DELETE r\n\
                 RETURN count(*) AS deleted",
                retention_days,
            )
            .await?;
        info!(deleted, "cleaned old vulnerability links");
        Ok(deleted)
    }

    /// Delete closed `ON` edges between hosts and their network services /
    /// software versions.
    pub async fn clean_host_layer(&self, retention_days: i64) -> Result<u64> {
        let services = self
            .delete_in_batches(
                "WITH datetime() - duration({days: $days}) AS popTime\n\
                 MATCH (:NetworkService)-[r:ON]->(:Host)\n\
                 WHERE r.end < popTime\n\
                 WITH r LIMIT $limit\n\
                 DELETE r\n\
                 RETURN count(*) AS deleted",
                retention_days,
            )
            .await?;
        let software = self
            .delete_in_batches(
                "WITH datetime() - duration({days: $days}) AS popTime\n\
                 MATCH (:SoftwareVersion)-[r:ON]->(:Host)\n\
                 WHERE r.end < popTime\n\
                 WITH r LIMIT $limit\n\
                 DELETE r\n\
                 RETURN count(*) AS deleted",
                retention_days,
            )
            .await?;
        info!(services, software, "cleaned host layer");
        Ok(services + software)
    }

    /// Delete closed `RESOLVES_TO`, `HAS_ASSIGNED`, and `IS_CONNECTED_TO`
    /// edges of the network layer.
    pub async fn clean_network_layer(&self, retention_days: i64) -> Result<u64> {
        let mut total = 0u64;
        for cypher in [
            "WITH datetime() - duration({days: $days}) AS popTime\n\
             MATCH (:IP)-[r:RESOLVES_TO]->(:DomainName)\n\
             WHERE r.end < popTime\n\
             WITH r LIMIT $limit\n\
             DELETE r\n\
             RETURN count(*) AS deleted",
            "WITH datetime() - duration({days: $days}) AS popTime\n\
             MATCH (:Node)-[r:HAS_ASSIGNED]->(:IP)\n\
             WHERE r.end < popTime\n\
             WITH r LIMIT $limit\n\
             DELETE r\n\
             RETURN count(*) AS deleted",
            "WITH datetime() - duration({days: $days}) AS popTime\n\
             MATCH (:Node)-[r:IS_CONNECTED_TO]->(:Node)\n\
             WHERE r.end < popTime\n\
             WITH r LIMIT $limit\n\
             DELETE r\n\
             RETURN count(*) AS deleted",
        ] {
            total += self.delete_in_batches(cypher, retention_days).await?;
        }
        info!(deleted = total, "cleaned network layer");
        Ok(total)
    }

    /// Delete security events older than the retention horizon.
    pub async fn clean_security_events(&self, retention_days: i64) -> Result<u64> {
        let deleted = self
            .delete_in_batches(
                "WITH datetime() - duration({days: $days}) AS popTime\n\
                 MATCH (secEvent:SecurityEvent)\n\
                 WHERE secEvent.detection_time < popTime\n\
                 WITH secEvent LIMIT $limit\n\
                 DETACH DELETE secEvent\n\
                 RETURN count(*) AS deleted",
                retention_days,
            )
            .await?;
        info!(deleted, "cleaned security events");
        Ok(deleted)
    }
}
