//! IP/subnet hierarchy synchronizer.
//!
//! Rebuilds the `PART_OF` hierarchy so that every IP hangs off its most
//! specific subnet and every subnet off its most specific parent. The
//! closest-parent computation is pure; persistence clears and recreates the
//! hierarchy edges in one transaction, then applies the default-parent
//! maintenance so every IP and non-default subnet has exactly one parent
//! after each run.

use std::net::IpAddr;

use ipnet::IpNet;
use neo4rs::query;
use serde::Serialize;
use tracing::{debug, warn};

use sitrep_core::error::Result;
use sitrep_core::net::{closest_network, closest_parent, is_default_range};

use crate::client::{store_err, GraphClient};

/// An IP mapped to its most specific containing subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpParent {
    pub address: String,
    pub subnet: String,
}

/// A subnet mapped to its most specific enclosing parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubnetParent {
    pub ip_range: String,
    pub version: u8,
    pub parent: String,
}

/// Compute the closest-parent maps for the fetched IPs and subnets.
///
/// IPs and subnets without a containing network are left out; the
/// default-parent pass attaches those to `0.0.0.0/0` / `::/0`.
pub fn prepare_hierarchy(ips: &[IpAddr], subnets: &[IpNet]) -> (Vec<IpParent>, Vec<SubnetParent>) {
    let ip_map = ips
        .iter()
        .filter_map(|ip| {
            closest_network(ip, subnets).map(|net| IpParent {
                address: ip.to_string(),
                subnet: net.to_string(),
            })
        })
        .collect();

    let subnet_map = subnets
        .iter()
        .filter(|subnet| !is_default_range(&subnet.to_string()))
        .filter_map(|subnet| {
            closest_parent(subnet, subnets).map(|parent| SubnetParent {
                ip_range: subnet.to_string(),
                version: if subnet.network().is_ipv6() { 6 } else { 4 },
                parent: parent.to_string(),
            })
        })
        .collect();

    (ip_map, subnet_map)
}

const SUBNET_HIERARCHY_QUERY: &str = r#"
WITH apoc.convert.fromJsonList($json_string) AS subnets
UNWIND subnets AS subnet
MERGE (s:Subnet {range: subnet.ip_range})
SET s.version = subnet.version
MERGE (parent:Subnet {range: subnet.parent})
MERGE (s)-[:PART_OF]->(parent)
"#;

const IP_HIERARCHY_QUERY: &str = r#"
WITH apoc.convert.fromJsonList($json_string) AS ips
UNWIND ips AS ip_data
MATCH (ip:IP {address: ip_data.address})
MATCH (subnet:Subnet {range: ip_data.subnet})
MERGE (ip)-[:PART_OF]->(subnet)
"#;

impl GraphClient {
    /// Fetch all stored IP addresses and subnet ranges, parsed.
    /// Unparseable values are skipped with a warning.
    pub async fn fetch_ips_and_subnets(&self) -> Result<(Vec<IpAddr>, Vec<IpNet>)> {
        let mut ips = Vec::new();
        let mut rows = self
            .graph()
            .execute(query("MATCH (ip:IP) RETURN ip.address AS address"))
            .await
            .map_err(store_err)?;
        while let Some(row) = rows.next().await.map_err(store_err)? {
            let address: String = row
                .get("address")
                .map_err(|e| sitrep_core::Error::StoreTransient(format!("row decode failed: {e}")))?;
            match address.parse::<IpAddr>() {
                Ok(ip) => ips.push(ip),
                Err(_) => warn!(address, "skipping unparseable IP address"),
            }
        }

        let mut subnets = Vec::new();
        let mut rows = self
            .graph()
            .execute(query("MATCH (s:Subnet) RETURN s.range AS range"))
            .await
            .map_err(store_err)?;
        while let Some(row) = rows.next().await.map_err(store_err)? {
            let range: String = row
                .get("range")
                .map_err(|e| sitrep_core::Error::StoreTransient(format!("row decode failed: {e}")))?;
            match range.parse::<IpNet>() {
                Ok(net) => subnets.push(net),
                Err(_) => warn!(range, "skipping unparseable subnet range"),
            }
        }

        Ok((ips, subnets))
    }

    /// Clear every hierarchy edge and recreate them from the prepared maps,
    /// all in one write transaction.
    pub async fn load_hierarchy(
        &self,
        ips: &[IpParent],
        subnets: &[SubnetParent],
    ) -> Result<()> {
        let subnets_json = serde_json::to_string(subnets)?;
        let ips_json = serde_json::to_string(ips)?;
        self.run_in_txn(vec![
            query("MATCH (:Subnet)-[r:PART_OF]->(:Subnet) DELETE r"),
            query("MATCH (:IP)-[r:PART_OF]->(:Subnet) DELETE r"),
            query(SUBNET_HIERARCHY_QUERY).param("json_string", subnets_json),
            query(IP_HIERARCHY_QUERY).param("json_string", ips_json),
        ])
        .await
    }

    /// Full synchronizer run: fetch, compute, rewrite, re-apply defaults.
    pub async fn sync_ip_subnet_hierarchy(&self) -> Result<()> {
        let (ips, subnets) = self.fetch_ips_and_subnets().await?;
        debug!(ips = ips.len(), subnets = subnets.len(), "hierarchy sync input");
        let (ip_map, subnet_map) = prepare_hierarchy(&ips, &subnets);
        self.load_hierarchy(&ip_map, &subnet_map).await?;
        self.default_ip_parent_constraint().await?;
        self.default_subnet_parent_constraint().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(values: &[&str]) -> Vec<IpAddr> {
        values.iter().map(|v| v.parse().unwrap()).collect()
    }

    fn nets(values: &[&str]) -> Vec<IpNet> {
        values.iter().map(|v| v.parse().unwrap()).collect()
    }

    #[test]
    fn test_prepare_hierarchy_maps_to_most_specific() {
        let ips = addrs(&["192.168.1.10", "10.0.0.5"]);
        let subnets = nets(&["192.168.0.0/16", "192.168.1.0/24", "10.0.0.0/8"]);
        let (ip_map, subnet_map) = prepare_hierarchy(&ips, &subnets);

        assert!(ip_map.contains(&IpParent {
            address: "192.168.1.10".into(),
            subnet: "192.168.1.0/24".into(),
        }));
        assert!(ip_map.contains(&IpParent {
            address: "10.0.0.5".into(),
            subnet: "10.0.0.0/8".into(),
        }));
        assert!(subnet_map.contains(&SubnetParent {
            ip_range: "192.168.1.0/24".into(),
            version: 4,
            parent: "192.168.0.0/16".into(),
        }));
    }

    #[test]
    fn test_prepare_hierarchy_skips_unmatched_ips() {
        let ips = addrs(&["8.8.8.8"]);
        let subnets = nets(&["192.168.0.0/16"]);
        let (ip_map, _) = prepare_hierarchy(&ips, &subnets);
        assert!(ip_map.is_empty());
    }

    #[test]
    fn test_prepare_hierarchy_defaults_are_not_children() {
        let subnets = nets(&["0.0.0.0/0", "10.0.0.0/8"]);
        let (_, subnet_map) = prepare_hierarchy(&[], &subnets);
        // 10.0.0.0/8 has the default as its only parent candidate, which the
        // default-parent pass handles; the default itself must never appear
        // as a child.
        assert_eq!(subnet_map.len(), 1);
        assert_eq!(subnet_map[0].ip_range, "10.0.0.0/8");
        assert_eq!(subnet_map[0].parent, "0.0.0.0/0");
    }

    #[test]
    fn test_prepare_hierarchy_mixed_versions_stay_separate() {
        let ips = addrs(&["2001:db8:0:1::5"]);
        let subnets = nets(&["2001:db8::/32", "10.0.0.0/8"]);
        let (ip_map, _) = prepare_hierarchy(&ips, &subnets);
        assert_eq!(ip_map.len(), 1);
        assert_eq!(ip_map[0].subnet, "2001:db8::/32");
    }
}
