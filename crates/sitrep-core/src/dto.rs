//! Wire DTOs exchanged between scan workflows, the REST collaborator, and
//! the graph store.
//!
//! Shapes follow the published wire formats; unknown inputs are rejected at
//! the boundary while optional fields default so partially-populated
//! documents stay accepted.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Asset documents (Nmap basic scan / POST /assets)
// ---------------------------------------------------------------------------

/// One scanned host with its naming and subnet context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostAsset {
    pub ip_address: String,
    #[serde(default)]
    pub domain_names: Vec<String>,
    #[serde(default)]
    pub subnets: Vec<String>,
    #[serde(default)]
    pub uris: Vec<String>,
    #[serde(default)]
    pub tag: Vec<String>,
}

/// One subnet with optional administrative context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubnetAsset {
    pub ip_range: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub contacts: Vec<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub org_units: Vec<String>,
}

/// A physical or virtual device identified by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceAsset {
    pub name: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub org_units: Vec<String>,
}

/// A software version (CPE 2.3 string) observed on one or more hosts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoftwareVersionAsset {
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub ip_addresses: Vec<String>,
    #[serde(default)]
    pub tag: Vec<String>,
}

/// A process/service associated with a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationAsset {
    pub name: String,
    pub device: String,
}

/// An organization unit owning subnets or devices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrgUnitAsset {
    pub name: String,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub parents: Vec<String>,
}

/// Full asset document produced by the basic Nmap workflow and accepted by
/// the asset upsert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NmapResults {
    #[serde(default)]
    pub hosts: Vec<HostAsset>,
    #[serde(default)]
    pub subnets: Vec<SubnetAsset>,
    #[serde(default)]
    pub devices: Vec<DeviceAsset>,
    #[serde(default)]
    pub software_versions: Vec<SoftwareVersionAsset>,
    #[serde(default)]
    pub applications: Vec<ApplicationAsset>,
    #[serde(default)]
    pub org_units: Vec<OrgUnitAsset>,
}

impl NmapResults {
    /// Materialize hosts and subnets that the document only references.
    ///
    /// Devices and software versions may point at IPs with no host entry,
    /// and hosts/subnets may reference subnets declared nowhere else; the
    /// upsert expects the closure, so bare entries are appended here.
    pub fn flatten_related_relationships(&mut self) {
        let declared_hosts: BTreeSet<String> =
            self.hosts.iter().map(|h| h.ip_address.clone()).collect();
        let declared_subnets: BTreeSet<String> =
            self.subnets.iter().map(|s| s.ip_range.clone()).collect();

        let mut related_hosts: BTreeSet<String> = BTreeSet::new();
        related_hosts.extend(self.devices.iter().filter_map(|d| d.ip_address.clone()));
        for sw in &self.software_versions {
            related_hosts.extend(sw.ip_addresses.iter().cloned());
        }

        let mut related_subnets: BTreeSet<String> = BTreeSet::new();
        for host in &self.hosts {
            related_subnets.extend(host.subnets.iter().cloned());
        }
        for subnet in &self.subnets {
            related_subnets.extend(subnet.parents.iter().cloned());
        }

        for ip in related_hosts.difference(&declared_hosts) {
            self.hosts.push(HostAsset {
                ip_address: ip.clone(),
                ..Default::default()
            });
        }
        for range in related_subnets.difference(&declared_subnets) {
            self.subnets.push(SubnetAsset {
                ip_range: range.clone(),
                ..Default::default()
            });
        }
    }
}

// ---------------------------------------------------------------------------
// EASM (POST /easm)
// ---------------------------------------------------------------------------

/// A technology detection mapped to a concrete CPE 2.3 string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnologyVersion {
    pub name: String,
    pub version: String,
}

/// One probed service discovered during external enumeration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EasmRecord {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub domain_name: Option<String>,
    pub port: u16,
    pub protocol: String,
    pub service: String,
    #[serde(default)]
    pub software_versions: Vec<TechnologyVersion>,
}

// ---------------------------------------------------------------------------
// Traceroute (POST /traceroute)
// ---------------------------------------------------------------------------

/// One hop segment between two addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    pub prev_ip: String,
    pub hops: i64,
    pub next_ip: String,
}

/// Hop path towards one destination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TracerouteHost {
    pub dst_ip: String,
    #[serde(default)]
    pub hops: Vec<Hop>,
}

/// Traceroute sweep output: hop paths plus the scan timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TracerouteResult {
    pub time: String,
    #[serde(default)]
    pub data: Vec<TracerouteHost>,
}

// ---------------------------------------------------------------------------
// Missions & criticality
// ---------------------------------------------------------------------------

/// A mission as returned by the graph store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionRecord {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub criticality: Option<f64>,
    #[serde(default)]
    pub confidentiality_requirement: Option<f64>,
    #[serde(default)]
    pub integrity_requirement: Option<f64>,
    #[serde(default)]
    pub availability_requirement: Option<f64>,
    /// JSON-encoded [`MissionStructure`].
    #[serde(default)]
    pub structure: Option<String>,
}

/// An id/name pair inside a mission structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionEntity {
    pub id: i64,
    pub name: String,
}

/// Host leaf of a mission representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionHost {
    pub id: i64,
    pub hostname: String,
    pub ip: String,
}

/// AND/OR aggregation node ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregations {
    #[serde(rename = "and", default)]
    pub and_ids: Vec<i64>,
    #[serde(rename = "or", default)]
    pub or_ids: Vec<i64>,
}

/// Node sets of a mission DAG.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionNodes {
    #[serde(default)]
    pub missions: Vec<MissionEntity>,
    #[serde(default)]
    pub services: Vec<MissionEntity>,
    #[serde(default)]
    pub hosts: Vec<MissionHost>,
    #[serde(default)]
    pub aggregations: Aggregations,
}

/// A directed edge inside a mission DAG.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectedLink {
    #[serde(rename = "from")]
    pub from_id: i64,
    #[serde(rename = "to")]
    pub to_id: i64,
}

/// Relationship sets of a mission DAG.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionRelationships {
    #[serde(default)]
    pub one_way: Vec<DirectedLink>,
}

/// Full mission DAG representation stored on the mission node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionStructure {
    pub nodes: MissionNodes,
    pub relationships: MissionRelationships,
}

/// Criticality propagated to a concrete host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostCriticality {
    pub ip: String,
    pub hostname: String,
    pub criticality: f64,
}

// ---------------------------------------------------------------------------
// IP asset information (GET /ips, get_ip_asset_info)
// ---------------------------------------------------------------------------

/// Centrality properties of one network Node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeCentrality {
    #[serde(default)]
    pub degree_centrality: Option<f64>,
    #[serde(default)]
    pub pagerank_centrality: Option<f64>,
    #[serde(default)]
    pub topology_betweenness: Option<f64>,
    #[serde(default)]
    pub topology_degree: Option<f64>,
}

/// Aggregated view of an IP: subnets, contacts, missions, centralities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpAssetInfo {
    pub ip: String,
    #[serde(default)]
    pub subnets: Vec<String>,
    #[serde(default)]
    pub contacts: Vec<String>,
    #[serde(default)]
    pub domain_names: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<NodeCentrality>,
    #[serde(default)]
    pub missions: Vec<String>,
    pub critical: bool,
}

impl IpAssetInfo {
    /// An IP is critical iff it supports at least one mission.
    pub fn with_critical_flag(mut self) -> Self {
        self.critical = !self.missions.is_empty();
        self
    }
}

// ---------------------------------------------------------------------------
// SLP enrichment (POST /slp_enrichment)
// ---------------------------------------------------------------------------

/// One enrichment record from the SLP bulk API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlpRecord {
    pub ip: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub subnet: String,
    /// Integer risk score, or the literal string `"null"` when unknown.
    #[serde(default)]
    pub sp_risk_score: serde_json::Value,
    pub tag: String,
}
