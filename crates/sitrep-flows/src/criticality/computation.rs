//! Mission-criticality propagation over mission DAGs.
//!
//! Each mission representation is a DAG of mission/service/host nodes and
//! AND/OR aggregators connected by `one_way` edges. The mission criticality
//! flows breadth-first from the mission node: an OR aggregator divides the
//! value among its children, AND and service nodes pass it through, and a
//! host accumulates the maximum value reached across all paths and all
//! missions.

use std::collections::{HashMap, VecDeque};

use sitrep_core::dto::{HostCriticality, MissionRecord, MissionStructure};
use sitrep_core::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityKind {
    Mission,
    Service,
    Host,
    And,
    Or,
    Unknown,
}

fn entity_kind(structure: &MissionStructure, id: i64) -> EntityKind {
    if structure.nodes.hosts.iter().any(|h| h.id == id) {
        return EntityKind::Host;
    }
    if structure.nodes.services.iter().any(|s| s.id == id) {
        return EntityKind::Service;
    }
    if structure.nodes.aggregations.and_ids.contains(&id) {
        return EntityKind::And;
    }
    if structure.nodes.aggregations.or_ids.contains(&id) {
        return EntityKind::Or;
    }
    EntityKind::Unknown
}

/// The numeric criticality of a mission: the explicit field, or the maximum
/// of its security requirements.
fn mission_criticality(mission: &MissionRecord) -> Result<f64> {
    if let Some(criticality) = mission.criticality {
        return Ok(criticality);
    }
    match (
        mission.confidentiality_requirement,
        mission.integrity_requirement,
        mission.availability_requirement,
    ) {
        (Some(c), Some(i), Some(a)) => Ok(c.max(i).max(a)),
        _ => Err(Error::BadInput(format!(
            "mission {} has no criticality nor security requirements",
            mission.name
        ))),
    }
}

fn mission_node_id(mission: &MissionRecord, structure: &MissionStructure) -> Result<i64> {
    structure
        .nodes
        .missions
        .iter()
        .find(|m| m.name == mission.name)
        .map(|m| m.id)
        .ok_or_else(|| {
            Error::BadInput(format!(
                "mission {} is missing from its own structure",
                mission.name
            ))
        })
}

/// Propagate criticality from every mission to its hosts.
pub fn compute_host_criticalities(missions: &[MissionRecord]) -> Result<Vec<HostCriticality>> {
    let mut final_hosts: Vec<HostCriticality> = Vec::new();

    for mission in missions {
        let criticality = mission_criticality(mission)?;
        let raw_structure = mission.structure.as_deref().ok_or_else(|| {
            Error::BadInput(format!(
                "mission {} does not contain a structure representation",
                mission.name
            ))
        })?;
        let structure: MissionStructure = serde_json::from_str(raw_structure)?;
        let mission_id = mission_node_id(mission, &structure)?;

        let mut queue: VecDeque<(i64, f64, EntityKind)> = VecDeque::new();
        queue.push_back((mission_id, criticality, EntityKind::Mission));
        let mut host_values: HashMap<i64, f64> = HashMap::new();

        while let Some((id, value, kind)) = queue.pop_front() {
            if kind == EntityKind::Host {
                let entry = host_values.entry(id).or_insert(value);
                if value > *entry {
                    *entry = value;
                }
                continue;
            }
            let children: Vec<i64> = structure
                .relationships
                .one_way
                .iter()
                .filter(|edge| edge.from_id == id)
                .map(|edge| edge.to_id)
                .collect();
            if children.is_empty() {
                continue;
            }
            let child_value = if kind == EntityKind::Or {
                value / children.len() as f64
            } else {
                value
            };
            for child in children {
                queue.push_back((child, child_value, entity_kind(&structure, child)));
            }
        }

        for (host_id, value) in host_values {
            let Some(host) = structure.nodes.hosts.iter().find(|h| h.id == host_id) else {
                continue;
            };
            match final_hosts
                .iter_mut()
                .find(|h| h.hostname == host.hostname && h.ip == host.ip)
            {
                Some(existing) => {
                    if value > existing.criticality {
                        existing.criticality = value;
                    }
                }
                None => final_hosts.push(HostCriticality {
                    ip: host.ip.clone(),
                    hostname: host.hostname.clone(),
                    criticality: value,
                }),
            }
        }
    }

    Ok(final_hosts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mission_with_structure(aggregator: &str, criticality: f64) -> MissionRecord {
        // mission(1) -> aggregator(2) -> service(3) -> host(5)
        //                             -> service(4) -> host(6)
        let structure = json!({
            "nodes": {
                "missions": [{"id": 1, "name": "payments"}],
                "services": [{"id": 3, "name": "api"}, {"id": 4, "name": "db"}],
                "hosts": [
                    {"id": 5, "hostname": "api-1", "ip": "10.0.0.5"},
                    {"id": 6, "hostname": "db-1", "ip": "10.0.0.6"}
                ],
                "aggregations": {
                    "and": if aggregator == "and" { vec![2] } else { vec![] },
                    "or": if aggregator == "or" { vec![2] } else { vec![] }
                }
            },
            "relationships": {
                "one_way": [
                    {"from": 1, "to": 2},
                    {"from": 2, "to": 3},
                    {"from": 2, "to": 4},
                    {"from": 3, "to": 5},
                    {"from": 4, "to": 6}
                ]
            }
        });
        MissionRecord {
            name: "payments".into(),
            criticality: Some(criticality),
            structure: Some(structure.to_string()),
            ..Default::default()
        }
    }

    fn value_for(hosts: &[HostCriticality], hostname: &str) -> f64 {
        hosts
            .iter()
            .find(|h| h.hostname == hostname)
            .expect("host present")
            .criticality
    }

    #[test]
    fn test_or_aggregation_divides_criticality() {
        let hosts = compute_host_criticalities(&[mission_with_structure("or", 10.0)]).unwrap();
        assert_eq!(value_for(&hosts, "api-1"), 5.0);
        assert_eq!(value_for(&hosts, "db-1"), 5.0);
    }

    #[test]
    fn test_and_aggregation_passes_criticality_through() {
        let hosts = compute_host_criticalities(&[mission_with_structure("and", 10.0)]).unwrap();
        assert_eq!(value_for(&hosts, "api-1"), 10.0);
        assert_eq!(value_for(&hosts, "db-1"), 10.0);
    }

    #[test]
    fn test_host_keeps_maximum_across_missions() {
        let low = mission_with_structure("or", 4.0);
        let high = mission_with_structure("and", 8.0);
        let hosts = compute_host_criticalities(&[low, high]).unwrap();
        assert_eq!(value_for(&hosts, "api-1"), 8.0);
    }

    #[test]
    fn test_requirements_fallback_uses_maximum() {
        let mut mission = mission_with_structure("and", 0.0);
        mission.criticality = None;
        mission.confidentiality_requirement = Some(3.0);
        mission.integrity_requirement = Some(9.0);
        mission.availability_requirement = Some(5.0);
        let hosts = compute_host_criticalities(&[mission]).unwrap();
        assert_eq!(value_for(&hosts, "api-1"), 9.0);
    }

    #[test]
    fn test_mission_without_criticality_or_requirements_fails() {
        let mut mission = mission_with_structure("and", 0.0);
        mission.criticality = None;
        let err = compute_host_criticalities(&[mission]).unwrap_err();
        assert_eq!(err.kind(), "BadInput");
    }

    #[test]
    fn test_mission_without_structure_fails() {
        let mission = MissionRecord {
            name: "bare".into(),
            criticality: Some(5.0),
            ..Default::default()
        };
        assert!(compute_host_criticalities(&[mission]).is_err());
    }
}
