//! Nmap XML parsing into asset documents.
//!
//! Only hosts in state `up` are considered. Open ports with a service
//! carrying a versioned CPE become software versions; named services become
//! applications. Legacy `cpe:/...` identifiers are converted to CPE 2.3,
//! and services without a version component are dropped.

use std::collections::BTreeSet;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use sitrep_core::cpe::CpeIdentifier;
use sitrep_core::dto::{
    ApplicationAsset, DeviceAsset, Hop, HostAsset, NmapResults, SoftwareVersionAsset, SubnetAsset,
    TracerouteHost,
};
use sitrep_core::error::{Error, Result};
use sitrep_core::net::extract_subnet;

fn attr(element: &BytesStart<'_>, name: &str) -> Option<String> {
    element
        .attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == name.as_bytes())
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

/// Convert a legacy `cpe:/part:vendor:product:version` identifier to CPE
/// 2.3. `None` when no version component is present (downstream consumers
/// require one).
pub fn convert_cpe_to_version_2_3(cpe: &str) -> Option<String> {
    let parts: Vec<&str> = cpe.split(':').collect();
    if parts.first() != Some(&"cpe") || parts.len() < 2 {
        return None;
    }
    let part = parts[1].trim_start_matches('/');
    let vendor = parts.get(2).copied().unwrap_or_default();
    let product = parts.get(3).copied().unwrap_or_default();
    let version = parts.get(4).copied().unwrap_or_default();
    if version.trim().is_empty() {
        return None;
    }
    Some(CpeIdentifier::new(part, vendor, product, version).to_string())
}

#[derive(Debug, Default)]
struct ServiceInfo {
    name: String,
    product: String,
    version: String,
    extrainfo: String,
    cpe: String,
    port: String,
    protocol: String,
}

impl ServiceInfo {
    fn description(&self) -> String {
        let mut full = [self.product.as_str(), self.version.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        if !self.extrainfo.is_empty() {
            full.push_str(&format!(" ({})", self.extrainfo));
        }
        let full = full.trim().to_string();
        if full.is_empty() {
            self.name.clone()
        } else {
            full
        }
    }
}

#[derive(Debug, Default)]
struct HostState {
    up: bool,
    addresses: Vec<String>,
    hostnames: Vec<String>,
    services: Vec<ServiceInfo>,
}

/// Parse a basic-scan XML document into the asset data model.
pub fn parse_nmap_xml(xml: &str, tag: &[String]) -> Result<NmapResults> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut results = NmapResults::default();
    let mut subnet_set: BTreeSet<String> = BTreeSet::new();
    let mut software_versions: Vec<SoftwareVersionAsset> = Vec::new();
    let mut applications: Vec<ApplicationAsset> = Vec::new();

    let mut host: Option<HostState> = None;
    let mut port: Option<(String, String)> = None;
    let mut port_open = false;
    let mut service: Option<ServiceInfo> = None;
    let mut in_service_cpe = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::BadInput(format!("invalid nmap XML: {e}")))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.name().as_ref() {
                    b"host" => host = Some(HostState::default()),
                    b"status" => {
                        if let Some(host) = host.as_mut() {
                            host.up = attr(e, "state").as_deref() == Some("up");
                        }
                    }
                    b"address" => {
                        if let Some(host) = host.as_mut() {
                            let addr_type = attr(e, "addrtype").unwrap_or_default();
                            if matches!(addr_type.as_str(), "ipv4" | "ipv6") {
                                if let Some(addr) = attr(e, "addr") {
                                    host.addresses.push(addr);
                                }
                            }
                        }
                    }
                    b"hostname" => {
                        if let Some(host) = host.as_mut() {
                            if let Some(name) = attr(e, "name") {
                                host.hostnames.push(name);
                            }
                        }
                    }
                    b"port" => {
                        port = Some((
                            attr(e, "portid").unwrap_or_default(),
                            attr(e, "protocol").unwrap_or_else(|| "tcp".to_string()),
                        ));
                        port_open = false;
                    }
                    b"state" => {
                        if port.is_some() {
                            port_open = attr(e, "state").as_deref() == Some("open");
                        }
                    }
                    b"service" => {
                        if let Some((port_num, protocol)) = &port {
                            let info = ServiceInfo {
                                name: attr(e, "name").unwrap_or_default(),
                                product: attr(e, "product").unwrap_or_default(),
                                version: attr(e, "version").unwrap_or_default(),
                                extrainfo: attr(e, "extrainfo").unwrap_or_default(),
                                cpe: attr(e, "cpe").unwrap_or_default(),
                                port: port_num.clone(),
                                protocol: protocol.clone(),
                            };
                            if is_empty {
                                if port_open {
                                    if let Some(host) = host.as_mut() {
                                        host.services.push(info);
                                    }
                                }
                            } else {
                                service = Some(info);
                            }
                        }
                    }
                    b"cpe" => {
                        if service.is_some() && !is_empty {
                            in_service_cpe = true;
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(ref text) => {
                if in_service_cpe {
                    if let (Some(service), Ok(value)) = (service.as_mut(), text.unescape()) {
                        service.cpe = value.into_owned();
                    }
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"cpe" => in_service_cpe = false,
                b"service" => {
                    if let Some(info) = service.take() {
                        if port_open {
                            if let Some(host) = host.as_mut() {
                                host.services.push(info);
                            }
                        }
                    }
                }
                b"port" => port = None,
                b"host" => {
                    if let Some(state) = host.take() {
                        finalize_host(
                            state,
                            tag,
                            &mut results,
                            &mut subnet_set,
                            &mut software_versions,
                            &mut applications,
                        );
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    results.subnets.extend(subnet_set.into_iter().map(|subnet| SubnetAsset {
        ip_range: subnet.clone(),
        note: subnet,
        ..Default::default()
    }));
    results.software_versions.extend(software_versions);
    results.applications.extend(applications);
    Ok(results)
}

fn finalize_host(
    state: HostState,
    tag: &[String],
    results: &mut NmapResults,
    subnet_set: &mut BTreeSet<String>,
    software_versions: &mut Vec<SoftwareVersionAsset>,
    applications: &mut Vec<ApplicationAsset>,
) {
    if !state.up || state.addresses.is_empty() {
        return;
    }

    let mut host_subnets = Vec::new();
    for ip in &state.addresses {
        if let Some(subnet) = extract_subnet(ip, None) {
            subnet_set.insert(subnet.clone());
            host_subnets.push(subnet);
        }
    }

    let primary_ip = state.addresses[0].clone();
    results.hosts.push(HostAsset {
        ip_address: primary_ip,
        domain_names: state.hostnames.clone(),
        subnets: host_subnets,
        uris: Vec::new(),
        tag: tag.to_vec(),
    });

    for ip in &state.addresses {
        let base_name = state
            .hostnames
            .first()
            .cloned()
            .unwrap_or_else(|| ip.clone());
        let name = if state.addresses.len() > 1 {
            format!("{base_name} ({ip})")
        } else {
            base_name
        };
        results.devices.push(DeviceAsset {
            name,
            ip_address: Some(ip.clone()),
            ..Default::default()
        });
    }

    for ip in &state.addresses {
        for service in &state.services {
            if !service.cpe.is_empty() {
                if let Some(cpe) = convert_cpe_to_version_2_3(&service.cpe) {
                    software_versions.push(SoftwareVersionAsset {
                        version: cpe,
                        description: service.description(),
                        ip_addresses: vec![ip.clone()],
                        tag: tag.to_vec(),
                    });
                }
            }
            if !service.name.is_empty() {
                applications.push(ApplicationAsset {
                    name: format!("{} (port {}/{})", service.name, service.port, service.protocol),
                    device: ip.clone(),
                });
            }
        }
    }
}

/// Parse traceroute XML output into hop paths, one per scanned host.
pub fn parse_traceroute_xml(xml: &str, source_ip: &str) -> Result<Vec<TracerouteHost>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut hosts = Vec::new();
    let mut current: Option<TracerouteHost> = None;
    let mut prev_ip = source_ip.to_string();
    let mut prev_ttl = 0i64;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::BadInput(format!("invalid traceroute XML: {e}")))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => match e.name().as_ref() {
                b"host" => {
                    current = Some(TracerouteHost::default());
                    prev_ip = source_ip.to_string();
                    prev_ttl = 0;
                }
                b"address" => {
                    if let Some(host) = current.as_mut() {
                        if host.dst_ip.is_empty() {
                            if let Some(addr) = attr(e, "addr") {
                                host.dst_ip = addr;
                            }
                        }
                    }
                }
                b"hop" => {
                    if let Some(host) = current.as_mut() {
                        let ttl: i64 = attr(e, "ttl")
                            .and_then(|t| t.parse().ok())
                            .unwrap_or(prev_ttl + 1);
                        if let Some(ip) = attr(e, "ipaddr") {
                            host.hops.push(Hop {
                                prev_ip: prev_ip.clone(),
                                hops: ttl - prev_ttl,
                                next_ip: ip.clone(),
                            });
                            prev_ttl = ttl;
                            prev_ip = ip;
                        }
                    }
                }
                _ => {}
            },
            Event::End(ref e) => {
                if e.name().as_ref() == b"host" {
                    if let Some(host) = current.take() {
                        hosts.push(host);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(hosts)
}
