//! Network math shared by the hierarchy synchronizer and scan parsers.

use std::net::IpAddr;

use ipnet::IpNet;

/// Default prefix length used when deriving a subnet from a bare address.
fn default_prefix(ip: &IpAddr) -> u8 {
    match ip {
        IpAddr::V4(_) => 24,
        IpAddr::V6(_) => 64,
    }
}

/// IP protocol version of an address (4 or 6).
pub fn ip_version(ip: &IpAddr) -> u8 {
    match ip {
        IpAddr::V4(_) => 4,
        IpAddr::V6(_) => 6,
    }
}

/// Most specific network from `networks` that contains `ip`, tie-broken by
/// longest prefix. `None` when no network matches.
pub fn closest_network(ip: &IpAddr, networks: &[IpNet]) -> Option<IpNet> {
    networks
        .iter()
        .filter(|net| net.contains(ip))
        .max_by_key(|net| net.prefix_len())
        .copied()
}

/// Most specific network from `networks` that strictly encloses `subnet`.
/// The subnet itself never counts as its own parent.
pub fn closest_parent(subnet: &IpNet, networks: &[IpNet]) -> Option<IpNet> {
    networks
        .iter()
        .filter(|net| *net != subnet && encloses(net, subnet))
        .max_by_key(|net| net.prefix_len())
        .copied()
}

fn encloses(outer: &IpNet, inner: &IpNet) -> bool {
    outer.prefix_len() <= inner.prefix_len() && outer.contains(&inner.network())
}

/// CIDR subnet of an address using the default prefix (/24 for v4, /64 for
/// v6) or an explicit one. `None` when the address string does not parse.
pub fn extract_subnet(ip_str: &str, prefix: Option<u8>) -> Option<String> {
    let ip: IpAddr = ip_str.parse().ok()?;
    let prefix = prefix.unwrap_or_else(|| default_prefix(&ip));
    let net = IpNet::new(ip, prefix).ok()?.trunc();
    Some(net.to_string())
}

/// The default ("internet") range for an IP version.
pub fn default_range(version: u8) -> &'static str {
    if version == 6 {
        "::/0"
    } else {
        "0.0.0.0/0"
    }
}

/// Whether `range` is one of the two bootstrap default subnets.
pub fn is_default_range(range: &str) -> bool {
    range == "0.0.0.0/0" || range == "::/0"
}

/// Accepts an IP address, a CIDR range, or a DNS hostname.
///
/// Hostname labels are limited to alphanumerics and hyphens, must not start
/// or end with a hyphen, and the whole name is capped at 253 characters.
pub fn validate_target(target: &str) -> bool {
    if target.parse::<IpAddr>().is_ok() || target.parse::<IpNet>().is_ok() {
        return true;
    }
    validate_hostname(target)
}

/// DNS hostname validation (RFC 1123 shape).
pub fn validate_hostname(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 {
        return false;
    }
    let name = name.strip_suffix('.').unwrap_or(name);
    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    })
}

/// A registrable domain name: a valid hostname with at least two labels.
pub fn validate_domain(name: &str) -> bool {
    validate_hostname(name) && name.trim_end_matches('.').contains('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nets(ranges: &[&str]) -> Vec<IpNet> {
        ranges.iter().map(|r| r.parse().unwrap()).collect()
    }

    #[test]
    fn test_closest_network_prefers_longest_prefix() {
        let networks = nets(&["192.168.0.0/16", "192.168.1.0/24", "10.0.0.0/8"]);
        let ip: IpAddr = "192.168.1.10".parse().unwrap();
        assert_eq!(
            closest_network(&ip, &networks),
            Some("192.168.1.0/24".parse().unwrap())
        );
    }

    #[test]
    fn test_closest_network_disjoint_is_none() {
        let networks = nets(&["192.168.0.0/16", "10.0.0.0/8"]);
        let ip: IpAddr = "8.8.8.8".parse().unwrap();
        assert_eq!(closest_network(&ip, &networks), None);
    }

    #[test]
    fn test_closest_network_ipv6() {
        let networks = nets(&["2001:db8::/32", "2001:db8:0:1::/64"]);
        let ip: IpAddr = "2001:db8:0:1::5".parse().unwrap();
        assert_eq!(
            closest_network(&ip, &networks),
            Some("2001:db8:0:1::/64".parse().unwrap())
        );
        let other: IpAddr = "2001:db8:9:9::5".parse().unwrap();
        assert_eq!(
            closest_network(&other, &networks),
            Some("2001:db8::/32".parse().unwrap())
        );
    }

    #[test]
    fn test_closest_parent_excludes_self() {
        let networks = nets(&["192.168.1.0/24", "192.168.0.0/16", "10.0.0.0/8"]);
        let subnet: IpNet = "192.168.1.0/24".parse().unwrap();
        assert_eq!(
            closest_parent(&subnet, &networks),
            Some("192.168.0.0/16".parse().unwrap())
        );
        let orphan: IpNet = "8.0.0.0/8".parse().unwrap();
        assert_eq!(closest_parent(&orphan, &networks), None);
    }

    #[test]
    fn test_closest_parent_not_in_list_subnet() {
        let networks = nets(&["192.168.1.0/24", "192.168.0.0/16"]);
        let subnet: IpNet = "192.168.1.128/25".parse().unwrap();
        assert_eq!(
            closest_parent(&subnet, &networks),
            Some("192.168.1.0/24".parse().unwrap())
        );
    }

    #[test]
    fn test_extract_subnet_defaults() {
        assert_eq!(
            extract_subnet("192.168.1.10", None),
            Some("192.168.1.0/24".to_string())
        );
        assert_eq!(
            extract_subnet("2001:db8::1", None),
            Some("2001:db8::/64".to_string())
        );
        assert_eq!(extract_subnet("not-an-ip", None), None);
    }

    #[test]
    fn test_default_ranges() {
        assert_eq!(default_range(4), "0.0.0.0/0");
        assert_eq!(default_range(6), "::/0");
        assert!(is_default_range("::/0"));
        assert!(!is_default_range("10.0.0.0/8"));
    }

    #[test]
    fn test_validate_target() {
        assert!(validate_target("192.168.1.1"));
        assert!(validate_target("10.0.0.0/8"));
        assert!(validate_target("scanner.example.com"));
        assert!(validate_target("localhost"));
        assert!(!validate_target("-bad.example.com"));
        assert!(!validate_target("exa mple.com"));
        assert!(!validate_target(""));
    }

    #[test]
    fn test_validate_domain_needs_two_labels() {
        assert!(validate_domain("example.com"));
        assert!(!validate_domain("localhost"));
    }
}
