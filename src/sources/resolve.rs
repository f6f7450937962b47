// Resolving telemetry identifiers (resource ids, IPs, subnets, service names) to graph nodes/edges.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::models::Topology;

/// Suffixes dropped when fuzzy-matching service names (`orders-api` ~ `orders`).
const NAME_SUFFIXES: &[&str] = &[
    "-service", "-svc", "-api", "-app", "-web", "-func", "-fn", "-worker", "-prod", "-dev",
    "-staging", "-test",
];

/// Minimum length for substring-containment name matches.
const MIN_CONTAINS_LEN: usize = 3;

/// `(subscription, resource group)` of an ARM-style resource id, lowercased.
pub fn resource_scope(resource_ref: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = resource_ref.split('/').filter(|s| !s.is_empty()).collect();
    let mut subscription = None;
    let mut group = None;
    for pair in parts.windows(2) {
        if pair[0].eq_ignore_ascii_case("subscriptions") && subscription.is_none() {
            subscription = Some(pair[1].to_lowercase());
        } else if pair[0].eq_ignore_ascii_case("resourcegroups") && group.is_none() {
            group = Some(pair[1].to_lowercase());
        }
    }
    Some((subscription?, group?))
}

/// True when `ip` lies inside the IPv4 `cidr` (e.g. `10.1.0.0/16`).
pub fn ipv4_in_cidr(ip: &str, cidr: &str) -> bool {
    let Some((net, bits)) = cidr.trim().split_once('/') else {
        return false;
    };
    let (Ok(ip), Ok(net), Ok(bits)) = (
        ip.trim().parse::<Ipv4Addr>(),
        net.parse::<Ipv4Addr>(),
        bits.parse::<u32>(),
    ) else {
        return false;
    };
    if bits > 32 {
        return false;
    }
    let mask = if bits == 0 { 0 } else { u32::MAX << (32 - bits) };
    (u32::from(ip) & mask) == (u32::from(net) & mask)
}

/// Lowercase, drop any domain part and known role suffixes, keep alphanumerics.
pub fn normalize_service_name(name: &str) -> String {
    let mut s = name.trim().to_lowercase();
    if let Some(rest) = s.strip_prefix("https://").or_else(|| s.strip_prefix("http://")) {
        s = rest.to_string();
    }
    if let Some(idx) = s.find(['.', ':', '/']) {
        s.truncate(idx);
    }
    loop {
        let before = s.len();
        for suffix in NAME_SUFFIXES {
            if let Some(stripped) = s.strip_suffix(suffix) {
                s = stripped.to_string();
            }
        }
        if s.len() == before {
            break;
        }
    }
    s.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// True when `child` equals `parent` or sits below it in the resource path (both lowercase).
pub fn is_within(child: &str, parent: &str) -> bool {
    let (child, parent) = (child.trim_end_matches('/'), parent.trim_end_matches('/'));
    child == parent
        || (child.len() > parent.len()
            && child.starts_with(parent)
            && child.as_bytes()[parent.len()] == b'/')
}

/// Lookup tables over one topology, built once per collection.
pub struct GraphIndex<'a> {
    topology: &'a Topology,
    by_resource: HashMap<String, &'a str>,
}

impl<'a> GraphIndex<'a> {
    pub fn new(topology: &'a Topology) -> Self {
        let mut by_resource = HashMap::new();
        for node in &topology.nodes {
            if let Some(r) = &node.resource_ref {
                by_resource
                    .entry(r.trim_end_matches('/').to_lowercase())
                    .or_insert(node.id.as_str());
            }
        }
        Self {
            topology,
            by_resource,
        }
    }

    /// Node for a resource id: exact (case-insensitive), then a node whose resource contains it
    /// (e.g. a VM for one of its extensions).
    pub fn node_for_resource(&self, resource_ref: &str) -> Option<&'a str> {
        let key = resource_ref.trim_end_matches('/').to_lowercase();
        if key.is_empty() {
            return None;
        }
        if let Some(id) = self.by_resource.get(&key).copied() {
            return Some(id);
        }
        self.topology
            .nodes
            .iter()
            .find(|n| {
                n.resource_ref
                    .as_deref()
                    .is_some_and(|r| is_within(&key, &r.to_lowercase()))
            })
            .map(|n| n.id.as_str())
    }

    /// Node declaring `ip` among its addresses.
    pub fn node_for_ip(&self, ip: &str) -> Option<&'a str> {
        let ip = ip.trim();
        self.topology
            .nodes
            .iter()
            .find(|n| n.addresses.iter().any(|a| a == ip))
            .map(|n| n.id.as_str())
    }

    /// Pool-managed node whose address prefix contains `ip`.
    pub fn node_for_ip_in_pool(&self, ip: &str) -> Option<&'a str> {
        self.topology
            .nodes
            .iter()
            .find(|n| {
                n.address_prefix
                    .as_deref()
                    .is_some_and(|cidr| ipv4_in_cidr(ip, cidr))
            })
            .map(|n| n.id.as_str())
    }

    /// Node with an address occurring inside `field` (fields may hold IP lists).
    pub fn node_for_ip_substring(&self, field: &str) -> Option<&'a str> {
        if field.trim().is_empty() {
            return None;
        }
        self.topology
            .nodes
            .iter()
            .find(|n| {
                n.addresses.iter().any(|a| {
                    !a.is_empty()
                        && field
                            .split(|c: char| !(c.is_ascii_digit() || c == '.'))
                            .any(|tok| tok == a)
                })
            })
            .map(|n| n.id.as_str())
    }

    /// Node in the subnet named by `field` (a name or a path ending in the name).
    pub fn node_for_subnet(&self, field: &str) -> Option<&'a str> {
        let name = field.trim().trim_end_matches('/').rsplit('/').next()?;
        if name.is_empty() {
            return None;
        }
        self.topology
            .nodes
            .iter()
            .find(|n| n.subnet.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(name)))
            .map(|n| n.id.as_str())
    }

    /// Node for a service name: exact id/label, then suffix-stripped match, then containment.
    pub fn node_for_name(&self, name: &str) -> Option<&'a str> {
        let wanted = name.trim();
        if wanted.is_empty() {
            return None;
        }
        let nodes = &self.topology.nodes;
        if let Some(n) = nodes
            .iter()
            .find(|n| n.id.eq_ignore_ascii_case(wanted) || n.label.eq_ignore_ascii_case(wanted))
        {
            return Some(n.id.as_str());
        }
        let norm = normalize_service_name(wanted);
        if norm.is_empty() {
            return None;
        }
        if let Some(n) = nodes.iter().find(|n| {
            normalize_service_name(&n.label) == norm || normalize_service_name(&n.id) == norm
        }) {
            return Some(n.id.as_str());
        }
        if norm.len() < MIN_CONTAINS_LEN {
            return None;
        }
        nodes
            .iter()
            .find(|n| {
                [&n.label, &n.id].iter().any(|candidate| {
                    let c = normalize_service_name(candidate);
                    c.len() >= MIN_CONTAINS_LEN && (c.contains(&norm) || norm.contains(&c))
                })
            })
            .map(|n| n.id.as_str())
    }

    /// Edge joining two nodes: declared direction first, then reversed.
    pub fn edge_between(&self, a: &str, b: &str) -> Option<&'a str> {
        if a == b {
            return None;
        }
        let edges = &self.topology.edges;
        edges
            .iter()
            .find(|e| e.source == a && e.target == b)
            .or_else(|| edges.iter().find(|e| e.source == b && e.target == a))
            .map(|e| e.id.as_str())
    }
}
