// Fault impacts: one per critical node, covering its direct neighbourhood.

use std::collections::HashMap;

use crate::models::{FaultImpact, HealthState, LiveNode, Topology};

/// Ripple radius when a neighbour is critical, and when no neighbour is worse than ok.
const RADIUS_CRITICAL: u32 = 3;
const RADIUS_WARNING: u32 = 2;
const RADIUS_DEFAULT: u32 = 3;

pub fn detect(topology: &Topology, nodes: &[LiveNode]) -> Vec<FaultImpact> {
    let health: HashMap<&str, HealthState> =
        nodes.iter().map(|n| (n.id.as_str(), n.health)).collect();

    nodes
        .iter()
        .filter(|n| n.health == HealthState::Critical)
        .map(|n| {
            let mut affected_node_ids: Vec<String> = Vec::new();
            let mut affected_edge_ids = Vec::new();
            for edge in &topology.edges {
                let other = if edge.source == n.id {
                    &edge.target
                } else if edge.target == n.id {
                    &edge.source
                } else {
                    continue;
                };
                affected_edge_ids.push(edge.id.clone());
                if *other != n.id && !affected_node_ids.contains(other) {
                    affected_node_ids.push(other.clone());
                }
            }

            let neighbour_health = |state: HealthState| {
                affected_node_ids
                    .iter()
                    .any(|id| health.get(id.as_str()) == Some(&state))
            };
            let ripple_radius = if neighbour_health(HealthState::Critical) {
                RADIUS_CRITICAL
            } else if neighbour_health(HealthState::Warning) {
                RADIUS_WARNING
            } else {
                RADIUS_DEFAULT
            };

            FaultImpact {
                source_node_id: n.id.clone(),
                severity: n.health,
                affected_node_ids,
                affected_edge_ids,
                ripple_radius,
            }
        })
        .collect()
}
