// Alert correlation: provider alerts onto the nodes and edges they touch.

use chrono::{DateTime, FixedOffset};
use std::cmp::Reverse;

use crate::models::{AlertSeverity, LiveAlert, Topology};
use crate::sources::RawAlert;
use crate::sources::resolve::is_within;

fn affected_nodes(topology: &Topology, target: &str) -> Vec<String> {
    let target = target.trim().trim_end_matches('/').to_lowercase();
    if target.is_empty() {
        return Vec::new();
    }
    topology
        .nodes
        .iter()
        .filter(|n| {
            n.resource_ref.as_deref().is_some_and(|r| {
                let r = r.trim_end_matches('/').to_lowercase();
                is_within(&r, &target) || is_within(&target, &r)
            })
        })
        .map(|n| n.id.clone())
        .collect()
}

/// Affected nodes with no edge coming in from another affected node.
fn root_causes(topology: &Topology, affected: &[String]) -> Vec<String> {
    let roots: Vec<String> = affected
        .iter()
        .filter(|id| {
            !topology.edges.iter().any(|e| {
                &e.target == *id && e.source != **id && affected.contains(&e.source)
            })
        })
        .cloned()
        .collect();
    if roots.is_empty() {
        affected.to_vec()
    } else {
        roots
    }
}

/// Sort key: severity, then newest parseable `firedAt`, then unparseable ones by raw text.
fn order_key(
    alert: &LiveAlert,
) -> (AlertSeverity, Reverse<Option<DateTime<FixedOffset>>>, Reverse<String>) {
    let fired = DateTime::parse_from_rfc3339(&alert.fired_at).ok();
    (alert.severity, Reverse(fired), Reverse(alert.fired_at.clone()))
}

pub fn correlate(topology: &Topology, raw: &[RawAlert]) -> Vec<LiveAlert> {
    let mut alerts: Vec<LiveAlert> = raw
        .iter()
        .map(|a| {
            let affected_node_ids = affected_nodes(topology, &a.target_resource);
            let affected_edge_ids = topology
                .edges
                .iter()
                .filter(|e| {
                    affected_node_ids.contains(&e.source) || affected_node_ids.contains(&e.target)
                })
                .map(|e| e.id.clone())
                .collect();
            LiveAlert {
                id: a.id.clone(),
                severity: AlertSeverity::from_provider(&a.severity),
                title: if a.name.is_empty() {
                    a.id.clone()
                } else {
                    a.name.clone()
                },
                resource_ref: a.target_resource.clone(),
                fired_at: a.fired_date_time.clone(),
                summary: a.description.clone(),
                root_cause_candidates: root_causes(topology, &affected_node_ids),
                affected_node_ids,
                affected_edge_ids,
            }
        })
        .collect();
    alerts.sort_by_cached_key(order_key);
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Edge, Node};

    const RG: &str = "/subscriptions/s/resourceGroups/rg";

    fn topology() -> Topology {
        let node = |id: &str| Node {
            id: id.into(),
            label: id.into(),
            resource_ref: Some(format!("{RG}/providers/Microsoft.Web/sites/{id}")),
            bindings: Default::default(),
            addresses: vec![],
            subnet: None,
            address_prefix: None,
        };
        let edge = |s: &str, t: &str| Edge {
            id: format!("{s}-{t}"),
            source: s.into(),
            target: t.into(),
            bindings: Default::default(),
        };
        Topology {
            id: "d".into(),
            name: String::new(),
            nodes: vec![node("web"), node("api"), node("db")],
            edges: vec![edge("web", "api"), edge("api", "db")],
            settings: Default::default(),
        }
    }

    fn raw(id: &str, severity: &str, target: &str, fired: &str) -> RawAlert {
        RawAlert {
            id: id.into(),
            name: format!("alert {id}"),
            severity: severity.into(),
            target_resource: target.into(),
            fired_date_time: fired.into(),
            description: String::new(),
            monitor_condition: None,
            alert_state: None,
        }
    }

    #[test]
    fn matches_resource_case_insensitively_and_marks_edges() {
        let t = topology();
        let target = format!("{RG}/providers/Microsoft.Web/sites/API").to_uppercase();
        let alerts = correlate(&t, &[raw("a1", "Sev1", &target, "2026-01-01T00:00:00Z")]);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
        assert_eq!(alerts[0].affected_node_ids, vec!["api"]);
        assert_eq!(alerts[0].affected_edge_ids, vec!["web-api", "api-db"]);
        assert_eq!(alerts[0].root_cause_candidates, vec!["api"]);
    }

    #[test]
    fn group_level_alert_roots_at_upstream_node() {
        let t = topology();
        let alerts = correlate(&t, &[raw("a1", "Sev2", RG, "2026-01-01T00:00:00Z")]);
        assert_eq!(alerts[0].affected_node_ids, vec!["web", "api", "db"]);
        assert_eq!(alerts[0].root_cause_candidates, vec!["web"]);
        assert_eq!(alerts[0].severity, AlertSeverity::Warning);
    }

    #[test]
    fn unmatched_alert_kept_with_empty_sets() {
        let t = topology();
        let alerts = correlate(&t, &[raw("a1", "Sev4", "/subscriptions/other", "")]);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].affected_node_ids.is_empty());
        assert!(alerts[0].root_cause_candidates.is_empty());
        assert_eq!(alerts[0].severity, AlertSeverity::Info);
    }

    #[test]
    fn ordered_by_severity_then_newest() {
        let t = topology();
        let alerts = correlate(
            &t,
            &[
                raw("info", "Sev3", RG, "2026-01-03T00:00:00Z"),
                raw("old-crit", "Sev0", RG, "2026-01-01T00:00:00Z"),
                raw("warn", "Sev2", RG, "2026-01-02T00:00:00Z"),
                raw("new-crit", "Sev1", RG, "2026-01-02T00:00:00+00:00"),
            ],
        );
        let ids: Vec<&str> = alerts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["new-crit", "old-crit", "warn", "info"]);
    }

    #[test]
    fn unparseable_fired_at_sorts_after_parsed_within_severity() {
        let t = topology();
        let alerts = correlate(
            &t,
            &[
                raw("garbled-a", "Sev2", RG, "yesterday"),
                raw("old", "Sev2", RG, "2026-01-01T00:00:00Z"),
                raw("garbled-b", "Sev2", RG, "zzz"),
                raw("new", "Sev2", RG, "2026-01-05T00:00:00Z"),
                raw("empty", "Sev2", RG, ""),
            ],
        );
        let ids: Vec<&str> = alerts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old", "garbled-b", "garbled-a", "empty"]);
    }
}
