// Deterministic merge of per-source partial results.
//
// Direct bindings (platform, app telemetry) always win. Traffic sources only fill fields that are
// still null, in fixed order: flow analytics, raw flow logs, dependency graph, active probe. The
// order of `partials` (task completion order) never affects the outcome.

use indexmap::IndexMap;
use std::collections::HashMap;

use crate::models::{EdgeMetricKey, EdgeMetrics, ElementRef, MetricSourceKind, Topology};
use crate::sources::{PartialMetrics, RawAlert, SourceKind};

/// Traffic sources in fill order.
const TRAFFIC_PRECEDENCE: [SourceKind; 4] = [
    SourceKind::FlowAnalytics,
    SourceKind::FlowLogs,
    SourceKind::DependencyGraph,
    SourceKind::ConnectionMonitor,
];

#[derive(Debug, Clone, Default)]
pub struct MergedMetrics {
    /// Node id -> direct binding name -> value, in binding declaration order.
    pub nodes: HashMap<String, IndexMap<String, Option<f64>>>,
    pub edges: HashMap<String, EdgeMetrics>,
    pub alerts: Vec<RawAlert>,
    pub resolved: usize,
    pub failed: usize,
}

impl MergedMetrics {
    pub fn node_metrics(&self, node_id: &str) -> IndexMap<String, Option<f64>> {
        self.nodes.get(node_id).cloned().unwrap_or_default()
    }

    pub fn edge_metrics(&self, edge_id: &str) -> EdgeMetrics {
        self.edges.get(edge_id).copied().unwrap_or_default()
    }
}

fn binding_source(kind: MetricSourceKind) -> SourceKind {
    match kind {
        MetricSourceKind::Monitor => SourceKind::Platform,
        MetricSourceKind::AppInsights => SourceKind::AppTelemetry,
    }
}

fn set_if_none(slot: &mut Option<f64>, value: Option<f64>) {
    if slot.is_none() {
        *slot = value;
    }
}

fn fill_nulls(target: &mut EdgeMetrics, from: &EdgeMetrics) {
    set_if_none(&mut target.throughput_bps, from.throughput_bps);
    set_if_none(&mut target.latency_ms, from.latency_ms);
    set_if_none(&mut target.error_rate, from.error_rate);
    set_if_none(&mut target.requests_per_sec, from.requests_per_sec);
}

fn slot(metrics: &mut EdgeMetrics, key: EdgeMetricKey) -> &mut Option<f64> {
    match key {
        EdgeMetricKey::Throughput => &mut metrics.throughput_bps,
        EdgeMetricKey::Latency => &mut metrics.latency_ms,
        EdgeMetricKey::ErrorRate => &mut metrics.error_rate,
        EdgeMetricKey::RequestsPerSec => &mut metrics.requests_per_sec,
    }
}

pub fn merge(topology: &Topology, partials: &[(SourceKind, PartialMetrics)]) -> MergedMetrics {
    let by_kind = |kind: SourceKind| partials.iter().filter(move |(k, _)| *k == kind);
    let direct_value = |element: &ElementRef, binding: &str, kind: MetricSourceKind| {
        by_kind(binding_source(kind)).find_map(|(_, p)| match element {
            ElementRef::Node(id) => p.node_value(id, binding),
            ElementRef::Edge(id) => p.edge_value(id, binding),
        })
    };

    let mut out = MergedMetrics::default();

    for node in &topology.nodes {
        let element = ElementRef::Node(node.id.clone());
        let metrics: IndexMap<String, Option<f64>> = node
            .bindings
            .iter()
            .filter_map(|(name, b)| {
                let mb = b.as_metric()?;
                Some((name.clone(), direct_value(&element, name, mb.source)))
            })
            .collect();
        out.nodes.insert(node.id.clone(), metrics);
    }

    for edge in &topology.edges {
        let element = ElementRef::Edge(edge.id.clone());
        let mut metrics = EdgeMetrics::default();
        for (name, b) in &edge.bindings {
            let (Some(mb), Some(key)) = (b.as_metric(), EdgeMetricKey::from_binding_name(name))
            else {
                continue;
            };
            set_if_none(slot(&mut metrics, key), direct_value(&element, name, mb.source));
        }
        for kind in TRAFFIC_PRECEDENCE {
            for (_, p) in by_kind(kind) {
                if let Some(observed) = p.traffic.get(&edge.id) {
                    fill_nulls(&mut metrics, observed);
                }
            }
        }
        out.edges.insert(edge.id.clone(), metrics);
    }

    for (_, p) in partials {
        out.resolved += p.resolved;
        out.failed += p.failed;
    }
    for (_, p) in by_kind(SourceKind::Alerts) {
        for alert in &p.alerts {
            if !out.alerts.iter().any(|a| a.id == alert.id) {
                out.alerts.push(alert.clone());
            }
        }
    }
    out
}
