// Topology declaration: nodes, edges, metric bindings. Read-only to the engine.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Binding name -> binding, in declaration order. Order matters for sparkline selection.
pub type Bindings = IndexMap<String, Binding>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub settings: TopologySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologySettings {
    #[serde(default = "default_refresh_interval_sec")]
    pub refresh_interval_sec: u64,
}

fn default_refresh_interval_sec() -> u64 {
    30
}

impl Default for TopologySettings {
    fn default() -> Self {
        Self {
            refresh_interval_sec: default_refresh_interval_sec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub resource_ref: Option<String>,
    #[serde(default)]
    pub bindings: Bindings,
    /// Private IPs known from discovery.
    #[serde(default)]
    pub addresses: Vec<String>,
    /// Subnet name the resource sits in.
    #[serde(default)]
    pub subnet: Option<String>,
    /// CIDR for pool-managed resources whose instance IPs are not known statically.
    #[serde(default)]
    pub address_prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub bindings: Bindings,
}

/// Where a direct binding's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricSourceKind {
    Monitor,
    AppInsights,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    #[serde(alias = "avg")]
    Average,
    #[serde(alias = "sum")]
    Total,
    #[serde(alias = "max")]
    Maximum,
    #[serde(alias = "min")]
    Minimum,
    Count,
}

impl Aggregation {
    /// Name used on the wire by the metrics backends.
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Average => "average",
            Aggregation::Total => "total",
            Aggregation::Maximum => "maximum",
            Aggregation::Minimum => "minimum",
            Aggregation::Count => "count",
        }
    }
}

/// A direct `{source, metric, aggregation}` binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricBinding {
    pub source: MetricSourceKind,
    pub metric: String,
    #[serde(default)]
    pub aggregation: Aggregation,
    /// Overrides the resource the binding resolves against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_ref: Option<String>,
}

/// Tagged on `source`: `monitor` / `appInsights` carry a metric, `composite` carries rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "camelCase")]
pub enum Binding {
    Monitor {
        metric: String,
        #[serde(default)]
        aggregation: Aggregation,
        #[serde(default, rename = "resourceRef", skip_serializing_if = "Option::is_none")]
        resource_ref: Option<String>,
    },
    AppInsights {
        metric: String,
        #[serde(default)]
        aggregation: Aggregation,
        #[serde(default, rename = "resourceRef", skip_serializing_if = "Option::is_none")]
        resource_ref: Option<String>,
    },
    Composite { rules: Vec<HealthRule> },
}

impl Binding {
    /// The direct form of this binding, or None for composite bindings.
    pub fn as_metric(&self) -> Option<MetricBinding> {
        match self {
            Binding::Monitor {
                metric,
                aggregation,
                resource_ref,
            } => Some(MetricBinding {
                source: MetricSourceKind::Monitor,
                metric: metric.clone(),
                aggregation: *aggregation,
                resource_ref: resource_ref.clone(),
            }),
            Binding::AppInsights {
                metric,
                aggregation,
                resource_ref,
            } => Some(MetricBinding {
                source: MetricSourceKind::AppInsights,
                metric: metric.clone(),
                aggregation: *aggregation,
                resource_ref: resource_ref.clone(),
            }),
            Binding::Composite { .. } => None,
        }
    }

    pub fn rules(&self) -> &[HealthRule] {
        match self {
            Binding::Composite { rules } => rules,
            _ => &[],
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Binding::Composite { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRule {
    pub metric: String,
    pub op: Comparator,
    pub threshold: f64,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// Edge metric a binding name feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeMetricKey {
    Throughput,
    Latency,
    ErrorRate,
    RequestsPerSec,
}

impl EdgeMetricKey {
    /// Maps an edge binding name onto the metric field it fills.
    pub fn from_binding_name(name: &str) -> Option<Self> {
        match name {
            "throughput" | "throughputBps" => Some(EdgeMetricKey::Throughput),
            "latency" | "latencyMs" => Some(EdgeMetricKey::Latency),
            "errorRate" | "error_rate" => Some(EdgeMetricKey::ErrorRate),
            "requestsPerSec" | "requests_per_sec" => Some(EdgeMetricKey::RequestsPerSec),
            _ => None,
        }
    }
}

/// Which graph element a binding belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementRef {
    Node(String),
    Edge(String),
}

impl Topology {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Resource a binding on `element` resolves against: the override, else the node's
    /// resourceRef, else (for edges) the source node's resourceRef.
    pub fn binding_resource(
        &self,
        element: &ElementRef,
        binding: &MetricBinding,
    ) -> Option<String> {
        if let Some(r) = &binding.resource_ref {
            return Some(r.clone());
        }
        match element {
            ElementRef::Node(id) => self.node(id).and_then(|n| n.resource_ref.clone()),
            ElementRef::Edge(id) => self
                .edges
                .iter()
                .find(|e| &e.id == id)
                .and_then(|e| self.node(&e.source))
                .and_then(|n| n.resource_ref.clone()),
        }
    }

    /// Every direct binding in the topology as (element, binding name, binding).
    pub fn direct_bindings(&self) -> Vec<(ElementRef, String, MetricBinding)> {
        let mut out = Vec::new();
        for node in &self.nodes {
            for (name, b) in &node.bindings {
                if let Some(mb) = b.as_metric() {
                    out.push((ElementRef::Node(node.id.clone()), name.clone(), mb));
                }
            }
        }
        for edge in &self.edges {
            for (name, b) in &edge.bindings {
                if let Some(mb) = b.as_metric() {
                    out.push((ElementRef::Edge(edge.id.clone()), name.clone(), mb));
                }
            }
        }
        out
    }

    /// Distinct resource references declared by nodes, in node order.
    pub fn resource_refs(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.nodes
            .iter()
            .filter_map(|n| n.resource_ref.clone())
            .filter(|r| seen.insert(r.to_lowercase()))
            .collect()
    }
}
