// Telemetry source adapters. Every adapter is total: failures become an empty PartialMetrics.

pub mod alerts;
pub mod app_telemetry;
pub mod connection_monitor;
pub mod dependency_graph;
pub mod flow_analytics;
pub mod flow_logs;
pub mod log_query;
pub mod platform;
pub mod pool;
pub mod resolve;
pub mod transport;

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::SourceError;
use crate::identity::Identity;
use crate::models::{EdgeMetrics, ElementRef, Topology};

pub use transport::{HttpTransport, TelemetryTransport};

/// Slot a source fills in the merge. Also used as the `source` log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Platform,
    AppTelemetry,
    FlowAnalytics,
    FlowLogs,
    ConnectionMonitor,
    DependencyGraph,
    Alerts,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Platform => "platform",
            SourceKind::AppTelemetry => "app_telemetry",
            SourceKind::FlowAnalytics => "flow_analytics",
            SourceKind::FlowLogs => "flow_logs",
            SourceKind::ConnectionMonitor => "connection_monitor",
            SourceKind::DependencyGraph => "dependency_graph",
            SourceKind::Alerts => "alerts",
        }
    }
}

/// Alert as reported by the provider, before correlation onto the graph.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAlert {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub target_resource: String,
    #[serde(default, alias = "startDateTime")]
    pub fired_date_time: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub monitor_condition: Option<String>,
    #[serde(default)]
    pub alert_state: Option<String>,
}

/// What one source contributed to a cycle.
#[derive(Debug, Clone, Default)]
pub struct PartialMetrics {
    /// Node id -> binding name -> value, for declared direct bindings.
    pub nodes: HashMap<String, HashMap<String, f64>>,
    /// Edge id -> binding name -> value, for declared direct bindings.
    pub edges: HashMap<String, HashMap<String, f64>>,
    /// Edge id -> metrics observed by a traffic source (no binding involved).
    pub traffic: HashMap<String, EdgeMetrics>,
    pub alerts: Vec<RawAlert>,
    /// Declared bindings that produced a value.
    pub resolved: usize,
    /// Declared bindings whose request failed or could not be issued.
    pub failed: usize,
}

impl PartialMetrics {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Empty result charging `attempted` bindings as failed.
    pub fn failed(attempted: usize) -> Self {
        Self {
            failed: attempted,
            ..Self::default()
        }
    }

    pub fn record(&mut self, element: &ElementRef, binding: &str, value: f64) {
        let map = match element {
            ElementRef::Node(id) => self.nodes.entry(id.clone()).or_default(),
            ElementRef::Edge(id) => self.edges.entry(id.clone()).or_default(),
        };
        map.insert(binding.to_string(), value);
        self.resolved += 1;
    }

    pub fn node_value(&self, node_id: &str, binding: &str) -> Option<f64> {
        self.nodes.get(node_id).and_then(|m| m.get(binding)).copied()
    }

    pub fn edge_value(&self, edge_id: &str, binding: &str) -> Option<f64> {
        self.edges.get(edge_id).and_then(|m| m.get(binding)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.edges.is_empty()
            && self.traffic.is_empty()
            && self.alerts.is_empty()
    }
}

/// A telemetry source. `collect` must not fail; see [`fold_result`].
#[async_trait::async_trait]
pub trait MetricSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Declared bindings this source attempts for `topology` (charged as failed on deadline).
    fn attempted(&self, _topology: &Topology) -> usize {
        0
    }

    async fn collect(&self, topology: &Topology, identity: Option<&Identity>) -> PartialMetrics;
}

/// Adapter boundary: turns a fallible collection into a total one.
pub fn fold_result(
    kind: SourceKind,
    attempted: usize,
    result: Result<PartialMetrics, SourceError>,
) -> PartialMetrics {
    match result {
        Ok(m) => m,
        Err(SourceError::ConfigurationMissing(what)) => {
            tracing::debug!(source = kind.as_str(), missing = what, "source skipped");
            PartialMetrics::failed(attempted)
        }
        Err(e) => {
            tracing::warn!(source = kind.as_str(), error = %e, "source unavailable");
            PartialMetrics::failed(attempted)
        }
    }
}

/// Per-source cache key: (identity hash, resource, binding set). The binding set is sorted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceCacheKey {
    pub identity: String,
    pub resource: String,
    pub bindings: String,
}

impl SourceCacheKey {
    pub fn new<'a>(
        identity: Option<&Identity>,
        resource: &str,
        bindings: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut names: Vec<&str> = bindings.into_iter().collect();
        names.sort_unstable();
        names.dedup();
        Self {
            identity: crate::identity::identity_key(identity),
            resource: resource.to_lowercase(),
            bindings: names.join(","),
        }
    }
}
