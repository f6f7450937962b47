// Shared test helpers: topology builders, an in-process telemetry transport, canned sources.

#![allow(dead_code)]

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

use topolive::error::SourceError;
use topolive::identity::Identity;
use topolive::models::*;
use topolive::sources::{MetricSource, PartialMetrics, SourceKind, TelemetryTransport};
use topolive::topology_repo::InMemoryTopologyStore;

pub const RG: &str = "/subscriptions/sub-1/resourceGroups/rg-app";

pub fn resource(name: &str) -> String {
    format!("{RG}/providers/Microsoft.Compute/virtualMachines/{name}")
}

pub fn node(id: &str) -> Node {
    Node {
        id: id.into(),
        label: id.into(),
        resource_ref: None,
        bindings: Bindings::new(),
        addresses: vec![],
        subnet: None,
        address_prefix: None,
    }
}

pub fn node_on(id: &str) -> Node {
    Node {
        resource_ref: Some(resource(id)),
        ..node(id)
    }
}

pub fn edge(source: &str, target: &str) -> Edge {
    Edge {
        id: format!("{source}-{target}"),
        source: source.into(),
        target: target.into(),
        bindings: Bindings::new(),
    }
}

pub fn monitor(metric: &str) -> Binding {
    Binding::Monitor {
        metric: metric.into(),
        aggregation: Aggregation::Average,
        resource_ref: None,
    }
}

pub fn app_metric(metric: &str, aggregation: Aggregation) -> Binding {
    Binding::AppInsights {
        metric: metric.into(),
        aggregation,
        resource_ref: None,
    }
}

pub fn rule(metric: &str, op: Comparator, threshold: f64) -> HealthRule {
    HealthRule {
        metric: metric.into(),
        op,
        threshold,
        weight: 1.0,
    }
}

pub fn composite(rules: Vec<HealthRule>) -> Binding {
    Binding::Composite { rules }
}

pub fn with_binding<T: HasBindings>(mut element: T, name: &str, binding: Binding) -> T {
    element.bindings_mut().insert(name.into(), binding);
    element
}

pub trait HasBindings {
    fn bindings_mut(&mut self) -> &mut Bindings;
}

impl HasBindings for Node {
    fn bindings_mut(&mut self) -> &mut Bindings {
        &mut self.bindings
    }
}

impl HasBindings for Edge {
    fn bindings_mut(&mut self) -> &mut Bindings {
        &mut self.bindings
    }
}

pub fn topology(id: &str, nodes: Vec<Node>, edges: Vec<Edge>) -> Topology {
    Topology {
        id: id.into(),
        name: id.into(),
        nodes,
        edges,
        settings: TopologySettings::default(),
    }
}

/// A -> B -> C -> D with no bindings.
pub fn chain() -> Topology {
    topology(
        "chain",
        vec![node("A"), node("B"), node("C"), node("D")],
        vec![edge("A", "B"), edge("B", "C"), edge("C", "D")],
    )
}

pub async fn store_with(topologies: Vec<Topology>) -> Arc<InMemoryTopologyStore> {
    let store = InMemoryTopologyStore::new();
    for t in topologies {
        store.insert(t).await;
    }
    Arc::new(store)
}

type Handler = Box<dyn Fn(&Value) -> Result<Value, SourceError> + Send + Sync>;

/// In-process gateway: canned handlers per path, every request recorded.
#[derive(Default)]
pub struct StubTransport {
    handlers: HashMap<String, Handler>,
    calls: Mutex<Vec<(String, Value, Option<Identity>)>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, path: &str, value: Value) -> Self {
        self.respond_with(path, move |_| Ok(value.clone()))
    }

    pub fn respond_with(
        mut self,
        path: &str,
        handler: impl Fn(&Value) -> Result<Value, SourceError> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(path.into(), Box::new(handler));
        self
    }

    pub fn fail(self, path: &str, status: u16) -> Self {
        self.respond_with(path, move |_| match status {
            401 | 403 => Err(SourceError::Auth(format!("status {status}"))),
            429 => Err(SourceError::RateLimited),
            _ => Err(SourceError::Http(format!("status {status}"))),
        })
    }

    pub fn calls(&self, path: &str) -> usize {
        self.bodies(path).len()
    }

    pub fn bodies(&self, path: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _, _)| p == path)
            .map(|(_, b, _)| b.clone())
            .collect()
    }

    pub fn identities(&self) -> Vec<Option<Identity>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, i)| i.clone())
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl TelemetryTransport for StubTransport {
    async fn post(
        &self,
        path: &str,
        identity: Option<&Identity>,
        body: Value,
    ) -> Result<Value, SourceError> {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_string(), body.clone(), identity.cloned()));
        match self.handlers.get(path) {
            Some(handler) => handler(&body),
            None => Err(SourceError::Http(format!("{path} returned status 404 Not Found"))),
        }
    }
}

/// Metric time-series response for every requested metric name, using `values` by name.
pub fn metrics_response(body: &Value, values: &HashMap<&str, f64>) -> Value {
    let names = body["metricNames"].as_array().cloned().unwrap_or_default();
    let series: Vec<Value> = names
        .iter()
        .filter_map(|n| n.as_str())
        .filter_map(|n| {
            let v = values.get(n)?;
            Some(serde_json::json!({
                "name": {"value": n, "localizedValue": n},
                "timeseries": [{"data": [
                    {"timeStamp": "2026-01-01T00:00:00Z"},
                    {"timeStamp": "2026-01-01T00:01:00Z", "average": v, "total": v, "maximum": v}
                ]}]
            }))
        })
        .collect();
    serde_json::json!({ "value": series })
}

/// Returns the same partial result every cycle and counts invocations.
pub struct FixedSource {
    pub kind: SourceKind,
    pub attempted: usize,
    pub result: PartialMetrics,
    pub calls: AtomicUsize,
}

impl FixedSource {
    pub fn new(kind: SourceKind, result: PartialMetrics) -> Arc<Self> {
        Arc::new(Self {
            kind,
            attempted: result.resolved + result.failed,
            result,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MetricSource for FixedSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn attempted(&self, _topology: &Topology) -> usize {
        self.attempted
    }

    async fn collect(&self, _topology: &Topology, _identity: Option<&Identity>) -> PartialMetrics {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// Panics inside collect.
pub struct PanickingSource {
    pub attempted: usize,
}

#[async_trait::async_trait]
impl MetricSource for PanickingSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Platform
    }

    fn attempted(&self, _topology: &Topology) -> usize {
        self.attempted
    }

    async fn collect(&self, _topology: &Topology, _identity: Option<&Identity>) -> PartialMetrics {
        panic!("source exploded");
    }
}

/// Never finishes within any reasonable deadline.
pub struct StalledSource {
    pub attempted: usize,
}

#[async_trait::async_trait]
impl MetricSource for StalledSource {
    fn kind(&self) -> SourceKind {
        SourceKind::AppTelemetry
    }

    fn attempted(&self, _topology: &Topology) -> usize {
        self.attempted
    }

    async fn collect(&self, _topology: &Topology, _identity: Option<&Identity>) -> PartialMetrics {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        PartialMetrics::empty()
    }
}
