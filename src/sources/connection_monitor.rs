// Active-probe connectivity. Probes are listed per (subscription, resource group) found in the
// node resource references; their latest results give latency and packet loss per matched edge.

use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, instrument, warn};

use super::resolve::{GraphIndex, resource_scope};
use super::transport::post_json;
use super::{
    MetricSource, PartialMetrics, SourceCacheKey, SourceKind, TelemetryTransport, fold_result,
};
use crate::cache::TtlCache;
use crate::error::SourceError;
use crate::identity::Identity;
use crate::models::{EdgeMetrics, Topology};

pub const MONITOR_LIST_PATH: &str = "connectionMonitors/list";
pub const MONITOR_RESULTS_PATH: &str = "connectionMonitors/results";

#[derive(Debug, Clone, Deserialize)]
struct MonitorList {
    #[serde(default)]
    value: Vec<ConnectionMonitor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionMonitor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub endpoints: Vec<MonitorEndpoint>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorEndpoint {
    pub name: String,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProbeResults {
    #[serde(default)]
    value: Vec<ProbeResult>,
}

/// Latest result of one source -> destination test.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub source_endpoint: String,
    pub destination_endpoint: String,
    #[serde(default)]
    pub avg_latency_ms: Option<f64>,
    #[serde(default)]
    pub checks_failed_percent: Option<f64>,
}

fn worst(current: Option<f64>, candidate: Option<f64>) -> Option<f64> {
    match (current, candidate.filter(|v| v.is_finite())) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Maps one monitor's results onto edges, keeping the worst latency and loss per edge.
pub fn apply_results(
    index: &GraphIndex<'_>,
    monitor: &ConnectionMonitor,
    results: &[ProbeResult],
    out: &mut HashMap<String, EdgeMetrics>,
) {
    let endpoint_node = |name: &str| -> Option<&str> {
        let ep = monitor.endpoints.iter().find(|e| e.name == name)?;
        ep.resource_id
            .as_deref()
            .and_then(|r| index.node_for_resource(r))
            .or_else(|| ep.address.as_deref().and_then(|a| index.node_for_ip(a)))
    };
    for r in results {
        let (Some(src), Some(dst)) = (
            endpoint_node(&r.source_endpoint),
            endpoint_node(&r.destination_endpoint),
        ) else {
            continue;
        };
        let Some(edge) = index.edge_between(src, dst) else {
            continue;
        };
        let m = out.entry(edge.to_string()).or_default();
        m.latency_ms = worst(m.latency_ms, r.avg_latency_ms);
        m.error_rate = worst(m.error_rate, r.checks_failed_percent);
    }
}

pub struct ConnectionMonitorSource {
    transport: Arc<dyn TelemetryTransport>,
    cache: TtlCache<SourceCacheKey, HashMap<String, EdgeMetrics>>,
}

impl ConnectionMonitorSource {
    pub fn new(
        transport: Arc<dyn TelemetryTransport>,
        cache_ttl: Duration,
        cache_capacity: usize,
    ) -> Self {
        Self {
            transport,
            cache: TtlCache::new(cache_ttl, cache_capacity),
        }
    }

    async fn probe(
        &self,
        topology: &Topology,
        identity: Option<&Identity>,
    ) -> Result<PartialMetrics, SourceError> {
        let scopes: BTreeSet<(String, String)> = topology
            .nodes
            .iter()
            .filter_map(|n| n.resource_ref.as_deref().and_then(resource_scope))
            .collect();
        if scopes.is_empty() {
            return Ok(PartialMetrics::empty());
        }

        let scope_key: Vec<String> = scopes.iter().map(|(s, g)| format!("{s}/{g}")).collect();
        let key = SourceCacheKey::new(identity, &scope_key.join(";"), [topology.id.as_str()]);
        if let Some(traffic) = self.cache.get(&key) {
            debug!(edges = traffic.len(), "probe results served from cache");
            return Ok(PartialMetrics {
                traffic,
                ..PartialMetrics::empty()
            });
        }

        let listings = join_all(scopes.iter().map(|(subscription, group)| {
            post_json::<MonitorList>(
                self.transport.as_ref(),
                MONITOR_LIST_PATH,
                identity,
                json!({ "subscriptionId": subscription, "resourceGroup": group }),
            )
        }))
        .await;

        let mut monitors = Vec::new();
        let mut last_error = None;
        for listing in listings {
            match listing {
                Ok(list) => monitors.extend(list.value),
                Err(e) => {
                    warn!(error = %e, "probe listing failed for scope");
                    last_error = Some(e);
                }
            }
        }
        if monitors.is_empty()
            && let Some(e) = last_error
        {
            return Err(e);
        }

        let results = join_all(monitors.iter().map(|m| {
            post_json::<ProbeResults>(
                self.transport.as_ref(),
                MONITOR_RESULTS_PATH,
                identity,
                json!({ "monitorId": m.id }),
            )
        }))
        .await;

        let index = GraphIndex::new(topology);
        let mut traffic = HashMap::new();
        for (monitor, result) in monitors.iter().zip(results) {
            match result {
                Ok(r) => apply_results(&index, monitor, &r.value, &mut traffic),
                Err(e) => warn!(monitor = %monitor.name, error = %e, "probe results unavailable"),
            }
        }
        debug!(
            monitors = monitors.len(),
            edges = traffic.len(),
            "probe results resolved"
        );
        self.cache.insert(key, traffic.clone());
        Ok(PartialMetrics {
            traffic,
            ..PartialMetrics::empty()
        })
    }
}

#[async_trait::async_trait]
impl MetricSource for ConnectionMonitorSource {
    fn kind(&self) -> SourceKind {
        SourceKind::ConnectionMonitor
    }

    #[instrument(skip_all, fields(source = "connection_monitor", diagram = %topology.id))]
    async fn collect(&self, topology: &Topology, identity: Option<&Identity>) -> PartialMetrics {
        if topology.edges.is_empty() {
            return PartialMetrics::empty();
        }
        fold_result(self.kind(), 0, self.probe(topology, identity).await)
    }
}
