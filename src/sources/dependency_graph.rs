// Dependency-call graph from application telemetry: caller -> callee aggregates over 5 minutes.

use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, instrument};

use super::log_query::{LOG_QUERY_PATH, LogQueryResponse, LogRow};
use super::resolve::GraphIndex;
use super::transport::post_json;
use super::{
    MetricSource, PartialMetrics, SourceCacheKey, SourceKind, TelemetryTransport, fold_result,
};
use crate::cache::TtlCache;
use crate::error::SourceError;
use crate::identity::Identity;
use crate::models::{EdgeMetrics, Topology};

pub const WINDOW_SECS: f64 = 300.0;

const QUERY: &str = "dependencies \
| where timestamp > ago(5m) \
| summarize Calls = count(), Failures = countif(success == false), AvgDurationMs = avg(duration) \
  by Caller = cloud_RoleName, Callee = target";

#[derive(Default)]
struct CallTotals {
    calls: f64,
    failures: f64,
    weighted_duration: f64,
}

/// Resolves caller/callee names onto edges and derives rate, failure percentage and latency.
pub fn edge_calls(topology: &Topology, rows: &[LogRow]) -> HashMap<String, EdgeMetrics> {
    let index = GraphIndex::new(topology);
    let mut totals: HashMap<&str, CallTotals> = HashMap::new();
    for row in rows {
        let (Some(caller), Some(callee)) = (
            index.node_for_name(row.str("Caller")),
            index.node_for_name(row.str("Callee")),
        ) else {
            continue;
        };
        let Some(edge) = index.edge_between(caller, callee) else {
            continue;
        };
        let calls = row.num("Calls").unwrap_or(0.0).max(0.0);
        if calls == 0.0 {
            continue;
        }
        let t = totals.entry(edge).or_default();
        t.calls += calls;
        t.failures += row.num("Failures").unwrap_or(0.0).max(0.0);
        t.weighted_duration += row.num("AvgDurationMs").unwrap_or(0.0) * calls;
    }

    totals
        .into_iter()
        .map(|(edge, t)| {
            (
                edge.to_string(),
                EdgeMetrics {
                    requests_per_sec: Some(t.calls / WINDOW_SECS),
                    error_rate: Some(t.failures / t.calls * 100.0),
                    latency_ms: Some(t.weighted_duration / t.calls),
                    throughput_bps: None,
                },
            )
        })
        .collect()
}

pub struct DependencyGraphSource {
    transport: Arc<dyn TelemetryTransport>,
    app_id: Option<String>,
    cache: TtlCache<SourceCacheKey, HashMap<String, EdgeMetrics>>,
}

impl DependencyGraphSource {
    pub fn new(
        transport: Arc<dyn TelemetryTransport>,
        app_id: Option<String>,
        cache_ttl: Duration,
        cache_capacity: usize,
    ) -> Self {
        Self {
            transport,
            app_id: app_id.filter(|a| !a.trim().is_empty()),
            cache: TtlCache::new(cache_ttl, cache_capacity),
        }
    }

    async fn query(
        &self,
        topology: &Topology,
        identity: Option<&Identity>,
    ) -> Result<PartialMetrics, SourceError> {
        let app = self
            .app_id
            .as_deref()
            .ok_or(SourceError::ConfigurationMissing("dependency_graph.app_id"))?;

        let key = SourceCacheKey::new(identity, app, [topology.id.as_str()]);
        if let Some(traffic) = self.cache.get(&key) {
            debug!(edges = traffic.len(), "dependency graph served from cache");
            return Ok(PartialMetrics {
                traffic,
                ..PartialMetrics::empty()
            });
        }

        let response: LogQueryResponse = post_json(
            self.transport.as_ref(),
            LOG_QUERY_PATH,
            identity,
            json!({ "appId": app, "query": QUERY }),
        )
        .await?;
        let traffic = edge_calls(topology, &response.rows());
        debug!(edges = traffic.len(), "dependency graph resolved");
        self.cache.insert(key, traffic.clone());
        Ok(PartialMetrics {
            traffic,
            ..PartialMetrics::empty()
        })
    }
}

#[async_trait::async_trait]
impl MetricSource for DependencyGraphSource {
    fn kind(&self) -> SourceKind {
        SourceKind::DependencyGraph
    }

    #[instrument(skip_all, fields(source = "dependency_graph", diagram = %topology.id))]
    async fn collect(&self, topology: &Topology, identity: Option<&Identity>) -> PartialMetrics {
        if topology.edges.is_empty() {
            return PartialMetrics::empty();
        }
        fold_result(self.kind(), 0, self.query(topology, identity).await)
    }
}
