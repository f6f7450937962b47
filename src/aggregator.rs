// Aggregation cycle: lookup -> collect -> merge -> score/classify -> overlays -> assemble -> cache.
// Only a missing diagram fails a cycle; every source failure degrades to missing data.

use chrono::{SecondsFormat, Utc};
use futures_util::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::{Duration, timeout};
use tracing::{debug, instrument, warn};

use crate::cache::SnapshotCache;
use crate::config::{AggregationConfig, SourcesConfig};
use crate::engine::{self, SparklineStore, edge_status, health, heatmap, impact};
use crate::error::AggregateError;
use crate::identity::Identity;
use crate::models::{LiveAlert, LiveEdge, LiveNode, Snapshot, Topology, TopologySummary};
use crate::sources::alerts::AlertSource;
use crate::sources::app_telemetry::AppTelemetrySource;
use crate::sources::connection_monitor::ConnectionMonitorSource;
use crate::sources::dependency_graph::DependencyGraphSource;
use crate::sources::flow_analytics::FlowAnalyticsSource;
use crate::sources::flow_logs::FlowLogSource;
use crate::sources::platform::PlatformMetricsSource;
use crate::sources::{MetricSource, PartialMetrics, SourceKind, TelemetryTransport};
use crate::topology_repo::TopologyStore;

/// Builds the enabled sources, all sharing one transport.
pub fn build_sources(
    config: &SourcesConfig,
    transport: Arc<dyn TelemetryTransport>,
) -> Vec<Arc<dyn MetricSource>> {
    let capacity = config.cache_capacity;
    let ttl = Duration::from_secs;
    let mut sources: Vec<Arc<dyn MetricSource>> = Vec::new();

    if config.platform.enabled {
        sources.push(Arc::new(PlatformMetricsSource::new(
            transport.clone(),
            config.platform.concurrency,
            ttl(config.platform.cache_ttl_secs),
            capacity,
        )));
    }
    if config.app_telemetry.enabled {
        sources.push(Arc::new(AppTelemetrySource::new(
            transport.clone(),
            ttl(config.app_telemetry.cache_ttl_secs),
            capacity,
        )));
    }
    if config.flow_analytics.enabled {
        sources.push(Arc::new(FlowAnalyticsSource::new(
            transport.clone(),
            config.flow_analytics.workspace_id.clone(),
            ttl(config.flow_analytics.cache_ttl_secs),
            capacity,
        )));
    }
    if config.flow_logs.enabled {
        sources.push(Arc::new(FlowLogSource::new(
            transport.clone(),
            config.flow_logs.clone(),
            capacity,
        )));
    }
    if config.connection_monitor.enabled {
        sources.push(Arc::new(ConnectionMonitorSource::new(
            transport.clone(),
            ttl(config.connection_monitor.cache_ttl_secs),
            capacity,
        )));
    }
    if config.dependency_graph.enabled {
        sources.push(Arc::new(DependencyGraphSource::new(
            transport.clone(),
            config.dependency_graph.app_id.clone(),
            ttl(config.dependency_graph.cache_ttl_secs),
            capacity,
        )));
    }
    if config.alerts.enabled {
        sources.push(Arc::new(AlertSource::new(
            transport,
            ttl(config.alerts.cache_ttl_secs),
            capacity,
        )));
    }
    sources
}

fn alert_ids(alerts: &[LiveAlert], touches: impl Fn(&LiveAlert) -> bool) -> Vec<String> {
    alerts
        .iter()
        .filter(|a| touches(a))
        .map(|a| a.id.clone())
        .collect()
}

pub struct Aggregator {
    store: Arc<dyn TopologyStore>,
    sources: Vec<Arc<dyn MetricSource>>,
    snapshots: SnapshotCache,
    sparklines: SparklineStore,
    source_timeout: Duration,
    cycles_total: AtomicU64,
}

impl Aggregator {
    pub fn new(
        store: Arc<dyn TopologyStore>,
        sources: Vec<Arc<dyn MetricSource>>,
        config: &AggregationConfig,
    ) -> Self {
        Self {
            store,
            sources,
            snapshots: SnapshotCache::new(
                Duration::from_secs(config.snapshot_cache_ttl_secs),
                config.snapshot_cache_capacity,
            ),
            sparklines: SparklineStore::new(config.sparkline_capacity),
            source_timeout: Duration::from_secs(config.source_timeout_secs),
            cycles_total: AtomicU64::new(0),
        }
    }

    /// Cycles actually computed (cache hits excluded).
    pub fn cycles_total(&self) -> u64 {
        self.cycles_total.load(Ordering::Relaxed)
    }

    pub async fn topology(&self, diagram_id: &str) -> Option<Arc<Topology>> {
        self.store.get(diagram_id).await
    }

    /// Latest snapshot for `diagram_id`, served from the identity-scoped cache when fresh.
    #[instrument(skip(self, identity), fields(diagram = %diagram_id, operation = "aggregate"))]
    pub async fn aggregate(
        &self,
        diagram_id: &str,
        identity: Option<&Identity>,
    ) -> Result<Snapshot, AggregateError> {
        self.run(diagram_id, identity, true).await
    }

    /// Always runs a new cycle, then stores the result for later cached reads. Used by live feeds,
    /// which tick on their own schedule.
    #[instrument(skip(self, identity), fields(diagram = %diagram_id, operation = "refresh"))]
    pub async fn refresh(
        &self,
        diagram_id: &str,
        identity: Option<&Identity>,
    ) -> Result<Snapshot, AggregateError> {
        self.run(diagram_id, identity, false).await
    }

    async fn run(
        &self,
        diagram_id: &str,
        identity: Option<&Identity>,
        use_cache: bool,
    ) -> Result<Snapshot, AggregateError> {
        let topology = self
            .store
            .get(diagram_id)
            .await
            .ok_or_else(|| AggregateError::NotFound(diagram_id.to_string()))?;

        if use_cache && let Some(cached) = self.snapshots.get(identity, diagram_id) {
            debug!(generated_at = %cached.generated_at, "snapshot served from cache");
            return Ok(cached);
        }

        let partials = self.collect(&topology, identity).await;
        let snapshot = self.assemble(&topology, &partials);
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
        debug!(
            nodes = snapshot.nodes.len(),
            edges = snapshot.edges.len(),
            alerts = snapshot.alerts.len(),
            resolved = snapshot.topology.resolved_bindings,
            failed = snapshot.topology.failed_bindings,
            "snapshot assembled"
        );
        self.snapshots.insert(identity, diagram_id, snapshot.clone());
        Ok(snapshot)
    }

    /// Runs every source as its own task under the deadline. A task that panics or overruns
    /// contributes nothing and charges its attempted bindings as failed.
    async fn collect(
        &self,
        topology: &Arc<Topology>,
        identity: Option<&Identity>,
    ) -> Vec<(SourceKind, PartialMetrics)> {
        let tasks = self.sources.iter().map(|source| {
            let kind = source.kind();
            let attempted = source.attempted(topology);
            let source = source.clone();
            let topology = topology.clone();
            let identity = identity.cloned();
            let deadline = self.source_timeout;
            let handle = tokio::spawn(async move {
                timeout(deadline, source.collect(&topology, identity.as_ref())).await
            });
            async move {
                let partial = match handle.await {
                    Ok(Ok(partial)) => partial,
                    Ok(Err(_)) => {
                        warn!(
                            source = kind.as_str(),
                            deadline_secs = deadline.as_secs(),
                            "source deadline expired"
                        );
                        PartialMetrics::failed(attempted)
                    }
                    Err(e) => {
                        warn!(source = kind.as_str(), error = %e, "source task failed");
                        PartialMetrics::failed(attempted)
                    }
                };
                (kind, partial)
            }
        });
        join_all(tasks).await
    }

    fn assemble(&self, topology: &Topology, partials: &[(SourceKind, PartialMetrics)]) -> Snapshot {
        let now = Utc::now();
        let timestamp_ms = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let merged = engine::merge(topology, partials);
        let alerts = engine::alerts::correlate(topology, &merged.alerts);

        let nodes: Vec<LiveNode> = topology
            .nodes
            .iter()
            .map(|node| {
                let metrics = merged.node_metrics(&node.id);
                let score = health::score_node(node, &metrics);
                let sparkline = self
                    .sparklines
                    .record(&topology.id, node, &metrics, timestamp_ms);
                LiveNode {
                    id: node.id.clone(),
                    health: score.state,
                    health_score: score.score,
                    active_alert_ids: alert_ids(&alerts, |a| {
                        a.affected_node_ids.contains(&node.id)
                    }),
                    metrics,
                    sparkline,
                }
            })
            .collect();

        let max_throughput = edge_status::max_throughput(merged.edges.values());
        let edges: Vec<LiveEdge> = topology
            .edges
            .iter()
            .map(|edge| {
                let metrics = merged.edge_metrics(&edge.id);
                LiveEdge {
                    id: edge.id.clone(),
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                    status: edge_status::resolve_status(&metrics),
                    traffic_level: edge_status::traffic_level(
                        metrics.throughput_bps,
                        max_throughput,
                    ),
                    metrics,
                    active_alert_ids: alert_ids(&alerts, |a| {
                        a.affected_edge_ids.contains(&edge.id)
                    }),
                }
            })
            .collect();

        let fault_impacts = impact::detect(topology, &nodes);
        let heatmap = heatmap::build(&edges);

        Snapshot {
            diagram_id: topology.id.clone(),
            generated_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            refresh_interval_sec: topology.settings.refresh_interval_sec,
            topology: TopologySummary {
                node_count: topology.nodes.len(),
                edge_count: topology.edges.len(),
                resolved_bindings: merged.resolved,
                failed_bindings: merged.failed,
            },
            nodes,
            edges,
            alerts,
            fault_impacts: Some(fault_impacts),
            heatmap: Some(heatmap),
        }
    }
}
