// Traffic analytics over the last 5 minutes, grouped by subnet and IP pair.
//
// The window here is 5 minutes while the raw flow-log scan covers an hour; both land in
// `throughputBps`, so the two rates are averages over different spans.

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

const QUERY: &str = "AzureNetworkAnalytics_CL \
| where TimeGenerated > ago(5m) \
| where SubType_s == 'FlowLog' \
| extend TotalBytes = coalesce(InboundBytes_d, 0.0) + coalesce(OutboundBytes_d, 0.0) \
| summarize TotalBytes = sum(TotalBytes) by Subnet1_s, Subnet2_s, SrcIP_s, DestIP_s";

pub struct FlowAnalyticsSource {
    transport: Arc<dyn TelemetryTransport>,
    workspace_id: Option<String>,
    cache: TtlCache<SourceCacheKey, HashMap<String, EdgeMetrics>>,
}

impl FlowAnalyticsSource {
    pub fn new(
        transport: Arc<dyn TelemetryTransport>,
        workspace_id: Option<String>,
        cache_ttl: Duration,
        cache_capacity: usize,
    ) -> Self {
        Self {
            transport,
            workspace_id: workspace_id.filter(|w| !w.trim().is_empty()),
            cache: TtlCache::new(cache_ttl, cache_capacity),
        }
    }

    async fn query(
        &self,
        topology: &Topology,
        identity: Option<&Identity>,
    ) -> Result<PartialMetrics, SourceError> {
        let workspace = self
            .workspace_id
            .as_deref()
            .ok_or(SourceError::ConfigurationMissing("flow_analytics.workspace_id"))?;

        let key = SourceCacheKey::new(identity, workspace, [topology.id.as_str()]);
        if let Some(traffic) = self.cache.get(&key) {
            debug!(edges = traffic.len(), "flow analytics served from cache");
            return Ok(PartialMetrics {
                traffic,
                ..PartialMetrics::empty()
            });
        }

        let response: LogQueryResponse = post_json(
            self.transport.as_ref(),
            LOG_QUERY_PATH,
            identity,
            json!({ "workspaceId": workspace, "query": QUERY }),
        )
        .await?;
        let traffic = edge_throughput(topology, &response.rows());
        debug!(edges = traffic.len(), "flow analytics resolved");
        self.cache.insert(key, traffic.clone());
        Ok(PartialMetrics {
            traffic,
            ..PartialMetrics::empty()
        })
    }
}

/// Resolves a flow endpoint: the IP field first, then the subnet name.
fn resolve_endpoint<'a>(index: &GraphIndex<'a>, ip: &str, subnet: &str) -> Option<&'a str> {
    index
        .node_for_ip_substring(ip)
        .or_else(|| index.node_for_subnet(subnet))
}

/// Sums bytes per resolved edge and converts to bits per second over the window.
pub fn edge_throughput(topology: &Topology, rows: &[LogRow]) -> HashMap<String, EdgeMetrics> {
    let index = GraphIndex::new(topology);
    let mut bytes: HashMap<&str, f64> = HashMap::new();
    for row in rows {
        let src = resolve_endpoint(&index, row.str("SrcIP_s"), row.str("Subnet1_s"));
        let dst = resolve_endpoint(&index, row.str("DestIP_s"), row.str("Subnet2_s"));
        let (Some(src), Some(dst)) = (src, dst) else {
            continue;
        };
        let Some(edge) = index.edge_between(src, dst) else {
            continue;
        };
        let total = row.num("TotalBytes").unwrap_or(0.0).max(0.0);
        *bytes.entry(edge).or_default() += total;
    }
    bytes
        .into_iter()
        .map(|(edge, total)| {
            (
                edge.to_string(),
                EdgeMetrics {
                    throughput_bps: Some(total * 8.0 / WINDOW_SECS),
                    ..EdgeMetrics::default()
                },
            )
        })
        .collect()
}

#[async_trait::async_trait]
impl MetricSource for FlowAnalyticsSource {
    fn kind(&self) -> SourceKind {
        SourceKind::FlowAnalytics
    }

    #[instrument(skip_all, fields(source = "flow_analytics", diagram = %topology.id))]
    async fn collect(&self, topology: &Topology, identity: Option<&Identity>) -> PartialMetrics {
        if topology.edges.is_empty() {
            return PartialMetrics::empty();
        }
        fold_result(self.kind(), 0, self.query(topology, identity).await)
    }
}
