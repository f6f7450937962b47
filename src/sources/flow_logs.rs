// Raw NSG flow-log scan. Reads the most recent blobs, keeps tuples inside the window, and turns
// per-IP-pair byte counts into edge throughput averaged over the whole window (1 hour by default,
// unlike the 5-minute traffic-analytics rate).

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, instrument, warn};

use super::pool::run_pool;
use super::resolve::GraphIndex;
use super::transport::post_json;
use super::{
    MetricSource, PartialMetrics, SourceCacheKey, SourceKind, TelemetryTransport, fold_result,
};
use crate::cache::TtlCache;
use crate::config::FlowLogsConfig;
use crate::error::SourceError;
use crate::identity::Identity;
use crate::models::{EdgeMetrics, Topology};

pub const BLOB_LIST_PATH: &str = "storage/blobs/list";
pub const BLOB_READ_PATH: &str = "storage/blobs/read";
pub const NETWORK_INTERFACES_PATH: &str = "network/interfaces";
const READ_CONCURRENCY: usize = 4;

/// One flow tuple. v1 carries the first eight fields; v2 adds state and counters.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowTuple {
    pub timestamp: i64,
    pub src_ip: String,
    pub dest_ip: String,
    pub src_port: String,
    pub dest_port: String,
    pub protocol: String,
    pub direction: String,
    pub action: String,
    pub flow_state: Option<String>,
    pub packets_src_to_dest: Option<u64>,
    pub bytes_src_to_dest: Option<u64>,
    pub packets_dest_to_src: Option<u64>,
    pub bytes_dest_to_src: Option<u64>,
}

fn opt_field<'a>(fields: &[&'a str], i: usize) -> Option<&'a str> {
    fields.get(i).map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn opt_count(fields: &[&str], i: usize) -> Option<u64> {
    opt_field(fields, i).and_then(|s| s.parse().ok())
}

impl FlowTuple {
    /// Parses a comma-delimited tuple. Fewer than eight fields, or a bad timestamp, is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let fields: Vec<&str> = raw.split(',').collect();
        if fields.len() < 8 {
            return None;
        }
        let timestamp = fields[0].trim().parse().ok()?;
        let src_ip = fields[1].trim();
        let dest_ip = fields[2].trim();
        if src_ip.is_empty() || dest_ip.is_empty() {
            return None;
        }
        Some(Self {
            timestamp,
            src_ip: src_ip.to_string(),
            dest_ip: dest_ip.to_string(),
            src_port: fields[3].trim().to_string(),
            dest_port: fields[4].trim().to_string(),
            protocol: fields[5].trim().to_string(),
            direction: fields[6].trim().to_string(),
            action: fields[7].trim().to_string(),
            flow_state: opt_field(&fields, 8).map(str::to_string),
            packets_src_to_dest: opt_count(&fields, 9),
            bytes_src_to_dest: opt_count(&fields, 10),
            packets_dest_to_src: opt_count(&fields, 11),
            bytes_dest_to_src: opt_count(&fields, 12),
        })
    }

    /// Bytes in both directions, when the tuple carries counters. Saturates instead of wrapping.
    pub fn total_bytes(&self) -> Option<u64> {
        match (self.bytes_src_to_dest, self.bytes_dest_to_src) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(0).saturating_add(b.unwrap_or(0))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FlowLogDocument {
    #[serde(default)]
    records: Vec<FlowRecord>,
}

#[derive(Debug, Deserialize)]
struct FlowRecord {
    #[serde(default)]
    properties: FlowRecordProperties,
}

#[derive(Debug, Default, Deserialize)]
struct FlowRecordProperties {
    #[serde(default)]
    flows: Vec<RuleFlows>,
}

#[derive(Debug, Deserialize)]
struct RuleFlows {
    #[serde(default)]
    flows: Vec<MacFlows>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MacFlows {
    #[serde(default)]
    flow_tuples: Vec<String>,
}

/// Every parseable tuple in an NSG flow-log document; malformed tuples are skipped.
pub fn parse_flow_log(document: &Value) -> Vec<FlowTuple> {
    let Ok(doc) = FlowLogDocument::deserialize(document) else {
        return Vec::new();
    };
    doc.records
        .iter()
        .flat_map(|r| &r.properties.flows)
        .flat_map(|rule| &rule.flows)
        .flat_map(|mac| &mac.flow_tuples)
        .filter_map(|t| FlowTuple::parse(t))
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobList {
    #[serde(default)]
    blobs: Vec<BlobItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobItem {
    name: String,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
struct InterfaceList {
    #[serde(default)]
    value: Vec<NetworkInterface>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkInterface {
    id: String,
    #[serde(default)]
    ip_addresses: Vec<String>,
    #[serde(default)]
    attached_resource_ref: Option<String>,
}

/// Reverse NIC map: private IP -> node, via the resource the NIC is attached to (or the NIC
/// itself).
pub fn nic_ip_map(index: &GraphIndex<'_>, interfaces: &Value) -> HashMap<String, String> {
    let Ok(list) = InterfaceList::deserialize(interfaces) else {
        return HashMap::new();
    };
    let mut map = HashMap::new();
    for nic in list.value {
        let node = nic
            .attached_resource_ref
            .as_deref()
            .and_then(|r| index.node_for_resource(r))
            .or_else(|| index.node_for_resource(&nic.id));
        if let Some(node) = node {
            for ip in nic.ip_addresses {
                map.entry(ip).or_insert_with(|| node.to_string());
            }
        }
    }
    map
}

/// Sums in-window bytes per IP pair, resolves both ends, and attributes them to edges.
pub fn edge_throughput(
    topology: &Topology,
    nic_map: &HashMap<String, String>,
    tuples: &[FlowTuple],
    now: i64,
    window_secs: u64,
) -> HashMap<String, EdgeMetrics> {
    let index = GraphIndex::new(topology);
    let since = now - window_secs as i64;

    let mut pairs: HashMap<(&str, &str), u64> = HashMap::new();
    for t in tuples.iter().filter(|t| t.timestamp >= since && t.timestamp <= now) {
        if let Some(bytes) = t.total_bytes() {
            let total = pairs.entry((t.src_ip.as_str(), t.dest_ip.as_str())).or_default();
            *total = total.saturating_add(bytes);
        }
    }

    let resolve = |ip: &str| -> Option<String> {
        nic_map
            .get(ip)
            .cloned()
            .or_else(|| index.node_for_ip(ip).map(str::to_string))
            .or_else(|| index.node_for_ip_in_pool(ip).map(str::to_string))
    };

    let mut per_edge: HashMap<String, u64> = HashMap::new();
    for ((src, dst), bytes) in pairs {
        let (Some(a), Some(b)) = (resolve(src), resolve(dst)) else {
            continue;
        };
        if let Some(edge) = index.edge_between(&a, &b) {
            let total = per_edge.entry(edge.to_string()).or_default();
            *total = total.saturating_add(bytes);
        }
    }

    per_edge
        .into_iter()
        .map(|(edge, bytes)| {
            (
                edge,
                EdgeMetrics {
                    throughput_bps: Some(bytes as f64 * 8.0 / window_secs.max(1) as f64),
                    ..EdgeMetrics::default()
                },
            )
        })
        .collect()
}

pub struct FlowLogSource {
    transport: Arc<dyn TelemetryTransport>,
    config: FlowLogsConfig,
    cache: TtlCache<SourceCacheKey, HashMap<String, EdgeMetrics>>,
}

impl FlowLogSource {
    pub fn new(
        transport: Arc<dyn TelemetryTransport>,
        config: FlowLogsConfig,
        cache_capacity: usize,
    ) -> Self {
        let ttl = Duration::from_secs(config.cache_ttl_secs);
        Self {
            transport,
            config,
            cache: TtlCache::new(ttl, cache_capacity),
        }
    }

    async fn scan(
        &self,
        topology: &Topology,
        identity: Option<&Identity>,
    ) -> Result<PartialMetrics, SourceError> {
        let account = self
            .config
            .storage_account
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .ok_or(SourceError::ConfigurationMissing("flow_logs.storage_account"))?;

        let key = SourceCacheKey::new(
            identity,
            &format!("{account}/{}", self.config.container),
            [topology.id.as_str()],
        );
        if let Some(traffic) = self.cache.get(&key) {
            debug!(edges = traffic.len(), "flow logs served from cache");
            return Ok(PartialMetrics {
                traffic,
                ..PartialMetrics::empty()
            });
        }

        let now = Utc::now();
        let window = chrono::Duration::seconds(self.config.window_secs as i64);
        let listing: BlobList = post_json(
            self.transport.as_ref(),
            BLOB_LIST_PATH,
            identity,
            json!({ "storageAccount": account, "container": self.config.container }),
        )
        .await?;
        let mut recent: Vec<BlobItem> = listing
            .blobs
            .into_iter()
            .filter(|b| now.signed_duration_since(b.last_modified) <= window)
            .collect();
        recent.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        recent.truncate(self.config.max_blobs);

        let index = GraphIndex::new(topology);
        let nic_map = match self
            .transport
            .post(
                NETWORK_INTERFACES_PATH,
                identity,
                json!({ "resourceRefs": topology.resource_refs() }),
            )
            .await
        {
            Ok(v) => nic_ip_map(&index, &v),
            Err(e) => {
                warn!(error = %e, "interface listing failed; resolving by declared addresses");
                HashMap::new()
            }
        };

        let transport = self.transport.clone();
        let identity_owned = identity.cloned();
        let account_owned = account.to_string();
        let container = self.config.container.clone();
        let blobs = run_pool(recent, READ_CONCURRENCY, move |blob: BlobItem| {
            let transport = transport.clone();
            let identity = identity_owned.clone();
            let body = json!({
                "storageAccount": account_owned,
                "container": container,
                "name": blob.name,
            });
            async move {
                let result = transport.post(BLOB_READ_PATH, identity.as_ref(), body).await;
                (blob.name, result)
            }
        })
        .await;

        let mut tuples = Vec::new();
        let mut blobs_read = 0usize;
        for (name, result) in blobs {
            match result {
                Ok(doc) => {
                    blobs_read += 1;
                    tuples.extend(parse_flow_log(&doc));
                }
                Err(e) => warn!(blob = %name, error = %e, "flow log blob read failed"),
            }
        }

        let traffic = edge_throughput(
            topology,
            &nic_map,
            &tuples,
            now.timestamp(),
            self.config.window_secs,
        );
        debug!(
            blobs = blobs_read,
            tuples = tuples.len(),
            edges = traffic.len(),
            "flow logs scanned"
        );
        self.cache.insert(key, traffic.clone());
        Ok(PartialMetrics {
            traffic,
            ..PartialMetrics::empty()
        })
    }
}

#[async_trait::async_trait]
impl MetricSource for FlowLogSource {
    fn kind(&self) -> SourceKind {
        SourceKind::FlowLogs
    }

    #[instrument(skip_all, fields(source = "flow_logs", diagram = %topology.id))]
    async fn collect(&self, topology: &Topology, identity: Option<&Identity>) -> PartialMetrics {
        if topology.edges.is_empty() {
            return PartialMetrics::empty();
        }
        fold_result(self.kind(), 0, self.scan(topology, identity).await)
    }
}
