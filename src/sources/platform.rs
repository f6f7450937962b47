// Per-resource platform metrics. Bindings are batched per (resource, aggregation) and fetched by a
// fixed-size worker pool; the metrics backend never sees more than `concurrency` requests at once.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, instrument, warn};

use super::pool::run_pool;
use super::transport::post_json;
use super::{MetricSource, PartialMetrics, SourceCacheKey, SourceKind, TelemetryTransport};
use crate::cache::TtlCache;
use crate::identity::Identity;
use crate::models::{Aggregation, ElementRef, MetricBinding, MetricSourceKind, Topology};

pub const METRICS_QUERY_PATH: &str = "metrics/query";
const TIMESPAN: &str = "PT5M";
const INTERVAL: &str = "PT1M";

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsResponse {
    #[serde(default)]
    pub value: Vec<MetricSeries>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricSeries {
    pub name: MetricName,
    #[serde(default)]
    pub timeseries: Vec<TimeSeries>,
}

/// Backends report either a plain name or `{value, localizedValue}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MetricName {
    Plain(String),
    Localized { value: String },
}

impl MetricName {
    fn as_str(&self) -> &str {
        match self {
            MetricName::Plain(s) => s,
            MetricName::Localized { value } => value,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeSeries {
    #[serde(default)]
    pub data: Vec<DataPoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataPoint {
    pub average: Option<f64>,
    pub total: Option<f64>,
    pub maximum: Option<f64>,
    pub minimum: Option<f64>,
    pub count: Option<f64>,
}

impl DataPoint {
    fn get(&self, aggregation: Aggregation) -> Option<f64> {
        match aggregation {
            Aggregation::Average => self.average,
            Aggregation::Total => self.total,
            Aggregation::Maximum => self.maximum,
            Aggregation::Minimum => self.minimum,
            Aggregation::Count => self.count,
        }
    }
}

impl MetricsResponse {
    /// Latest datapoint carrying `aggregation` for `metric`.
    pub fn latest(&self, metric: &str, aggregation: Aggregation) -> Option<f64> {
        let series = self
            .value
            .iter()
            .find(|s| s.name.as_str().eq_ignore_ascii_case(metric))?;
        series
            .timeseries
            .iter()
            .find_map(|ts| ts.data.iter().rev().find_map(|p| p.get(aggregation)))
            .filter(|v| v.is_finite())
    }
}

#[derive(Debug, Clone)]
struct Target {
    element: ElementRef,
    binding: String,
    metric: String,
}

/// All bindings sharing one resource and aggregation: one backend request.
#[derive(Debug, Clone)]
struct Batch {
    resource: String,
    aggregation: Aggregation,
    targets: Vec<Target>,
}

impl Batch {
    fn metric_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.targets.iter().map(|t| t.metric.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    fn cache_key(&self, identity: Option<&Identity>) -> SourceCacheKey {
        let agg = format!("@{}", self.aggregation.as_str());
        SourceCacheKey::new(
            identity,
            &self.resource,
            self.metric_names().into_iter().chain([agg.as_str()]),
        )
    }

    fn request_body(&self) -> serde_json::Value {
        json!({
            "resourceRef": self.resource,
            "metricNames": self.metric_names(),
            "aggregation": self.aggregation.as_str(),
            "timespan": TIMESPAN,
            "interval": INTERVAL,
        })
    }

    fn apply(&self, response: &MetricsResponse, out: &mut PartialMetrics) {
        for t in &self.targets {
            if let Some(v) = response.latest(&t.metric, self.aggregation) {
                out.record(&t.element, &t.binding, v);
            }
        }
    }
}

pub struct PlatformMetricsSource {
    transport: Arc<dyn TelemetryTransport>,
    cache: TtlCache<SourceCacheKey, MetricsResponse>,
    concurrency: usize,
}

impl PlatformMetricsSource {
    pub fn new(
        transport: Arc<dyn TelemetryTransport>,
        concurrency: usize,
        cache_ttl: Duration,
        cache_capacity: usize,
    ) -> Self {
        Self {
            transport,
            cache: TtlCache::new(cache_ttl, cache_capacity),
            concurrency: concurrency.max(1),
        }
    }
}

fn monitor_bindings(
    topology: &Topology,
) -> impl Iterator<Item = (ElementRef, String, MetricBinding)> {
    topology
        .direct_bindings()
        .into_iter()
        .filter(|(_, _, b)| b.source == MetricSourceKind::Monitor)
}

#[async_trait::async_trait]
impl MetricSource for PlatformMetricsSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Platform
    }

    fn attempted(&self, topology: &Topology) -> usize {
        monitor_bindings(topology).count()
    }

    #[instrument(skip_all, fields(source = "platform", diagram = %topology.id))]
    async fn collect(&self, topology: &Topology, identity: Option<&Identity>) -> PartialMetrics {
        let mut out = PartialMetrics::empty();

        let mut batches: IndexMap<(String, Aggregation), Vec<Target>> = IndexMap::new();
        for (element, binding, mb) in monitor_bindings(topology) {
            let Some(resource) = topology.binding_resource(&element, &mb) else {
                debug!(binding = %binding, "no resource reference; binding not resolvable");
                out.failed += 1;
                continue;
            };
            batches
                .entry((resource, mb.aggregation))
                .or_default()
                .push(Target {
                    element,
                    binding,
                    metric: mb.metric,
                });
        }

        let mut pending = Vec::new();
        for ((resource, aggregation), targets) in batches {
            let batch = Batch {
                resource,
                aggregation,
                targets,
            };
            let key = batch.cache_key(identity);
            match self.cache.get(&key) {
                Some(cached) => batch.apply(&cached, &mut out),
                None => pending.push((key, batch)),
            }
        }
        let from_cache = out.resolved;

        let transport = self.transport.clone();
        let identity = identity.cloned();
        let results = run_pool(
            pending,
            self.concurrency,
            move |(key, batch): (SourceCacheKey, Batch)| {
                let transport = transport.clone();
                let identity = identity.clone();
                async move {
                    let result = post_json::<MetricsResponse>(
                        transport.as_ref(),
                        METRICS_QUERY_PATH,
                        identity.as_ref(),
                        batch.request_body(),
                    )
                    .await;
                    (key, batch, result)
                }
            },
        )
        .await;

        for (key, batch, result) in results {
            match result {
                Ok(response) => {
                    batch.apply(&response, &mut out);
                    self.cache.insert(key, response);
                }
                Err(e) => {
                    warn!(
                        resource = %batch.resource,
                        bindings = batch.targets.len(),
                        error = %e,
                        "metric batch failed"
                    );
                    out.failed += batch.targets.len();
                }
            }
        }

        debug!(
            resolved = out.resolved,
            from_cache,
            failed = out.failed,
            "platform metrics collected"
        );
        out
    }
}
