// Application-telemetry metrics. One query per binding; edge bindings resolve through the edge's
// source node, since that is the component emitting the request telemetry.

use serde_json::{Value, json};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, instrument, warn};

use super::pool::run_pool;
use super::{MetricSource, PartialMetrics, SourceCacheKey, SourceKind, TelemetryTransport};
use crate::cache::TtlCache;
use crate::identity::Identity;
use crate::models::{Aggregation, ElementRef, MetricBinding, MetricSourceKind, Topology};

pub const APP_METRICS_PATH: &str = "appinsights/metrics";
const TIMESPAN: &str = "PT5M";
/// In-flight queries per cycle.
const CONCURRENCY: usize = 6;

/// Aggregation key inside an app-telemetry metric result (`{"requests/count": {"sum": 12}}`).
fn result_key(aggregation: Aggregation) -> &'static str {
    match aggregation {
        Aggregation::Average => "avg",
        Aggregation::Total => "sum",
        Aggregation::Maximum => "max",
        Aggregation::Minimum => "min",
        Aggregation::Count => "count",
    }
}

/// Extracts `value.<metric>.<agg>` from a metrics response.
pub fn extract_metric(response: &Value, metric: &str, aggregation: Aggregation) -> Option<f64> {
    response
        .get("value")?
        .get(metric)?
        .get(result_key(aggregation))?
        .as_f64()
        .filter(|v| v.is_finite())
}

struct Query {
    element: ElementRef,
    binding: String,
    app: String,
    metric: MetricBinding,
}

pub struct AppTelemetrySource {
    transport: Arc<dyn TelemetryTransport>,
    cache: TtlCache<SourceCacheKey, Option<f64>>,
}

impl AppTelemetrySource {
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
}

fn app_bindings(topology: &Topology) -> impl Iterator<Item = (ElementRef, String, MetricBinding)> {
    topology
        .direct_bindings()
        .into_iter()
        .filter(|(_, _, b)| b.source == MetricSourceKind::AppInsights)
}

#[async_trait::async_trait]
impl MetricSource for AppTelemetrySource {
    fn kind(&self) -> SourceKind {
        SourceKind::AppTelemetry
    }

    fn attempted(&self, topology: &Topology) -> usize {
        app_bindings(topology).count()
    }

    #[instrument(skip_all, fields(source = "app_telemetry", diagram = %topology.id))]
    async fn collect(&self, topology: &Topology, identity: Option<&Identity>) -> PartialMetrics {
        let mut out = PartialMetrics::empty();
        let mut pending = Vec::new();

        for (element, binding, metric) in app_bindings(topology) {
            let Some(app) = topology.binding_resource(&element, &metric) else {
                debug!(binding = %binding, "no resource reference; binding not resolvable");
                out.failed += 1;
                continue;
            };
            let agg = format!("{}@{}", metric.metric, metric.aggregation.as_str());
            let key = SourceCacheKey::new(identity, &app, [agg.as_str()]);
            match self.cache.get(&key) {
                Some(Some(v)) => out.record(&element, &binding, v),
                Some(None) => {}
                None => pending.push((
                    key,
                    Query {
                        element,
                        binding,
                        app,
                        metric,
                    },
                )),
            }
        }

        let transport = self.transport.clone();
        let identity = identity.cloned();
        let results = run_pool(
            pending,
            CONCURRENCY,
            move |(key, query): (SourceCacheKey, Query)| {
                let transport = transport.clone();
                let identity = identity.clone();
                async move {
                    let body = json!({
                        "appRef": query.app,
                        "metric": query.metric.metric,
                        "aggregation": result_key(query.metric.aggregation),
                        "timespan": TIMESPAN,
                    });
                    let result = transport
                        .post(APP_METRICS_PATH, identity.as_ref(), body)
                        .await;
                    (key, query, result)
                }
            },
        )
        .await;

        for (key, query, result) in results {
            match result {
                Ok(response) => {
                    let value =
                        extract_metric(&response, &query.metric.metric, query.metric.aggregation);
                    if let Some(v) = value {
                        out.record(&query.element, &query.binding, v);
                    }
                    self.cache.insert(key, value);
                }
                Err(e) => {
                    warn!(
                        app = %query.app,
                        metric = %query.metric.metric,
                        error = %e,
                        "app metric query failed"
                    );
                    out.failed += 1;
                }
            }
        }
        out
    }
}
