// Active provider alerts for the resources in a topology. Correlation happens in the engine.

use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, instrument};

use super::transport::post_json;
use super::{
    MetricSource, PartialMetrics, RawAlert, SourceCacheKey, SourceKind, TelemetryTransport,
    fold_result,
};
use crate::cache::TtlCache;
use crate::error::SourceError;
use crate::identity::Identity;
use crate::models::Topology;

pub const ALERTS_QUERY_PATH: &str = "alerts/query";

#[derive(Debug, Clone, Deserialize)]
struct AlertList {
    #[serde(default)]
    value: Vec<RawAlert>,
}

fn is_field(value: Option<&str>, expected: &str) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case(expected))
}

/// Drops alerts whose condition is resolved or that an operator already closed.
pub fn active_only(alerts: Vec<RawAlert>) -> Vec<RawAlert> {
    alerts
        .into_iter()
        .filter(|a| {
            !is_field(a.monitor_condition.as_deref(), "resolved")
                && !is_field(a.alert_state.as_deref(), "closed")
        })
        .collect()
}

pub struct AlertSource {
    transport: Arc<dyn TelemetryTransport>,
    cache: TtlCache<SourceCacheKey, Vec<RawAlert>>,
}

impl AlertSource {
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

    async fn query(
        &self,
        topology: &Topology,
        identity: Option<&Identity>,
    ) -> Result<PartialMetrics, SourceError> {
        let resources = topology.resource_refs();
        if resources.is_empty() {
            return Ok(PartialMetrics::empty());
        }
        let key = SourceCacheKey::new(
            identity,
            &topology.id,
            resources.iter().map(String::as_str),
        );
        let alerts = match self.cache.get(&key) {
            Some(cached) => cached,
            None => {
                let list: AlertList = post_json(
                    self.transport.as_ref(),
                    ALERTS_QUERY_PATH,
                    identity,
                    json!({ "resourceRefs": resources }),
                )
                .await?;
                let active = active_only(list.value);
                self.cache.insert(key, active.clone());
                active
            }
        };
        debug!(alerts = alerts.len(), "active alerts collected");
        Ok(PartialMetrics {
            alerts,
            ..PartialMetrics::empty()
        })
    }
}

#[async_trait::async_trait]
impl MetricSource for AlertSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Alerts
    }

    #[instrument(skip_all, fields(source = "alerts", diagram = %topology.id))]
    async fn collect(&self, topology: &Topology, identity: Option<&Identity>) -> PartialMetrics {
        fold_result(self.kind(), 0, self.query(topology, identity).await)
    }
}
