// Per-node history ring buffers, kept across cycles.

use indexmap::IndexMap;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::models::{Node, Sparkline, SparklineSeries};

pub const DEFAULT_CAPACITY: usize = 20;

#[derive(Debug, Clone)]
struct Sample {
    metric: String,
    value: f64,
    timestamp: u64,
}

/// History keyed by (diagram id, node id).
pub struct SparklineStore {
    buffers: Mutex<HashMap<(String, String), VecDeque<Sample>>>,
    capacity: usize,
}

impl Default for SparklineStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// First resolved direct binding in declaration order.
pub fn primary_metric<'a>(
    node: &'a Node,
    metrics: &IndexMap<String, Option<f64>>,
) -> Option<(&'a str, f64)> {
    node.bindings
        .iter()
        .filter(|(_, b)| !b.is_composite())
        .find_map(|(name, _)| {
            metrics
                .get(name)
                .copied()
                .flatten()
                .map(|v| (name.as_str(), v))
        })
}

fn render(samples: &VecDeque<Sample>) -> Sparkline {
    let mut series: IndexMap<String, SparklineSeries> = IndexMap::new();
    for s in samples {
        let entry = series.entry(s.metric.clone()).or_default();
        entry.values.push(s.value);
        entry.timestamps.push(s.timestamp);
    }
    Sparkline {
        values: samples.iter().map(|s| s.value).collect(),
        series,
    }
}

impl SparklineStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Appends this cycle's primary value (if any) and returns the node's history.
    pub fn record(
        &self,
        diagram_id: &str,
        node: &Node,
        metrics: &IndexMap<String, Option<f64>>,
        timestamp: u64,
    ) -> Sparkline {
        let Ok(mut buffers) = self.buffers.lock() else {
            tracing::warn!(operation = "sparkline_record", "sparkline lock poisoned");
            return Sparkline::default();
        };
        let buffer = buffers
            .entry((diagram_id.to_string(), node.id.clone()))
            .or_default();
        if let Some((metric, value)) = primary_metric(node, metrics) {
            buffer.push_back(Sample {
                metric: metric.to_string(),
                value,
                timestamp,
            });
            while buffer.len() > self.capacity {
                buffer.pop_front();
            }
        }
        render(buffer)
    }

    pub fn len(&self, diagram_id: &str, node_id: &str) -> usize {
        self.buffers
            .lock()
            .ok()
            .and_then(|b| {
                b.get(&(diagram_id.to_string(), node_id.to_string()))
                    .map(VecDeque::len)
            })
            .unwrap_or(0)
    }
}
