// Per-cycle live state of nodes, edges and alerts.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Node health category; serializes to lowercase JSON (e.g. "critical").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Ok,
    Warning,
    Critical,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStatus {
    Normal,
    Degraded,
    Down,
    Idle,
}

/// Ordered from quietest to busiest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficLevel {
    None,
    Low,
    Medium,
    High,
    Burst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
}

impl AlertSeverity {
    /// Maps provider severities (Sev0..Sev4 or plain words) onto the three levels.
    pub fn from_provider(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "sev0" | "sev1" | "0" | "1" | "critical" | "error" => AlertSeverity::Critical,
            "sev2" | "2" | "warning" => AlertSeverity::Warning,
            _ => AlertSeverity::Info,
        }
    }
}

/// One metric's history: values and timestamps stay the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparklineSeries {
    pub values: Vec<f64>,
    pub timestamps: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sparkline {
    /// Most recent samples, oldest first, regardless of metric.
    pub values: Vec<f64>,
    /// Metric name -> its samples.
    pub series: IndexMap<String, SparklineSeries>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveNode {
    pub id: String,
    pub health: HealthState,
    pub health_score: f64,
    pub metrics: IndexMap<String, Option<f64>>,
    pub active_alert_ids: Vec<String>,
    #[serde(default)]
    pub sparkline: Sparkline,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeMetrics {
    pub throughput_bps: Option<f64>,
    pub latency_ms: Option<f64>,
    pub error_rate: Option<f64>,
    pub requests_per_sec: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub status: EdgeStatus,
    pub metrics: EdgeMetrics,
    pub traffic_level: TrafficLevel,
    pub active_alert_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveAlert {
    pub id: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub resource_ref: String,
    pub fired_at: String,
    pub summary: String,
    pub root_cause_candidates: Vec<String>,
    pub affected_node_ids: Vec<String>,
    pub affected_edge_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultImpact {
    pub source_node_id: String,
    pub severity: HealthState,
    pub affected_node_ids: Vec<String>,
    pub affected_edge_ids: Vec<String>,
    pub ripple_radius: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapCell {
    pub source: String,
    pub target: String,
    pub value: f64,
    pub normalized_value: f64,
}
