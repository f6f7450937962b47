// Snapshot: the one artifact an aggregation cycle produces.

use serde::{Deserialize, Serialize};

use super::{FaultImpact, HeatmapCell, LiveAlert, LiveEdge, LiveNode};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologySummary {
    pub node_count: usize,
    pub edge_count: usize,
    pub resolved_bindings: usize,
    pub failed_bindings: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heatmap {
    pub cells: Vec<HeatmapCell>,
    pub node_ids: Vec<String>,
    pub max_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub diagram_id: String,
    /// RFC 3339, UTC, millisecond precision.
    pub generated_at: String,
    pub refresh_interval_sec: u64,
    pub nodes: Vec<LiveNode>,
    pub edges: Vec<LiveEdge>,
    pub alerts: Vec<LiveAlert>,
    pub topology: TopologySummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_impacts: Option<Vec<FaultImpact>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heatmap: Option<Heatmap>,
}

impl Snapshot {
    /// Copy without the derived overlays (fault impacts, heatmap).
    pub fn without_overlays(&self) -> Snapshot {
        Snapshot {
            fault_impacts: None,
            heatmap: None,
            ..self.clone()
        }
    }

    pub fn node(&self, id: &str) -> Option<&LiveNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&LiveEdge> {
        self.edges.iter().find(|e| e.id == id)
    }
}
