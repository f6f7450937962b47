// Traffic heatmap over edges with resolved throughput.

use crate::models::{Heatmap, HeatmapCell, LiveEdge};

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

pub fn build(edges: &[LiveEdge]) -> Heatmap {
    let with_throughput: Vec<(&LiveEdge, f64)> = edges
        .iter()
        .filter_map(|e| {
            e.metrics
                .throughput_bps
                .filter(|t| t.is_finite())
                .map(|t| (e, t))
        })
        .collect();
    let max_value = with_throughput.iter().map(|(_, t)| *t).fold(0.0, f64::max);
    let denominator = max_value.max(1.0);

    let mut node_ids: Vec<String> = Vec::new();
    let mut cells = Vec::with_capacity(with_throughput.len());
    for (edge, value) in with_throughput {
        for id in [&edge.source, &edge.target] {
            if !node_ids.contains(id) {
                node_ids.push(id.clone());
            }
        }
        cells.push(HeatmapCell {
            source: edge.source.clone(),
            target: edge.target.clone(),
            value,
            normalized_value: round3(value / denominator).clamp(0.0, 1.0),
        });
    }

    Heatmap {
        cells,
        node_ids,
        max_value,
    }
}
