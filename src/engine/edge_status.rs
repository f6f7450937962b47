// Edge status and relative traffic level.

use crate::models::{EdgeMetrics, EdgeStatus, TrafficLevel};

const DOWN_ERROR_RATE: f64 = 25.0;
const DEGRADED_ERROR_RATE: f64 = 5.0;
const DEGRADED_LATENCY_MS: f64 = 2000.0;

/// First match wins; a missing throughput counts as zero.
pub fn resolve_status(m: &EdgeMetrics) -> EdgeStatus {
    let error_rate = m.error_rate.unwrap_or(0.0);
    if error_rate > DOWN_ERROR_RATE {
        EdgeStatus::Down
    } else if error_rate > DEGRADED_ERROR_RATE {
        EdgeStatus::Degraded
    } else if m.latency_ms.unwrap_or(0.0) > DEGRADED_LATENCY_MS {
        EdgeStatus::Degraded
    } else if m.throughput_bps.unwrap_or(0.0) == 0.0 {
        EdgeStatus::Idle
    } else {
        EdgeStatus::Normal
    }
}

/// Level of `throughput` relative to the busiest edge of the same snapshot.
pub fn traffic_level(throughput: Option<f64>, max_throughput: f64) -> TrafficLevel {
    let Some(t) = throughput.filter(|t| *t > 0.0) else {
        return TrafficLevel::None;
    };
    let ratio = t / max_throughput.max(1.0);
    if ratio >= 0.80 {
        TrafficLevel::Burst
    } else if ratio >= 0.50 {
        TrafficLevel::High
    } else if ratio >= 0.15 {
        TrafficLevel::Medium
    } else {
        TrafficLevel::Low
    }
}

pub fn max_throughput<'a>(metrics: impl IntoIterator<Item = &'a EdgeMetrics>) -> f64 {
    metrics
        .into_iter()
        .filter_map(|m| m.throughput_bps)
        .filter(|t| t.is_finite())
        .fold(0.0, f64::max)
}
