// Pure per-cycle computation: merge, score, classify, correlate, derive overlays.
// Only the sparkline store keeps state between cycles.

pub mod alerts;
pub mod edge_status;
pub mod health;
pub mod heatmap;
pub mod impact;
pub mod merge;
pub mod sparkline;

pub use merge::{MergedMetrics, merge};
pub use sparkline::SparklineStore;
