// Domain models: topology declaration (input) and live snapshot (output)

mod live;
mod snapshot;
mod topology;

pub use live::{
    AlertSeverity, EdgeMetrics, EdgeStatus, FaultImpact, HealthState, HeatmapCell, LiveAlert,
    LiveEdge, LiveNode, Sparkline, SparklineSeries, TrafficLevel,
};
pub use snapshot::{Heatmap, Snapshot, TopologySummary};
pub use topology::{
    Aggregation, Binding, Bindings, Comparator, Edge, EdgeMetricKey, ElementRef, HealthRule,
    MetricBinding, MetricSourceKind, Node, Topology, TopologySettings,
};
