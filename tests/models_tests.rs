// Model (de)serialization tests: diagram declarations in, snapshots out

use serde_json::json;
use topolive::models::*;

#[test]
fn test_topology_deserializes_with_defaults() {
    let t: Topology = serde_json::from_value(json!({
        "id": "shop",
        "nodes": [{"id": "web"}, {"id": "db", "resourceRef": "/subscriptions/s/resourceGroups/rg/providers/x/db"}],
        "edges": [{"id": "web-db", "source": "web", "target": "db"}]
    }))
    .unwrap();
    assert_eq!(t.settings.refresh_interval_sec, 30);
    assert_eq!(t.nodes.len(), 2);
    assert!(t.nodes[0].bindings.is_empty());
    assert!(t.nodes[0].addresses.is_empty());
    assert_eq!(
        t.node("db").and_then(|n| n.resource_ref.as_deref()),
        Some("/subscriptions/s/resourceGroups/rg/providers/x/db")
    );
    assert_eq!(t.resource_refs().len(), 1);
}

#[test]
fn test_bindings_are_tagged_by_source() {
    let node: Node = serde_json::from_value(json!({
        "id": "api",
        "bindings": {
            "cpu": {"source": "monitor", "metric": "Percentage CPU", "aggregation": "avg"},
            "requests": {"source": "appInsights", "metric": "requests/count", "aggregation": "sum"},
            "health": {"source": "composite", "rules": [
                {"metric": "cpu", "op": "<", "threshold": 80},
                {"metric": "requests", "op": ">=", "threshold": 1, "weight": 2.5}
            ]}
        }
    }))
    .unwrap();

    let names: Vec<&str> = node.bindings.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["cpu", "requests", "health"]);

    let cpu = node.bindings["cpu"].as_metric().unwrap();
    assert_eq!(cpu.source, MetricSourceKind::Monitor);
    assert_eq!(cpu.aggregation, Aggregation::Average);

    let requests = node.bindings["requests"].as_metric().unwrap();
    assert_eq!(requests.source, MetricSourceKind::AppInsights);
    assert_eq!(requests.aggregation, Aggregation::Total);

    let health = &node.bindings["health"];
    assert!(health.is_composite());
    assert!(health.as_metric().is_none());
    let rules = health.rules();
    assert_eq!(rules[0].op, Comparator::Lt);
    assert_eq!(rules[0].weight, 1.0);
    assert_eq!(rules[1].op, Comparator::Ge);
    assert_eq!(rules[1].weight, 2.5);
}

#[test]
fn test_aggregation_defaults_to_average() {
    let b: Binding =
        serde_json::from_value(json!({"source": "monitor", "metric": "Percentage CPU"})).unwrap();
    assert_eq!(b.as_metric().unwrap().aggregation, Aggregation::Average);

    for (raw, expected) in [
        ("average", Aggregation::Average),
        ("total", Aggregation::Total),
        ("max", Aggregation::Maximum),
        ("minimum", Aggregation::Minimum),
        ("count", Aggregation::Count),
    ] {
        let b: Binding = serde_json::from_value(
            json!({"source": "monitor", "metric": "m", "aggregation": raw}),
        )
        .unwrap();
        assert_eq!(b.as_metric().unwrap().aggregation, expected);
    }
}

#[test]
fn test_unknown_binding_source_is_rejected() {
    let res: Result<Binding, _> =
        serde_json::from_value(json!({"source": "prometheus", "metric": "up"}));
    assert!(res.is_err());
    let res: Result<HealthRule, _> =
        serde_json::from_value(json!({"metric": "cpu", "op": "=>", "threshold": 1}));
    assert!(res.is_err());
}

#[test]
fn test_binding_resource_falls_back_to_edge_source() {
    let t: Topology = serde_json::from_value(json!({
        "id": "d",
        "nodes": [
            {"id": "a", "resourceRef": "/r/a"},
            {"id": "b", "resourceRef": "/r/b"}
        ],
        "edges": [{
            "id": "a-b", "source": "a", "target": "b",
            "bindings": {
                "throughput": {"source": "monitor", "metric": "Network Out Total"},
                "latency": {"source": "monitor", "metric": "Latency", "resourceRef": "/r/gateway"}
            }
        }]
    }))
    .unwrap();
    let edge = ElementRef::Edge("a-b".into());
    let bindings = t.direct_bindings();
    assert_eq!(bindings.len(), 2);

    let throughput = &bindings[0].2;
    assert_eq!(t.binding_resource(&edge, throughput).as_deref(), Some("/r/a"));
    let latency = &bindings[1].2;
    assert_eq!(t.binding_resource(&edge, latency).as_deref(), Some("/r/gateway"));
}

#[test]
fn test_edge_metric_keys_from_binding_names() {
    assert_eq!(EdgeMetricKey::from_binding_name("throughput"), Some(EdgeMetricKey::Throughput));
    assert_eq!(EdgeMetricKey::from_binding_name("latencyMs"), Some(EdgeMetricKey::Latency));
    assert_eq!(EdgeMetricKey::from_binding_name("errorRate"), Some(EdgeMetricKey::ErrorRate));
    assert_eq!(
        EdgeMetricKey::from_binding_name("requestsPerSec"),
        Some(EdgeMetricKey::RequestsPerSec)
    );
    assert_eq!(EdgeMetricKey::from_binding_name("cpu"), None);
}

#[test]
fn test_alert_severity_from_provider() {
    assert_eq!(AlertSeverity::from_provider("Sev0"), AlertSeverity::Critical);
    assert_eq!(AlertSeverity::from_provider("sev1"), AlertSeverity::Critical);
    assert_eq!(AlertSeverity::from_provider("Sev2"), AlertSeverity::Warning);
    assert_eq!(AlertSeverity::from_provider("Sev3"), AlertSeverity::Info);
    assert_eq!(AlertSeverity::from_provider(""), AlertSeverity::Info);
    assert!(AlertSeverity::Critical < AlertSeverity::Warning);
}

#[test]
fn test_live_enums_serialize_lowercase() {
    assert_eq!(serde_json::to_value(HealthState::Critical).unwrap(), json!("critical"));
    assert_eq!(serde_json::to_value(EdgeStatus::Degraded).unwrap(), json!("degraded"));
    assert_eq!(serde_json::to_value(TrafficLevel::Burst).unwrap(), json!("burst"));
    assert_eq!(serde_json::to_value(AlertSeverity::Info).unwrap(), json!("info"));
}

#[test]
fn test_edge_metrics_serialize_nulls() {
    let m = EdgeMetrics {
        throughput_bps: Some(1.5),
        ..Default::default()
    };
    let v = serde_json::to_value(m).unwrap();
    assert_eq!(
        v,
        json!({"throughputBps": 1.5, "latencyMs": null, "errorRate": null, "requestsPerSec": null})
    );
}
