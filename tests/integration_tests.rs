// Integration tests: HTTP and WebSocket endpoints

mod common;

use axum_test::TestServer;
use common::*;
use std::sync::Arc;
use tokio::time::Duration;

use topolive::aggregator::Aggregator;
use topolive::config::AppConfig;
use topolive::feed::{FeedConfig, FeedStats};
use topolive::models::*;
use topolive::routes;
use topolive::sources::{MetricSource, PartialMetrics, SourceKind};

const TEST_CONFIG: &str = r#"
[server]
port = 8081
host = "0.0.0.0"

[publishing]
min_refresh_interval_secs = 1
feed_buffer = 2

[topology]
directory = "diagrams"

[sources]
endpoint = "http://gateway.test"
"#;

fn test_app_config() -> AppConfig {
    AppConfig::load_from_str(TEST_CONFIG).unwrap()
}

/// Chain A -> B -> C -> D where A -> B carries traffic.
async fn test_app() -> axum::Router {
    let config = test_app_config();
    let mut traffic = PartialMetrics::empty();
    traffic.traffic.insert(
        "A-B".into(),
        EdgeMetrics {
            throughput_bps: Some(2_000.0),
            ..Default::default()
        },
    );
    let sources: Vec<Arc<dyn MetricSource>> =
        vec![FixedSource::new(SourceKind::FlowAnalytics, traffic)];
    let mut diagram = chain();
    diagram.settings.refresh_interval_sec = 1;
    let aggregator = Arc::new(Aggregator::new(
        store_with(vec![diagram]).await,
        sources,
        &config.aggregation,
    ));
    routes::app(
        aggregator,
        Arc::new(FeedStats::default()),
        FeedConfig {
            min_refresh_interval: Duration::from_secs(config.publishing.min_refresh_interval_secs),
            buffer: config.publishing.feed_buffer,
        },
    )
}

/// Build TestServer with http_transport (required for WebSocket tests).
async fn test_server_with_http() -> TestServer {
    TestServer::builder()
        .http_transport()
        .build(test_app().await)
}

#[tokio::test]
async fn test_root_endpoint() {
    let server = TestServer::new(test_app().await);
    let response = server.get("/").await;
    response.assert_status_ok();
    response.assert_text("topolive: live topology aggregation");
}

#[tokio::test]
async fn test_version_endpoint() {
    let server = TestServer::new(test_app().await);
    let response = server.get("/version").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json.get("name").and_then(|v| v.as_str()), Some("topolive"));
    assert!(json.get("version").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn test_live_snapshot_endpoint() {
    let server = TestServer::new(test_app().await);
    let response = server.get("/api/diagrams/chain/live").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["diagramId"], "chain");
    assert_eq!(json["topology"]["nodeCount"], 4);
    assert_eq!(json["topology"]["edgeCount"], 3);
    assert_eq!(json["edges"][0]["id"], "A-B");
    assert_eq!(json["edges"][0]["status"], "normal");
    assert_eq!(json["edges"][0]["trafficLevel"], "burst");
    assert_eq!(json["heatmap"]["cells"][0]["normalizedValue"], 1.0);
    assert!(json["faultImpacts"].is_array());
}

#[tokio::test]
async fn test_live_snapshot_without_overlays() {
    let server = TestServer::new(test_app().await);
    let response = server.get("/api/diagrams/chain/live?overlays=false").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert!(json.get("faultImpacts").is_none());
    assert!(json.get("heatmap").is_none());
    assert_eq!(json["nodes"].as_array().map(Vec::len), Some(4));
}

#[tokio::test]
async fn test_live_snapshot_unknown_diagram() {
    let server = TestServer::new(test_app().await);
    let response = server.get("/api/diagrams/missing/live").await;
    response.assert_status_not_found();
    let json: serde_json::Value = response.json();
    assert_eq!(json["error"], "diagram not found: missing");
}

#[tokio::test]
async fn test_live_snapshot_cached_for_same_caller() {
    let server = TestServer::new(test_app().await);
    let first: Snapshot = server
        .get("/api/diagrams/chain/live")
        .authorization_bearer("token-a")
        .await
        .json();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second: Snapshot = server
        .get("/api/diagrams/chain/live")
        .authorization_bearer("token-a")
        .await
        .json();
    assert_eq!(first.generated_at, second.generated_at);
}

// --- WebSocket message tests (require http_transport + ws feature) ---
// Receive until we get valid JSON (server may send Ping first).

async fn receive_first_json_text<T: serde::de::DeserializeOwned>(
    ws: &mut axum_test::TestWebSocket,
) -> T {
    let deadline = tokio::time::Instant::now() + tokio::time::Duration::from_secs(3);
    loop {
        let text = ws.receive_text().await;
        if let Ok(v) = serde_json::from_str::<T>(&text) {
            return v;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for JSON"
        );
    }
}

#[tokio::test]
async fn test_ws_live_receives_snapshots() {
    let server = test_server_with_http().await;
    let mut ws = server
        .get_websocket("/ws/diagrams/chain/live")
        .await
        .into_websocket()
        .await;
    let first: Snapshot = receive_first_json_text(&mut ws).await;
    assert_eq!(first.diagram_id, "chain");
    assert_eq!(first.nodes.len(), 4);
    assert!(first.heatmap.is_some());

    // Next cycle arrives after the diagram's refresh interval.
    let second: Snapshot = receive_first_json_text(&mut ws).await;
    assert_eq!(second.diagram_id, "chain");
}

#[tokio::test]
async fn test_ws_live_without_overlays() {
    let server = test_server_with_http().await;
    let mut ws = server
        .get_websocket("/ws/diagrams/chain/live?overlays=false")
        .await
        .into_websocket()
        .await;
    let json: serde_json::Value = receive_first_json_text(&mut ws).await;
    assert_eq!(json["diagramId"], "chain");
    assert!(json.get("heatmap").is_none());
    assert!(json.get("faultImpacts").is_none());
}

#[tokio::test]
async fn test_ws_live_unknown_diagram_sends_error() {
    let server = test_server_with_http().await;
    let mut ws = server
        .get_websocket("/ws/diagrams/missing/live")
        .await
        .into_websocket()
        .await;
    let json: serde_json::Value = receive_first_json_text(&mut ws).await;
    assert_eq!(json["type"], "error");
    assert_eq!(json["error"], "diagram not found: missing");
}
