// Config loading and validation tests

use topolive::config::AppConfig;

const VALID_CONFIG: &str = r#"
[server]
port = 8081
host = "0.0.0.0"

[publishing]
min_refresh_interval_secs = 5
feed_buffer = 4
stats_log_interval_secs = 60

[aggregation]
snapshot_cache_ttl_secs = 30
snapshot_cache_capacity = 20
sparkline_capacity = 20
source_timeout_secs = 20

[topology]
directory = "diagrams"

[sources]
endpoint = "https://telemetry-gateway.internal"
request_timeout_secs = 15
cache_capacity = 512

[sources.platform]
concurrency = 6

[sources.flow_analytics]
workspace_id = "ws-123"

[sources.flow_logs]
storage_account = "flowlogs"
max_blobs = 10
window_secs = 3600

[sources.dependency_graph]
app_id = "app-456"

[sources.alerts]
enabled = false
"#;

const MINIMAL_CONFIG: &str = r#"
[server]
port = 8081
host = "127.0.0.1"

[topology]
directory = "diagrams"

[sources]
endpoint = "http://localhost:9000"
"#;

#[test]
fn test_config_loads_from_str() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.server.port, 8081);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.topology.directory, "diagrams");
    assert_eq!(config.sources.endpoint, "https://telemetry-gateway.internal");
    assert_eq!(config.sources.platform.concurrency, 6);
    assert_eq!(
        config.sources.flow_analytics.workspace_id.as_deref(),
        Some("ws-123")
    );
    assert_eq!(
        config.sources.flow_logs.storage_account.as_deref(),
        Some("flowlogs")
    );
    assert_eq!(config.sources.dependency_graph.app_id.as_deref(), Some("app-456"));
    assert!(!config.sources.alerts.enabled);
    assert!(config.sources.connection_monitor.enabled);
}

#[test]
fn test_config_defaults() {
    let config = AppConfig::load_from_str(MINIMAL_CONFIG).expect("load_from_str");
    assert_eq!(config.publishing.min_refresh_interval_secs, 5);
    assert_eq!(config.publishing.feed_buffer, 4);
    assert_eq!(config.publishing.stats_log_interval_secs, 60);
    assert_eq!(config.aggregation.snapshot_cache_ttl_secs, 30);
    assert_eq!(config.aggregation.snapshot_cache_capacity, 20);
    assert_eq!(config.aggregation.sparkline_capacity, 20);
    assert_eq!(config.aggregation.source_timeout_secs, 20);
    assert_eq!(config.sources.request_timeout_secs, 15);
    assert_eq!(config.sources.cache_capacity, 512);
    assert_eq!(config.sources.platform.concurrency, 6);
    assert!(config.sources.platform.enabled);
    assert!(config.sources.app_telemetry.enabled);
    assert_eq!(config.sources.flow_analytics.workspace_id, None);
    assert_eq!(
        config.sources.flow_logs.container,
        "insights-logs-networksecuritygroupflowevent"
    );
    assert_eq!(config.sources.flow_logs.window_secs, 3600);
}

#[test]
fn test_config_validation_rejects_invalid_port() {
    let bad = VALID_CONFIG.replace("port = 8081", "port = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("server.port"));
}

#[test]
fn test_config_validation_rejects_min_refresh_interval_zero() {
    let bad = VALID_CONFIG.replace(
        "min_refresh_interval_secs = 5",
        "min_refresh_interval_secs = 0",
    );
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("min_refresh_interval_secs"));
}

#[test]
fn test_config_validation_rejects_feed_buffer_zero() {
    let bad = VALID_CONFIG.replace("feed_buffer = 4", "feed_buffer = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("feed_buffer"));
}

#[test]
fn test_config_validation_rejects_stats_log_interval_zero() {
    let bad = VALID_CONFIG.replace("stats_log_interval_secs = 60", "stats_log_interval_secs = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("stats_log_interval_secs"));
}

#[test]
fn test_config_validation_rejects_snapshot_cache_ttl_zero() {
    let bad = VALID_CONFIG.replace("snapshot_cache_ttl_secs = 30", "snapshot_cache_ttl_secs = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("snapshot_cache_ttl_secs"));
}

#[test]
fn test_config_validation_rejects_snapshot_cache_capacity_zero() {
    let bad = VALID_CONFIG.replace("snapshot_cache_capacity = 20", "snapshot_cache_capacity = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("snapshot_cache_capacity"));
}

#[test]
fn test_config_validation_rejects_sparkline_capacity_zero() {
    let bad = VALID_CONFIG.replace("sparkline_capacity = 20", "sparkline_capacity = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("sparkline_capacity"));
}

#[test]
fn test_config_validation_rejects_source_timeout_zero() {
    let bad = VALID_CONFIG.replace("source_timeout_secs = 20", "source_timeout_secs = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("source_timeout_secs"));
}

#[test]
fn test_config_validation_rejects_empty_topology_directory() {
    let bad = VALID_CONFIG.replace("directory = \"diagrams\"", "directory = \"\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("topology.directory"));
}

#[test]
fn test_config_validation_rejects_non_http_endpoint() {
    let bad = VALID_CONFIG.replace(
        "endpoint = \"https://telemetry-gateway.internal\"",
        "endpoint = \"telemetry-gateway.internal\"",
    );
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("sources.endpoint"));
}

#[test]
fn test_config_validation_rejects_request_timeout_zero() {
    let bad = VALID_CONFIG.replace("request_timeout_secs = 15", "request_timeout_secs = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("request_timeout_secs"));
}

#[test]
fn test_config_validation_rejects_cache_capacity_zero() {
    let bad = VALID_CONFIG.replace("cache_capacity = 512", "cache_capacity = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("sources.cache_capacity"));
}

#[test]
fn test_config_validation_rejects_platform_concurrency_zero() {
    let bad = VALID_CONFIG.replace("concurrency = 6", "concurrency = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("sources.platform.concurrency"));
}

#[test]
fn test_config_validation_rejects_max_blobs_zero() {
    let bad = VALID_CONFIG.replace("max_blobs = 10", "max_blobs = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("max_blobs"));
}

#[test]
fn test_config_validation_rejects_flow_log_window_zero() {
    let bad = VALID_CONFIG.replace("window_secs = 3600", "window_secs = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("sources.flow_logs.window_secs"));
}

#[test]
fn test_config_missing_sources_section_fails() {
    let bad = MINIMAL_CONFIG.replace("[sources]\nendpoint = \"http://localhost:9000\"\n", "");
    assert!(AppConfig::load_from_str(&bad).is_err());
}
