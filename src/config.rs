use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub publishing: PublishingConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    pub topology: TopologyConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishingConfig {
    /// Floor for a diagram's refreshIntervalSec on the live stream.
    #[serde(default = "default_min_refresh_interval_secs")]
    pub min_refresh_interval_secs: u64,
    /// Snapshots buffered per live-feed subscriber (slow clients make the feed wait).
    #[serde(default = "default_feed_buffer")]
    pub feed_buffer: usize,
    /// How often to log app stats (live clients, cycles run) at INFO level.
    #[serde(default = "default_stats_log_interval_secs")]
    pub stats_log_interval_secs: u64,
}

fn default_min_refresh_interval_secs() -> u64 {
    5
}

fn default_feed_buffer() -> usize {
    4
}

fn default_stats_log_interval_secs() -> u64 {
    60
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            min_refresh_interval_secs: default_min_refresh_interval_secs(),
            feed_buffer: default_feed_buffer(),
            stats_log_interval_secs: default_stats_log_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    #[serde(default = "default_snapshot_cache_ttl_secs")]
    pub snapshot_cache_ttl_secs: u64,
    #[serde(default = "default_snapshot_cache_capacity")]
    pub snapshot_cache_capacity: usize,
    /// Samples kept per node history buffer.
    #[serde(default = "default_sparkline_capacity")]
    pub sparkline_capacity: usize,
    /// Deadline for one source's collect call; expiry folds to an empty result.
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,
}

fn default_snapshot_cache_ttl_secs() -> u64 {
    30
}

fn default_snapshot_cache_capacity() -> usize {
    20
}

fn default_sparkline_capacity() -> usize {
    20
}

fn default_source_timeout_secs() -> u64 {
    20
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            snapshot_cache_ttl_secs: default_snapshot_cache_ttl_secs(),
            snapshot_cache_capacity: default_snapshot_cache_capacity(),
            sparkline_capacity: default_sparkline_capacity(),
            source_timeout_secs: default_source_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopologyConfig {
    /// Directory of `*.json` diagram declarations loaded at startup.
    pub directory: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    /// Base URL of the telemetry gateway.
    pub endpoint: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Entries kept per source cache.
    #[serde(default = "default_source_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default)]
    pub platform: PlatformSourceConfig,
    #[serde(default)]
    pub app_telemetry: SourceToggle,
    #[serde(default)]
    pub flow_analytics: FlowAnalyticsConfig,
    #[serde(default)]
    pub flow_logs: FlowLogsConfig,
    #[serde(default)]
    pub connection_monitor: SourceToggle,
    #[serde(default)]
    pub dependency_graph: DependencyGraphConfig,
    #[serde(default)]
    pub alerts: SourceToggle,
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_source_cache_capacity() -> usize {
    512
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_secs() -> u64 {
    60
}

/// Enable flag + cache TTL, for sources with no other settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceToggle {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for SourceToggle {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformSourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Workers pulling metric batches from the shared queue.
    #[serde(default = "default_platform_concurrency")]
    pub concurrency: usize,
}

fn default_platform_concurrency() -> usize {
    6
}

impl Default for PlatformSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_ttl_secs: default_cache_ttl_secs(),
            concurrency: default_platform_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowAnalyticsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_flow_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Log workspace holding traffic analytics; the source is skipped without it.
    #[serde(default)]
    pub workspace_id: Option<String>,
}

fn default_flow_cache_ttl_secs() -> u64 {
    120
}

impl Default for FlowAnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_ttl_secs: default_flow_cache_ttl_secs(),
            workspace_id: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowLogsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_flow_logs_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Storage account holding flow-log blobs; the source is skipped without it.
    #[serde(default)]
    pub storage_account: Option<String>,
    #[serde(default = "default_flow_logs_container")]
    pub container: String,
    /// Most recent blobs read per cycle.
    #[serde(default = "default_flow_logs_max_blobs")]
    pub max_blobs: usize,
    #[serde(default = "default_flow_logs_window_secs")]
    pub window_secs: u64,
}

fn default_flow_logs_cache_ttl_secs() -> u64 {
    300
}

fn default_flow_logs_container() -> String {
    "insights-logs-networksecuritygroupflowevent".into()
}

fn default_flow_logs_max_blobs() -> usize {
    10
}

fn default_flow_logs_window_secs() -> u64 {
    3600
}

impl Default for FlowLogsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_ttl_secs: default_flow_logs_cache_ttl_secs(),
            storage_account: None,
            container: default_flow_logs_container(),
            max_blobs: default_flow_logs_max_blobs(),
            window_secs: default_flow_logs_window_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DependencyGraphConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_flow_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Application-telemetry app holding dependency calls; the source is skipped without it.
    #[serde(default)]
    pub app_id: Option<String>,
}

impl Default for DependencyGraphConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_ttl_secs: default_flow_cache_ttl_secs(),
            app_id: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            self.publishing.min_refresh_interval_secs > 0,
            "publishing.min_refresh_interval_secs must be > 0, got {}",
            self.publishing.min_refresh_interval_secs
        );
        anyhow::ensure!(
            self.publishing.feed_buffer > 0,
            "publishing.feed_buffer must be > 0, got {}",
            self.publishing.feed_buffer
        );
        anyhow::ensure!(
            self.publishing.stats_log_interval_secs > 0,
            "publishing.stats_log_interval_secs must be > 0, got {}",
            self.publishing.stats_log_interval_secs
        );
        anyhow::ensure!(
            self.aggregation.snapshot_cache_ttl_secs > 0,
            "aggregation.snapshot_cache_ttl_secs must be > 0, got {}",
            self.aggregation.snapshot_cache_ttl_secs
        );
        anyhow::ensure!(
            self.aggregation.snapshot_cache_capacity > 0,
            "aggregation.snapshot_cache_capacity must be > 0, got {}",
            self.aggregation.snapshot_cache_capacity
        );
        anyhow::ensure!(
            self.aggregation.sparkline_capacity > 0,
            "aggregation.sparkline_capacity must be > 0, got {}",
            self.aggregation.sparkline_capacity
        );
        anyhow::ensure!(
            self.aggregation.source_timeout_secs > 0,
            "aggregation.source_timeout_secs must be > 0, got {}",
            self.aggregation.source_timeout_secs
        );
        anyhow::ensure!(
            !self.topology.directory.is_empty(),
            "topology.directory must be non-empty"
        );
        anyhow::ensure!(
            self.sources.endpoint.starts_with("http://")
                || self.sources.endpoint.starts_with("https://"),
            "sources.endpoint must be an http(s) URL, got {:?}",
            self.sources.endpoint
        );
        anyhow::ensure!(
            self.sources.request_timeout_secs > 0,
            "sources.request_timeout_secs must be > 0, got {}",
            self.sources.request_timeout_secs
        );
        anyhow::ensure!(
            self.sources.cache_capacity > 0,
            "sources.cache_capacity must be > 0, got {}",
            self.sources.cache_capacity
        );
        anyhow::ensure!(
            self.sources.platform.concurrency > 0,
            "sources.platform.concurrency must be > 0, got {}",
            self.sources.platform.concurrency
        );
        anyhow::ensure!(
            self.sources.flow_logs.max_blobs > 0,
            "sources.flow_logs.max_blobs must be > 0, got {}",
            self.sources.flow_logs.max_blobs
        );
        anyhow::ensure!(
            self.sources.flow_logs.window_secs > 0,
            "sources.flow_logs.window_secs must be > 0, got {}",
            self.sources.flow_logs.window_secs
        );
        Ok(())
    }
}
