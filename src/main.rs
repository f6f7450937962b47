use anyhow::Result;
use std::sync::Arc;
use tokio::time::Duration;
use topolive::*;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;

    let store = Arc::new(
        topology_repo::InMemoryTopologyStore::load_dir(&app_config.topology.directory).await?,
    );
    let transport: Arc<dyn sources::TelemetryTransport> = Arc::new(sources::HttpTransport::new(
        &app_config.sources.endpoint,
        Duration::from_secs(app_config.sources.request_timeout_secs),
    )?);
    let sources = aggregator::build_sources(&app_config.sources, transport);
    tracing::info!(
        sources = sources.len(),
        endpoint = %app_config.sources.endpoint,
        "telemetry sources configured"
    );
    let aggregator = Arc::new(aggregator::Aggregator::new(
        store,
        sources,
        &app_config.aggregation,
    ));

    let feed_stats = Arc::new(feed::FeedStats::default());
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let stats_handle = feed::spawn_stats_logger(
        aggregator.clone(),
        feed_stats.clone(),
        Duration::from_secs(app_config.publishing.stats_log_interval_secs),
        shutdown_rx,
    );

    let app = routes::app(
        aggregator,
        feed_stats,
        feed::FeedConfig {
            min_refresh_interval: Duration::from_secs(
                app_config.publishing.min_refresh_interval_secs,
            ),
            buffer: app_config.publishing.feed_buffer,
        },
    );
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    let in_container = std::path::Path::new("/.dockerenv").exists()
        || std::env::var("CONTAINER").as_deref() == Ok("1");

    if in_container {
        // In Docker: run server until error or SIGTERM (no signal handler; avoids immediate exit)
        axum::serve(listener, app).await?;
    } else {
        tokio::select! {
            result = axum::serve(listener, app) => {
                result?;
            }
            _ = async {
                #[cfg(unix)]
                {
                    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                        Ok(s) => s,
                        Err(_) => {
                            let _ = tokio::signal::ctrl_c().await;
                            return;
                        }
                    };
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                #[cfg(not(unix))]
                {
                    let _ = tokio::signal::ctrl_c().await;
                }
            } => {
                tracing::info!("Received shutdown signal");
                let _ = shutdown_tx.send(());
                let _ = stats_handle.await;
            }
        }
    }

    Ok(())
}
