// Live feed: one timer loop per subscriber re-running the aggregation at the diagram's refresh
// interval. Ticks never overlap; a slow cycle makes the next tick skip rather than queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::aggregator::Aggregator;
use crate::error::AggregateError;
use crate::identity::Identity;
use crate::models::Snapshot;

#[derive(Debug, Clone, Copy)]
pub struct FeedConfig {
    /// Floor for the diagram's refresh interval.
    pub min_refresh_interval: Duration,
    /// Snapshots buffered per subscriber before the loop waits on the consumer.
    pub buffer: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            min_refresh_interval: Duration::from_secs(5),
            buffer: 4,
        }
    }
}

/// Counters shared by all feeds, reported by the stats logger.
#[derive(Debug, Default)]
pub struct FeedStats {
    pub live_clients: AtomicUsize,
    pub snapshots_sent: AtomicU64,
}

/// Decrements the live-client count when a feed loop ends.
struct LiveClientGuard(Arc<FeedStats>);

impl Drop for LiveClientGuard {
    fn drop(&mut self) {
        self.0.live_clients.fetch_sub(1, Ordering::Relaxed);
    }
}

pub type FeedItem = Result<Snapshot, AggregateError>;

/// Starts a feed for `diagram_id`. The loop ends when the receiver is dropped or after it has
/// delivered a `NotFound` error.
pub fn subscribe(
    aggregator: Arc<Aggregator>,
    stats: Arc<FeedStats>,
    diagram_id: String,
    identity: Option<Identity>,
    config: FeedConfig,
) -> (mpsc::Receiver<FeedItem>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.buffer.max(1));
    stats.live_clients.fetch_add(1, Ordering::Relaxed);
    let guard = LiveClientGuard(stats.clone());

    let handle = tokio::spawn(async move {
        let _guard = guard;
        let refresh = match aggregator.topology(&diagram_id).await {
            Some(t) => Duration::from_secs(t.settings.refresh_interval_sec)
                .max(config.min_refresh_interval),
            None => {
                let _ = tx.send(Err(AggregateError::NotFound(diagram_id))).await;
                return;
            }
        };
        let mut tick = interval(refresh);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(diagram = %diagram_id, refresh_secs = refresh.as_secs(), "live feed started");

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let result = aggregator.refresh(&diagram_id, identity.as_ref()).await;
                    let done = result.is_err();
                    if tx.send(result).await.is_err() {
                        break;
                    }
                    stats.snapshots_sent.fetch_add(1, Ordering::Relaxed);
                    if done {
                        break;
                    }
                }
                _ = tx.closed() => break,
            }
        }
        debug!(diagram = %diagram_id, "live feed stopped");
    });
    (rx, handle)
}

/// Logs live clients, snapshots sent and cycles computed at INFO on every tick until shutdown.
pub fn spawn_stats_logger(
    aggregator: Arc<Aggregator>,
    stats: Arc<FeedStats>,
    every: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stats_log_tick = interval(every);
        stats_log_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick completes immediately; skip it so the first report covers a full interval.
        stats_log_tick.tick().await;
        loop {
            tokio::select! {
                _ = stats_log_tick.tick() => {
                    info!(
                        live_clients = stats.live_clients.load(Ordering::Relaxed),
                        snapshots_sent = stats.snapshots_sent.load(Ordering::Relaxed),
                        cycles_total = aggregator.cycles_total(),
                        "app stats"
                    );
                }
                _ = &mut shutdown_rx => {
                    debug!("stats logger shutting down");
                    break;
                }
            }
        }
    })
}
