// HTTP + WebSocket routes

mod http;
mod ws;

use axum::{Router, routing::get};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::aggregator::Aggregator;
use crate::feed::{FeedConfig, FeedStats};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) aggregator: Arc<Aggregator>,
    pub(crate) feed_stats: Arc<FeedStats>,
    pub(crate) feed: FeedConfig,
}

/// `?overlays=false` drops fault impacts and the heatmap from the payload.
#[derive(Debug, Deserialize)]
pub(crate) struct LiveQuery {
    #[serde(default = "default_overlays")]
    pub(crate) overlays: bool,
}

fn default_overlays() -> bool {
    true
}

pub fn app(aggregator: Arc<Aggregator>, feed_stats: Arc<FeedStats>, feed: FeedConfig) -> Router {
    let state = AppState {
        aggregator,
        feed_stats,
        feed,
    };
    Router::new()
        .route("/", get(|| async { "topolive: live topology aggregation" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        // GET /api/diagrams/{id}/live
        .route("/api/diagrams/{id}/live", get(http::live_snapshot_handler))
        .route("/ws/diagrams/{id}/live", get(ws::ws_live)) // WS /ws/diagrams/{id}/live
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
