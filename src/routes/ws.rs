// WebSocket live stream: one text frame per aggregation cycle

use axum::{
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::IntoResponse,
};
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};

use super::http::identity_from;
use super::{AppState, LiveQuery};
use crate::feed::{self, FeedItem};

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

pub(super) async fn ws_live(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(diagram_id): Path<String>,
    Query(query): Query<LiveQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let identity = identity_from(&headers);
    ws.on_upgrade(move |socket| async move {
        let (rx, handle) = feed::subscribe(
            state.aggregator.clone(),
            state.feed_stats.clone(),
            diagram_id.clone(),
            identity,
            state.feed,
        );
        if let Err(e) = stream_live(socket, rx, query.overlays).await {
            tracing::info!(diagram = %diagram_id, error = %e, "live stream error");
        }
        handle.abort();
    })
}

/// Sends one frame within WS_SEND_TIMEOUT; false when the client is gone or too slow.
async fn send_frame(socket: &mut WebSocket, message: Message) -> bool {
    matches!(timeout(WS_SEND_TIMEOUT, socket.send(message)).await, Ok(Ok(())))
}

async fn stream_live(
    mut socket: WebSocket,
    mut rx: mpsc::Receiver<FeedItem>,
    overlays: bool,
) -> anyhow::Result<()> {
    tracing::info!("Client connected to live stream");
    let mut ping_interval = tokio::time::interval(WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; pings start one interval in.
    ping_interval.tick().await;
    loop {
        tokio::select! {
            item = rx.recv() => {
                match item {
                    Some(Ok(snapshot)) => {
                        let payload = if overlays { snapshot } else { snapshot.without_overlays() };
                        let json = serde_json::to_string(&payload)?;
                        if !send_frame(&mut socket, Message::Text(json.into())).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        let frame = serde_json::json!({ "type": "error", "error": e.to_string() });
                        let json = serde_json::to_string(&frame)?;
                        if send_frame(&mut socket, Message::Text(json.into())).await {
                            let _ = send_frame(&mut socket, Message::Close(None)).await;
                        }
                        break;
                    }
                    None => break,
                }
            }
            _ = ping_interval.tick() => {
                if !send_frame(&mut socket, Message::Ping(Bytes::new())).await {
                    break;
                }
            }
        }
    }
    Ok(())
}
