// WebSocket handler: live capture stream

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant, interval_at, timeout};

use super::AppState;
use crate::models::DeltaCapture;
use crate::monitor::Monitor;
use crate::source::CounterSource;

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Decrements the monitor's client count on drop (connect = +1, drop = -1).
struct WsClientGuard(Arc<Monitor>);

impl Drop for WsClientGuard {
    fn drop(&mut self) {
        self.0.ws_clients().fetch_sub(1, Ordering::Relaxed);
    }
}

type WsSender = SplitSink<WebSocket, Message>;

async fn send(sender: &mut WsSender, message: Message) -> bool {
    matches!(
        timeout(WS_SEND_TIMEOUT, sender.send(message)).await,
        Ok(Ok(()))
    )
}

pub(super) async fn ws_captures<S: CounterSource>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    let tx = state.captures_tx.clone();
    let monitor = state.monitor.clone();
    ws.on_upgrade(move |socket| async move {
        let mut rx = tx.subscribe();
        if let Err(e) = stream_captures(socket, &mut rx, monitor).await {
            tracing::info!("Capture stream error: {}", e);
        }
    })
}

async fn stream_captures(
    socket: WebSocket,
    rx: &mut broadcast::Receiver<Arc<DeltaCapture>>,
    monitor: Arc<Monitor>,
) -> anyhow::Result<()> {
    monitor.ws_clients().fetch_add(1, Ordering::Relaxed);
    let _guard = WsClientGuard(monitor.clone());
    tracing::info!("Client connected to capture stream");

    let (mut sender, mut receiver) = socket.split();
    let welcome = serde_json::json!({ "type": "info", "status": monitor.status() });
    let welcome_json = serde_json::to_string(&welcome)?;
    if !send(&mut sender, Message::Text(welcome_json.into())).await {
        return Ok(());
    }

    // first ping one period after the welcome
    let mut ping_interval = interval_at(Instant::now() + WS_PING_INTERVAL, WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(capture) => {
                        let message = serde_json::json!({
                            "type": "capture",
                            "capture": capture.as_ref(),
                        });
                        let json = serde_json::to_string(&message)?;
                        if !send(&mut sender, Message::Text(json.into())).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // the client refetches /api/series to fill the gap
                        tracing::warn!(
                            "WebSocket /ws/captures client lagged, skipped {} captures",
                            n
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            inbound = receiver.next() => {
                // clients only listen; anything but a close is ignored
                match inbound {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                }
            }
            _ = ping_interval.tick() => {
                if !send(&mut sender, Message::Ping(Bytes::new())).await {
                    break;
                }
            }
        }
    }
    Ok(())
}
