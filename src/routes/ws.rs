// WebSocket push channel: one socket per client

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use std::sync::Arc;
use tokio::time::{Duration, timeout};
use uuid::Uuid;

use super::AppState;
use crate::models::{SubscribeReply, SubscribeRequest};
use crate::orchestrator::Orchestrator;

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Disconnects the client from the engine when the socket task ends, however it ends.
struct ClientGuard {
    orchestrator: Arc<Orchestrator>,
    client: String,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.orchestrator.disconnect(&self.client);
    }
}

pub(super) async fn ws_client(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let orchestrator = state.orchestrator.clone();
    ws.on_upgrade(move |socket| async move {
        let client = Uuid::new_v4().to_string();
        if let Err(e) = stream_client(socket, orchestrator, client).await {
            tracing::info!("Client stream error: {}", e);
        }
    })
}

async fn stream_client(
    mut socket: WebSocket,
    orchestrator: Arc<Orchestrator>,
    client: String,
) -> anyhow::Result<()> {
    let mut pushes = orchestrator.connect(&client);
    let _guard = ClientGuard {
        orchestrator: orchestrator.clone(),
        client: client.clone(),
    };

    let mut ping_interval =
        tokio::time::interval_at(tokio::time::Instant::now() + WS_PING_INTERVAL, WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<SubscribeRequest>(text.as_str()) {
                            Ok(request) => orchestrator.subscribe(&client, &request),
                            Err(e) => SubscribeReply::rejected(format!("invalid subscribe message: {}", e)),
                        };
                        let json = serde_json::to_string(&serde_json::json!({ "reply": reply }))?;
                        let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Text(json.into()))).await;
                        if r.is_err() || r.unwrap_or(Ok(())).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            push = pushes.recv() => {
                match push {
                    Some(message) => {
                        let json = serde_json::to_string(&message)?;
                        let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Text(json.into()))).await;
                        if r.is_err() || r.unwrap_or(Ok(())).is_err() {
                            break;
                        }
                    }
                    // Channel closed by the engine (heartbeat expired).
                    None => break,
                }
            }
            _ = ping_interval.tick() => {
                let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Ping(Bytes::new()))).await;
                if r.is_err() || r.unwrap_or(Ok(())).is_err() {
                    break;
                }
            }
        }
    }
    Ok(())
}
