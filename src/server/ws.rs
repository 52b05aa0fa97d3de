// src/server/ws.rs
//
// WebSocket endpoint. Each socket gets its own bus subscription pumped to
// the client, a heartbeat ping, and a JSON command dispatcher for the
// serial:* message family.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::StreamExt;
use futures::SinkExt;
use serde_json::{json, Value};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::events::Event;
use crate::types::{PortConfigRequest, SendMode, DEFAULT_CHANNEL};

use super::AppState;

/// Ping cadence; a client that misses a pong for one interval is dropped.
const HEARTBEAT: Duration = Duration::from_secs(30);

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscription = state.manager.bus().subscribe();
    info!(
        "[ws] client connected (subscriber {}, {} active)",
        subscription.id(),
        state.manager.bus().subscriber_count()
    );

    // Advertise the decoder set once at connect
    let plugins = json!({
        "type": "plugins:list",
        "plugins": state.decoders.list(),
    });
    if sender.send(Message::Text(plugins.to_string())).await.is_err() {
        return;
    }

    let mut heartbeat = interval(HEARTBEAT);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; treat it as the baseline.
    heartbeat.tick().await;
    let mut pong_seen = true;

    loop {
        tokio::select! {
            event = subscription.recv() => {
                match event {
                    Some(event) => {
                        let message = event_to_message(event.as_ref());
                        if sender.send(Message::Text(message.to_string())).await.is_err() {
                            break;
                        }
                    }
                    // Detached for falling behind; the client reconnects
                    None => {
                        warn!("[ws] subscription dropped, closing socket");
                        break;
                    }
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_client_message(&state, &text).await {
                            if sender.send(Message::Text(reply.to_string())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        pong_seen = true;
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if sender.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("[ws] receive error: {}", e);
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if !pong_seen {
                    info!("[ws] client missed heartbeat, terminating");
                    break;
                }
                pong_seen = false;
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }
    info!("[ws] client disconnected");
}

/// Broadcast rendering of a bus event.
fn event_to_message(event: &Event) -> Value {
    match event {
        Event::Line {
            channel_id,
            entry,
            decoded,
        } => {
            let mut message = json!({
                "type": "serial:data",
                "channelId": channel_id,
                "payload": entry,
            });
            if !decoded.is_empty() {
                message["decoded"] = json!(decoded);
            }
            message
        }
        Event::RawData {
            channel_id,
            bytes,
            timestamp,
        } => json!({
            "type": "serial:raw",
            "channelId": channel_id,
            "hex": hex::encode(bytes),
            "timestamp": timestamp,
        }),
        Event::Connected { channel_id, config } => json!({
            "type": "serial:status",
            "channelId": channel_id,
            "status": "connected",
            "config": config,
        }),
        Event::Disconnected { channel_id } => json!({
            "type": "serial:status",
            "channelId": channel_id,
            "status": "disconnected",
        }),
        Event::ChannelError { channel_id, error } => json!({
            "type": "serial:error",
            "channelId": channel_id,
            "error": error,
        }),
        Event::Cleared { channel_id } => json!({
            "type": "serial:cleared",
            "channelId": channel_id,
        }),
        Event::PortsChanged { ports } => json!({
            "type": "ports:updated",
            "ports": ports,
        }),
    }
}

fn channel_id_of(message: &Value) -> String {
    message["channelId"]
        .as_str()
        .filter(|id| !id.is_empty())
        .unwrap_or(DEFAULT_CHANNEL)
        .to_string()
}

/// Dispatch one inbound client message; the returned value, if any, is a
/// reply to the sender only.
async fn handle_client_message(state: &AppState, text: &str) -> Option<Value> {
    let message: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => {
            return Some(json!({"type": "error", "error": "Invalid message format"}));
        }
    };
    let message_type = match message["type"].as_str() {
        Some(t) => t,
        None => {
            return Some(json!({"type": "error", "error": "Invalid message format"}));
        }
    };
    let channel_id = channel_id_of(&message);

    match message_type {
        "serial:connect" => {
            let request: PortConfigRequest =
                match serde_json::from_value(message["config"].clone()) {
                    Ok(request) => request,
                    Err(_) => {
                        return Some(error_reply(&channel_id, "invalid config"));
                    }
                };
            let config = match request.build() {
                Ok(config) => config,
                Err(e) => return Some(error_reply(&channel_id, e)),
            };
            match state.manager.connect(&channel_id, config).await {
                Ok(()) => None,
                Err(e) => Some(error_reply(&channel_id, e)),
            }
        }
        "serial:disconnect" => {
            state.manager.disconnect(&channel_id).await;
            None
        }
        "serial:send" => {
            let data = message["data"].as_str().unwrap_or_default().to_string();
            let mode: SendMode = serde_json::from_value(message["mode"].clone())
                .unwrap_or_default();
            match state.manager.send(&channel_id, &data, mode) {
                Ok(()) => None,
                Err(e) => Some(error_reply(&channel_id, e)),
            }
        }
        "serial:clear" => {
            state.manager.clear_buffer(&channel_id);
            None
        }
        "serial:getStatus" => {
            if message["channelId"].is_string() {
                Some(json!({
                    "type": "serial:status",
                    "channelId": channel_id,
                    "status": state.manager.get_status(&channel_id),
                }))
            } else {
                Some(json!({
                    "type": "serial:status",
                    "channels": state.manager.status_all(),
                }))
            }
        }
        "channel:remove" => {
            state.manager.remove_channel(&channel_id).await;
            None
        }
        other => Some(json!({
            "type": "error",
            "error": format!("Unknown message type: {}", other),
        })),
    }
}

fn error_reply(channel_id: &str, error: impl ToString) -> Value {
    json!({
        "type": "serial:error",
        "channelId": channel_id,
        "error": error.to_string(),
    })
}

// ============================================================================
// Tests
// ============================================================================
