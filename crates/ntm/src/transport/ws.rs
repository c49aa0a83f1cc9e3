// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket hub: each socket is one bus subscriber.
//!
//! Frames are JSON envelopes `{type, id?, method?, event?, params?, result?,
//! error?}` correlated by `id`. High-frequency `pane.output` events are
//! coalesced into array batches (at most `batch_size` events or
//! `batch_window`, whichever comes first); clients treat each array element
//! as an independent event.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::bus::{Filter, Subscription};
use crate::event::Event;
use crate::transport::{ErrorBody, Store};

/// Frame direction/kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    Event,
    Request,
    Response,
    Error,
}

/// The wire envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsFrame {
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// A single event object, or an array for batches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl WsFrame {
    fn event(value: serde_json::Value) -> Self {
        Self {
            frame_type: FrameType::Event,
            id: None,
            method: None,
            event: Some(value),
            params: None,
            result: None,
            error: None,
        }
    }

    fn response(id: Option<u64>, result: serde_json::Value) -> Self {
        Self {
            frame_type: FrameType::Response,
            id,
            method: None,
            event: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<u64>, code: &str, message: &str) -> Self {
        Self {
            frame_type: FrameType::Error,
            id,
            method: None,
            event: None,
            params: None,
            result: None,
            error: Some(ErrorBody {
                code: code.to_owned(),
                message: message.to_owned(),
                details: None,
            }),
        }
    }

    fn ping(id: u64) -> Self {
        Self {
            frame_type: FrameType::Request,
            id: Some(id),
            method: Some("ping".to_owned()),
            event: None,
            params: None,
            result: None,
            error: None,
        }
    }
}

/// `GET /api/v1/ws/global`
pub async fn ws_global_handler(
    State(state): State<Arc<Store>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(state, socket, Filter::all()))
}

/// `GET /api/v1/ws/sessions/{name}/watch`
pub async fn ws_session_handler(
    State(state): State<Arc<Store>>,
    Path(name): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(state, socket, Filter::for_session(name)))
}

async fn next_event(subscription: &mut Option<Subscription>) -> Option<Event> {
    match subscription {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}

/// Per-connection event loop.
async fn handle_connection(state: Arc<Store>, socket: WebSocket, filter: Filter) {
    state.ws_client_count.fetch_add(1, Ordering::Relaxed);
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subscription = Some(state.bus.subscribe(filter));

    let mut batch: Vec<Event> = Vec::new();
    let mut batch_deadline: Option<Instant> = None;
    let mut ping_timer = tokio::time::interval(state.ws.ping_interval);
    ping_timer.tick().await; // immediate first tick
    let mut ping_id: u64 = 0;
    let mut pong_deadline: Option<Instant> = None;

    loop {
        let flush_at = batch_deadline.unwrap_or_else(|| Instant::now() + state.ws.batch_window * 1000);
        let pong_at = pong_deadline.unwrap_or_else(|| Instant::now() + state.ws.pong_timeout * 1000);

        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            event = next_event(&mut subscription) => {
                let Some(event) = event else { break };
                if event.kind.topic() == "pane.output" {
                    batch.push(event);
                    if batch.len() >= state.ws.batch_size {
                        if flush_batch(&mut ws_tx, &mut batch).await.is_err() {
                            break;
                        }
                        batch_deadline = None;
                    } else if batch_deadline.is_none() {
                        batch_deadline = Some(Instant::now() + state.ws.batch_window);
                    }
                } else {
                    // Preserve order: drain any pending batch first.
                    if flush_batch(&mut ws_tx, &mut batch).await.is_err() {
                        break;
                    }
                    batch_deadline = None;
                    let Ok(value) = serde_json::to_value(&event) else { continue };
                    if send_frame(&mut ws_tx, &WsFrame::event(value)).await.is_err() {
                        break;
                    }
                }
            }

            _ = tokio::time::sleep_until(flush_at), if batch_deadline.is_some() => {
                if flush_batch(&mut ws_tx, &mut batch).await.is_err() {
                    break;
                }
                batch_deadline = None;
            }

            _ = ping_timer.tick() => {
                ping_id += 1;
                if send_frame(&mut ws_tx, &WsFrame::ping(ping_id)).await.is_err() {
                    break;
                }
                if pong_deadline.is_none() {
                    pong_deadline = Some(Instant::now() + state.ws.pong_timeout);
                }
            }

            _ = tokio::time::sleep_until(pong_at), if pong_deadline.is_some() => {
                // No pong within the timeout: close the socket.
                break;
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(_)) | None => break,
                };
                match msg {
                    Message::Text(text) => {
                        pong_deadline = None;
                        let frame: WsFrame = match serde_json::from_str(&text) {
                            Ok(frame) => frame,
                            Err(_) => {
                                let err = WsFrame::error(None, "invalid_argument", "unparseable frame");
                                if send_frame(&mut ws_tx, &err).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                        };
                        if let Some(reply) = handle_request(&state, frame, &mut subscription).await {
                            if send_frame(&mut ws_tx, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Message::Pong(_) => {
                        pong_deadline = None;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    state.ws_client_count.fetch_sub(1, Ordering::Relaxed);
}

/// Handle one inbound request frame. Supported methods: `subscribe`,
/// `unsubscribe`, `ping` (and `pong` replies to server pings).
async fn handle_request(
    state: &Store,
    frame: WsFrame,
    subscription: &mut Option<Subscription>,
) -> Option<WsFrame> {
    match frame.frame_type {
        FrameType::Request => {}
        // Responses (e.g. pong to our ping) carry no follow-up.
        FrameType::Response => return None,
        _ => return Some(WsFrame::error(frame.id, "invalid_argument", "expected a request frame")),
    }
    match frame.method.as_deref() {
        Some("ping") => Some(WsFrame::response(frame.id, serde_json::json!("pong"))),
        Some("pong") => None,
        Some("subscribe") => {
            let filter: Filter = frame
                .params
                .and_then(|p| serde_json::from_value(p).ok())
                .unwrap_or_default();
            *subscription = Some(state.bus.subscribe(filter.clone()));
            Some(WsFrame::response(
                frame.id,
                serde_json::json!({ "subscribed": true, "filter": filter }),
            ))
        }
        Some("unsubscribe") => {
            *subscription = None;
            Some(WsFrame::response(frame.id, serde_json::json!({ "subscribed": false })))
        }
        _ => Some(WsFrame::error(frame.id, "invalid_argument", "unknown method")),
    }
}

async fn flush_batch(
    tx: &mut SplitSink<WebSocket, Message>,
    batch: &mut Vec<Event>,
) -> Result<(), ()> {
    if batch.is_empty() {
        return Ok(());
    }
    let events: Vec<serde_json::Value> =
        batch.drain(..).filter_map(|e| serde_json::to_value(e).ok()).collect();
    let frame = WsFrame::event(serde_json::Value::Array(events));
    send_frame(tx, &frame).await
}

async fn send_frame(tx: &mut SplitSink<WebSocket, Message>, frame: &WsFrame) -> Result<(), ()> {
    let text = serde_json::to_string(frame).map_err(|_| ())?;
    tx.send(Message::Text(text.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
