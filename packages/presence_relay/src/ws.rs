//! WebSocket Transport
//!
//! Adapts one axum WebSocket to the relay: a writer task drains the
//! connection's outbox into the socket while the reader loop feeds inbound
//! frames to [`Relay::receive`]. However the socket ends, [`Relay::close`]
//! runs exactly once afterwards.

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior, interval_at, timeout};
use tracing::{debug, info, warn};

use crate::config::WebSocketConfig;
use crate::registry::ConnectionId;
use crate::relay::Relay;

/// Drive a WebSocket connection until it closes or fails.
pub async fn handle_relay_ws(socket: WebSocket, relay: Arc<Relay>, config: WebSocketConfig) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<String>(config.outbox_capacity);

    let mut session = relay.open(tx).await;
    let conn_id = session.id();

    let writer_handle = tokio::spawn(writer_task(ws_sender, rx, config.ping_interval, conn_id));

    loop {
        let next = match config.idle_timeout {
            Some(limit) => match timeout(limit, ws_receiver.next()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(conn_id = %conn_id, idle_secs = limit.as_secs(), "Connection idle, closing");
                    break;
                }
            },
            None => ws_receiver.next().await,
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                relay.receive(&session, text.as_str()).await;
            }
            Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                Ok(text) => {
                    relay.receive(&session, text).await;
                }
                Err(_) => {
                    debug!(conn_id = %conn_id, len = data.len(), "Dropping non-UTF-8 binary frame");
                }
            },
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
            Some(Ok(Message::Close(frame))) => {
                info!(conn_id = %conn_id, reason = ?frame, "Client initiated close");
                break;
            }
            Some(Err(e)) => {
                warn!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
            None => {
                debug!(conn_id = %conn_id, "WebSocket stream ended");
                break;
            }
        }
    }

    relay.close(&mut session).await;
    writer_handle.abort();
}

/// Forward outbox messages to the socket, pinging on `ping_interval`.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<String>,
    ping_interval: Option<Duration>,
    conn_id: ConnectionId,
) {
    let mut ping_timer = ping_interval.map(|period| {
        // First ping one period after connect, not immediately.
        let mut timer = interval_at(tokio::time::Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        timer
    });

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(json) = msg else { break };
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    debug!(conn_id = %conn_id, "WebSocket send failed, stopping writer");
                    break;
                }
            }
            _ = next_tick(&mut ping_timer) => {
                if ws_sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
