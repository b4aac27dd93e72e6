//! WebSocket endpoint producers upload clips through.

use super::super::AppState;
use crate::application::ingest::IngestSession;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::time::Duration;

/// Sent to a connection replaced by a newer one for the same source
pub const CLOSE_SUPERSEDED: u16 = 4000;
/// Sent when the token is not an accepted source
pub const CLOSE_UNKNOWN_SOURCE: u16 = 4404;
const CLOSE_GOING_AWAY: u16 = 1001;

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub async fn handle(
    ws: WebSocketUpgrade,
    Path(token): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, token, state))
}

fn close_frame(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

async fn handle_socket(socket: WebSocket, token: String, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let handle = match state.registry.connect(&token) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(source = %token, error = %e, "Rejected producer connection");
            let _ = sender
                .send(close_frame(CLOSE_UNKNOWN_SOURCE, "unknown source"))
                .await;
            return;
        }
    };
    let Some(source) = state.registry.get(&token) else {
        return;
    };
    tracing::info!(source = %token, epoch = handle.epoch, "Producer connected");

    let mut session = IngestSession::new(
        source,
        handle.epoch,
        state.limits,
        state.queue.clone(),
        state.enqueue_timeout,
    );
    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);

    let close = loop {
        tokio::select! {
            _ = handle.superseded.cancelled() => {
                break Some(close_frame(CLOSE_SUPERSEDED, "source superseded"));
            }
            _ = state.shutdown.cancelled() => {
                break Some(close_frame(CLOSE_GOING_AWAY, "server shutting down"));
            }
            _ = sweep.tick() => session.sweep(),
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(ack) = session.on_text(&text).await {
                        match serde_json::to_string(&ack) {
                            Ok(json) => {
                                if sender.send(Message::Text(json)).await.is_err() {
                                    break None;
                                }
                            }
                            Err(e) => tracing::error!(error = %e, "Failed to encode ack"),
                        }
                    }
                }
                Some(Ok(Message::Binary(data))) => session.on_binary(&data),
                Some(Ok(Message::Ping(data))) => {
                    let _ = sender.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => break None,
                Some(Err(e)) => {
                    tracing::debug!(source = %token, error = %e, "WebSocket error");
                    break None;
                }
            }
        }
    };

    if let Some(frame) = close {
        let _ = sender.send(frame).await;
    }
    state.registry.disconnect(&token, handle.epoch);
    tracing::info!(
        source = %token,
        epoch = handle.epoch,
        open_assemblies = session.open_assemblies(),
        "Producer disconnected"
    );
}
