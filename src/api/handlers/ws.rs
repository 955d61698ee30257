use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use crate::models::ActivityEvent;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Replay buffered events with a sequence number above this before streaming.
    pub since: Option<u64>,
}

pub async fn handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.since))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, since: Option<u64>) {
    tracing::info!(since = ?since, "Activity WebSocket client connected");

    // Subscribe before reading the backlog so nothing falls in between.
    let mut rx = state.ctx.activity.subscribe();
    let mut last_seq = since.unwrap_or(0);

    if since.is_some() {
        for event in state.ctx.activity.recent(usize::MAX) {
            if event.seq <= last_seq {
                continue;
            }
            last_seq = event.seq;
            if !send_event(&mut socket, &event).await {
                return;
            }
        }
    }

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Ok(event) if event.seq <= last_seq => {}
                    Ok(event) => {
                        last_seq = event.seq;
                        if !send_event(&mut socket, &event).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Activity WS client lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            client_msg = socket.recv() => {
                match client_msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::info!("Activity WebSocket client disconnected");
}

/// False once the client is gone.
async fn send_event(socket: &mut WebSocket, event: &ActivityEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json)).await.is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize activity event");
            true
        }
    }
}
