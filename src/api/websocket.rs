use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::api::handlers::handle_client_action;
use crate::api::state::AppState;
use crate::api::types::{ClientAction, ErrorFrame};

/// WebSocket handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe to broadcast channel
    let mut rx = state.ws_tx.subscribe();
    // Replies meant only for this client
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(16);

    let send_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                msg = rx.recv() => match msg {
                    Ok(json) => json,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("WebSocket client lagged, skipped {} messages", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                Some(reply) = reply_rx.recv() => reply,
            };

            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    info!("WebSocket client connected");
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                let outcome = match serde_json::from_str::<ClientAction>(&text) {
                    Ok(action) => handle_client_action(&state, action)
                        .await
                        .map_err(|e| e.to_string()),
                    Err(e) => Err(format!("invalid frame: {}", e)),
                };
                if let Err(reason) = outcome {
                    debug!("Rejecting client frame: {}", reason);
                    match serde_json::to_string(&ErrorFrame::new(reason)) {
                        Ok(json) => {
                            let _ = reply_tx.send(json).await;
                        }
                        Err(e) => error!("Failed to serialize error frame: {}", e),
                    }
                }
            }
            Message::Close(_) => {
                break;
            }
            _ => {}
        }
    }

    // Abort the send task when connection closes
    send_task.abort();

    info!("WebSocket connection closed");
}
