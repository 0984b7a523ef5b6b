use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use sighub_core::{Broadcaster, Frame};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::messages::route_message;
use crate::state::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4();
    let mut outbound = state.hub.subscribe();
    let _session = state.hub.open_session();
    info!(session = %session_id, "Session connected");

    let (mut sender, mut receiver) = socket.split();

    // Forward broadcast traffic to this client.
    let forward_task = tokio::spawn(async move {
        loop {
            match outbound.recv().await {
                Ok(text) => {
                    if sender.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(session = %session_id, skipped, "Session lagging, frames dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                handle_frame(&state, session_id, text.as_str().to_owned()).await;
            }
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(session = %session_id, error = %e, "Session read error");
                break;
            }
        }
    }

    forward_task.abort();
    info!(session = %session_id, "Session disconnected");
}

/// Decode and route one frame on its own task, so that a failing branch
/// cannot take the session down with it.
async fn handle_frame(state: &Arc<AppState>, session_id: Uuid, text: String) {
    let frame = match Frame::decode(&text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(session = %session_id, error = %e, "Undecodable frame");
            return;
        }
    };

    let state = state.clone();
    let task = tokio::spawn(async move {
        match frame {
            Frame::Signal(signal) => {
                debug!(session = %session_id, id = ?signal.id, "Signal received");
                let hub: &dyn Broadcaster = &state.hub;
                state.dispatcher.dispatch(signal, Some(hub)).await;
            }
            Frame::Message(message) => {
                debug!(session = %session_id, kind = ?message.kind, "Message received");
                route_message(&state, message).await;
            }
        }
    });

    if let Err(e) = task.await {
        error!(session = %session_id, error = %e, "Frame handler failed");
    }
}
