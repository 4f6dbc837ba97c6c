//! WebSocket transport for one client connection.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use sketchroom_core::Relay;
use tracing::{debug, warn};

use crate::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state.relay))
}

/// Pump frames between the socket and the relay until either side ends.
async fn handle_socket(socket: WebSocket, relay: Arc<Relay>) {
    let (mut session, mut outbound) = relay.accept();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        relay.handle_text(&mut session, text.as_str());
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!("Ignoring {} byte binary frame from {}", data.len(), session.client_id());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", session.client_id(), e);
                        break;
                    }
                }
            }

            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = sender.send(Message::Text(frame.to_string().into())).await {
                    debug!("Send to {} failed: {}", session.client_id(), e);
                    break;
                }
            }
        }
    }

    relay.close(session);
}
