//! WebSocket live feed.
//!
//! # Protocol
//!
//! ```text
//! client → {"type":"subscribe","symbol":"BTCUSDT","market_type":"spot","data_type":"trades"}
//! server → {"type":"subscribed","symbol":"BTCUSDT","market_type":"spot","data_type":"trades"}
//! server → {"type":"data","symbol":"BTCUSDT",...,"data":[...]}   (once per interval)
//! client → {"type":"unsubscribe",...}
//! server → {"type":"unsubscribed",...}
//! ```
//!
//! Rejected requests get `{"type":"error","error":"..."}`. Closing the
//! socket cancels every feed the connection owns.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::AppState;
use crate::domain::subscription::ClientId;
use crate::infrastructure::broadcast::{
    ClientMessage, ServerMessage, SharedBroadcaster, SubscriptionBroadcaster,
};

/// Outbound queue per connection.
const OUTBOUND_CAPACITY: usize = 64;

/// WebSocket upgrade handler: `GET /ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let client = state.next_client_id();
    let (sender, receiver) = socket.split();
    serve_connection(Arc::clone(state.broadcaster()), client, sender, receiver).await;
}

/// Pump one connection until either side closes, then cancel the client's
/// feeds.
async fn serve_connection<S, R>(
    broadcaster: SharedBroadcaster,
    client: ClientId,
    mut sender: S,
    mut receiver: R,
) where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Send,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin + Send + 'static,
{
    debug!(client, "WebSocket client connected");
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(OUTBOUND_CAPACITY);

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(client, error = %e, "Failed to serialize feed message"),
            }
        }
    });

    let feeds = Arc::clone(&broadcaster);
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let reply = handle_client_message(&feeds, client, text.as_str(), &tx).await;
                    if let Some(reply) = reply
                        && tx.send(reply).await.is_err()
                    {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    debug!(client, error = %e, "WebSocket receive error");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    broadcaster.disconnect(client);
    debug!(client, "WebSocket client disconnected");
}

/// Apply one client message. Returns the reply to queue, if any.
async fn handle_client_message(
    broadcaster: &SubscriptionBroadcaster,
    client: ClientId,
    text: &str,
    sink: &mpsc::Sender<ServerMessage>,
) -> Option<ServerMessage> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(client, error = %e, "Invalid feed message");
            return Some(ServerMessage::error("Invalid message"));
        }
    };

    match message {
        ClientMessage::Subscribe(request) => broadcaster
            .subscribe(client, &request, sink.clone())
            .await
            .err()
            .map(ServerMessage::error),
        ClientMessage::Unsubscribe(request) => Some(match broadcaster.unsubscribe(client, &request) {
            Ok((key, _)) => ServerMessage::Unsubscribed { key },
            Err(e) => ServerMessage::error(e),
        }),
    }
}
