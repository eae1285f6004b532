use futures_util::{SinkExt, StreamExt};
use ink_core::{RoundEngine, SessionContext};
use tracing::{error, info, warn};
use warp::ws::{Message, WebSocket};

use crate::state::AppState;
use ink_types::{ClientMessage, ServerMessage};

pub mod connection;
pub mod handlers;
pub mod rate_limiter;

use connection::ConnectionId;
pub use connection::ConnectionManager;
use handlers::MessageHandler;
use rate_limiter::RateLimiter;

pub async fn handle_connection(websocket: WebSocket, state: AppState) {
    let connection_id = ConnectionId::new();
    info!("New WebSocket connection: {}", connection_id);

    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let mut rate_limiter = RateLimiter::new_with_limits(state.ws_max_messages, state.ws_refill);

    let session = SessionContext::new();
    let (sender, message_receiver) = state
        .connections
        .create_connection(connection_id, session.clone())
        .await;

    let engine = RoundEngine::new(
        state.round_config.clone(),
        state.judge.clone(),
        state.words.clone(),
        state.ranking.clone(),
        session,
    );
    let message_handler = MessageHandler::new(
        connection_id,
        state.connections.clone(),
        state.auth.clone(),
        engine,
        state.live_feed,
        sender,
    );

    // Handle incoming messages
    let incoming_handler = {
        let message_handler = message_handler.clone();

        async move {
            while let Some(result) = ws_receiver.next().await {
                match result {
                    Ok(msg) => {
                        if msg.is_close() {
                            break;
                        }
                        if let Err(e) =
                            handle_message(msg, &mut rate_limiter, &message_handler, connection_id)
                                .await
                        {
                            error!("Error handling message for {}: {}", connection_id, e);
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("WebSocket error for {}: {}", connection_id, e);
                        break;
                    }
                }
            }
        }
    };

    // Handle outgoing messages
    let outgoing_handler = async move {
        let mut receiver = message_receiver;

        while let Some(message) = receiver.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize message: {:?}", e);
                    continue;
                }
            };

            if let Err(e) = ws_sender.send(Message::text(json)).await {
                warn!("Failed to send message to {}: {:?}", connection_id, e);
                break;
            }
        }
    };

    tokio::select! {
        _ = incoming_handler => {},
        _ = outgoing_handler => {},
    }

    info!("Connection {} disconnected", connection_id);
    message_handler.handle_disconnect().await;
}

/// Errors returned here close the connection. Malformed messages are
/// answered instead.
async fn handle_message(
    msg: Message,
    rate_limiter: &mut RateLimiter,
    message_handler: &MessageHandler,
    connection_id: ConnectionId,
) -> Result<(), String> {
    if !rate_limiter.check_rate_limit() {
        warn!("Rate limit exceeded for connection {}", connection_id);
        return Err("Rate limit exceeded".to_string());
    }

    // Only handle text messages
    if !msg.is_text() {
        return Ok(());
    }

    let text = msg.to_str().map_err(|_| "Invalid text message".to_string())?;

    let client_message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Invalid message from {}: {}", connection_id, e);
            return message_handler.send_message(ServerMessage::Error {
                message: format!("Invalid JSON message: {}", e),
            });
        }
    };

    message_handler
        .handle_message(client_message)
        .await
        .map_err(|e| format!("Message handling error: {}", e))
}
