use std::sync::{Arc, Mutex, PoisonError};

use ink_core::{LiveFeed, LiveSubscription, RoundEngine, RoundEvent, RoundEventHandler};
use ink_types::{ClientMessage, RoundMode, ServerMessage, Stroke};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::auth::AuthService;
use crate::websocket::connection::{ConnectionId, ConnectionManager};

/// Translates round events into wire messages for one socket.
pub struct ClientEvents {
    sender: mpsc::UnboundedSender<ServerMessage>,
}

impl ClientEvents {
    pub fn new(sender: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self { sender }
    }
}

impl RoundEventHandler for ClientEvents {
    fn handle_event(&mut self, event: RoundEvent) {
        let _ = self.sender.send(server_message_for(event));
    }
}

pub fn server_message_for(event: RoundEvent) -> ServerMessage {
    match event {
        RoundEvent::PhaseChanged { from, to } => ServerMessage::PhaseChanged { from, to },
        RoundEvent::RoundStarted {
            target_word,
            time_limit,
        } => ServerMessage::RoundStarted {
            target_word,
            time_limit_ms: time_limit.as_millis() as u64,
        },
        RoundEvent::ClockTick { elapsed, remaining } => ServerMessage::ClockTick {
            elapsed_ms: elapsed.as_millis() as u64,
            remaining_ms: remaining.as_millis() as u64,
        },
        RoundEvent::AttemptCleared => ServerMessage::AttemptCleared,
        RoundEvent::Judged {
            attempt,
            predicted_word,
        } => ServerMessage::RoundResult {
            attempt,
            predicted_word,
        },
        RoundEvent::Failed { kind, message } => ServerMessage::RoundFailed { kind, message },
    }
}

/// Handles the messages of one socket, which owns its own Round Engine and
/// optional live feed subscription.
#[derive(Clone)]
pub struct MessageHandler {
    connection_id: ConnectionId,
    connection_manager: Arc<ConnectionManager>,
    auth_service: Arc<AuthService>,
    engine: RoundEngine,
    live_feed: LiveFeed,
    live: Arc<Mutex<Option<LiveSubscription>>>,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

impl MessageHandler {
    pub fn new(
        connection_id: ConnectionId,
        connection_manager: Arc<ConnectionManager>,
        auth_service: Arc<AuthService>,
        engine: RoundEngine,
        live_feed: LiveFeed,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        engine.add_handler(Box::new(ClientEvents::new(sender.clone())));
        Self {
            connection_id,
            connection_manager,
            auth_service,
            engine,
            live_feed,
            live: Arc::new(Mutex::new(None)),
            sender,
        }
    }

    pub async fn handle_message(&self, message: ClientMessage) -> Result<(), String> {
        match message {
            ClientMessage::Authenticate { token } => self.handle_authenticate(token).await,
            ClientMessage::SignOut => self.handle_sign_out().await,
            ClientMessage::StartRound { mode } => self.handle_start_round(mode),
            ClientMessage::RecordStroke { stroke } => self.handle_record_stroke(stroke),
            ClientMessage::UpdateSnapshot { image_data_url } => {
                self.ignore_if_rejected("UpdateSnapshot", self.engine.update_snapshot(image_data_url));
                Ok(())
            }
            ClientMessage::UpdateText { text } => {
                self.ignore_if_rejected("UpdateText", self.engine.update_text(text));
                Ok(())
            }
            ClientMessage::ClearAttempt => {
                self.ignore_if_rejected("ClearAttempt", self.engine.clear_attempt());
                Ok(())
            }
            ClientMessage::SubmitAttempt => self.handle_submit_attempt(),
            ClientMessage::CancelRound => {
                self.engine.cancel_round();
                Ok(())
            }
            ClientMessage::RequestDefinition => self.handle_request_definition(),
            ClientMessage::RequestSnapshot => self.send_message(ServerMessage::Snapshot {
                round: self.engine.snapshot(),
            }),
            ClientMessage::SubscribeLiveFeed => self.handle_subscribe_live_feed(),
            ClientMessage::UnsubscribeLiveFeed => {
                self.stop_live_feed();
                Ok(())
            }
            ClientMessage::Heartbeat => Ok(()),
        }
    }

    /// Tears the engine down and stops the live feed. Nothing is sent to the
    /// socket afterwards.
    pub async fn handle_disconnect(&self) {
        self.engine.teardown();
        self.stop_live_feed();
        if let Some(open_for) = self
            .connection_manager
            .remove_connection(self.connection_id)
            .await
        {
            info!(
                "Connection {} closed after {:.1}s",
                self.connection_id,
                open_for.as_secs_f64()
            );
        }
    }

    async fn handle_authenticate(&self, token: String) -> Result<(), String> {
        info!("Authenticating connection {}", self.connection_id);

        match self.auth_service.validate_token(&token) {
            Ok(player) => {
                self.connection_manager
                    .set_connection_player(self.connection_id, token, player.clone())
                    .await;
                self.send_message(ServerMessage::AuthenticationSuccess { player })
            }
            Err(e) => {
                warn!(
                    "Authentication failed for connection {}: {}",
                    self.connection_id, e
                );
                self.send_message(ServerMessage::AuthenticationFailed {
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn handle_sign_out(&self) -> Result<(), String> {
        self.connection_manager
            .clear_connection_player(self.connection_id)
            .await;
        self.send_message(ServerMessage::SignedOut)
    }

    fn handle_start_round(&self, mode: Option<RoundMode>) -> Result<(), String> {
        let changes_mode = mode.is_some();
        let Some(pending) = self.engine.begin_round(mode) else {
            if changes_mode {
                return self.send_error("Cannot change mode while a round is running");
            }
            return Ok(());
        };

        // The word fetch runs off the read loop so CancelRound stays responsive
        let engine = self.engine.clone();
        let connection_id = self.connection_id;
        tokio::spawn(async move {
            if let Err(e) = engine.complete_start(pending).await {
                debug!("Round failed to start for {}: {}", connection_id, e);
            }
        });
        Ok(())
    }

    fn handle_record_stroke(&self, stroke: Stroke) -> Result<(), String> {
        if stroke.points.is_empty() {
            return self.send_error("Stroke has no points");
        }
        self.ignore_if_rejected("RecordStroke", self.engine.record_stroke(stroke));
        Ok(())
    }

    fn handle_submit_attempt(&self) -> Result<(), String> {
        let engine = self.engine.clone();
        let connection_id = self.connection_id;
        tokio::spawn(async move {
            match engine.submit_attempt().await {
                Ok(Some(attempt)) => info!("Connection {} recorded attempt {}", connection_id, attempt.id),
                Ok(None) => {}
                Err(e) => debug!("Submission failed for {}: {}", connection_id, e),
            }
        });
        Ok(())
    }

    fn handle_request_definition(&self) -> Result<(), String> {
        let engine = self.engine.clone();
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let message = match engine.define_target().await {
                Ok(definition) => ServerMessage::Definition {
                    word: definition.word,
                    definition: definition.definition,
                },
                Err(e) => ServerMessage::Error {
                    message: e.to_string(),
                },
            };
            let _ = sender.send(message);
        });
        Ok(())
    }

    fn handle_subscribe_live_feed(&self) -> Result<(), String> {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        if live.is_some() {
            return Ok(());
        }

        let sender = self.sender.clone();
        *live = Some(self.live_feed.subscribe(move |event| {
            let _ = sender.send(ServerMessage::LiveEvent { event });
        }));
        debug!("Connection {} subscribed to the live feed", self.connection_id);
        Ok(())
    }

    fn stop_live_feed(&self) {
        let subscription = self
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
    }

    fn ignore_if_rejected(&self, operation: &str, applied: bool) {
        if !applied {
            debug!(
                "Ignored {} from {} in phase {:?}",
                operation,
                self.connection_id,
                self.engine.phase()
            );
        }
    }

    pub fn send_message(&self, message: ServerMessage) -> Result<(), String> {
        self.sender
            .send(message)
            .map_err(|_| "Connection closed".to_string())
    }

    fn send_error(&self, message: &str) -> Result<(), String> {
        self.send_message(ServerMessage::Error {
            message: message.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ink_types::{Attempt, ErrorKind, RoundPhase};
    use std::time::Duration;

    #[test]
    fn test_event_translation() {
        let message = server_message_for(RoundEvent::ClockTick {
            elapsed: Duration::from_millis(1500),
            remaining: Duration::from_millis(8500),
        });
        assert!(matches!(
            message,
            ServerMessage::ClockTick {
                elapsed_ms: 1500,
                remaining_ms: 8500
            }
        ));

        let message = server_message_for(RoundEvent::RoundStarted {
            target_word: "orbit".to_string(),
            time_limit: Duration::from_secs(10),
        });
        assert!(matches!(
            message,
            ServerMessage::RoundStarted { time_limit_ms: 10_000, .. }
        ));

        let attempt = Attempt {
            id: "a_1".to_string(),
            player: "Jay".to_string(),
            word: "orbit".to_string(),
            is_correct: true,
            time_seconds: 4.2,
            date: "2026-03-01".to_string(),
        };
        let message = server_message_for(RoundEvent::Judged {
            attempt: attempt.clone(),
            predicted_word: Some("orbit".to_string()),
        });
        match message {
            ServerMessage::RoundResult {
                attempt: sent,
                predicted_word,
            } => {
                assert_eq!(sent, attempt);
                assert_eq!(predicted_word.as_deref(), Some("orbit"));
            }
            other => panic!("Expected RoundResult, got {:?}", other),
        }

        assert!(matches!(
            server_message_for(RoundEvent::Failed {
                kind: ErrorKind::UpstreamFailure,
                message: "down".to_string()
            }),
            ServerMessage::RoundFailed {
                kind: ErrorKind::UpstreamFailure,
                ..
            }
        ));
        assert!(matches!(
            server_message_for(RoundEvent::PhaseChanged {
                from: RoundPhase::Idle,
                to: RoundPhase::Countdown
            }),
            ServerMessage::PhaseChanged {
                from: RoundPhase::Idle,
                to: RoundPhase::Countdown
            }
        ));
    }
}
