use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use ink_core::{Actor, SessionContext};
use ink_types::{Player, ServerMessage};
use tokio::sync::{RwLock, mpsc};
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One open socket. `session` is the same handle its Round Engine checks
/// before recording attempts.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub token: Option<String>,
    pub player: Option<Player>,
    pub session: SessionContext,
    pub connected_at: Instant,
    pub sender: mpsc::UnboundedSender<ServerMessage>,
}

impl Connection {
    pub fn new(id: ConnectionId, session: SessionContext) -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let connection = Self {
            id,
            token: None,
            player: None,
            session,
            connected_at: Instant::now(),
            sender,
        };

        (connection, receiver)
    }

    pub fn is_authenticated(&self) -> bool {
        self.player.is_some()
    }

    pub fn set_player(&mut self, token: String, player: Player) {
        self.session.sign_in(Actor::from(&player));
        self.token = Some(token);
        self.player = Some(player);
    }

    pub fn clear_player(&mut self) {
        self.session.sign_out();
        self.token = None;
        self.player = None;
    }

    pub fn send_message(&self, message: ServerMessage) -> Result<(), String> {
        self.sender
            .send(message)
            .map_err(|_| "Connection closed".to_string())
    }
}

#[derive(Default)]
pub struct ConnectionManager {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_connection(
        &self,
        id: ConnectionId,
        session: SessionContext,
    ) -> (mpsc::UnboundedSender<ServerMessage>, mpsc::UnboundedReceiver<ServerMessage>) {
        let (connection, receiver) = Connection::new(id, session);
        let sender = connection.sender.clone();
        self.connections.write().await.insert(id, connection);
        (sender, receiver)
    }

    /// Drops the connection and returns how long it was open.
    pub async fn remove_connection(&self, id: ConnectionId) -> Option<Duration> {
        self.connections
            .write()
            .await
            .remove(&id)
            .map(|connection| connection.connected_at.elapsed())
    }

    pub async fn set_connection_player(&self, id: ConnectionId, token: String, player: Player) {
        if let Some(connection) = self.connections.write().await.get_mut(&id) {
            connection.set_player(token, player);
        }
    }

    pub async fn clear_connection_player(&self, id: ConnectionId) {
        if let Some(connection) = self.connections.write().await.get_mut(&id) {
            connection.clear_player();
        }
    }

    /// Signs out every socket that authenticated with `token` and tells each
    /// one. Returns how many were signed out.
    pub async fn revoke_token(&self, token: &str) -> usize {
        let mut connections = self.connections.write().await;
        let mut revoked = 0;
        for connection in connections.values_mut() {
            if connection.token.as_deref() == Some(token) {
                connection.clear_player();
                let _ = connection.send_message(ServerMessage::SignedOut);
                revoked += 1;
            }
        }
        revoked
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn authenticated_count(&self) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|connection| connection.is_authenticated())
            .count()
    }
}
