use std::sync::{Arc, PoisonError, RwLock};

use ink_types::Player;
use uuid::Uuid;

/// The authenticated player a round is played on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub username: String,
}

impl From<&Player> for Actor {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id,
            username: player.username.clone(),
        }
    }
}

/// Shared "who is signed in" handle. Created at startup (or per connection),
/// signed in on login and signed out on logout. Engines read it at the moment
/// they need an actor instead of caching one.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    actor: Arc<RwLock<Option<Actor>>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(actor: Actor) -> Self {
        let session = Self::new();
        session.sign_in(actor);
        session
    }

    pub fn sign_in(&self, actor: Actor) {
        *self.actor.write().unwrap_or_else(PoisonError::into_inner) = Some(actor);
    }

    pub fn sign_out(&self) {
        *self.actor.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn actor(&self) -> Option<Actor> {
        self.actor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.actor().is_some()
    }
}
