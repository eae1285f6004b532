use std::time::Duration;

use ink_types::{Attempt, ErrorKind, RoundPhase};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum RoundEvent {
    PhaseChanged {
        from: RoundPhase,
        to: RoundPhase,
    },
    RoundStarted {
        target_word: String,
        time_limit: Duration,
    },
    ClockTick {
        elapsed: Duration,
        remaining: Duration,
    },
    AttemptCleared,
    Judged {
        attempt: Attempt,
        predicted_word: Option<String>,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
}

impl RoundEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RoundEvent::Judged { .. } | RoundEvent::Failed { .. })
    }
}

/// Receives every event an engine publishes. Handlers run while the engine's
/// state is locked, so they must not call back into the engine.
pub trait RoundEventHandler: Send {
    fn handle_event(&mut self, event: RoundEvent);
}

impl RoundEventHandler for mpsc::UnboundedSender<RoundEvent> {
    fn handle_event(&mut self, event: RoundEvent) {
        // A closed receiver means the view went away; teardown will follow.
        let _ = self.send(event);
    }
}

/// Fan-out of round events to the attached views.
#[derive(Default)]
pub struct RoundEventBus {
    handlers: Vec<Box<dyn RoundEventHandler>>,
}

impl RoundEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&mut self, handler: Box<dyn RoundEventHandler>) {
        self.handlers.push(handler);
    }

    pub fn publish(&mut self, event: RoundEvent) {
        for handler in &mut self.handlers {
            handler.handle_event(event.clone());
        }
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}
