use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use ink_types::{LiveEvent, LiveEventKind, round_to_tenth};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::ticker::Ticker;

pub const DEFAULT_LIVE_INTERVAL: Duration = Duration::from_millis(3000);
/// How many events a display keeps.
pub const LIVE_WINDOW: usize = 6;

const PLAYERS: &[&str] = &["Seth", "Mia", "Avery", "Jay", "Sky"];
const WORDS: &[&str] = &["planet", "orbit", "echo", "nova", "flux"];
const NEW_RECORD_CHANCE: f64 = 0.35;
const FINISHED_CORRECT_CHANCE: f64 = 0.75;

/// Synthesizes "someone else just played" events.
#[derive(Debug, Clone)]
pub struct LiveEventGenerator {
    rng: StdRng,
}

impl LiveEventGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic sequence, for tests and demos.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn next_event(&mut self) -> LiveEvent {
        let kind = if self.rng.random_bool(NEW_RECORD_CHANCE) {
            LiveEventKind::NewRecord
        } else {
            LiveEventKind::AttemptFinished
        };
        let is_correct = match kind {
            LiveEventKind::NewRecord => true,
            LiveEventKind::AttemptFinished => self.rng.random_bool(FINISHED_CORRECT_CHANCE),
        };
        let player = PLAYERS[self.rng.random_range(0..PLAYERS.len())];
        let word = WORDS[self.rng.random_range(0..WORDS.len())];
        let time_seconds = round_to_tenth(self.rng.random_range(4.0..8.0));
        let now = Utc::now();

        LiveEvent {
            id: format!(
                "evt_{}_{}",
                now.timestamp_millis(),
                self.rng.random_range(0..1000)
            ),
            kind,
            player: player.to_string(),
            word: word.to_string(),
            time_seconds,
            is_correct,
            created_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

impl Default for LiveEventGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LiveFeed {
    interval: Duration,
}

impl LiveFeed {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn subscribe<F>(&self, on_event: F) -> LiveSubscription
    where
        F: FnMut(LiveEvent) + Send + 'static,
    {
        self.subscribe_with(LiveEventGenerator::new(), on_event)
    }

    /// Starts generating one event per interval until the subscription is
    /// cancelled. The first event arrives one interval after subscribing.
    pub fn subscribe_with<F>(&self, mut generator: LiveEventGenerator, mut on_event: F) -> LiveSubscription
    where
        F: FnMut(LiveEvent) + Send + 'static,
    {
        debug!("Live feed subscribed ({:?} interval)", self.interval);
        let ticker = Ticker::spawn(self.interval, move || {
            on_event(generator.next_event());
            ControlFlow::Continue(())
        });
        LiveSubscription { ticker }
    }
}

impl Default for LiveFeed {
    fn default() -> Self {
        Self::new(DEFAULT_LIVE_INTERVAL)
    }
}

/// Running live feed. Dropping it stops generation; `unsubscribe` also
/// guarantees the callback is not running when it returns.
pub struct LiveSubscription {
    ticker: Ticker,
}

impl LiveSubscription {
    pub fn unsubscribe(self) {
        self.ticker.cancel();
        debug!("Live feed unsubscribed");
    }

    pub fn is_active(&self) -> bool {
        !self.ticker.is_cancelled()
    }
}

/// Most recent live events, newest first.
#[derive(Debug, Clone)]
pub struct LiveEventWindow {
    events: VecDeque<LiveEvent>,
    capacity: usize,
}

impl LiveEventWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, event: LiveEvent) {
        self.events.push_front(event);
        self.events.truncate(self.capacity);
    }

    pub fn events(&self) -> Vec<LiveEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for LiveEventWindow {
    fn default() -> Self {
        Self::new(LIVE_WINDOW)
    }
}
