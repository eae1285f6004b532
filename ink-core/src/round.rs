use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ink_types::{
    Attempt, NewAttempt, RoundMode, RoundPhase, RoundSnapshot, Stroke, WordDefinition,
    round_to_tenth,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::RoundError;
use crate::events::{RoundEvent, RoundEventBus, RoundEventHandler};
use crate::judging::{Judge, Submission};
use crate::ranking::RankingEngine;
use crate::session::{Actor, SessionContext};
use crate::ticker::Ticker;
use crate::words::{WordSource, pick};

/// Attempts shorter than this are recorded as this long.
pub const MIN_ATTEMPT_DURATION: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundConfig {
    pub timed_limit: Duration,
    pub practice_limit: Duration,
    pub tick: Duration,
}

impl RoundConfig {
    pub fn time_limit(&self, mode: &RoundMode) -> Duration {
        match mode {
            RoundMode::Timed => self.timed_limit,
            RoundMode::Practice { .. } => self.practice_limit,
        }
    }
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            timed_limit: Duration::from_secs(10),
            practice_limit: Duration::from_secs(20),
            tick: Duration::from_millis(100),
        }
    }
}

/// The round currently on the canvas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Round {
    pub target_word: Option<String>,
    pub phase: RoundPhase,
    pub elapsed: Duration,
    pub strokes: Vec<Stroke>,
    pub submitted_text: Option<String>,
    pub image_data_url: Option<String>,
}

impl Round {
    pub fn point_count(&self) -> usize {
        self.strokes.iter().map(|stroke| stroke.points.len()).sum()
    }

    fn clear_input(&mut self) {
        self.strokes.clear();
        self.submitted_text = None;
        self.image_data_url = None;
    }

    fn reset(&mut self) {
        self.target_word = None;
        self.elapsed = Duration::ZERO;
        self.clear_input();
    }

    fn submission(&self) -> Submission {
        Submission {
            image_data_url: self.image_data_url.clone(),
            typed_text: self.submitted_text.clone(),
            stroke_count: self.strokes.len(),
            point_count: self.point_count(),
        }
    }
}

/// Recorded duration: elapsed time floored at [`MIN_ATTEMPT_DURATION`], in
/// seconds with one decimal.
pub fn attempt_seconds(elapsed: Duration) -> f64 {
    round_to_tenth(elapsed.max(MIN_ATTEMPT_DURATION).as_secs_f64())
}

struct RoundState {
    round: Round,
    mode: RoundMode,
    epoch: u64,
    torn_down: bool,
    clock: Option<Ticker>,
    bus: RoundEventBus,
}

impl RoundState {
    fn is_current(&self, epoch: u64) -> bool {
        !self.torn_down && self.epoch == epoch
    }

    fn is_active(&self) -> bool {
        !self.torn_down && self.round.phase == RoundPhase::Active
    }

    fn set_phase(&mut self, to: RoundPhase) {
        let from = self.round.phase;
        if from == to {
            return;
        }
        debug_assert!(from.can_transition_to(to), "illegal transition {from:?} -> {to:?}");
        self.round.phase = to;
        debug!("Round phase {:?} -> {:?}", from, to);
        self.bus.publish(RoundEvent::PhaseChanged { from, to });
    }

    /// Ends the round with an error. Anything still in flight for this round
    /// is invalidated.
    fn fail(&mut self, err: &RoundError) {
        warn!("Round failed ({:?}): {}", err.kind(), err);
        self.epoch += 1;
        self.set_phase(RoundPhase::Idle);
        self.bus.publish(RoundEvent::Failed {
            kind: err.kind(),
            message: err.to_string(),
        });
    }
}

struct Shared {
    state: Mutex<RoundState>,
    config: RoundConfig,
    judge: Judge,
    words: Arc<dyn WordSource>,
    ranking: Arc<RankingEngine>,
    session: SessionContext,
}

/// A round sitting in `Countdown` until its target word arrives.
#[derive(Debug)]
pub struct PendingStart {
    epoch: u64,
    mode: RoundMode,
}

/// Everything judging needs, captured when the round leaves `Active`.
struct PendingJudgment {
    epoch: u64,
    actor: Actor,
    target: String,
    submission: Submission,
    elapsed: Duration,
}

/// Drives one player's rounds: word fetch, clock, judging and recording.
///
/// State lives behind a short-held mutex that is never held across an
/// `.await`. Before each suspension point the phase already shows the next
/// state (`Countdown`, `Submitted`), so repeated calls hit the phase guard.
/// Every round has an epoch, and an async continuation whose epoch is no longer
/// current (new round, cancellation, teardown) is dropped without touching
/// state or publishing.
///
/// Calls that are not valid in the current phase are no-ops.
#[derive(Clone)]
pub struct RoundEngine {
    shared: Arc<Shared>,
}

impl RoundEngine {
    pub fn new(
        config: RoundConfig,
        judge: Judge,
        words: Arc<dyn WordSource>,
        ranking: Arc<RankingEngine>,
        session: SessionContext,
    ) -> Self {
        let state = RoundState {
            round: Round::default(),
            mode: RoundMode::default(),
            epoch: 0,
            torn_down: false,
            clock: None,
            bus: RoundEventBus::new(),
        };

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                config,
                judge,
                words,
                ranking,
                session,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RoundState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_handler(&self, handler: Box<dyn RoundEventHandler>) {
        let mut state = self.lock();
        if !state.torn_down {
            state.bus.add_handler(handler);
        }
    }

    /// Channel that receives every event published from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RoundEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.add_handler(Box::new(tx));
        rx
    }

    pub fn session(&self) -> &SessionContext {
        &self.shared.session
    }

    pub fn config(&self) -> &RoundConfig {
        &self.shared.config
    }

    pub fn phase(&self) -> RoundPhase {
        self.lock().round.phase
    }

    pub fn round(&self) -> Round {
        self.lock().round.clone()
    }

    pub fn mode(&self) -> RoundMode {
        self.lock().mode.clone()
    }

    pub fn is_torn_down(&self) -> bool {
        self.lock().torn_down
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        let state = self.lock();
        let round = &state.round;
        RoundSnapshot {
            target_word: round.target_word.clone(),
            phase: round.phase,
            mode: state.mode.clone(),
            elapsed_ms: round.elapsed.as_millis() as u64,
            time_limit_ms: self.shared.config.time_limit(&state.mode).as_millis() as u64,
            stroke_count: round.strokes.len() as u32,
            point_count: round.point_count() as u32,
            submitted_text: round.submitted_text.clone(),
            has_snapshot: round.image_data_url.is_some(),
        }
    }

    /// Moves to `Countdown` under `mode` (or the current mode), fetches a
    /// target word and starts the clock. Returns the phase the engine is in
    /// afterwards; a round already in progress is left alone.
    pub async fn start_round_with(&self, mode: Option<RoundMode>) -> Result<RoundPhase, RoundError> {
        match self.begin_round(mode) {
            Some(pending) => self.complete_start(pending).await,
            None => Ok(self.phase()),
        }
    }

    pub async fn start_round(&self) -> Result<RoundPhase, RoundError> {
        self.start_round_with(None).await
    }

    /// The synchronous half of a start: checks the phase, applies `mode` and
    /// enters `Countdown` under one lock. `None` when a round is running or
    /// the engine is torn down.
    pub fn begin_round(&self, mode: Option<RoundMode>) -> Option<PendingStart> {
        let (pending, stale_clock) = {
            let mut state = self.lock();
            if state.torn_down || !state.round.phase.accepts_start() {
                debug!("Ignoring start in {:?}", state.round.phase);
                return None;
            }
            if let Some(mode) = mode {
                state.mode = mode;
            }
            state.epoch += 1;
            let clock = state.clock.take();
            state.set_phase(RoundPhase::Countdown);
            state.round.reset();
            let pending = PendingStart {
                epoch: state.epoch,
                mode: state.mode.clone(),
            };
            (pending, clock)
        };
        stop(stale_clock);
        Some(pending)
    }

    /// Fetches the word for a round begun with [`RoundEngine::begin_round`].
    /// A fetch that lands after a cancel or a newer start is discarded.
    pub async fn complete_start(&self, pending: PendingStart) -> Result<RoundPhase, RoundError> {
        let PendingStart { epoch, mode } = pending;
        let fetched = self.fetch_target(&mode).await;

        let mut state = self.lock();
        if !state.is_current(epoch) {
            debug!("Discarding word fetch for stale round {}", epoch);
            return Ok(state.round.phase);
        }

        match fetched {
            Ok(word) => {
                let time_limit = self.shared.config.time_limit(&mode);
                state.round.reset();
                state.round.target_word = Some(word.clone());
                state.set_phase(RoundPhase::Active);
                state.bus.publish(RoundEvent::RoundStarted {
                    target_word: word,
                    time_limit,
                });
                state.clock = Some(self.spawn_clock(epoch));
                info!("Round {} started ({:?} limit)", epoch, time_limit);
                Ok(RoundPhase::Active)
            }
            Err(err) => {
                state.fail(&err);
                Err(err)
            }
        }
    }

    async fn fetch_target(&self, mode: &RoundMode) -> Result<String, RoundError> {
        let word = match mode {
            RoundMode::Timed => {
                self.shared
                    .words
                    .next_word()
                    .await
                    .map_err(RoundError::upstream)?
                    .word
            }
            RoundMode::Practice { level } => {
                let set = self
                    .shared
                    .words
                    .practice_words(level)
                    .await
                    .map_err(RoundError::upstream)?;
                pick(&set.words).ok_or_else(|| {
                    RoundError::UpstreamFailure(format!("No practice words for level {}", set.level))
                })?
            }
        };

        let word = word.trim().to_string();
        if word.is_empty() {
            return Err(RoundError::upstream("Word source returned an empty word"));
        }
        Ok(word)
    }

    fn spawn_clock(&self, epoch: u64) -> Ticker {
        let shared = Arc::downgrade(&self.shared);
        let tick = self.shared.config.tick;
        Ticker::spawn(tick, move || match shared.upgrade() {
            Some(shared) => RoundEngine { shared }.on_clock(epoch, tick),
            None => ControlFlow::Break(()),
        })
    }

    fn on_clock(&self, epoch: u64, delta: Duration) -> ControlFlow<()> {
        let mut state = self.lock();
        if !state.is_current(epoch) || !state.is_active() {
            return ControlFlow::Break(());
        }
        if self.tick_locked(&mut state, delta) {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Advances elapsed time and submits on timeout. Returns true when the
    /// round left `Active`.
    fn tick_locked(&self, state: &mut RoundState, delta: Duration) -> bool {
        let limit = self.shared.config.time_limit(&state.mode);
        state.round.elapsed = (state.round.elapsed + delta).min(limit);
        let elapsed = state.round.elapsed;
        state.bus.publish(RoundEvent::ClockTick {
            elapsed,
            remaining: limit.saturating_sub(elapsed),
        });

        if elapsed < limit {
            return false;
        }

        info!("Round {} ran out of time after {:?}", state.epoch, limit);
        if let Ok(pending) = self.begin_submit(state) {
            let engine = self.clone();
            tokio::spawn(async move {
                // The outcome reaches the views through the event bus.
                let _ = engine.finish_round(pending).await;
            });
        }
        true
    }

    /// Drives the round clock by hand. Returns the phase afterwards.
    ///
    /// Must be called from within a tokio runtime: a tick that reaches the
    /// time limit spawns the judging of the timed-out attempt.
    pub fn advance_clock(&self, delta: Duration) -> RoundPhase {
        let (phase, clock) = {
            let mut state = self.lock();
            if !state.is_active() {
                return state.round.phase;
            }
            let clock = if self.tick_locked(&mut state, delta) {
                state.clock.take()
            } else {
                None
            };
            (state.round.phase, clock)
        };
        stop(clock);
        phase
    }

    pub fn record_stroke(&self, stroke: Stroke) -> bool {
        self.with_active("record_stroke", |round| round.strokes.push(stroke))
    }

    pub fn update_snapshot(&self, image_data_url: String) -> bool {
        self.with_active("update_snapshot", |round| {
            round.image_data_url = Some(image_data_url)
        })
    }

    pub fn update_text(&self, text: String) -> bool {
        self.with_active("update_text", |round| round.submitted_text = Some(text))
    }

    /// Discards strokes, typed text and snapshot. The phase is unchanged.
    pub fn clear_attempt(&self) -> bool {
        let mut state = self.lock();
        if !state.is_active() {
            debug!("Ignoring clear_attempt in {:?}", state.round.phase);
            return false;
        }
        state.round.clear_input();
        state.bus.publish(RoundEvent::AttemptCleared);
        true
    }

    fn with_active(&self, op: &str, update: impl FnOnce(&mut Round)) -> bool {
        let mut state = self.lock();
        if !state.is_active() {
            debug!("Ignoring {} in {:?}", op, state.round.phase);
            return false;
        }
        update(&mut state.round);
        true
    }

    /// Judges the current attempt and records it. `Ok(None)` means the call
    /// was ignored or the round was cancelled while judging.
    pub async fn submit_attempt(&self) -> Result<Option<Attempt>, RoundError> {
        let (pending, clock) = {
            let mut state = self.lock();
            if !state.is_active() {
                debug!("Ignoring submit_attempt in {:?}", state.round.phase);
                return Ok(None);
            }
            let clock = state.clock.take();
            (self.begin_submit(&mut state), clock)
        };
        stop(clock);

        self.finish_round(pending?).await
    }

    fn begin_submit(&self, state: &mut RoundState) -> Result<PendingJudgment, RoundError> {
        let Some(actor) = self.shared.session.actor() else {
            let err = RoundError::AuthorizationRequired;
            state.fail(&err);
            return Err(err);
        };

        state.set_phase(RoundPhase::Submitted);
        Ok(PendingJudgment {
            epoch: state.epoch,
            actor,
            target: state.round.target_word.clone().unwrap_or_default(),
            submission: state.round.submission(),
            elapsed: state.round.elapsed,
        })
    }

    async fn finish_round(&self, pending: PendingJudgment) -> Result<Option<Attempt>, RoundError> {
        let epoch = pending.epoch;
        let judged = self
            .shared
            .judge
            .judge(&pending.target, &pending.submission)
            .await;

        let judgment = {
            let mut state = self.lock();
            if !state.is_current(epoch) {
                debug!("Discarding judgment for stale round {}", epoch);
                return Ok(None);
            }
            match judged {
                Ok(judgment) => judgment,
                Err(err) => {
                    state.fail(&err);
                    return Err(err);
                }
            }
        };

        let record = NewAttempt::new(
            pending.actor.username,
            pending.target,
            judgment.is_correct,
            attempt_seconds(pending.elapsed),
        );
        let recorded = self.shared.ranking.add_attempt(record).await;

        let mut state = self.lock();
        if !state.is_current(epoch) {
            debug!("Round {} ended while its attempt was being recorded", epoch);
            return Ok(None);
        }

        match recorded {
            Ok(attempt) => {
                state.set_phase(RoundPhase::Result);
                state.bus.publish(RoundEvent::Judged {
                    attempt: attempt.clone(),
                    predicted_word: judgment.predicted_word,
                });
                Ok(Some(attempt))
            }
            Err(e) => {
                let err = RoundError::UpstreamFailure(format!("Could not record attempt: {e}"));
                state.fail(&err);
                Err(err)
            }
        }
    }

    /// Forces the engine back to `Idle`, dropping the current round.
    pub fn cancel_round(&self) {
        let clock = {
            let mut state = self.lock();
            if state.torn_down {
                return;
            }
            state.epoch += 1;
            let clock = state.clock.take();
            if state.round.phase != RoundPhase::Idle {
                info!("Round cancelled in {:?}", state.round.phase);
                state.set_phase(RoundPhase::Idle);
            }
            state.round.reset();
            clock
        };
        stop(clock);
    }

    /// Stops the clock, detaches every handler and turns all later calls into
    /// no-ops. Work still in flight is discarded when it completes.
    pub fn teardown(&self) {
        let clock = {
            let mut state = self.lock();
            if state.torn_down {
                return;
            }
            state.torn_down = true;
            state.epoch += 1;
            state.round = Round::default();
            state.bus.clear();
            state.clock.take()
        };
        stop(clock);
        info!("Round engine torn down");
    }

    /// Definition of the current target word.
    pub async fn define_target(&self) -> Result<WordDefinition, RoundError> {
        let target = self
            .lock()
            .round
            .target_word
            .clone()
            .ok_or_else(|| RoundError::InputValidation("No target word yet".to_string()))?;

        self.shared
            .words
            .definition(&target)
            .await
            .map_err(RoundError::upstream)
    }
}

/// Cancels a clock taken out of the state. Must run after the state lock is
/// released, since a pending tick may be waiting on it.
fn stop(clock: Option<Ticker>) {
    if let Some(clock) = clock {
        clock.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_seconds() {
        assert_eq!(attempt_seconds(Duration::ZERO), 0.1);
        assert_eq!(attempt_seconds(Duration::from_millis(40)), 0.1);
        assert_eq!(attempt_seconds(Duration::from_millis(6_240)), 6.2);
        assert_eq!(attempt_seconds(Duration::from_millis(6_250)), 6.3);
        assert_eq!(attempt_seconds(Duration::from_secs(10)), 10.0);
    }

    #[test]
    fn test_time_limits() {
        let config = RoundConfig::default();
        assert_eq!(config.time_limit(&RoundMode::Timed), Duration::from_secs(10));
        assert_eq!(
            config.time_limit(&RoundMode::Practice {
                level: ink_types::PracticeLevel::Hard
            }),
            Duration::from_secs(20)
        );
    }

    #[test]
    fn test_round_point_count() {
        let mut round = Round::default();
        round.strokes.push(Stroke {
            id: "s1".to_string(),
            points: vec![
                ink_types::Point { x: 0.0, y: 0.0, timestamp_ms: 0 },
                ink_types::Point { x: 1.0, y: 1.0, timestamp_ms: 16 },
            ],
        });
        round.strokes.push(Stroke {
            id: "s2".to_string(),
            points: vec![ink_types::Point { x: 2.0, y: 2.0, timestamp_ms: 40 }],
        });

        let submission = round.submission();
        assert_eq!(submission.stroke_count, 2);
        assert_eq!(submission.point_count, 3);
    }
}
