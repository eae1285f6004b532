#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use ink_core::{
    Actor, AttemptStore, Judge, MemoryAttemptStore, RankingEngine, RecognitionService,
    RoundConfig, RoundEngine, RoundEvent, RoundEventHandler, SessionContext, WordSource,
};
use ink_types::{Attempt, NextWord, PracticeLevel, PracticeWords, Point, Stroke, WordDefinition};
use tokio::sync::{Notify, mpsc};
use uuid::Uuid;

pub const PNG_DATA_URL: &str = "data:image/png;base64,iVBORw0KGgo=";

pub fn create_test_actor(name: &str) -> Actor {
    Actor {
        id: Uuid::new_v4(),
        username: name.to_string(),
    }
}

pub fn signed_in_session(name: &str) -> SessionContext {
    SessionContext::signed_in(create_test_actor(name))
}

pub fn create_test_stroke(points: usize) -> Stroke {
    Stroke {
        id: Uuid::new_v4().to_string(),
        points: (0..points)
            .map(|i| Point {
                x: i as f64,
                y: i as f64 * 2.0,
                timestamp_ms: i as u64 * 16,
            })
            .collect(),
    }
}

/// Word source that always hands out the same word.
pub struct FixedWords(pub &'static str);

#[async_trait]
impl WordSource for FixedWords {
    async fn next_word(&self) -> Result<NextWord> {
        Ok(NextWord {
            word: self.0.to_string(),
        })
    }

    async fn practice_words(&self, level: &PracticeLevel) -> Result<PracticeWords> {
        let words = match level {
            PracticeLevel::Custom { words } => words.clone(),
            _ => vec![self.0.to_string()],
        };
        Ok(PracticeWords {
            level: level.name().to_string(),
            words,
        })
    }

    async fn definition(&self, word: &str) -> Result<WordDefinition> {
        Ok(WordDefinition {
            word: word.to_string(),
            definition: format!("definition of {word}"),
        })
    }
}

pub struct FailingWords;

#[async_trait]
impl WordSource for FailingWords {
    async fn next_word(&self) -> Result<NextWord> {
        Err(anyhow!("word service unavailable"))
    }

    async fn practice_words(&self, _level: &PracticeLevel) -> Result<PracticeWords> {
        Err(anyhow!("word service unavailable"))
    }

    async fn definition(&self, _word: &str) -> Result<WordDefinition> {
        Err(anyhow!("word service unavailable"))
    }
}

/// Word source whose `next_word` waits until released.
pub struct GatedWords {
    pub release: Arc<Notify>,
    pub word: &'static str,
}

#[async_trait]
impl WordSource for GatedWords {
    async fn next_word(&self) -> Result<NextWord> {
        self.release.notified().await;
        Ok(NextWord {
            word: self.word.to_string(),
        })
    }

    async fn practice_words(&self, level: &PracticeLevel) -> Result<PracticeWords> {
        self.release.notified().await;
        Ok(PracticeWords {
            level: level.name().to_string(),
            words: vec![self.word.to_string()],
        })
    }

    async fn definition(&self, word: &str) -> Result<WordDefinition> {
        Ok(WordDefinition {
            word: word.to_string(),
            definition: String::new(),
        })
    }
}

/// Recognizer that answers only after being released.
pub struct GatedRecognizer {
    pub release: Arc<Notify>,
    pub answer: &'static str,
}

#[async_trait]
impl RecognitionService for GatedRecognizer {
    async fn recognize(&self, _image_data_url: &str, _target_word: &str) -> Result<String> {
        self.release.notified().await;
        Ok(self.answer.to_string())
    }
}

pub struct FixedRecognizer(pub &'static str);

#[async_trait]
impl RecognitionService for FixedRecognizer {
    async fn recognize(&self, _image_data_url: &str, _target_word: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}

pub struct BrokenStore;

#[async_trait]
impl AttemptStore for BrokenStore {
    async fn append(&self, _attempt: &Attempt) -> Result<()> {
        Err(anyhow!("disk full"))
    }

    async fn load_all(&self) -> Result<Vec<Attempt>> {
        Ok(Vec::new())
    }
}

pub struct TestEngine {
    pub engine: RoundEngine,
    pub ranking: Arc<RankingEngine>,
    pub events: EventCollector,
}

pub fn create_engine(words: Arc<dyn WordSource>, judge: Judge, session: SessionContext) -> TestEngine {
    let ranking = Arc::new(RankingEngine::new(Arc::new(MemoryAttemptStore::new())));
    create_engine_with_ranking(words, judge, session, ranking)
}

pub fn create_engine_with_ranking(
    words: Arc<dyn WordSource>,
    judge: Judge,
    session: SessionContext,
    ranking: Arc<RankingEngine>,
) -> TestEngine {
    let engine = RoundEngine::new(RoundConfig::default(), judge, words, ranking.clone(), session);
    let events = EventCollector::new();
    engine.add_handler(Box::new(events.clone()));
    TestEngine {
        engine,
        ranking,
        events,
    }
}

/// Text-judged engine for `word`, signed in as Avery.
pub fn create_text_engine(word: &'static str) -> TestEngine {
    create_engine(
        Arc::new(FixedWords(word)),
        Judge::text_compare(),
        signed_in_session("Avery"),
    )
}

/// Waits for the round to be judged or to fail.
pub async fn next_terminal_event(rx: &mut mpsc::UnboundedReceiver<RoundEvent>) -> RoundEvent {
    loop {
        let event = rx.recv().await.expect("engine dropped its event channel");
        if event.is_terminal() {
            return event;
        }
    }
}

/// Event collector for testing event emissions
#[derive(Clone, Default)]
pub struct EventCollector {
    events: Arc<Mutex<Vec<RoundEvent>>>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_events(&self) -> Vec<RoundEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn has_event_type(&self, check_fn: impl Fn(&RoundEvent) -> bool) -> bool {
        self.events.lock().unwrap().iter().any(check_fn)
    }

    pub fn phase_changes(&self) -> Vec<(ink_types::RoundPhase, ink_types::RoundPhase)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                RoundEvent::PhaseChanged { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }
}

impl RoundEventHandler for EventCollector {
    fn handle_event(&mut self, event: RoundEvent) {
        self.events.lock().unwrap().push(event);
    }
}
