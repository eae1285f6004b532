use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use ink_types::{Attempt, LeaderboardRow, NewAttempt, PlayerSummary, WordSummary};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// How many best attempts a player summary shows.
pub const PLAYER_BEST_LIMIT: usize = 10;

pub type AttemptFilter<'a> = &'a (dyn Fn(&Attempt) -> bool + Send + Sync);

/// Append-only attempt log. `load_all` returns records in insertion order.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn append(&self, attempt: &Attempt) -> Result<()>;
    async fn load_all(&self) -> Result<Vec<Attempt>>;
}

#[derive(Debug, Default)]
pub struct MemoryAttemptStore {
    attempts: RwLock<Vec<Attempt>>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attempts(attempts: Vec<Attempt>) -> Self {
        Self {
            attempts: RwLock::new(attempts),
        }
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn append(&self, attempt: &Attempt) -> Result<()> {
        self.attempts.write().await.push(attempt.clone());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Attempt>> {
        Ok(self.attempts.read().await.clone())
    }
}

/// A named set of players, e.g. the friends leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerGroup {
    pub name: String,
    members: HashSet<String>,
}

impl PlayerGroup {
    pub fn new(name: impl Into<String>, members: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            members: members.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, player: &str) -> bool {
        self.members.contains(player)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Leaderboard queries over an attempt store. Every query re-reads the log,
/// so results always reflect the latest appends.
pub struct RankingEngine {
    store: Arc<dyn AttemptStore>,
}

impl RankingEngine {
    pub fn new(store: Arc<dyn AttemptStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryAttemptStore::new()))
    }

    pub async fn add_attempt(&self, record: NewAttempt) -> Result<Attempt> {
        let attempt = complete_attempt(record);
        self.store.append(&attempt).await?;
        info!(
            "Recorded attempt {} for {} on '{}' (correct: {}, {}s)",
            attempt.id, attempt.player, attempt.word, attempt.is_correct, attempt.time_seconds
        );
        Ok(attempt)
    }

    pub async fn attempts(&self) -> Result<Vec<Attempt>> {
        self.store.load_all().await
    }

    pub async fn top_by_time(
        &self,
        filter: Option<AttemptFilter<'_>>,
        limit: usize,
    ) -> Result<Vec<LeaderboardRow>> {
        let log = self.store.load_all().await?;
        Ok(top_by_time(&log, filter, limit))
    }

    pub async fn top_in_group(&self, group: &PlayerGroup, limit: usize) -> Result<Vec<LeaderboardRow>> {
        let in_group = |attempt: &Attempt| group.contains(&attempt.player);
        self.top_by_time(Some(&in_group), limit).await
    }

    pub async fn best_per_word(&self) -> Result<Vec<LeaderboardRow>> {
        let log = self.store.load_all().await?;
        Ok(best_per_word(&log))
    }

    pub async fn player_summary(&self, player: &str) -> Result<PlayerSummary> {
        let log = self.store.load_all().await?;
        Ok(player_summary(&log, player))
    }
}

/// Fills in a generated id and today's UTC date where the record has none.
pub fn complete_attempt(record: NewAttempt) -> Attempt {
    Attempt {
        id: record
            .id
            .unwrap_or_else(|| format!("a_{}", Uuid::new_v4())),
        player: record.player,
        word: record.word,
        is_correct: record.is_correct,
        time_seconds: record.time_seconds,
        date: record
            .date
            .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string()),
    }
}

/// Sorts by ascending time, keeping input order on ties, and numbers the rows
/// from 1.
pub fn rank_by_time<'a>(attempts: impl IntoIterator<Item = &'a Attempt>) -> Vec<LeaderboardRow> {
    let mut sorted: Vec<&Attempt> = attempts.into_iter().collect();
    sorted.sort_by(|a, b| a.time_seconds.total_cmp(&b.time_seconds));

    sorted
        .into_iter()
        .enumerate()
        .map(|(index, attempt)| LeaderboardRow {
            rank: index as u32 + 1,
            attempt: attempt.clone(),
        })
        .collect()
}

pub fn top_by_time(log: &[Attempt], filter: Option<AttemptFilter<'_>>, limit: usize) -> Vec<LeaderboardRow> {
    let mut rows = rank_by_time(
        log.iter()
            .filter(|attempt| attempt.is_correct)
            .filter(|attempt| filter.is_none_or(|keep| keep(*attempt))),
    );
    rows.truncate(limit);
    rows
}

pub fn best_per_word(log: &[Attempt]) -> Vec<LeaderboardRow> {
    let mut best: HashMap<&str, usize> = HashMap::new();
    for (index, attempt) in log.iter().enumerate() {
        if !attempt.is_correct {
            continue;
        }
        best.entry(attempt.word.as_str())
            .and_modify(|current| {
                if attempt.time_seconds < log[*current].time_seconds {
                    *current = index;
                }
            })
            .or_insert(index);
    }

    let mut winners: Vec<usize> = best.into_values().collect();
    winners.sort_unstable();
    rank_by_time(winners.into_iter().map(|index| &log[index]))
}

pub fn player_summary(log: &[Attempt], player: &str) -> PlayerSummary {
    let own: Vec<&Attempt> = log.iter().filter(|attempt| attempt.player == player).collect();

    let mut best = rank_by_time(own.iter().copied().filter(|attempt| attempt.is_correct));
    best.truncate(PLAYER_BEST_LIMIT);

    let mut by_word: BTreeMap<&str, WordSummary> = BTreeMap::new();
    for attempt in &own {
        let summary = by_word
            .entry(attempt.word.as_str())
            .or_insert_with(|| WordSummary {
                word: attempt.word.clone(),
                attempts: 0,
                correct_attempts: 0,
                best_time: None,
                latest_time: attempt.time_seconds,
            });

        summary.attempts += 1;
        summary.latest_time = attempt.time_seconds;
        if attempt.is_correct {
            summary.correct_attempts += 1;
            summary.best_time = Some(match summary.best_time {
                Some(current) => current.min(attempt.time_seconds),
                None => attempt.time_seconds,
            });
        }
    }

    PlayerSummary {
        player: player.to_string(),
        best,
        by_word: by_word.into_values().collect(),
    }
}
