use anyhow::{Context, Result};
use async_trait::async_trait;
use ink_core::AttemptStore;
use ink_types::Attempt;
use sea_orm::{ActiveValue, DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::entities::{attempts, prelude::*};

/// Legacy rows scored at or above this accuracy count as correct.
pub const LEGACY_CORRECT_ACCURACY: i32 = 90;

const DEMO_ATTEMPTS: &str = include_str!("../../seeds/demo_attempts.json");

/// Attempt as persisted, including rows from before correct/incorrect
/// scoring that only carry an accuracy percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAttempt {
    pub id: String,
    pub player: String,
    pub word: String,
    #[serde(default)]
    pub is_correct: Option<bool>,
    #[serde(default)]
    pub accuracy: Option<i32>,
    pub time_seconds: f64,
    pub date: String,
}

impl StoredAttempt {
    pub fn is_correct(&self) -> bool {
        resolve_is_correct(self.is_correct, self.accuracy)
    }

    pub fn into_attempt(self) -> Attempt {
        Attempt {
            is_correct: self.is_correct(),
            id: self.id,
            player: self.player,
            word: self.word,
            time_seconds: self.time_seconds,
            date: self.date,
        }
    }
}

impl From<&Attempt> for StoredAttempt {
    fn from(attempt: &Attempt) -> Self {
        Self {
            id: attempt.id.clone(),
            player: attempt.player.clone(),
            word: attempt.word.clone(),
            is_correct: Some(attempt.is_correct),
            accuracy: None,
            time_seconds: attempt.time_seconds,
            date: attempt.date.clone(),
        }
    }
}

/// An explicit flag wins; otherwise the legacy accuracy decides, and no
/// accuracy at all means incorrect.
pub fn resolve_is_correct(is_correct: Option<bool>, accuracy: Option<i32>) -> bool {
    is_correct.unwrap_or_else(|| accuracy.is_some_and(|a| a >= LEGACY_CORRECT_ACCURACY))
}

/// The five demo attempts shipped with the game, in legacy shape.
pub fn demo_attempts() -> Result<Vec<StoredAttempt>> {
    serde_json::from_str(DEMO_ATTEMPTS).context("demo attempt seed is malformed")
}

pub struct AttemptRepository {
    db: DatabaseConnection,
}

impl AttemptRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn model_to_stored(model: attempts::Model) -> StoredAttempt {
        StoredAttempt {
            id: model.id,
            player: model.player,
            word: model.word,
            is_correct: model.is_correct,
            accuracy: model.accuracy,
            time_seconds: model.time_seconds,
            date: model.date,
        }
    }

    pub async fn insert(&self, record: &StoredAttempt) -> Result<()> {
        let model = attempts::ActiveModel {
            seq: ActiveValue::NotSet,
            id: ActiveValue::Set(record.id.clone()),
            player: ActiveValue::Set(record.player.clone()),
            word: ActiveValue::Set(record.word.clone()),
            is_correct: ActiveValue::Set(record.is_correct),
            accuracy: ActiveValue::Set(record.accuracy),
            time_seconds: ActiveValue::Set(record.time_seconds),
            date: ActiveValue::Set(record.date.clone()),
        };

        Attempts::insert(model).exec(&self.db).await?;
        Ok(())
    }

    /// Full log in insertion order.
    pub async fn list(&self) -> Result<Vec<Attempt>> {
        let models = Attempts::find()
            .order_by_asc(attempts::Column::Seq)
            .all(&self.db)
            .await?;

        Ok(models
            .into_iter()
            .map(|model| Self::model_to_stored(model).into_attempt())
            .collect())
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(Attempts::find().count(&self.db).await?)
    }

    /// Inserts `records` when the log is empty. Returns how many were written.
    pub async fn seed_if_empty(&self, records: &[StoredAttempt]) -> Result<usize> {
        if self.count().await? > 0 {
            return Ok(0);
        }

        for record in records {
            self.insert(record).await?;
        }
        info!("Seeded {} attempts", records.len());
        Ok(records.len())
    }
}

#[async_trait]
impl AttemptStore for AttemptRepository {
    async fn append(&self, attempt: &Attempt) -> Result<()> {
        self.insert(&StoredAttempt::from(attempt)).await
    }

    async fn load_all(&self) -> Result<Vec<Attempt>> {
        self.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::connect_to_memory_database;
    use ink_core::RankingEngine;
    use migration::{Migrator, MigratorTrait};
    use std::sync::Arc;

    async fn setup_test_db() -> AttemptRepository {
        let db = connect_to_memory_database().await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        AttemptRepository::new(db)
    }

    fn attempt(id: &str, word: &str, is_correct: bool, time_seconds: f64) -> Attempt {
        Attempt {
            id: id.to_string(),
            player: "Seth".to_string(),
            word: word.to_string(),
            is_correct,
            time_seconds,
            date: "2026-02-01".to_string(),
        }
    }

    #[test]
    fn test_legacy_correctness_rule() {
        assert!(resolve_is_correct(None, Some(90)));
        assert!(!resolve_is_correct(None, Some(89)));
        assert!(!resolve_is_correct(None, None));
        assert!(!resolve_is_correct(Some(false), Some(99)));
        assert!(resolve_is_correct(Some(true), None));
    }

    #[test]
    fn test_demo_seed_parses() {
        let seed = demo_attempts().unwrap();
        assert_eq!(seed.len(), 5);
        assert_eq!(seed[0].player, "Avery");
        assert_eq!(seed[0].accuracy, Some(98));
        assert_eq!(seed[0].is_correct, None);
        assert!(seed.iter().all(StoredAttempt::is_correct));
    }

    #[tokio::test]
    async fn test_append_and_load_in_order() {
        let repo = setup_test_db().await;

        repo.append(&attempt("x2", "orbit", true, 6.0)).await.unwrap();
        repo.append(&attempt("x1", "nova", false, 4.5)).await.unwrap();
        repo.append(&attempt("x3", "echo", true, 5.2)).await.unwrap();

        let log = repo.load_all().await.unwrap();
        let ids: Vec<&str> = log.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["x2", "x1", "x3"]);
        assert_eq!(log[1], attempt("x1", "nova", false, 4.5));
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let repo = setup_test_db().await;
        repo.append(&attempt("dup", "orbit", true, 6.0)).await.unwrap();
        assert!(repo.append(&attempt("dup", "orbit", true, 6.0)).await.is_err());
    }

    #[tokio::test]
    async fn test_seed_only_when_empty() {
        let repo = setup_test_db().await;
        let seed = demo_attempts().unwrap();

        assert_eq!(repo.seed_if_empty(&seed).await.unwrap(), 5);
        assert_eq!(repo.seed_if_empty(&seed).await.unwrap(), 0);
        assert_eq!(repo.count().await.unwrap(), 5);

        let log = repo.list().await.unwrap();
        assert!(log.iter().all(|a| a.is_correct));
        assert_eq!(log[4].player, "Mia");
    }

    #[tokio::test]
    async fn test_legacy_rows_without_accuracy_are_incorrect() {
        let repo = setup_test_db().await;
        repo.insert(&StoredAttempt {
            id: "old".to_string(),
            player: "Jay".to_string(),
            word: "flux".to_string(),
            is_correct: None,
            accuracy: None,
            time_seconds: 5.0,
            date: "2025-12-01".to_string(),
        })
        .await
        .unwrap();

        let log = repo.list().await.unwrap();
        assert!(!log[0].is_correct);
    }

    #[tokio::test]
    async fn test_ranking_over_persisted_log() {
        let repo = setup_test_db().await;
        repo.seed_if_empty(&demo_attempts().unwrap()).await.unwrap();
        let ranking = RankingEngine::new(Arc::new(repo));

        let top = ranking.top_by_time(None, 3).await.unwrap();
        let players: Vec<&str> = top.iter().map(|row| row.attempt.player.as_str()).collect();
        assert_eq!(players, vec!["Avery", "Jay", "Grant"]);
        assert_eq!(top[2].rank, 3);
    }
}
