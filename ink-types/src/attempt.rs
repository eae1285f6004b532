use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Finalized outcome of one round. Never mutated after it is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Attempt {
    pub id: String,
    pub player: String,
    pub word: String,
    pub is_correct: bool,
    pub time_seconds: f64,
    pub date: String, // YYYY-MM-DD
}

/// Input to the ranking engine's `add_attempt`. Missing `id` and `date` are
/// filled in when the attempt is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NewAttempt {
    #[serde(default)]
    pub id: Option<String>,
    pub player: String,
    pub word: String,
    pub is_correct: bool,
    pub time_seconds: f64,
    #[serde(default)]
    pub date: Option<String>,
}

impl NewAttempt {
    pub fn new(player: impl Into<String>, word: impl Into<String>, is_correct: bool, time_seconds: f64) -> Self {
        Self {
            id: None,
            player: player.into(),
            word: word.into(),
            is_correct,
            time_seconds,
            date: None,
        }
    }
}

/// Ranked projection of an attempt. Derived on every query, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LeaderboardRow {
    pub rank: u32,
    #[serde(flatten)]
    #[ts(flatten)]
    pub attempt: Attempt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct WordSummary {
    pub word: String,
    pub attempts: u32,
    pub correct_attempts: u32,
    pub best_time: Option<f64>,
    pub latest_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PlayerSummary {
    pub player: String,
    pub best: Vec<LeaderboardRow>,
    pub by_word: Vec<WordSummary>,
}

/// Body of `POST /api/attempts`. The player is taken from the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RecordAttemptRequest {
    pub word: String,
    pub is_correct: bool,
    pub time_seconds: f64,
}

/// Seconds with one decimal, the resolution every leaderboard shows.
pub fn round_to_tenth(seconds: f64) -> f64 {
    (seconds * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaderboard_row_is_flat() {
        let row = LeaderboardRow {
            rank: 1,
            attempt: Attempt {
                id: "a1".to_string(),
                player: "Avery".to_string(),
                word: "velocity".to_string(),
                is_correct: true,
                time_seconds: 6.2,
                date: "2026-01-20".to_string(),
            },
        };

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["rank"], 1);
        assert_eq!(json["player"], "Avery");
        assert_eq!(json["isCorrect"], true);
        assert_eq!(json["timeSeconds"], 6.2);
    }

    #[test]
    fn test_new_attempt_optional_fields() {
        let parsed: NewAttempt = serde_json::from_str(
            r#"{"player":"Mia","word":"nova","isCorrect":false,"timeSeconds":7.6}"#,
        )
        .unwrap();
        assert!(parsed.id.is_none());
        assert!(parsed.date.is_none());
    }

    #[test]
    fn test_round_to_tenth() {
        assert_eq!(round_to_tenth(6.24), 6.2);
        assert_eq!(round_to_tenth(6.25), 6.3);
        assert_eq!(round_to_tenth(0.1), 0.1);
    }
}
