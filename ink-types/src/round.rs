use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Lifecycle of a single round.
///
/// The only legal moves are `Idle -> Countdown -> Active -> Submitted -> Result`,
/// `Result -> Countdown` for a restart, and any phase back to `Idle` when the
/// round is cancelled or fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub enum RoundPhase {
    #[default]
    Idle,
    Countdown,
    Active,
    Submitted,
    Result,
}

impl RoundPhase {
    pub fn can_transition_to(self, next: RoundPhase) -> bool {
        use RoundPhase::*;
        matches!(
            (self, next),
            (Idle, Countdown)
                | (Result, Countdown)
                | (Countdown, Active)
                | (Active, Submitted)
                | (Submitted, Result)
                | (_, Idle)
        )
    }

    /// Phases from which a new round may be started.
    pub fn accepts_start(self) -> bool {
        matches!(self, RoundPhase::Idle | RoundPhase::Result)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub enum PracticeLevel {
    Easy,
    Medium,
    Hard,
    Custom { words: Vec<String> },
}

impl PracticeLevel {
    /// Parses a level name as sent by the practice screen. Unknown names fall
    /// back to `Easy`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "medium" => PracticeLevel::Medium,
            "hard" => PracticeLevel::Hard,
            _ => PracticeLevel::Easy,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PracticeLevel::Easy => "easy",
            PracticeLevel::Medium => "medium",
            PracticeLevel::Hard => "hard",
            PracticeLevel::Custom { .. } => "custom",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub enum RoundMode {
    /// Random word, short clock.
    #[default]
    Timed,
    /// Word drawn from a practice set, longer clock.
    Practice { level: PracticeLevel },
}

/// How a submission is judged against the target word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub enum JudgeStrategy {
    /// Send the canvas snapshot to the recognition service.
    ImageRecognition,
    /// Compare typed text directly.
    TextCompare,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Stroke {
    pub id: String,
    pub points: Vec<Point>,
}

/// Serializable view of the round currently held by an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RoundSnapshot {
    pub target_word: Option<String>,
    pub phase: RoundPhase,
    pub mode: RoundMode,
    pub elapsed_ms: u64,
    pub time_limit_ms: u64,
    pub stroke_count: u32,
    pub point_count: u32,
    pub submitted_text: Option<String>,
    pub has_snapshot: bool,
}
