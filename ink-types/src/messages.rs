use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{Attempt, ErrorKind, LiveEvent, Player, RoundMode, RoundPhase, RoundSnapshot, Stroke};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ClientMessage {
    Authenticate { token: String },
    SignOut,
    StartRound { mode: Option<RoundMode> },
    RecordStroke { stroke: Stroke },
    UpdateSnapshot {
        #[serde(rename = "imageDataUrl")]
        image_data_url: String,
    },
    UpdateText { text: String },
    ClearAttempt,
    SubmitAttempt,
    CancelRound,
    RequestDefinition,
    RequestSnapshot,
    SubscribeLiveFeed,
    UnsubscribeLiveFeed,
    Heartbeat,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ServerMessage {
    AuthenticationSuccess { player: Player },
    AuthenticationFailed { reason: String },
    SignedOut,
    PhaseChanged { from: RoundPhase, to: RoundPhase },
    RoundStarted {
        #[serde(rename = "targetWord")]
        target_word: String,
        #[serde(rename = "timeLimitMs")]
        time_limit_ms: u64,
    },
    ClockTick {
        #[serde(rename = "elapsedMs")]
        elapsed_ms: u64,
        #[serde(rename = "remainingMs")]
        remaining_ms: u64,
    },
    AttemptCleared,
    RoundResult {
        attempt: Attempt,
        #[serde(rename = "predictedWord")]
        predicted_word: Option<String>,
    },
    RoundFailed { kind: ErrorKind, message: String },
    Definition { word: String, definition: String },
    Snapshot { round: RoundSnapshot },
    LiveEvent { event: LiveEvent },
    Error { message: String },
}

/// Body of `POST /api/predict`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PredictRequest {
    pub image_data_url: Option<String>,
    #[serde(default)]
    pub target_word: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PredictResponse {
    pub predicted_word: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NextWord {
    pub word: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PracticeWords {
    pub level: String,
    pub words: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct WordDefinition {
    pub word: String,
    pub definition: String,
}
