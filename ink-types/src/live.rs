use serde::{Deserialize, Serialize};
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub enum LiveEventKind {
    AttemptFinished,
    NewRecord,
}

/// Display-only "someone else just played" event. Lives in a bounded window,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LiveEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: LiveEventKind,
    pub player: String,
    pub word: String,
    pub time_seconds: f64,
    pub is_correct: bool,
    pub created_at: String, // ISO 8601 string
}
