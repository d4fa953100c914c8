use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::transcript::{Transcript, TranscriptEntry};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Both parties reported their task complete.
    BothComplete,
    RoundBudgetExhausted,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BothComplete => "both_complete",
            Self::RoundBudgetExhausted => "round_budget_exhausted",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationOutcome {
    pub id: ConversationId,
    pub rounds: usize,
    pub stop_reason: StopReason,
    /// Present only when the caller asked for the exchange to be captured.
    pub transcript: Option<Transcript>,
}

impl ConversationOutcome {
    pub fn completed(&self) -> bool {
        self.stop_reason == StopReason::BothComplete
    }

    pub fn last_entry(&self) -> Option<&TranscriptEntry> {
        self.transcript.as_ref().and_then(|transcript| transcript.last())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConversationId, StopReason};

    #[test]
    fn conversation_ids_are_unique() {
        assert_ne!(ConversationId::new(), ConversationId::new());
    }

    #[test]
    fn stop_reason_serializes_snake_case() {
        let encoded = serde_json::to_string(&StopReason::RoundBudgetExhausted).expect("encode");
        assert_eq!(encoded, "\"round_budget_exhausted\"");
        assert_eq!(StopReason::BothComplete.as_str(), "both_complete");
    }
}
