use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::message::Message;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&Message> for TranscriptEntry {
    fn from(message: &Message) -> Self {
        Self {
            sender: message.sender.clone(),
            content: message.content.clone(),
            timestamp: message.timestamp,
        }
    }
}

pub type Transcript = Vec<TranscriptEntry>;

pub fn render_transcript(transcript: &[TranscriptEntry]) -> String {
    transcript
        .iter()
        .map(|entry| format!("{}: {}", entry.sender, entry.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::{render_transcript, TranscriptEntry};
    use crate::domain::message::{Message, Role};

    #[test]
    fn renders_one_line_per_entry() {
        let transcript = vec![
            TranscriptEntry::from(&Message::new(Role::User, "hi", "alice-ai", "coach")),
            TranscriptEntry::from(&Message::new(Role::Assistant, "hello", "coach", "alice-ai")),
        ];

        assert_eq!(render_transcript(&transcript), "alice-ai: hi\ncoach: hello");
    }
}
