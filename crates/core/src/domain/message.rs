use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One utterance exchanged between two agents (or injected by a tool).
///
/// Messages are values: once a message has been appended to a
/// [`Context`](crate::domain::context::Context) there is no way to reach it
/// mutably again.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub sender: String,
    pub receiver: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Message {
    pub fn new(
        role: Role,
        content: impl Into<String>,
        sender: impl Into<String>,
        receiver: impl Into<String>,
    ) -> Self {
        Self {
            role,
            content: content.into(),
            sender: sender.into(),
            receiver: receiver.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// The empty prompt that asks an agent to open a conversation.
    pub fn opening(sender: impl Into<String>, receiver: impl Into<String>) -> Self {
        Self::new(Role::User, String::new(), sender, receiver)
    }

    pub fn with_metadata(mut self, metadata: Option<Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }
}
