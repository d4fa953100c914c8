//! Boundary to the chat-completion backend.
//!
//! [`LlmClient`] is the only seam between the agents and a language model.
//! [`openai::OpenAiClient`] speaks the OpenAI-compatible HTTP protocol and
//! [`scripted::ScriptedLlmClient`] replays canned completions for tests and
//! offline runs.

pub mod openai;
pub mod scripted;

use agentmart_core::domain::message::Role;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

/// A function the model may ask to call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    Named(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDeclaration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

impl CompletionRequest {
    /// Content of the final user-role entry, which is always the prompt.
    pub fn prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
    }

    pub fn offers_tools(&self) -> bool {
        !self.tools.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_invocations: Vec<ToolInvocation>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), tool_invocations: Vec::new() }
    }

    pub fn tool_call(name: impl Into<String>, arguments: Value) -> Self {
        let name = name.into();
        let invocation = ToolInvocation { id: format!("call_{name}"), name, arguments };
        Self { text: String::new(), tool_invocations: vec![invocation] }
    }

    pub fn requests_tools(&self) -> bool {
        !self.tool_invocations.is_empty()
    }
}

/// Failure classes a backend client can report.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendFailure {
    #[error("no credential configured for provider `{provider}`")]
    MissingCredential { provider: String },
    #[error("backend rejected credentials: {0}")]
    Authentication(String),
    #[error("backend rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("backend transport failure: {0}")]
    Transport(String),
    #[error("backend returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl BackendFailure {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    pub fn class(&self) -> &'static str {
        match self {
            Self::MissingCredential { .. } => "missing_credential",
            Self::Authentication(_) => "authentication",
            Self::RateLimited(_) => "rate_limited",
            Self::Transport(_) => "transport",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, BackendFailure>;
}
