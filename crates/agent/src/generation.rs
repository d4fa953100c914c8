//! Generation Backend Adapter: assembles the message list for one backend
//! call, keeps it under the token budget and retries rate-limited calls.

use std::sync::Arc;
use std::time::Duration;

use agentmart_core::config::LlmConfig;
use agentmart_core::domain::context::Context;
use agentmart_core::domain::message::Role;
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::{
    BackendFailure, ChatMessage, Completion, CompletionRequest, LlmClient, ToolChoice,
    ToolDeclaration,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generation backend is not configured: {0}")]
    Configuration(String),
    #[error("generation backend failed after {attempts} attempt(s): {source}")]
    Backend {
        attempts: u32,
        #[source]
        source: BackendFailure,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub token_budget: usize,
    pub retry: RetryPolicy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, initial_backoff_ms: 1_000 }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (zero-based): 1s, 2s, 4s, ...
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.min(16);
        let multiplier = 1_u64 << exponent;
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(multiplier))
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            token_budget: 25_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&LlmConfig> for GenerationSettings {
    fn from(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            token_budget: config.token_budget,
            retry: RetryPolicy {
                max_attempts: config.max_attempts,
                initial_backoff_ms: config.initial_backoff_ms,
            },
        }
    }
}

/// Inputs of a single `generate` call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub history: Vec<ChatMessage>,
    pub tools: Vec<ToolDeclaration>,
    pub tool_choice: Option<ToolChoice>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), ..Self::default() }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        self.system_prompt = (!system_prompt.is_empty()).then_some(system_prompt);
        self
    }

    pub fn with_context(mut self, context: &Context) -> Self {
        self.history = context
            .history()
            .iter()
            .map(|message| ChatMessage::new(message.role, message.content.clone()))
            .collect();
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    /// System message, history in order, then the prompt as the final user entry.
    pub fn assemble(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if let Some(system_prompt) = &self.system_prompt {
            messages.push(ChatMessage::new(Role::System, system_prompt.clone()));
        }
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::new(Role::User, self.prompt.clone()));
        messages
    }
}

pub struct GenerationAdapter {
    client: Arc<dyn LlmClient>,
    settings: GenerationSettings,
}

impl GenerationAdapter {
    pub fn new(client: Arc<dyn LlmClient>, settings: GenerationSettings) -> Self {
        Self { client, settings }
    }

    pub async fn generate_text(&self, prompt: impl Into<String>) -> Result<String, GenerationError> {
        self.generate(GenerationRequest::new(prompt)).await.map(|completion| completion.text)
    }

    pub async fn generate(&self, request: GenerationRequest) -> Result<Completion, GenerationError> {
        let mut messages = request.assemble();
        let estimated = estimate_tokens(&messages);
        if estimated > self.settings.token_budget {
            let before = messages.len();
            messages = truncate_to_budget(messages, self.settings.token_budget);
            debug!(
                event_name = "generation.context.truncated",
                estimated_tokens = estimated,
                token_budget = self.settings.token_budget,
                kept = messages.len(),
                dropped = before - messages.len(),
                "conversation history truncated to fit token budget"
            );
        }

        let tool_choice = if request.tools.is_empty() {
            None
        } else {
            Some(request.tool_choice.clone().unwrap_or(ToolChoice::Auto))
        };
        let completion_request = CompletionRequest {
            model: self.settings.model.clone(),
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            tools: request.tools,
            tool_choice,
        };

        let retry = self.settings.retry;
        let mut attempt = 0_u32;
        loop {
            attempt += 1;
            match self.client.complete(completion_request.clone()).await {
                Ok(completion) => return Ok(completion),
                Err(BackendFailure::MissingCredential { provider }) => {
                    return Err(GenerationError::Configuration(format!(
                        "no API credential available for provider `{provider}`"
                    )));
                }
                Err(failure) if failure.is_retryable() && attempt < retry.max_attempts => {
                    let delay = retry.backoff(attempt - 1);
                    warn!(
                        event_name = "generation.rate_limited",
                        attempt,
                        max_attempts = retry.max_attempts,
                        backoff_ms = delay.as_millis() as u64,
                        error = %failure,
                        "backend rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(source) => {
                    warn!(
                        event_name = "generation.failed",
                        attempt,
                        error_class = source.class(),
                        error = %source,
                        "generation backend call failed"
                    );
                    return Err(GenerationError::Backend { attempts: attempt, source });
                }
            }
        }
    }
}

fn text_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

fn message_tokens(message: &ChatMessage) -> usize {
    4 + text_tokens(message.role.as_str()) + text_tokens(&message.content)
}

/// Heuristic token count: roughly four characters per token plus the
/// per-message framing and the reply primer.
pub fn estimate_tokens(messages: &[ChatMessage]) -> usize {
    messages.iter().map(message_tokens).sum::<usize>() + 2
}

/// Keeps the system message and the final prompt, then re-inserts history
/// newest first until the next entry would exceed `budget`.
pub fn truncate_to_budget(mut messages: Vec<ChatMessage>, budget: usize) -> Vec<ChatMessage> {
    let Some(prompt) = messages.pop() else {
        return messages;
    };
    let system = match messages.first() {
        Some(first) if first.role == Role::System => Some(messages.remove(0)),
        _ => None,
    };

    let mut kept = Vec::new();
    let mut tokens = estimate_tokens(&[prompt.clone()])
        + system.as_ref().map(message_tokens).unwrap_or_default();

    for message in messages.into_iter().rev() {
        let cost = message_tokens(&message);
        if tokens + cost > budget {
            break;
        }
        tokens += cost;
        kept.push(message);
    }
    kept.reverse();

    let mut result = Vec::with_capacity(kept.len() + 2);
    result.extend(system);
    result.extend(kept);
    result.push(prompt);
    result
}
