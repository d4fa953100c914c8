//! The turn-taking contract every agent implements, plus the pieces of the
//! response pipeline the variants share.

use agentmart_core::domain::agent::AgentIdentity;
use agentmart_core::domain::context::Context;
use agentmart_core::domain::message::{Message, Role};
use agentmart_core::domain::sentinel::{self, ChatState};
use agentmart_core::errors::ApplicationError;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::delivery::ServiceError;
use crate::generation::{GenerationAdapter, GenerationError, GenerationRequest};
use crate::personal_data::ProfileError;
use crate::prompts::{self, TaskFrame};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("failed to encode agent state: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<&AgentError> for ApplicationError {
    fn from(error: &AgentError) -> Self {
        match error {
            AgentError::Generation(GenerationError::Configuration(message)) => {
                Self::Configuration(message.clone())
            }
            AgentError::Generation(inner) => Self::Backend(inner.to_string()),
            AgentError::Profile(inner) => Self::Configuration(inner.to_string()),
            AgentError::Service(inner) => Self::Integration(inner.to_string()),
            AgentError::Encoding(inner) => Self::Integration(inner.to_string()),
        }
    }
}

/// A conversational actor in a two-party exchange.
///
/// Counterparts only ever see each other's [`AgentIdentity`].
#[async_trait]
pub trait Agent: Send + Sync {
    fn identity(&self) -> &AgentIdentity;

    fn name(&self) -> &str {
        &self.identity().name
    }

    /// One-time setup before the first turn.
    async fn initialize(&mut self, _counterpart: &AgentIdentity) -> Result<(), AgentError> {
        Ok(())
    }

    /// Consumes the counterpart's message and produces this agent's reply.
    async fn on_message(
        &mut self,
        message: &Message,
        sender: &AgentIdentity,
    ) -> Result<Message, AgentError>;

    fn is_task_complete(&self) -> bool;

    fn context(&self) -> &Context;
}

/// Reply content produced by a pipeline before it becomes a [`Message`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Draft {
    pub content: String,
    pub metadata: Option<Value>,
}

impl Draft {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), metadata: None }
    }

    pub fn conversation_end() -> Self {
        Self::text(sentinel::CONVERSATION_ENDS)
    }
}

/// Identity, history and completion flag every variant owns.
#[derive(Clone, Debug)]
pub struct AgentState {
    pub identity: AgentIdentity,
    pub context: Context,
    output_role: Role,
    task_complete: bool,
}

impl AgentState {
    pub fn new(identity: AgentIdentity, output_role: Role) -> Self {
        Self { identity, context: Context::new(), output_role, task_complete: false }
    }

    pub fn is_task_complete(&self) -> bool {
        self.task_complete
    }

    /// Records an incoming message; the empty opening prompt is not kept.
    pub fn receive(&mut self, message: &Message) {
        if message.has_content() {
            self.context.append(message.clone());
        }
    }

    pub fn compose(&self, draft: Draft, counterpart: &AgentIdentity) -> Message {
        Message::new(self.output_role, draft.content, &self.identity.name, &counterpart.name)
            .with_metadata(draft.metadata)
    }

    /// Appends the outgoing message and settles the completion flag.
    pub fn record(&mut self, message: Message) -> Message {
        self.context.append(message.clone());
        self.settle(&message);
        message
    }

    /// Sets the completion flag when `message` is the end sentinel. The flag
    /// never goes back to false.
    pub fn settle(&mut self, message: &Message) {
        if sentinel::is_conversation_end(&message.content) {
            self.task_complete = true;
        }
    }

    pub fn frame<'a>(&'a self, user_intent: &'a str, counterpart_description: &'a str) -> TaskFrame<'a> {
        TaskFrame {
            agent_name: &self.identity.name,
            owner: &self.identity.owner,
            user_intent,
            counterpart_description,
        }
    }
}

/// Decides whether the conversation is over.
///
/// A termination marker anywhere in the newest `window` entries ends it
/// without a backend call; otherwise the backend classifies the history.
pub async fn classify_chat_state(
    generation: &GenerationAdapter,
    context: &Context,
    window: usize,
    frame: TaskFrame<'_>,
) -> Result<ChatState, GenerationError> {
    let history = context.render_recent(window);
    if sentinel::contains_termination_marker(&history) {
        debug!(
            event_name = "agent.chat_state.sentinel",
            agent = frame.agent_name,
            "termination marker found in recent history"
        );
        return Ok(ChatState::End);
    }

    let prompt = prompts::check_chat_state(frame, &history);
    let output = generation.generate(GenerationRequest::new(prompt)).await?.text;
    Ok(ChatState::from_classifier_output(&output))
}
