pub mod chat;
pub mod config;
pub mod consult;
pub mod doctor;
pub mod health;

use std::sync::Arc;
use std::time::Duration;

use agentmart_agent::generation::{GenerationAdapter, GenerationSettings};
use agentmart_agent::llm::openai::OpenAiClient;
use agentmart_agent::payment::PaymentConfirmer;
use agentmart_agent::personal::{negotiation_tools, PersonalAgent, PersonalAgentSettings};
use agentmart_core::config::AppConfig;
use agentmart_core::domain::agent::AgentIdentity;
use agentmart_core::errors::ApplicationError;
use serde::Serialize;
use tokio::runtime::Runtime;

use crate::render::TranscriptPrinter;

const CHUNK_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn from_error(command: &str, error: &ApplicationError) -> Self {
        tracing::error!(
            event_name = "cli.command.failed",
            command,
            error_class = error.error_class(),
            error = %error,
            "command failed"
        );
        Self::failure(
            command,
            error.error_class(),
            format!("{} ({error})", error.user_message()),
            error.exit_code(),
        )
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Who the personal agent works for and what they asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoRequest {
    pub user_name: String,
    pub user_intent: String,
}

impl DemoRequest {
    pub fn personal_identity(&self) -> AgentIdentity {
        AgentIdentity::new(
            format!("{}'s Personal AI", self.user_name),
            &self.user_name,
            "A personal AI agent that can help with tasks and provide information",
        )
    }
}

pub(crate) fn runtime() -> Result<Runtime, ApplicationError> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        ApplicationError::Configuration(format!("failed to initialize async runtime: {error}"))
    })
}

pub(crate) fn generation(config: &AppConfig) -> Result<Arc<GenerationAdapter>, ApplicationError> {
    let client = OpenAiClient::from_config(&config.llm)
        .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
    Ok(Arc::new(GenerationAdapter::new(Arc::new(client), GenerationSettings::from(&config.llm))))
}

pub(crate) fn personal_agent(
    config: &AppConfig,
    request: &DemoRequest,
    generation: Arc<GenerationAdapter>,
    confirmer: Arc<dyn PaymentConfirmer>,
) -> PersonalAgent {
    PersonalAgent::new(
        request.personal_identity(),
        &request.user_intent,
        generation,
        negotiation_tools(confirmer),
        PersonalAgentSettings::from(&config.conversation),
    )
}

pub(crate) fn stdout_printer() -> TranscriptPrinter<std::io::Stdout> {
    TranscriptPrinter::new(std::io::stdout(), CHUNK_DELAY)
}

pub(crate) fn outcome_message(rounds: usize, completed: bool) -> String {
    if completed {
        format!("conversation completed after {rounds} rounds")
    } else {
        format!("conversation stopped after {rounds} rounds without completing")
    }
}
