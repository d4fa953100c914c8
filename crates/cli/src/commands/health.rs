use std::sync::Arc;

use agentmart_agent::generation::GenerationAdapter;
use agentmart_agent::health::HealthAgent;
use agentmart_agent::orchestrator::{ConversationObserver, Marketplace};
use agentmart_agent::payment::PaymentConfirmer;
use agentmart_core::config::AppConfig;
use agentmart_core::domain::agent::AgentIdentity;
use agentmart_core::domain::conversation::ConversationOutcome;
use agentmart_core::errors::ApplicationError;

use super::{
    generation, outcome_message, personal_agent, runtime, stdout_printer, CommandResult,
    DemoRequest,
};
use crate::confirm::TerminalConfirmer;

pub fn coach_identity() -> AgentIdentity {
    AgentIdentity::new(
        "Vitality Health Coach",
        "Health AI Inc.",
        "A health and fitness advisor that can create personalized workout plans, offer nutrition advice, and track fitness goals.",
    )
}

pub fn run(config: &AppConfig, request: &DemoRequest) -> CommandResult {
    let mut printer = stdout_printer();
    let result = runtime().and_then(|runtime| {
        let generation = generation(config)?;
        let confirmer = Arc::new(TerminalConfirmer);
        runtime.block_on(coach(config, request, generation, confirmer, &mut printer))
    });

    match result {
        Ok(outcome) => {
            CommandResult::success("health", outcome_message(outcome.rounds, outcome.completed()))
        }
        Err(error) => CommandResult::from_error("health", &error),
    }
}

pub async fn coach(
    config: &AppConfig,
    request: &DemoRequest,
    generation: Arc<GenerationAdapter>,
    confirmer: Arc<dyn PaymentConfirmer>,
    observer: &mut dyn ConversationObserver,
) -> Result<ConversationOutcome, ApplicationError> {
    let personal = personal_agent(config, request, generation.clone(), confirmer);
    let health = HealthAgent::new(
        coach_identity(),
        &request.user_intent,
        generation,
        config.conversation.history_window,
    );

    let personal_name = request.personal_identity().name;
    let mut marketplace = Marketplace::new(config.conversation.max_rounds);
    marketplace.add_agent(Box::new(personal));
    marketplace.add_agent(Box::new(health));

    marketplace
        .start_chat(&personal_name, &coach_identity().name, false, observer)
        .await
        .map_err(|error| ApplicationError::from(&error))
}
