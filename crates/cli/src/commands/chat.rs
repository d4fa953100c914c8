use std::sync::Arc;

use agentmart_agent::delivery::{DeliveryAgent, DeliverySettings, HttpServiceBackend};
use agentmart_agent::generation::GenerationAdapter;
use agentmart_agent::geocoding::GoogleGeocoder;
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

pub fn delivery_identity() -> AgentIdentity {
    AgentIdentity::new(
        "Byte AI Agent",
        "Byte AI",
        "A food delivery agent that can help users order food from restaurants.",
    )
}

pub fn run(config: &AppConfig, request: &DemoRequest) -> CommandResult {
    let mut printer = stdout_printer();
    let result = runtime().and_then(|runtime| {
        let generation = generation(config)?;
        let confirmer = Arc::new(TerminalConfirmer);
        runtime.block_on(negotiate(config, request, generation, confirmer, &mut printer))
    });

    match result {
        Ok(outcome) => {
            CommandResult::success("chat", outcome_message(outcome.rounds, outcome.completed()))
        }
        Err(error) => CommandResult::from_error("chat", &error),
    }
}

/// Registers the personal and delivery agents and runs their negotiation.
pub async fn negotiate(
    config: &AppConfig,
    request: &DemoRequest,
    generation: Arc<GenerationAdapter>,
    confirmer: Arc<dyn PaymentConfirmer>,
    observer: &mut dyn ConversationObserver,
) -> Result<ConversationOutcome, ApplicationError> {
    let geocoder = GoogleGeocoder::from_config(&config.geocoding)
        .map_err(|error| ApplicationError::Integration(error.to_string()))?;
    let backend = HttpServiceBackend::from_config(&config.service)
        .map_err(|error| ApplicationError::Integration(error.to_string()))?;

    let personal = personal_agent(config, request, generation.clone(), confirmer);
    let delivery = DeliveryAgent::new(
        delivery_identity(),
        &request.user_intent,
        generation,
        Arc::new(geocoder),
        Arc::new(backend),
        DeliverySettings::from_config(&config.service, &config.conversation),
    );

    let personal_name = request.personal_identity().name;
    let delivery_name = delivery_identity().name;

    let mut marketplace = Marketplace::new(config.conversation.max_rounds);
    marketplace.add_agent(Box::new(personal));
    marketplace.add_agent(Box::new(delivery));

    marketplace
        .start_chat(&personal_name, &delivery_name, false, observer)
        .await
        .map_err(|error| ApplicationError::from(&error))
}
