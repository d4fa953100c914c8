use std::sync::Arc;

use agentmart_agent::generation::GenerationAdapter;
use agentmart_agent::health::HealthAgent;
use agentmart_agent::orchestrator::{run_conversation, ConversationSettings};
use agentmart_agent::payment::PaymentConfirmer;
use agentmart_agent::Agent;
use agentmart_core::config::AppConfig;
use agentmart_core::domain::transcript::render_transcript;
use agentmart_core::errors::ApplicationError;

use super::health::coach_identity;
use super::{generation, personal_agent, runtime, stdout_printer, CommandResult, DemoRequest};
use crate::confirm::TerminalConfirmer;
use crate::render::TranscriptPrinter;

/// What came out of one consultation round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consultation {
    pub first_reply: String,
    pub rounds: usize,
    pub summary: String,
}

pub fn run(config: &AppConfig, request: &DemoRequest) -> CommandResult {
    let mut printer = stdout_printer();
    let result = runtime().and_then(|runtime| {
        let generation = generation(config)?;
        let confirmer = Arc::new(TerminalConfirmer);
        runtime.block_on(consult(config, request, generation, confirmer, &mut printer))
    });

    match result {
        Ok(consultation) => CommandResult::success(
            "consult",
            format!("consultation finished after {} rounds", consultation.rounds),
        ),
        Err(error) => CommandResult::from_error("consult", &error),
    }
}

/// The user asks their personal agent, which answers, consults the health
/// coach for a few rounds, and then summarizes the consultation.
pub async fn consult<W: std::io::Write + Send>(
    config: &AppConfig,
    request: &DemoRequest,
    generation: Arc<GenerationAdapter>,
    confirmer: Arc<dyn PaymentConfirmer>,
    printer: &mut TranscriptPrinter<W>,
) -> Result<Consultation, ApplicationError> {
    let mut personal = personal_agent(config, request, generation.clone(), confirmer);
    let message = &request.user_intent;

    let first_reply = personal
        .respond_to_user(message)
        .await
        .map_err(|error| ApplicationError::from(&error))?;
    printer.print_line(personal.name(), &first_reply).await;

    let mut coach = HealthAgent::new(
        coach_identity(),
        format!("Request from {} via Personal AI: {message}", request.user_name),
        generation,
        config.conversation.history_window,
    );
    let settings = ConversationSettings {
        round_budget: config.conversation.consultation_rounds,
        capture_transcript: true,
    };
    let outcome = run_conversation(&mut personal, &mut coach, settings, printer)
        .await
        .map_err(|error| ApplicationError::from(&error))?;

    let transcript = outcome.transcript.as_deref().map(render_transcript).unwrap_or_default();
    let summary = personal
        .summarize_agent_chat(&transcript, message)
        .await
        .map_err(|error| ApplicationError::from(&error))?;
    printer.print_line(personal.name(), &summary).await;

    Ok(Consultation { first_reply, rounds: outcome.rounds, summary })
}
