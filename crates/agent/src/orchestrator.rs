//! Strictly alternating two-party conversation loop and the marketplace
//! registry that pairs agents up by name.

use std::mem;

use agentmart_core::domain::agent::AgentIdentity;
use agentmart_core::domain::conversation::{ConversationId, ConversationOutcome, StopReason};
use agentmart_core::domain::message::Message;
use agentmart_core::domain::transcript::{Transcript, TranscriptEntry};
use agentmart_core::errors::ApplicationError;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentError};

pub const DEFAULT_ROUND_BUDGET: usize = 40;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConversationSettings {
    pub round_budget: usize,
    pub capture_transcript: bool,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self { round_budget: DEFAULT_ROUND_BUDGET, capture_transcript: false }
    }
}

/// Sees every message as soon as it is produced, the opening one included.
#[async_trait]
pub trait ConversationObserver: Send {
    async fn on_message(&mut self, message: &Message);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

#[async_trait]
impl ConversationObserver for NoopObserver {
    async fn on_message(&mut self, _message: &Message) {}
}

/// Runs `agent_a` against `agent_b` until both report completion or the
/// round budget runs out.
///
/// The opening reply from `agent_a` is not counted as a round. Running out
/// of rounds is not an error; the outcome carries the stop reason. Agent
/// failures abort the run.
pub async fn run_conversation<'a>(
    agent_a: &'a mut dyn Agent,
    agent_b: &'a mut dyn Agent,
    settings: ConversationSettings,
    observer: &mut dyn ConversationObserver,
) -> Result<ConversationOutcome, AgentError> {
    let id = ConversationId::new();
    info!(
        event_name = "conversation.started",
        conversation_id = %id,
        agent_a = agent_a.name(),
        agent_b = agent_b.name(),
        round_budget = settings.round_budget,
        "conversation started"
    );

    agent_a.initialize(agent_b.identity()).await?;
    agent_b.initialize(agent_a.identity()).await?;

    let mut transcript = settings.capture_transcript.then(Transcript::new);

    let prompt = Message::opening(agent_a.name(), agent_b.name());
    let mut current = agent_a.on_message(&prompt, agent_b.identity()).await?;
    observe(&mut transcript, observer, &current).await;

    let mut sender = agent_a;
    let mut receiver = agent_b;
    let mut rounds = 0;
    let mut stop_reason = StopReason::RoundBudgetExhausted;

    while rounds < settings.round_budget {
        let response = receiver.on_message(&current, sender.identity()).await?;
        rounds += 1;
        observe(&mut transcript, observer, &response).await;
        debug!(
            event_name = "conversation.round.completed",
            conversation_id = %id,
            round = rounds,
            sender = %response.sender,
            "round completed"
        );

        if sender.is_task_complete() && receiver.is_task_complete() {
            stop_reason = StopReason::BothComplete;
            break;
        }

        mem::swap(&mut sender, &mut receiver);
        current = response;
    }

    match stop_reason {
        StopReason::BothComplete => info!(
            event_name = "conversation.completed",
            conversation_id = %id,
            rounds,
            "both agents completed their tasks"
        ),
        StopReason::RoundBudgetExhausted => warn!(
            event_name = "conversation.budget_exhausted",
            conversation_id = %id,
            rounds,
            "conversation abandoned without completion"
        ),
    }

    Ok(ConversationOutcome { id, rounds, stop_reason, transcript })
}

async fn observe(
    transcript: &mut Option<Transcript>,
    observer: &mut dyn ConversationObserver,
    message: &Message,
) {
    if let Some(entries) = transcript.as_mut() {
        entries.push(TranscriptEntry::from(message));
    }
    observer.on_message(message).await;
}

#[derive(Debug, Error)]
pub enum MarketplaceError {
    #[error("agent `{0}` is not registered in the marketplace")]
    UnknownAgent(String),
    #[error("agent `{0}` cannot chat with itself")]
    SameAgent(String),
    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl From<&MarketplaceError> for ApplicationError {
    fn from(error: &MarketplaceError) -> Self {
        match error {
            MarketplaceError::Agent(inner) => Self::from(inner),
            other => Self::Configuration(other.to_string()),
        }
    }
}

/// Registered agents, looked up by name.
pub struct Marketplace {
    agents: Vec<Box<dyn Agent>>,
    round_budget: usize,
}

impl Default for Marketplace {
    fn default() -> Self {
        Self::new(DEFAULT_ROUND_BUDGET)
    }
}

impl Marketplace {
    pub fn new(round_budget: usize) -> Self {
        Self { agents: Vec::new(), round_budget }
    }

    /// Registers `agent`, replacing any agent already using its name.
    pub fn add_agent(&mut self, agent: Box<dyn Agent>) {
        match self.position(agent.name()) {
            Some(index) => self.agents[index] = agent,
            None => self.agents.push(agent),
        }
    }

    pub fn remove_agent(&mut self, name: &str) -> Option<Box<dyn Agent>> {
        self.position(name).map(|index| self.agents.remove(index))
    }

    pub fn get_agent(&self, name: &str) -> Option<&dyn Agent> {
        self.agents.iter().find(|agent| agent.name() == name).map(|agent| agent.as_ref())
    }

    pub fn list_agents(&self) -> Vec<&AgentIdentity> {
        self.agents.iter().map(|agent| agent.identity()).collect()
    }

    pub async fn start_chat(
        &mut self,
        name_a: &str,
        name_b: &str,
        capture_transcript: bool,
        observer: &mut dyn ConversationObserver,
    ) -> Result<ConversationOutcome, MarketplaceError> {
        if name_a == name_b {
            return Err(MarketplaceError::SameAgent(name_a.to_string()));
        }
        let index_a =
            self.position(name_a).ok_or_else(|| MarketplaceError::UnknownAgent(name_a.to_string()))?;
        let index_b =
            self.position(name_b).ok_or_else(|| MarketplaceError::UnknownAgent(name_b.to_string()))?;

        let settings = ConversationSettings { round_budget: self.round_budget, capture_transcript };
        let (agent_a, agent_b) = pair_mut(&mut self.agents, index_a, index_b);
        Ok(run_conversation(agent_a, agent_b, settings, observer).await?)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.agents.iter().position(|agent| agent.name() == name)
    }
}

fn pair_mut(
    agents: &mut [Box<dyn Agent>],
    first: usize,
    second: usize,
) -> (&mut dyn Agent, &mut dyn Agent) {
    if first < second {
        let (left, right) = agents.split_at_mut(second);
        (left[first].as_mut(), right[0].as_mut())
    } else {
        let (left, right) = agents.split_at_mut(first);
        (right[0].as_mut(), left[second].as_mut())
    }
}

#[cfg(test)]
mod tests {
    use agentmart_core::domain::agent::AgentIdentity;
    use agentmart_core::domain::context::Context;
    use agentmart_core::domain::conversation::StopReason;
    use agentmart_core::domain::message::{Message, Role};
    use agentmart_core::domain::sentinel::CONVERSATION_ENDS;
    use async_trait::async_trait;

    use super::{
        run_conversation, ConversationObserver, ConversationSettings, Marketplace,
        MarketplaceError, NoopObserver,
    };
    use crate::agent::{Agent, AgentError, AgentState, Draft};
    use crate::generation::GenerationError;

    /// Replies with a numbered line, the end sentinel from `ends_on` onwards,
    /// or an error on `fails_on`.
    struct ScriptAgent {
        state: AgentState,
        turns: usize,
        ends_on: Option<usize>,
        fails_on: Option<usize>,
        initialized_with: Option<String>,
        received: Vec<Message>,
    }

    impl ScriptAgent {
        fn new(name: &str) -> Self {
            Self {
                state: AgentState::new(AgentIdentity::new(name, "Owner", "scripted"), Role::User),
                turns: 0,
                ends_on: None,
                fails_on: None,
                initialized_with: None,
                received: Vec::new(),
            }
        }

        fn ending_on(mut self, turn: usize) -> Self {
            self.ends_on = Some(turn);
            self
        }

        fn failing_on(mut self, turn: usize) -> Self {
            self.fails_on = Some(turn);
            self
        }
    }

    #[async_trait]
    impl Agent for ScriptAgent {
        fn identity(&self) -> &AgentIdentity {
            &self.state.identity
        }

        async fn initialize(&mut self, counterpart: &AgentIdentity) -> Result<(), AgentError> {
            self.initialized_with = Some(counterpart.name.clone());
            Ok(())
        }

        async fn on_message(
            &mut self,
            message: &Message,
            sender: &AgentIdentity,
        ) -> Result<Message, AgentError> {
            self.received.push(message.clone());
            self.state.receive(message);
            self.turns += 1;
            if self.fails_on == Some(self.turns) {
                return Err(AgentError::Generation(GenerationError::Configuration(
                    "missing credential".to_string(),
                )));
            }

            let draft = match self.ends_on {
                Some(turn) if self.turns >= turn => Draft::conversation_end(),
                _ => Draft::text(format!("{} turn {}", self.state.identity.name, self.turns)),
            };
            let reply = self.state.compose(draft, sender);
            Ok(self.state.record(reply))
        }

        fn is_task_complete(&self) -> bool {
            self.state.is_task_complete()
        }

        fn context(&self) -> &Context {
            &self.state.context
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        seen: Vec<Message>,
    }

    #[async_trait]
    impl ConversationObserver for RecordingObserver {
        async fn on_message(&mut self, message: &Message) {
            self.seen.push(message.clone());
        }
    }

    fn settings(round_budget: usize) -> ConversationSettings {
        ConversationSettings { round_budget, capture_transcript: true }
    }

    #[tokio::test]
    async fn receivers_strictly_alternate() {
        let mut a = ScriptAgent::new("a");
        let mut b = ScriptAgent::new("b");
        let mut observer = RecordingObserver::default();

        run_conversation(&mut a, &mut b, settings(6), &mut observer).await.expect("run");

        let senders = observer.seen.iter().map(|message| message.sender.as_str()).collect::<Vec<_>>();
        assert_eq!(senders, vec!["a", "b", "a", "b", "a", "b", "a"]);
        for pair in observer.seen.windows(2) {
            assert_eq!(pair[0].receiver, pair[1].sender);
        }
    }

    #[tokio::test]
    async fn budget_bounds_turns_when_nobody_completes() {
        let mut a = ScriptAgent::new("a");
        let mut b = ScriptAgent::new("b");

        let outcome =
            run_conversation(&mut a, &mut b, settings(5), &mut NoopObserver).await.expect("run");

        assert_eq!(outcome.rounds, 5);
        assert_eq!(outcome.stop_reason, StopReason::RoundBudgetExhausted);
        assert!(!outcome.completed());
        assert_eq!(a.turns + b.turns, 6);
    }

    #[tokio::test]
    async fn stops_once_both_agents_complete() {
        let mut a = ScriptAgent::new("a").ending_on(2);
        let mut b = ScriptAgent::new("b").ending_on(2);

        let outcome =
            run_conversation(&mut a, &mut b, settings(40), &mut NoopObserver).await.expect("run");

        assert_eq!(outcome.stop_reason, StopReason::BothComplete);
        assert_eq!(outcome.rounds, 3);
        assert_eq!(outcome.last_entry().map(|entry| entry.content.as_str()), Some(CONVERSATION_ENDS));
    }

    #[tokio::test]
    async fn single_completion_does_not_stop_the_loop() {
        let mut a = ScriptAgent::new("a");
        let mut b = ScriptAgent::new("b").ending_on(1);

        let outcome =
            run_conversation(&mut a, &mut b, settings(4), &mut NoopObserver).await.expect("run");

        assert!(b.is_task_complete());
        assert!(!a.is_task_complete());
        assert_eq!(outcome.rounds, 4);
        assert_eq!(outcome.stop_reason, StopReason::RoundBudgetExhausted);
    }

    #[tokio::test]
    async fn transcript_starts_with_the_opening_message() {
        let mut a = ScriptAgent::new("a");
        let mut b = ScriptAgent::new("b");

        let outcome =
            run_conversation(&mut a, &mut b, settings(2), &mut NoopObserver).await.expect("run");

        let transcript = outcome.transcript.expect("transcript requested");
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[0].sender, "a");
        assert_eq!(transcript[0].content, "a turn 1");
        assert_eq!(a.initialized_with.as_deref(), Some("b"));
        assert_eq!(b.initialized_with.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn opening_prompt_is_sent_from_the_first_agent() {
        let mut a = ScriptAgent::new("a");
        let mut b = ScriptAgent::new("b");

        run_conversation(&mut a, &mut b, settings(1), &mut NoopObserver).await.expect("run");

        let opening = &a.received[0];
        assert_eq!(opening.sender, "a");
        assert_eq!(opening.receiver, "b");
        assert!(!opening.has_content());
    }

    #[tokio::test]
    async fn transcript_is_omitted_unless_requested() {
        let mut a = ScriptAgent::new("a");
        let mut b = ScriptAgent::new("b");
        let settings = ConversationSettings { round_budget: 2, capture_transcript: false };

        let outcome = run_conversation(&mut a, &mut b, settings, &mut NoopObserver).await.expect("run");

        assert!(outcome.transcript.is_none());
    }

    #[tokio::test]
    async fn agent_failure_aborts_the_run() {
        let mut a = ScriptAgent::new("a");
        let mut b = ScriptAgent::new("b").failing_on(2);

        let result = run_conversation(&mut a, &mut b, settings(10), &mut NoopObserver).await;

        assert!(matches!(result, Err(AgentError::Generation(GenerationError::Configuration(_)))));
        assert_eq!(a.turns, 2);
    }

    #[tokio::test]
    async fn marketplace_pairs_registered_agents_in_either_order() {
        let mut marketplace = Marketplace::new(3);
        marketplace.add_agent(Box::new(ScriptAgent::new("delivery")));
        marketplace.add_agent(Box::new(ScriptAgent::new("alice-ai")));

        let mut observer = RecordingObserver::default();
        let outcome =
            marketplace.start_chat("alice-ai", "delivery", false, &mut observer).await.expect("chat");

        assert_eq!(outcome.rounds, 3);
        assert_eq!(observer.seen[0].sender, "alice-ai");
        assert_eq!(observer.seen[1].sender, "delivery");
    }

    #[test]
    fn marketplace_registry_replaces_and_removes_by_name() {
        let mut marketplace = Marketplace::default();
        marketplace.add_agent(Box::new(ScriptAgent::new("coach")));
        marketplace.add_agent(Box::new(ScriptAgent::new("coach").ending_on(1)));
        marketplace.add_agent(Box::new(ScriptAgent::new("alice-ai")));

        let names =
            marketplace.list_agents().iter().map(|identity| identity.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["coach", "alice-ai"]);
        assert!(marketplace.get_agent("coach").is_some());

        assert!(marketplace.remove_agent("coach").is_some());
        assert!(marketplace.get_agent("coach").is_none());
        assert!(marketplace.remove_agent("coach").is_none());
    }

    #[tokio::test]
    async fn marketplace_rejects_unknown_and_self_chats() {
        let mut marketplace = Marketplace::default();
        marketplace.add_agent(Box::new(ScriptAgent::new("alice-ai")));

        let unknown = marketplace.start_chat("alice-ai", "ghost", false, &mut NoopObserver).await;
        assert!(matches!(unknown, Err(MarketplaceError::UnknownAgent(name)) if name == "ghost"));

        let same = marketplace.start_chat("alice-ai", "alice-ai", false, &mut NoopObserver).await;
        assert!(matches!(same, Err(MarketplaceError::SameAgent(_))));
    }
}
