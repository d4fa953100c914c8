//! The owner's personal agent: negotiates with a service agent using the
//! owner's profile, may call tools, and has every draft checked by a
//! validator pass before it is sent.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use agentmart_core::config::ConversationConfig;
use agentmart_core::domain::agent::AgentIdentity;
use agentmart_core::domain::context::Context;
use agentmart_core::domain::message::{Message, Role};
use agentmart_core::domain::sentinel::{self, ChatState};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::agent::{classify_chat_state, Agent, AgentError, AgentState, Draft};
use crate::generation::{GenerationAdapter, GenerationError, GenerationRequest};
use crate::llm::Completion;
use crate::payment::{PaymentConfirmer, PaymentTool};
use crate::personal_data::{self, SourceContent};
use crate::prompts::{self, NegotiationPrompt, TaskFrame};
use crate::tools::ToolRegistry;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersonalAgentSettings {
    pub validation_attempts: u32,
    pub history_window: usize,
    pub personal_data_dir: Option<PathBuf>,
}

impl Default for PersonalAgentSettings {
    fn default() -> Self {
        Self { validation_attempts: 3, history_window: 10, personal_data_dir: None }
    }
}

impl From<&ConversationConfig> for PersonalAgentSettings {
    fn from(config: &ConversationConfig) -> Self {
        Self {
            validation_attempts: config.validation_attempts,
            history_window: config.history_window,
            personal_data_dir: config.personal_data_dir.clone(),
        }
    }
}

/// Tools the personal agent offers the model during negotiation.
pub fn negotiation_tools(confirmer: Arc<dyn PaymentConfirmer>) -> ToolRegistry {
    let mut tools = ToolRegistry::default();
    tools.register(PaymentTool::new(confirmer));
    tools
}

pub struct PersonalAgent {
    state: AgentState,
    user_intent: String,
    generation: Arc<GenerationAdapter>,
    tools: ToolRegistry,
    settings: PersonalAgentSettings,
    basic_info: String,
    preferences: HashMap<String, String>,
}

impl PersonalAgent {
    pub fn new(
        identity: AgentIdentity,
        user_intent: impl Into<String>,
        generation: Arc<GenerationAdapter>,
        tools: ToolRegistry,
        settings: PersonalAgentSettings,
    ) -> Self {
        Self {
            state: AgentState::new(identity, Role::User),
            user_intent: user_intent.into(),
            generation,
            tools,
            settings,
            basic_info: String::new(),
            preferences: HashMap::new(),
        }
    }

    pub fn basic_info(&self) -> &str {
        &self.basic_info
    }

    pub fn preferences_for(&self, counterpart: &str) -> Option<&str> {
        self.preferences.get(counterpart).map(String::as_str)
    }

    /// Answers the owner directly, outside any agent-to-agent exchange.
    pub async fn respond_to_user(&self, user_message: &str) -> Result<String, AgentError> {
        let identity = &self.state.identity;
        let prompt = prompts::respond_to_user(&identity.name, &identity.owner, user_message);
        Ok(self.generation.generate_text(prompt).await?)
    }

    /// Turns a finished consultation into an answer for the owner.
    pub async fn summarize_agent_chat(
        &self,
        transcript: &str,
        original_message: &str,
    ) -> Result<String, AgentError> {
        let identity = &self.state.identity;
        let prompt = prompts::summarize_agent_chat(
            &identity.name,
            &identity.owner,
            transcript,
            original_message,
        );
        Ok(self.generation.generate_text(prompt).await?)
    }

    fn frame<'a>(&'a self, counterpart: &'a AgentIdentity) -> TaskFrame<'a> {
        self.state.frame(&self.user_intent, &counterpart.description)
    }

    fn owner_profile(&self, counterpart: &str) -> String {
        let preferences = self.preferences_for(counterpart).unwrap_or_default();
        format!("{}\n\n{}", self.basic_info, preferences)
    }

    async fn retrieve_preferences(&mut self, counterpart: &AgentIdentity) -> Result<(), AgentError> {
        let Some(root) = self.settings.personal_data_dir.clone() else {
            self.preferences.insert(counterpart.name.clone(), String::new());
            return Ok(());
        };

        let owner = self.state.identity.owner.clone();
        let dataset = personal_data::load_owner_data(&root, &owner)?;
        info!(
            event_name = "agent.profile.loading",
            agent = %self.state.identity.name,
            owner = %owner,
            sources = dataset.sources.len(),
            "retrieving personal preferences"
        );

        if let Some(basic_info) = &dataset.basic_info {
            self.basic_info = self
                .generation
                .generate_text(prompts::summarize_personal_preferences(basic_info))
                .await?;
        }

        let mut findings = Vec::with_capacity(dataset.sources.len());
        for source in &dataset.sources {
            let finding = match &source.content {
                SourceContent::Data(data) => {
                    let prompt = prompts::retrieve_personal_info(
                        self.frame(counterpart),
                        &counterpart.name,
                        data,
                    );
                    self.generation.generate_text(prompt).await?
                }
                SourceContent::Unreadable(note) => note.clone(),
            };
            findings.push(finding);
        }

        let joined = personal_data::cap_findings(&findings.join("\n\n"));
        let preferences = if joined.trim().is_empty() {
            String::new()
        } else {
            self.generation.generate_text(prompts::summarize_personal_preferences(&joined)).await?
        };
        self.preferences.insert(counterpart.name.clone(), preferences);
        Ok(())
    }

    async fn draft(&self, counterpart: &AgentIdentity, notes: &str) -> Result<Completion, GenerationError> {
        let history = self.state.context.render_recent(self.settings.history_window);
        let owner_profile = self.owner_profile(&counterpart.name);
        let prompt = prompts::generate_response(&NegotiationPrompt {
            frame: self.frame(counterpart),
            counterpart_name: &counterpart.name,
            owner_profile: &owner_profile,
            history: &history,
            notes,
        });
        self.generation.generate(GenerationRequest::new(prompt).with_tools(self.tools.declarations())).await
    }

    async fn run_tools(&mut self, completion: &Completion, message: &Message, counterpart: &AgentIdentity) {
        for invocation in &completion.tool_invocations {
            let result = self.tools.invoke(&invocation.name, &invocation.arguments, message).await;
            info!(
                event_name = "agent.tool.executed",
                agent = %self.state.identity.name,
                tool = %invocation.name,
                "tool result folded into context"
            );
            self.state.context.append(Message::new(
                Role::User,
                result,
                format!("[{}] tool", invocation.name),
                &counterpart.name,
            ));
        }
    }

    /// Produces the outgoing message. The returned message is already part
    /// of the context.
    async fn generate_response(
        &mut self,
        message: &Message,
        counterpart: &AgentIdentity,
    ) -> Result<Message, AgentError> {
        let window = self.settings.history_window;
        let chat_state =
            classify_chat_state(&self.generation, &self.state.context, window, self.frame(counterpart))
                .await?;
        if chat_state == ChatState::End {
            let reply = self.state.compose(Draft::conversation_end(), counterpart);
            self.state.context.append(reply.clone());
            return Ok(reply);
        }

        let attempts = self.settings.validation_attempts.max(1);
        let mut notes = String::new();
        let mut attempt = 1;
        loop {
            let mut completion = self.draft(counterpart, &notes).await?;
            if completion.requests_tools() {
                self.run_tools(&completion, message, counterpart).await;
                completion = self.draft(counterpart, &notes).await?;
            }

            let history = self.state.context.render_recent(window);
            let candidate = self.state.compose(Draft::text(completion.text), counterpart);
            self.state.context.append(candidate.clone());

            let prompt = prompts::validate_response(self.frame(counterpart), &history, &candidate.content);
            let verdict = match self.generation.generate_text(prompt).await {
                Ok(verdict) => verdict,
                Err(error) => {
                    self.state.context.rollback();
                    return Err(error.into());
                }
            };

            if sentinel::is_validation_approved(&verdict) {
                return Ok(candidate);
            }

            self.state.context.rollback();
            warn!(
                event_name = "agent.validation.rejected",
                agent = %self.state.identity.name,
                attempt,
                max_attempts = attempts,
                "validator rejected draft"
            );

            if attempt >= attempts {
                warn!(
                    event_name = "agent.validation.exhausted",
                    agent = %self.state.identity.name,
                    "sending last draft without approval"
                );
                self.state.context.append(candidate.clone());
                return Ok(candidate);
            }

            notes = prompts::rejection_notes(&candidate.content, &verdict);
            attempt += 1;
        }
    }
}

#[async_trait]
impl Agent for PersonalAgent {
    fn identity(&self) -> &AgentIdentity {
        &self.state.identity
    }

    async fn initialize(&mut self, counterpart: &AgentIdentity) -> Result<(), AgentError> {
        self.retrieve_preferences(counterpart).await
    }

    async fn on_message(
        &mut self,
        message: &Message,
        sender: &AgentIdentity,
    ) -> Result<Message, AgentError> {
        self.state.receive(message);
        let reply = self.generate_response(message, sender).await?;
        self.state.settle(&reply);
        Ok(reply)
    }

    fn is_task_complete(&self) -> bool {
        self.state.is_task_complete()
    }

    fn context(&self) -> &Context {
        &self.state.context
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use agentmart_core::domain::agent::AgentIdentity;
    use agentmart_core::domain::message::{Message, Role};
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    use super::{negotiation_tools, PersonalAgent, PersonalAgentSettings};
    use crate::agent::{Agent, AgentError};
    use crate::generation::{GenerationAdapter, GenerationError, GenerationSettings};
    use crate::llm::scripted::ScriptedLlmClient;
    use crate::llm::{BackendFailure, Completion};
    use crate::payment::{PaymentConfirmer, PaymentSummary};
    use crate::tools::ToolRegistry;

    struct AlwaysConfirm;

    #[async_trait]
    impl PaymentConfirmer for AlwaysConfirm {
        async fn confirm(&self, _summary: &PaymentSummary) -> Result<bool> {
            Ok(true)
        }
    }

    fn service() -> AgentIdentity {
        AgentIdentity::new("byte", "Byte Eats", "Food delivery service agent")
    }

    fn personal_agent(client: Arc<ScriptedLlmClient>, settings: PersonalAgentSettings) -> PersonalAgent {
        PersonalAgent::new(
            AgentIdentity::new("alice-ai", "Alice", "Alice's personal agent"),
            "Please help me order some food.",
            Arc::new(GenerationAdapter::new(client, GenerationSettings::default())),
            negotiation_tools(Arc::new(AlwaysConfirm)),
            settings,
        )
    }

    fn incoming(content: &str) -> Message {
        Message::new(Role::Assistant, content, "byte", "alice-ai")
    }

    fn prompts_of(requests: &[crate::llm::CompletionRequest]) -> Vec<String> {
        requests.iter().filter_map(|request| request.prompt().map(str::to_string)).collect()
    }

    #[tokio::test]
    async fn approved_first_draft_uses_one_generation_and_one_validation() {
        let client = Arc::new(ScriptedLlmClient::with_texts(["[CONTINUE]", "I'd like pad thai", "[YES]"]));
        let mut agent = personal_agent(client.clone(), PersonalAgentSettings::default());

        let reply = agent.on_message(&incoming("What would you like?"), &service()).await.expect("reply");

        assert_eq!(reply.content, "I'd like pad thai");
        assert_eq!(reply.role, Role::User);
        assert_eq!(reply.receiver, "byte");
        assert_eq!(agent.context().len(), 2);
        assert_eq!(agent.context().last(), Some(&reply));

        let requests = client.requests().await;
        assert_eq!(requests.len(), 3);
        assert_eq!(requests.iter().filter(|request| request.offers_tools()).count(), 1);
        assert!(prompts_of(&requests)[2].contains("only reply with [YES]"));
        assert!(!agent.is_task_complete());
    }

    #[tokio::test]
    async fn rejected_twice_then_approved_returns_third_draft() {
        let client = Arc::new(ScriptedLlmClient::with_texts([
            "[CONTINUE]",
            "draft one",
            "Too vague.",
            "draft two",
            "Still missing the address.",
            "draft three",
            "[YES]",
        ]));
        let mut agent = personal_agent(client.clone(), PersonalAgentSettings::default());

        let reply = agent.on_message(&incoming("What would you like?"), &service()).await.expect("reply");

        assert_eq!(reply.content, "draft three");
        // incoming message + approved draft; the two rejected drafts were rolled back
        assert_eq!(agent.context().len(), 2);
        let contents = agent.context().history().iter().map(|m| m.content.as_str()).collect::<Vec<_>>();
        assert_eq!(contents, vec!["What would you like?", "draft three"]);

        let prompts = prompts_of(&client.requests().await);
        assert!(prompts[3].contains("# Notes"));
        assert!(prompts[3].contains("draft one"));
        assert!(prompts[3].contains("Too vague."));
        assert!(prompts[5].contains("Still missing the address."));
    }

    #[tokio::test]
    async fn exhausted_validation_sends_last_draft() {
        let client = Arc::new(ScriptedLlmClient::with_texts([
            "[CONTINUE]", "d1", "no", "d2", "no", "d3", "no",
        ]));
        let mut agent = personal_agent(client.clone(), PersonalAgentSettings::default());

        let reply = agent.on_message(&incoming("Anything else?"), &service()).await.expect("reply");

        assert_eq!(reply.content, "d3");
        assert_eq!(agent.context().len(), 2);
        assert_eq!(client.call_count().await, 7);
    }

    #[tokio::test]
    async fn tool_results_are_folded_into_context_before_redrafting() {
        let client = Arc::new(ScriptedLlmClient::with_script(vec![
            Ok(Completion::text("[CONTINUE]")),
            Ok(Completion::tool_call("process_coinbase_payment", json!({}))),
            Ok(Completion::text("Payment sent, thank you!")),
            Ok(Completion::text("[YES]")),
        ]));
        let mut agent = personal_agent(client.clone(), PersonalAgentSettings::default());
        let invoice = incoming("Please pay here").with_metadata(Some(json!({
            "text": "Please pay here",
            "paymentDetails": {
                "pricing": { "local": { "amount": "18.00", "currency": "USD" } },
                "metadata": { "itemDescription": "pad thai", "name": "Alice" },
                "organizationName": "Byte Eats"
            }
        })));

        let reply = agent.on_message(&invoice, &service()).await.expect("reply");

        assert_eq!(reply.content, "Payment sent, thank you!");
        let history = agent.context().history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].sender, "[process_coinbase_payment] tool");
        assert!(history[1].content.starts_with("[PAYMENT_SUCCEEDED]"));
        assert!(prompts_of(&client.requests().await)[2].contains("[PAYMENT_SUCCEEDED]"));
    }

    #[tokio::test]
    async fn termination_sentinel_short_circuits_without_backend_call() {
        let client = Arc::new(ScriptedLlmClient::with_texts(Vec::<String>::new()));
        let mut agent = personal_agent(client.clone(), PersonalAgentSettings::default());

        let reply = agent.on_message(&incoming("[CONVERSATION_ENDS]"), &service()).await.expect("reply");

        assert_eq!(reply.content, "[CONVERSATION_ENDS]");
        assert!(agent.is_task_complete());
        assert_eq!(client.call_count().await, 0);
    }

    #[tokio::test]
    async fn classifier_end_completes_the_task() {
        let client = Arc::new(ScriptedLlmClient::with_texts(["[CONVERSATION_ENDS]"]));
        let mut agent = personal_agent(client.clone(), PersonalAgentSettings::default());

        let reply = agent.on_message(&incoming("Enjoy your meal!"), &service()).await.expect("reply");

        assert_eq!(reply.content, "[CONVERSATION_ENDS]");
        assert!(agent.is_task_complete());
        assert_eq!(client.call_count().await, 1);
    }

    #[tokio::test]
    async fn backend_failure_propagates_from_on_message() {
        let client = Arc::new(ScriptedLlmClient::with_script(vec![
            Ok(Completion::text("[CONTINUE]")),
            Err(BackendFailure::Authentication("bad key".to_string())),
        ]));
        let mut agent = personal_agent(client, PersonalAgentSettings::default());

        let error = agent.on_message(&incoming("Hi"), &service()).await.expect_err("must fail");

        assert!(matches!(
            error,
            AgentError::Generation(GenerationError::Backend { attempts: 1, .. })
        ));
        assert_eq!(agent.context().len(), 1);
    }

    #[tokio::test]
    async fn validator_failure_rolls_back_tentative_draft() {
        let client = Arc::new(ScriptedLlmClient::with_script(vec![
            Ok(Completion::text("[CONTINUE]")),
            Ok(Completion::text("a draft")),
            Err(BackendFailure::Transport("HTTP 502".to_string())),
        ]));
        let mut agent = personal_agent(client, PersonalAgentSettings::default());

        assert!(agent.on_message(&incoming("Hi"), &service()).await.is_err());
        assert_eq!(agent.context().len(), 1);
    }

    #[tokio::test]
    async fn initialize_without_data_directory_makes_no_calls() {
        let client = Arc::new(ScriptedLlmClient::with_texts(Vec::<String>::new()));
        let mut agent = personal_agent(client.clone(), PersonalAgentSettings::default());

        agent.initialize(&service()).await.expect("initialize");

        assert_eq!(agent.preferences_for("byte"), Some(""));
        assert_eq!(client.call_count().await, 0);
    }

    #[tokio::test]
    async fn initialize_summarizes_owner_data_per_counterpart() -> Result<(), String> {
        let root = TempDir::new().map_err(|error| error.to_string())?;
        let owner = root.path().join("Alice");
        fs::create_dir_all(&owner).map_err(|error| error.to_string())?;
        fs::write(owner.join("basic_info.json"), r#"{"city":"Austin"}"#)
            .map_err(|error| error.to_string())?;
        fs::write(owner.join("food.json"), r#"{"likes":["thai"],"allergies":["peanuts"]}"#)
            .map_err(|error| error.to_string())?;

        let client = Arc::new(ScriptedLlmClient::with_texts([
            "Alice lives in Austin.",
            "Alice likes thai food and is allergic to peanuts.",
            "Prefers thai, avoid peanuts.",
        ]));
        let settings = PersonalAgentSettings {
            personal_data_dir: Some(root.path().to_path_buf()),
            ..PersonalAgentSettings::default()
        };
        let mut agent = personal_agent(client.clone(), settings);

        agent.initialize(&service()).await.map_err(|error| error.to_string())?;

        assert_eq!(agent.basic_info(), "Alice lives in Austin.");
        assert_eq!(agent.preferences_for("byte"), Some("Prefers thai, avoid peanuts."));
        let prompts = prompts_of(&client.requests().await);
        assert!(prompts[1].contains("peanuts"));
        assert!(prompts[2].contains("Alice likes thai food"));
        Ok(())
    }

    #[tokio::test]
    async fn initialize_with_unknown_owner_fails() {
        let root = TempDir::new().expect("tempdir");
        let client = Arc::new(ScriptedLlmClient::with_texts(Vec::<String>::new()));
        let settings = PersonalAgentSettings {
            personal_data_dir: Some(root.path().to_path_buf()),
            ..PersonalAgentSettings::default()
        };
        let mut agent = personal_agent(client, settings);

        let error = agent.initialize(&service()).await.expect_err("must fail");
        assert!(matches!(error, AgentError::Profile(_)));
    }

    #[tokio::test]
    async fn direct_user_replies_bypass_the_negotiation_pipeline() {
        let client = Arc::new(ScriptedLlmClient::with_texts(["Sure, let me ask a coach.", "Summary"]));
        let agent = PersonalAgent::new(
            AgentIdentity::new("alice-ai", "Alice", "Alice's personal agent"),
            "stay healthy",
            Arc::new(GenerationAdapter::new(client.clone(), GenerationSettings::default())),
            ToolRegistry::default(),
            PersonalAgentSettings::default(),
        );

        let reply = agent.respond_to_user("How do I sleep better?").await.expect("reply");
        let summary = agent.summarize_agent_chat("coach: sleep 8h", "How do I sleep better?").await.expect("summary");

        assert_eq!(reply, "Sure, let me ask a coach.");
        assert_eq!(summary, "Summary");
        let prompts = prompts_of(&client.requests().await);
        assert!(prompts[1].contains("coach: sleep 8h"));
        assert!(agent.context().is_empty());
    }
}
