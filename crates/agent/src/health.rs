//! Health and fitness advisor that answers directly from a profile it
//! builds up over the conversation.

use std::sync::Arc;

use agentmart_core::domain::agent::AgentIdentity;
use agentmart_core::domain::context::Context;
use agentmart_core::domain::message::{Message, Role};
use agentmart_core::domain::sentinel::ChatState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::agent::{classify_chat_state, Agent, AgentError, AgentState, Draft};
use crate::generation::GenerationAdapter;
use crate::prompts::{self, AdvicePrompt};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthProfile {
    pub goals: Vec<String>,
    pub dietary_restrictions: Vec<String>,
    pub current_metrics: Map<String, Value>,
    pub workout_history: Vec<Value>,
    pub meal_plan: Map<String, Value>,
}

fn merge_unique(target: &mut Vec<String>, items: Vec<String>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

/// Parses a JSON array of strings, tolerating a surrounding code fence.
pub fn parse_string_list(output: &str) -> Option<Vec<String>> {
    let trimmed = output.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str::<Vec<String>>(body).ok()
}

pub struct HealthAgent {
    state: AgentState,
    user_intent: String,
    generation: Arc<GenerationAdapter>,
    history_window: usize,
    profile: HealthProfile,
}

impl HealthAgent {
    pub fn new(
        identity: AgentIdentity,
        user_intent: impl Into<String>,
        generation: Arc<GenerationAdapter>,
        history_window: usize,
    ) -> Self {
        Self {
            state: AgentState::new(identity, Role::Assistant),
            user_intent: user_intent.into(),
            generation,
            history_window,
            profile: HealthProfile::default(),
        }
    }

    pub fn profile(&self) -> &HealthProfile {
        &self.profile
    }

    /// Best effort: a failed call or an unparseable answer leaves the
    /// profile unchanged.
    async fn extract_list(&self, prompt: String, field: &'static str) -> Option<Vec<String>> {
        let output = match self.generation.generate_text(prompt).await {
            Ok(output) => output,
            Err(error) => {
                debug!(event_name = "health.extraction.failed", field, error = %error, "extraction call failed");
                return None;
            }
        };

        let parsed = parse_string_list(&output);
        if parsed.is_none() {
            debug!(event_name = "health.extraction.unparsed", field, "extraction output ignored");
        }
        parsed
    }

    async fn update_profile(&mut self, content: &str) {
        if let Some(goals) = self.extract_list(prompts::extract_goals(content), "goals").await {
            merge_unique(&mut self.profile.goals, goals);
        }
        if let Some(restrictions) = self
            .extract_list(prompts::extract_dietary_restrictions(content), "dietary_restrictions")
            .await
        {
            merge_unique(&mut self.profile.dietary_restrictions, restrictions);
        }
    }

    async fn generate_response(
        &mut self,
        message: &Message,
        sender: &AgentIdentity,
    ) -> Result<Draft, AgentError> {
        self.update_profile(&message.content).await;

        let frame = self.state.frame(&self.user_intent, &self.state.identity.description);
        let chat_state =
            classify_chat_state(&self.generation, &self.state.context, self.history_window, frame)
                .await?;
        if chat_state == ChatState::End {
            return Ok(Draft::conversation_end());
        }

        let profile_json = serde_json::to_string_pretty(&self.profile)?;
        let history = self.state.context.render_recent(self.history_window);
        let prompt = prompts::health_advice(&AdvicePrompt {
            advisor_name: &self.state.identity.name,
            counterpart_name: &sender.name,
            counterpart_owner: &sender.owner,
            user_intent: &self.user_intent,
            profile_json: &profile_json,
            history: &history,
            latest_message: &message.content,
        });
        let advice = self.generation.generate_text(prompt).await?;
        Ok(Draft::text(advice))
    }
}

#[async_trait]
impl Agent for HealthAgent {
    fn identity(&self) -> &AgentIdentity {
        &self.state.identity
    }

    async fn on_message(
        &mut self,
        message: &Message,
        sender: &AgentIdentity,
    ) -> Result<Message, AgentError> {
        self.state.receive(message);
        let draft = self.generate_response(message, sender).await?;
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

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agentmart_core::domain::agent::AgentIdentity;
    use agentmart_core::domain::message::{Message, Role};

    use super::{parse_string_list, HealthAgent};
    use crate::agent::Agent;
    use crate::generation::{GenerationAdapter, GenerationSettings};
    use crate::llm::scripted::ScriptedLlmClient;
    use crate::llm::{BackendFailure, Completion};

    fn coach(client: Arc<ScriptedLlmClient>) -> HealthAgent {
        HealthAgent::new(
            AgentIdentity::new("coach", "FitCo", "Health and fitness advisor"),
            "I want to get fitter",
            Arc::new(GenerationAdapter::new(client, GenerationSettings::default())),
            10,
        )
    }

    fn personal() -> AgentIdentity {
        AgentIdentity::new("alice-ai", "Alice", "Alice's personal agent")
    }

    fn from_personal(content: &str) -> Message {
        Message::new(Role::User, content, "alice-ai", "coach")
    }

    #[test]
    fn parses_plain_and_fenced_lists() {
        assert_eq!(parse_string_list(r#"["lose weight"]"#), Some(vec!["lose weight".to_string()]));
        assert_eq!(
            parse_string_list("```json\n[\"vegetarian\", \"no nuts\"]\n```"),
            Some(vec!["vegetarian".to_string(), "no nuts".to_string()])
        );
        assert_eq!(parse_string_list("none mentioned"), None);
    }

    #[tokio::test]
    async fn extracts_profile_and_answers_with_it() {
        let client = Arc::new(ScriptedLlmClient::with_texts([
            r#"["run a 5k", "lose weight"]"#,
            r#"["vegetarian"]"#,
            "[CONTINUE]",
            "Start with three easy runs a week.",
        ]));
        let mut agent = coach(client.clone());

        let reply = agent
            .on_message(&from_personal("I'm vegetarian and want to run a 5k"), &personal())
            .await
            .expect("reply");

        assert_eq!(reply.content, "Start with three easy runs a week.");
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(agent.profile().goals, vec!["run a 5k", "lose weight"]);
        assert_eq!(agent.profile().dietary_restrictions, vec!["vegetarian"]);

        let requests = client.requests().await;
        let advice_prompt = requests[3].prompt().unwrap_or_default();
        assert!(advice_prompt.contains("\"vegetarian\""));
        assert!(advice_prompt.contains("which is the personal AI assistant of Alice"));
        assert!(advice_prompt.contains("alice-ai: I'm vegetarian and want to run a 5k"));
    }

    #[tokio::test]
    async fn extraction_failures_are_swallowed() {
        let client = Arc::new(ScriptedLlmClient::with_script(vec![
            Err(BackendFailure::Transport("HTTP 500".to_string())),
            Ok(Completion::text("no restrictions here")),
            Ok(Completion::text("[CONTINUE]")),
            Ok(Completion::text("Drink more water.")),
        ]));
        let mut agent = coach(client);

        let reply = agent.on_message(&from_personal("hello"), &personal()).await.expect("reply");

        assert_eq!(reply.content, "Drink more water.");
        assert!(agent.profile().goals.is_empty());
        assert!(agent.profile().dietary_restrictions.is_empty());
    }

    #[tokio::test]
    async fn repeated_goals_are_not_duplicated() {
        let client = Arc::new(ScriptedLlmClient::with_texts([
            r#"["sleep better"]"#,
            "[]",
            "[CONTINUE]",
            "advice one",
            r#"["sleep better", "reduce stress"]"#,
            "[]",
            "[CONTINUE]",
            "advice two",
        ]));
        let mut agent = coach(client);

        agent.on_message(&from_personal("I sleep badly"), &personal()).await.expect("first");
        agent.on_message(&from_personal("and I'm stressed"), &personal()).await.expect("second");

        assert_eq!(agent.profile().goals, vec!["sleep better", "reduce stress"]);
        assert_eq!(agent.context().len(), 4);
    }

    #[tokio::test]
    async fn end_sentinel_from_counterpart_completes_the_advisor() {
        let client = Arc::new(ScriptedLlmClient::with_texts(["[]", "[]"]));
        let mut agent = coach(client.clone());

        let reply =
            agent.on_message(&from_personal("[CONVERSATION_ENDS]"), &personal()).await.expect("reply");

        assert_eq!(reply.content, "[CONVERSATION_ENDS]");
        assert!(agent.is_task_complete());
        assert_eq!(client.call_count().await, 2);
    }
}
