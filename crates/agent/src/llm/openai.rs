use std::time::Duration;

use agentmart_core::config::{LlmConfig, LlmProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{
    BackendFailure, Completion, CompletionRequest, LlmClient, ToolChoice, ToolInvocation,
};

/// Chat-completions client for OpenAI and OpenAI-compatible servers (Ollama).
pub struct OpenAiClient {
    http: Client,
    provider: LlmProvider,
    base_url: String,
    api_key: Option<SecretString>,
}

impl OpenAiClient {
    pub fn new(
        provider: LlmProvider,
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, BackendFailure> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| BackendFailure::Transport(error.to_string()))?;

        Ok(Self { http, provider, base_url: base_url.into(), api_key })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, BackendFailure> {
        Self::new(
            config.provider,
            config.endpoint(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn bearer_token(&self) -> Result<Option<&str>, BackendFailure> {
        let token = self
            .api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .filter(|key| !key.trim().is_empty());

        match (self.provider, token) {
            (LlmProvider::OpenAi, None) => {
                Err(BackendFailure::MissingCredential { provider: "openai".to_string() })
            }
            (_, token) => Ok(token),
        }
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, BackendFailure> {
        let token = self.bearer_token()?;
        let url = format!("{}/chat/completions", self.base_url);
        let body = build_request_body(&request);

        let mut builder = self.http.post(&url).json(&body);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|error| BackendFailure::Transport(format!("request failed: {error}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|error| BackendFailure::Transport(format!("reading body failed: {error}")))?;

        if !status.is_success() {
            debug!(
                event_name = "llm.request.failed",
                status = status.as_u16(),
                model = %request.model,
                "chat completion request failed"
            );
            return Err(classify_failure(status, &text));
        }

        let payload: Value = serde_json::from_str(&text)
            .map_err(|error| BackendFailure::InvalidResponse(error.to_string()))?;
        parse_completion(&payload)
    }
}

pub(crate) fn build_request_body(request: &CompletionRequest) -> Value {
    let messages = request
        .messages
        .iter()
        .map(|message| json!({ "role": message.role.as_str(), "content": message.content }))
        .collect::<Vec<_>>();

    let mut body = Map::new();
    body.insert("model".to_string(), json!(request.model));
    body.insert("messages".to_string(), Value::Array(messages));
    body.insert("temperature".to_string(), json!(request.temperature));
    body.insert("max_tokens".to_string(), json!(request.max_tokens));

    if request.offers_tools() {
        let tools = request
            .tools
            .iter()
            .map(|tool| {
                let mut function = Map::new();
                function.insert("name".to_string(), json!(tool.name));
                function.insert("description".to_string(), json!(tool.description));
                if let Some(parameters) = &tool.parameters {
                    function.insert("parameters".to_string(), parameters.clone());
                }
                json!({ "type": "function", "function": Value::Object(function) })
            })
            .collect::<Vec<_>>();
        body.insert("tools".to_string(), Value::Array(tools));

        let choice = request.tool_choice.clone().unwrap_or(ToolChoice::Auto);
        body.insert("tool_choice".to_string(), tool_choice_value(&choice));
    }

    Value::Object(body)
}

fn tool_choice_value(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::None => json!("none"),
        ToolChoice::Required => json!("required"),
        ToolChoice::Named(name) => json!({ "type": "function", "function": { "name": name } }),
    }
}

pub(crate) fn classify_failure(status: StatusCode, body: &str) -> BackendFailure {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string());

    if status == StatusCode::TOO_MANY_REQUESTS || body.contains("rate_limit_exceeded") {
        return BackendFailure::RateLimited(detail);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendFailure::Authentication(detail),
        _ => BackendFailure::Transport(format!("HTTP {}: {detail}", status.as_u16())),
    }
}

pub(crate) fn parse_completion(payload: &Value) -> Result<Completion, BackendFailure> {
    let message = payload
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| BackendFailure::InvalidResponse("missing choices[0].message".to_string()))?;

    let text = message.get("content").and_then(Value::as_str).unwrap_or_default().to_string();

    let mut tool_invocations = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let function = call.get("function").ok_or_else(|| {
                BackendFailure::InvalidResponse("tool call without function".to_string())
            })?;
            let name = function.get("name").and_then(Value::as_str).ok_or_else(|| {
                BackendFailure::InvalidResponse("tool call without name".to_string())
            })?;
            let raw_arguments = function.get("arguments").and_then(Value::as_str).unwrap_or("");
            let arguments = if raw_arguments.trim().is_empty() {
                Value::Object(Map::new())
            } else {
                serde_json::from_str(raw_arguments).map_err(|error| {
                    BackendFailure::InvalidResponse(format!(
                        "tool `{name}` arguments are not JSON: {error}"
                    ))
                })?
            };

            tool_invocations.push(ToolInvocation {
                id: call.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                name: name.to_string(),
                arguments,
            });
        }
    }

    Ok(Completion { text, tool_invocations })
}
