//! Service-side agent that relays the conversation to a food delivery
//! backend once it knows who the customer is.

use std::sync::Arc;
use std::time::Duration;

use agentmart_core::config::{ConversationConfig, ServiceConfig};
use agentmart_core::domain::agent::AgentIdentity;
use agentmart_core::domain::context::Context;
use agentmart_core::domain::message::{Message, Role};
use agentmart_core::domain::sentinel::ChatState;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::agent::{classify_chat_state, Agent, AgentError, AgentState, Draft};
use crate::generation::GenerationAdapter;
use crate::geocoding::Geocoder;
use crate::prompts;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("service request failed: {0}")]
    Transport(String),
    #[error("service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("service response is malformed: {0}")]
    InvalidResponse(String),
    #[error("no chat session has been opened with the service")]
    SessionNotStarted,
}

/// Payload that opens a chat session for a customer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub user_address: String,
    pub user_name: String,
    pub user_phone_number: String,
    pub wallet_address: String,
    pub flow: String,
    pub user_lat: f64,
    pub user_lon: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServiceReply {
    pub text: String,
    /// The full reply object, kept so invoices reach the payer untouched.
    pub payload: Value,
}

impl ServiceReply {
    pub fn from_payload(mut payload: Value) -> Result<Self, ServiceError> {
        let text = payload
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::InvalidResponse("reply has no text".to_string()))?
            .trim()
            .to_string();
        payload["text"] = json!(text);
        Ok(Self { text, payload })
    }

    /// Whole reply when it carries an invoice, nothing otherwise.
    pub fn metadata(&self) -> Option<Value> {
        self.payload.get("paymentDetails").map(|_| self.payload.clone())
    }
}

#[async_trait]
pub trait ServiceBackend: Send + Sync {
    async fn init_session(&self, request: &SessionRequest) -> Result<String, ServiceError>;
    async fn send_message(&self, chat_id: &str, message: &str) -> Result<ServiceReply, ServiceError>;
}

/// `POST /init_chat` and `POST /send_message/{chat_id}` over HTTP.
#[derive(Debug)]
pub struct HttpServiceBackend {
    http: Client,
    base_url: String,
}

impl HttpServiceBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ServiceError::Transport(error.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self, ServiceError> {
        Self::new(config.base_url.clone(), Duration::from_secs(config.timeout_secs))
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ServiceError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|error| ServiceError::Transport(error.to_string()))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|error| ServiceError::InvalidResponse(error.to_string()))?;

        if !status.is_success() {
            let message =
                payload.get("error").and_then(Value::as_str).unwrap_or("Unknown error").to_string();
            return Err(ServiceError::Status { status: status.as_u16(), message });
        }
        Ok(payload)
    }
}

#[async_trait]
impl ServiceBackend for HttpServiceBackend {
    async fn init_session(&self, request: &SessionRequest) -> Result<String, ServiceError> {
        let body = serde_json::to_value(request)
            .map_err(|error| ServiceError::InvalidResponse(error.to_string()))?;
        let payload = self.post("/init_chat", &body).await?;
        payload
            .get("chat_id")
            .and_then(|chat_id| match chat_id {
                Value::String(text) => Some(text.clone()),
                Value::Number(number) => Some(number.to_string()),
                _ => None,
            })
            .ok_or_else(|| ServiceError::InvalidResponse("init_chat returned no chat_id".to_string()))
    }

    async fn send_message(&self, chat_id: &str, message: &str) -> Result<ServiceReply, ServiceError> {
        let payload =
            self.post(&format!("/send_message/{chat_id}"), &json!({ "message": message })).await?;
        let reply = payload
            .get("response")
            .cloned()
            .ok_or_else(|| ServiceError::InvalidResponse("reply has no response".to_string()))?;
        ServiceReply::from_payload(reply)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
struct ProfileSubmission {
    user_name: String,
    user_phone_number: String,
    user_address: String,
}

/// Who the service is delivering to.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CustomerProfile {
    pub user_name: String,
    pub user_phone_number: String,
    pub user_address: String,
    pub user_lat: Option<f64>,
    pub user_lon: Option<f64>,
}

impl CustomerProfile {
    pub fn is_complete(&self) -> bool {
        !self.user_name.is_empty()
            && !self.user_phone_number.is_empty()
            && !self.user_address.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliverySettings {
    pub wallet_address: String,
    pub flow: String,
    pub history_window: usize,
}

impl DeliverySettings {
    pub fn from_config(service: &ServiceConfig, conversation: &ConversationConfig) -> Self {
        Self {
            wallet_address: service.wallet_address.clone(),
            flow: service.flow.clone(),
            history_window: conversation.history_window,
        }
    }
}

pub struct DeliveryAgent {
    state: AgentState,
    user_intent: String,
    generation: Arc<GenerationAdapter>,
    geocoder: Arc<dyn Geocoder>,
    backend: Arc<dyn ServiceBackend>,
    settings: DeliverySettings,
    profile: CustomerProfile,
    chat_id: Option<String>,
}

impl DeliveryAgent {
    pub fn new(
        identity: AgentIdentity,
        user_intent: impl Into<String>,
        generation: Arc<GenerationAdapter>,
        geocoder: Arc<dyn Geocoder>,
        backend: Arc<dyn ServiceBackend>,
        settings: DeliverySettings,
    ) -> Self {
        Self {
            state: AgentState::new(identity, Role::Assistant),
            user_intent: user_intent.into(),
            generation,
            geocoder,
            backend,
            settings,
            profile: CustomerProfile::default(),
            chat_id: None,
        }
    }

    pub fn profile(&self) -> &CustomerProfile {
        &self.profile
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    /// Fills the customer profile from a JSON submission and opens the
    /// backend session. Anything unparseable gets the instructive prompt.
    async fn collect_profile(&mut self, message: &Message) -> Result<Draft, AgentError> {
        let submission = match serde_json::from_str::<ProfileSubmission>(message.content.trim()) {
            Ok(submission) => submission,
            Err(error) => {
                info!(
                    event_name = "delivery.profile.requested",
                    agent = %self.state.identity.name,
                    reason = %error,
                    "customer details missing"
                );
                return Ok(Draft::text(prompts::DELIVERY_PROFILE_REQUEST));
            }
        };

        let coordinates = match self.geocoder.geocode(&submission.user_address).await {
            Ok(coordinates) => coordinates,
            Err(error) => {
                warn!(
                    event_name = "delivery.geocode.failed",
                    agent = %self.state.identity.name,
                    error = %error,
                    "could not geocode customer address"
                );
                return Ok(Draft::text(prompts::DELIVERY_PROFILE_REQUEST));
            }
        };

        let request = SessionRequest {
            user_address: coordinates.formatted_address.clone(),
            user_name: submission.user_name.clone(),
            user_phone_number: submission.user_phone_number.clone(),
            wallet_address: self.settings.wallet_address.clone(),
            flow: self.settings.flow.clone(),
            user_lat: coordinates.lat,
            user_lon: coordinates.lng,
        };
        let chat_id = self.backend.init_session(&request).await?;
        info!(
            event_name = "delivery.session.opened",
            agent = %self.state.identity.name,
            chat_id = %chat_id,
            "service chat session opened"
        );

        self.profile = CustomerProfile {
            user_name: submission.user_name,
            user_phone_number: submission.user_phone_number,
            user_address: coordinates.formatted_address,
            user_lat: Some(coordinates.lat),
            user_lon: Some(coordinates.lng),
        };
        self.chat_id = Some(chat_id);
        Ok(Draft::text(prompts::DELIVERY_ACKNOWLEDGEMENT))
    }

    async fn generate_response(&mut self, message: &Message) -> Result<Draft, AgentError> {
        if !self.profile.is_complete() {
            return self.collect_profile(message).await;
        }

        let frame = self.state.frame(&self.user_intent, &self.state.identity.description);
        let chat_state = classify_chat_state(
            &self.generation,
            &self.state.context,
            self.settings.history_window,
            frame,
        )
        .await?;
        if chat_state == ChatState::End {
            return Ok(Draft::conversation_end());
        }

        let chat_id = self.chat_id.as_deref().ok_or(ServiceError::SessionNotStarted)?;
        let reply = self.backend.send_message(chat_id, &message.content).await?;
        Ok(Draft { metadata: reply.metadata(), content: reply.text })
    }
}

#[async_trait]
impl Agent for DeliveryAgent {
    fn identity(&self) -> &AgentIdentity {
        &self.state.identity
    }

    async fn on_message(
        &mut self,
        message: &Message,
        sender: &AgentIdentity,
    ) -> Result<Message, AgentError> {
        self.state.receive(message);
        let draft = self.generate_response(message).await?;
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
