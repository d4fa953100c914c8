pub mod config;
pub mod domain;
pub mod errors;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};
pub use domain::agent::AgentIdentity;
pub use domain::context::Context;
pub use domain::conversation::{ConversationId, ConversationOutcome, StopReason};
pub use domain::message::{Message, Role};
pub use domain::sentinel::ChatState;
pub use domain::transcript::{render_transcript, Transcript, TranscriptEntry};
pub use errors::ApplicationError;
