//! Agents that negotiate on a user's behalf.
//!
//! - `llm` / `generation`: backend boundary, retrying adapter, token budget
//! - `agent`: the turn-taking contract plus the shared pipeline pieces
//! - `personal`, `delivery`, `health`: the agent variants
//! - `orchestrator`: the alternating conversation loop and marketplace
//!
//! Every agent owns its own history. Counterparts only ever exchange
//! messages and identities.

pub mod agent;
pub mod delivery;
pub mod generation;
pub mod geocoding;
pub mod health;
pub mod llm;
pub mod orchestrator;
pub mod payment;
pub mod personal;
pub mod personal_data;
pub mod prompts;
pub mod tools;

pub use agent::{Agent, AgentError};
pub use generation::{GenerationAdapter, GenerationError, GenerationSettings};
pub use orchestrator::{
    run_conversation, ConversationObserver, ConversationSettings, Marketplace, MarketplaceError,
    NoopObserver,
};
