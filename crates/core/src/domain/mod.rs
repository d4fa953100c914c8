pub mod agent;
pub mod context;
pub mod conversation;
pub mod message;
pub mod sentinel;
pub mod transcript;
