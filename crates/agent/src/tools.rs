use std::collections::HashMap;

use agentmart_core::domain::message::Message;
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::llm::ToolDeclaration;

/// A side-effecting handler the model can request by name.
///
/// Handlers never fail: every outcome, including errors, is reported as the
/// returned text so the conversation can react to it.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn declaration(&self) -> ToolDeclaration;
    async fn execute(&self, arguments: &Value, message: &Message) -> String;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Declarations sorted by name so requests are stable across runs.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        let mut declarations = self.tools.values().map(|tool| tool.declaration()).collect::<Vec<_>>();
        declarations.sort_by(|left, right| left.name.cmp(&right.name));
        declarations
    }

    pub async fn invoke(&self, name: &str, arguments: &Value, message: &Message) -> String {
        match self.tools.get(name) {
            Some(tool) => tool.execute(arguments, message).await,
            None => {
                warn!(event_name = "agent.tool.unknown", tool = name, "model requested unknown tool");
                format!("[TOOL_FAILED] Tool `{name}` is not available.")
            }
        }
    }
}
