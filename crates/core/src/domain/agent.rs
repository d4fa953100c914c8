use serde::{Deserialize, Serialize};

/// Who an agent is and whom it acts for. Counterparts see each other only
/// through this value, never through the other agent's state.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub name: String,
    pub owner: String,
    pub description: String,
}

impl AgentIdentity {
    pub fn new(
        name: impl Into<String>,
        owner: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self { name: name.into(), owner: owner.into(), description: description.into() }
    }
}
