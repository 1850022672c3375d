use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use qms_types::{AgentReply, AgentTask, IdentifierKind, QmsError, RefusalReason};
use tokio::sync::RwLock;

/// What an agent's `run` method receives for a single task: the task
/// itself (with dependency references already resolved by the executor),
/// the project the task belongs to, and the identifiers this conversation
/// has already verified (e.g. via `citation_validation`), which an agent
/// with no tool calls of its own can treat as its verified set.
pub struct AgentContext {
    pub project_id: String,
    pub task: AgentTask,
    pub verified_identifiers: HashSet<(IdentifierKind, String)>,
}

/// The agent contract shared by all seven specialized agents.
/// `temperature = 0` is enforced by each concrete agent's own `Reasoner`
/// call, not by this trait, since the temperature belongs to the model
/// request, not the agent interface.
#[async_trait]
pub trait Agent: Send + Sync {
    fn key(&self) -> &'static str;
    fn display_name(&self) -> &'static str;
    fn allowed_tools(&self) -> &'static [&'static str];

    async fn run(&self, ctx: &AgentContext) -> Result<AgentReply, QmsError>;
}

/// A refusal substitution helper: agents construct refusals through this
/// rather than ad hoc `AgentReply::Refusal` literals scattered through
/// each module, keeping refusal codes consistent.
pub fn refuse(code: &str, message: impl Into<String>) -> AgentReply {
    AgentReply::Refusal(RefusalReason {
        code: code.to_string(),
        message: message.into(),
    })
}

#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: Arc<RwLock<HashMap<String, Arc<dyn Agent>>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        let agents = Arc::get_mut(&mut self.agents)
            .expect("register must run before the registry is shared")
            .get_mut();
        agents.insert(agent.key().to_string(), agent);
    }

    pub async fn get(&self, key: &str) -> Option<Arc<dyn Agent>> {
        self.agents.read().await.get(key).cloned()
    }

    pub async fn list_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.agents.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}
