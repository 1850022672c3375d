use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why an agent declined to produce output. Distinct from a tool/executor
/// error: a refusal is a valid, expected agent outcome (insufficient
/// evidence, an out-of-scope clinical question), not a failure to retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefusalReason {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    pub task_id: String,
    pub agent_key: String,
    pub result: Value,
    #[serde(default)]
    pub artifacts: Vec<String>,
}

/// An agent's turn produces either output or a refusal, never both and
/// never a success value with a hidden "but actually I refused" flag. The
/// executor matches on this directly so a refusal can never be mistaken
/// for a completed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AgentReply {
    Ok(AgentOutput),
    Refusal(RefusalReason),
}

impl AgentReply {
    pub fn is_ok(&self) -> bool {
        matches!(self, AgentReply::Ok(_))
    }

    pub fn ok(self) -> Option<AgentOutput> {
        match self {
            AgentReply::Ok(output) => Some(output),
            AgentReply::Refusal(_) => None,
        }
    }
}
