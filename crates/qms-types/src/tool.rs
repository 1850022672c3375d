use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON-schema description of a tool adapter method, in the same
/// schema-as-data shape agents use to advertise callable tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub method: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub output: Value,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub cache_hit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolError {
    Transient { detail: String },
    UserError { detail: String },
    CircuitOpen { retry_after_secs: u64 },
    Unavailable { reason: String },
}

impl ToolError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ToolError::Transient { .. } | ToolError::CircuitOpen { .. })
    }
}
