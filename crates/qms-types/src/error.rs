use thiserror::Error;

/// The stable error taxonomy surfaced to the executor and audit log.
/// Every variant carries the fields an auditor needs to reconstruct what
/// happened without re-reading source; callers match on kind rather than
/// parsing message text.
#[derive(Debug, Error)]
pub enum QmsError {
    #[error("transient error calling {endpoint}: {detail}")]
    ToolTransient { endpoint: String, detail: String },

    #[error("tool `{tool}` rejected the request: {detail}")]
    ToolUser { tool: String, detail: String },

    #[error("circuit open for {endpoint}, retry after {retry_after_secs}s")]
    CircuitOpen {
        endpoint: String,
        retry_after_secs: u64,
    },

    #[error("tool `{tool}` is unavailable: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("agent `{agent}` cited unverified identifiers: {identifiers:?}")]
    GroundingViolation {
        agent: String,
        identifiers: Vec<String>,
    },

    #[error("validation failed for task `{task_id}`: {reason}")]
    Validation { task_id: String, reason: String },

    #[error("planner error: {detail}")]
    Planner { detail: String },

    #[error("executor error on task `{task_id}`: {detail}")]
    Executor { task_id: String, detail: String },

    #[error("store error: {detail}")]
    Store { detail: String },
}

impl QmsError {
    /// Stable machine-readable kind tag used in audit entries and API
    /// responses, independent of the Display message.
    pub fn kind(&self) -> &'static str {
        match self {
            QmsError::ToolTransient { .. } => "tool_transient_error",
            QmsError::ToolUser { .. } => "tool_user_error",
            QmsError::CircuitOpen { .. } => "circuit_open",
            QmsError::ToolUnavailable { .. } => "tool_unavailable",
            QmsError::GroundingViolation { .. } => "grounding_violation",
            QmsError::Validation { .. } => "validation_error",
            QmsError::Planner { .. } => "planner_error",
            QmsError::Executor { .. } => "executor_error",
            QmsError::Store { .. } => "store_error",
        }
    }

    /// Whether the executor should retry the step that produced this error.
    /// Only transient tool failures and an open circuit (which clears
    /// itself after `reset_timeout`) are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QmsError::ToolTransient { .. } | QmsError::CircuitOpen { .. }
        )
    }
}
