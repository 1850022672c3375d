pub mod error;
pub mod findings;
pub mod milestone;
pub mod plan;
pub mod reply;
pub mod tool;
pub mod workflow;

pub use error::QmsError;
pub use findings::{CitationAssertion, Finding, IdentifierKind, Verdict};
pub use milestone::{Milestone, MilestoneStatus};
pub use plan::{AgentTask, Plan};
pub use reply::{AgentOutput, AgentReply, RefusalReason};
pub use tool::{ToolError, ToolInvocation, ToolResult, ToolSchema};
pub use workflow::{AuditEntry, WorkflowRun, WorkflowStatus, WorkflowStep};

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches a dependency reference of the form `<task_id.dotted.path>` inside
/// a task's parameter values, e.g. `<search.findings.0.pmid>`.
pub static DEPENDENCY_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<([a-zA-Z0-9_\-]+)\.([a-zA-Z0-9_\-.]+)>$").unwrap());

/// Splits a dependency reference into `(task_id, dotted_path)`, or `None`
/// if the string is not a reference.
pub fn parse_dependency_ref(value: &str) -> Option<(String, String)> {
    let caps = DEPENDENCY_REF.captures(value)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}
