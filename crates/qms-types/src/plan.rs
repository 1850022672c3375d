use serde::{Deserialize, Serialize};
use serde_json::Map;
use serde_json::Value;

/// One step of a plan: which agent runs it, its parameters (which may
/// embed `<task_id.dotted.path>` dependency references resolved at
/// execution time), and an optional `parallel_group` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub task_id: String,
    pub agent_key: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_group: Option<String>,
}

/// A planner-produced, dependency-ordered sequence of agent tasks bound to
/// a single conversation turn. The planner enforces a hard ceiling of 8
/// tasks; exceeding it is a `QmsError::Planner`, not silent truncation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: String,
    pub project_id: String,
    pub tasks: Vec<AgentTask>,
}

impl Plan {
    pub const MAX_TASKS: usize = 8;

    /// Topologically orders tasks by `depends_on`. Returns `None` if the
    /// dependency graph contains a cycle or references an unknown task.
    pub fn topological_order(&self) -> Option<Vec<&AgentTask>> {
        let mut remaining: Vec<&AgentTask> = self.tasks.iter().collect();
        let mut done: Vec<&str> = Vec::new();
        let mut ordered = Vec::with_capacity(self.tasks.len());

        while !remaining.is_empty() {
            let ready_idx = remaining
                .iter()
                .position(|t| t.depends_on.iter().all(|d| done.contains(&d.as_str())))?;
            let task = remaining.remove(ready_idx);
            done.push(&task.task_id);
            ordered.push(task);
        }

        Some(ordered)
    }
}
