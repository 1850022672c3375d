use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use qms_agents::{AgentContext, AgentRegistry};
use qms_store::{ProjectStore, StoreError};
use qms_types::{
    parse_dependency_ref, AgentReply, AgentTask, IdentifierKind, Plan, QmsError, Verdict,
    WorkflowRun, WorkflowStatus, WorkflowStep,
};
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::context::ConversationContext;

const PARALLEL_GROUP_CAP: usize = 3;
const CONSECUTIVE_FAILURE_ABORT: u32 = 3;
const AGENT_TURN_DEADLINE: Duration = Duration::from_secs(180);

pub struct TaskOutcome {
    pub task_id: String,
    pub agent_key: String,
    pub reply: Option<AgentReply>,
    pub error: Option<QmsError>,
    pub skipped: bool,
}

pub struct ExecutionSummary {
    pub run_id: String,
    pub status: WorkflowStatus,
    pub outcomes: Vec<TaskOutcome>,
}

/// Runs a `Plan` to completion: topological ordering, `<task.field>`
/// dependency resolution, parallel-group concurrency capped at 3, and the
/// three-consecutive-failure run abort policy.
pub struct Executor {
    agents: Arc<AgentRegistry>,
    store: Arc<ProjectStore>,
}

impl Executor {
    pub fn new(agents: Arc<AgentRegistry>, store: Arc<ProjectStore>) -> Self {
        Self { agents, store }
    }

    pub async fn execute(
        &self,
        plan: &Plan,
        ctx: &mut ConversationContext,
        cancellation: CancellationToken,
    ) -> Result<ExecutionSummary, QmsError> {
        let ordered = plan.topological_order().ok_or_else(|| QmsError::Executor {
            task_id: plan.plan_id.clone(),
            detail: "plan contains a cyclic or unresolved dependency graph".to_string(),
        })?;

        let run_id = Uuid::new_v4().to_string();
        self.store
            .insert_workflow_run(&WorkflowRun {
                run_id: run_id.clone(),
                project_id: plan.project_id.clone(),
                plan_id: plan.plan_id.clone(),
                status: WorkflowStatus::Running,
                started_at: Utc::now(),
                finished_at: None,
            })
            .await
            .map_err(store_err)?;

        let mut results: HashMap<String, Value> = HashMap::new();
        let mut outcomes: Vec<TaskOutcome> = Vec::new();
        let mut failed_tasks: HashSet<String> = HashSet::new();
        let mut consecutive_failures = 0u32;
        let mut run_status = WorkflowStatus::Succeeded;

        let mut idx = 0;
        'outer: while idx < ordered.len() {
            if cancellation.is_cancelled() {
                run_status = WorkflowStatus::Canceled;
                break;
            }

            let group = ordered[idx].parallel_group.clone();
            let mut batch = vec![ordered[idx]];
            idx += 1;
            if group.is_some() {
                while idx < ordered.len() && ordered[idx].parallel_group == group {
                    batch.push(ordered[idx]);
                    idx += 1;
                }
            }

            let mut runnable: Vec<&AgentTask> = Vec::new();
            for task in batch {
                if task.depends_on.iter().any(|d| failed_tasks.contains(d)) {
                    self.store
                        .insert_workflow_step(&WorkflowStep {
                            run_id: run_id.clone(),
                            task_id: task.task_id.clone(),
                            agent_key: task.agent_key.clone(),
                            status: WorkflowStatus::Failed,
                            started_at: Utc::now(),
                            finished_at: Some(Utc::now()),
                            output_ref: None,
                        })
                        .await
                        .map_err(store_err)?;
                    failed_tasks.insert(task.task_id.clone());
                    outcomes.push(TaskOutcome {
                        task_id: task.task_id.clone(),
                        agent_key: task.agent_key.clone(),
                        reply: None,
                        error: None,
                        skipped: true,
                    });
                } else {
                    runnable.push(task);
                }
            }

            let semaphore = Arc::new(Semaphore::new(PARALLEL_GROUP_CAP));
            let mut futures = Vec::with_capacity(runnable.len());
            for task in runnable {
                let resolved_params = resolve_params(&task.params, &results, ctx);
                let verified_identifiers = verified_identifiers_from_context(ctx);
                let agent = self.agents.get(&task.agent_key).await;
                let permit = semaphore.clone();
                let project_id = plan.project_id.clone();
                let task_id = task.task_id.clone();
                let agent_key = task.agent_key.clone();
                let depends_on = task.depends_on.clone();
                let parallel_group = task.parallel_group.clone();
                let cancellation = cancellation.clone();

                futures.push(async move {
                    let _permit = permit.acquire_owned().await.expect("semaphore never closes");

                    if cancellation.is_cancelled() {
                        return (
                            task_id.clone(),
                            agent_key,
                            None,
                            Some(QmsError::Executor {
                                task_id,
                                detail: "cancelled".to_string(),
                            }),
                        );
                    }

                    let Some(agent) = agent else {
                        return (
                            task_id.clone(),
                            agent_key.clone(),
                            None,
                            Some(QmsError::Executor {
                                task_id,
                                detail: format!("no agent registered for `{agent_key}`"),
                            }),
                        );
                    };

                    let agent_ctx = AgentContext {
                        project_id,
                        task: AgentTask {
                            task_id: task_id.clone(),
                            agent_key: agent_key.clone(),
                            params: resolved_params,
                            depends_on,
                            parallel_group,
                        },
                        verified_identifiers,
                    };

                    match tokio::time::timeout(AGENT_TURN_DEADLINE, agent.run(&agent_ctx)).await {
                        Ok(Ok(reply)) => (task_id, agent_key, Some(reply), None),
                        Ok(Err(err)) => (task_id, agent_key, None, Some(err)),
                        Err(_) => (
                            task_id.clone(),
                            agent_key,
                            None,
                            Some(QmsError::Executor {
                                task_id,
                                detail: "agent turn exceeded the 180s deadline".to_string(),
                            }),
                        ),
                    }
                });
            }

            for (task_id, agent_key, reply, error) in join_all(futures).await {
                let started_at = Utc::now();
                let step_status = match (&reply, &error) {
                    (Some(AgentReply::Ok(_)), None) => WorkflowStatus::Succeeded,
                    (Some(AgentReply::Refusal(_)), None) => WorkflowStatus::ValidationFailed,
                    _ => WorkflowStatus::Failed,
                };

                match &reply {
                    Some(AgentReply::Ok(output)) => {
                        results.insert(task_id.clone(), output.result.clone());
                        apply_artifact(ctx, &agent_key, &output.result);
                        ctx.completed_tasks.push(task_id.clone());
                        self.store
                            .insert_workflow_output(&run_id, &task_id, &output.result)
                            .await
                            .map_err(store_err)?;
                        consecutive_failures = 0;
                    }
                    Some(AgentReply::Refusal(_)) => {
                        // validation_failed is terminal for this step, not
                        // retried, but does not count toward the
                        // consecutive-failure run-abort threshold.
                        failed_tasks.insert(task_id.clone());
                    }
                    None => {
                        failed_tasks.insert(task_id.clone());
                        consecutive_failures += 1;
                    }
                }

                self.store
                    .insert_workflow_step(&WorkflowStep {
                        run_id: run_id.clone(),
                        task_id: task_id.clone(),
                        agent_key: agent_key.clone(),
                        status: step_status,
                        started_at,
                        finished_at: Some(Utc::now()),
                        output_ref: None,
                    })
                    .await
                    .map_err(store_err)?;

                outcomes.push(TaskOutcome {
                    task_id,
                    agent_key,
                    reply,
                    error,
                    skipped: false,
                });

                if consecutive_failures >= CONSECUTIVE_FAILURE_ABORT {
                    run_status = WorkflowStatus::Failed;
                    break 'outer;
                }
            }
        }

        self.store
            .update_workflow_run_status(&run_id, run_status, Some(Utc::now()))
            .await
            .map_err(store_err)?;

        Ok(ExecutionSummary {
            run_id,
            status: run_status,
            outcomes,
        })
    }
}

fn store_err(err: StoreError) -> QmsError {
    QmsError::Store {
        detail: err.to_string(),
    }
}

fn resolve_params(
    params: &Map<String, Value>,
    results: &HashMap<String, Value>,
    ctx: &ConversationContext,
) -> Map<String, Value> {
    params
        .iter()
        .map(|(k, v)| (k.clone(), resolve_value(v, results, ctx)))
        .collect()
}

fn resolve_value(value: &Value, results: &HashMap<String, Value>, ctx: &ConversationContext) -> Value {
    match value {
        Value::String(s) => match parse_dependency_ref(s) {
            Some((task_id, path)) => {
                let root = results.get(&task_id).or_else(|| ctx.get_artifact(&task_id));
                root.and_then(|r| navigate_path(r, &path)).unwrap_or(Value::Null)
            }
            None => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_value(v, results, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, results, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn navigate_path(root: &Value, path: &str) -> Option<Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match segment.parse::<usize>() {
            Ok(idx) => current.get(idx)?,
            Err(_) => current.get(segment)?,
        };
    }
    Some(current.clone())
}

/// Builds the verified-identifier set an agent with no tool calls of its
/// own (e.g. `picot`) can treat as its verified set: every identifier the
/// `citation_validation` artifact has already marked `Grounded` this
/// conversation.
fn verified_identifiers_from_context(
    ctx: &ConversationContext,
) -> HashSet<(IdentifierKind, String)> {
    let Some(validated) = ctx.get_artifact("validated_articles") else {
        return HashSet::new();
    };
    let Some(assertions) = validated.get("assertions").and_then(|v| v.as_array()) else {
        return HashSet::new();
    };
    assertions
        .iter()
        .filter(|a| a.get("verdict").and_then(|v| v.as_str()) == Some(verdict_str(Verdict::Grounded)))
        .filter_map(|a| {
            let kind = a.get("identifier_kind").and_then(|v| v.as_str())?;
            let identifier = a.get("identifier").and_then(|v| v.as_str())?;
            Some((identifier_kind_from_str(kind)?, identifier.to_string()))
        })
        .collect()
}

fn verdict_str(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Grounded => "grounded",
        Verdict::Hallucinated => "hallucinated",
        Verdict::Refused => "refused",
    }
}

fn identifier_kind_from_str(value: &str) -> Option<IdentifierKind> {
    match value {
        "pmid" => Some(IdentifierKind::Pmid),
        "doi" => Some(IdentifierKind::Doi),
        "arxiv_id" => Some(IdentifierKind::ArxivId),
        "nct_id" => Some(IdentifierKind::NctId),
        _ => None,
    }
}

fn apply_artifact(ctx: &mut ConversationContext, agent_key: &str, result: &Value) {
    let artifact_key = match agent_key {
        "picot" => "picot",
        "literature_search" => "search_results",
        "citation_validation" => "validated_articles",
        "evidence_synthesis" => "synthesis",
        "statistical_planning" => "analysis",
        "writing" => "writing_draft",
        _ => return,
    };
    ctx.add_artifact(artifact_key, result.clone());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigate_path_resolves_nested_array_index() {
        let root = serde_json::json!({ "findings": [{ "identifier": "123" }] });
        let resolved = navigate_path(&root, "findings.0.identifier");
        assert_eq!(resolved, Some(Value::String("123".to_string())));
    }

    #[test]
    fn navigate_path_returns_none_for_missing_segment() {
        let root = serde_json::json!({ "findings": [] });
        assert_eq!(navigate_path(&root, "findings.0.identifier"), None);
    }
}
