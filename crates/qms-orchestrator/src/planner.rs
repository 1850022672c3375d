use std::sync::Arc;

use qms_agents::Reasoner;
use qms_types::{AgentTask, Plan, QmsError};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// One entry in the capability registry the planner's LLM prompt
/// enumerates: an agent's key, a one-line capability description, and the
/// action names it accepts.
#[derive(Debug, Clone)]
pub struct AgentCapability {
    pub agent_key: String,
    pub capability: String,
    pub actions: Vec<String>,
}

pub enum PlanOutcome {
    Plan(Plan),
    /// The planner could not match a trigger, keyword bag, or parse a valid
    /// LLM decomposition. Never silently collapsed into a single random
    /// agent call.
    Clarify { canonical_prompts: Vec<&'static str> },
}

const CANONICAL_PROMPTS: &[&str] = &[
    "Help me draft a PICOT question for my quality improvement project",
    "Search the literature on <topic>",
    "Run the full validated research workflow for my PICOT question",
    "Build a timeline for my project milestones",
];

const TRIGGER_PHRASES: &[(&str, &str)] = &[
    ("validated research workflow", "validated_research"),
    ("fully validated search", "validated_research"),
    ("search everything in parallel", "parallel_search"),
    ("search all databases at once", "parallel_search"),
    ("build my project timeline", "timeline_planner"),
    ("quick literature search", "basic_research"),
];

const KEYWORD_BAGS: &[(&str, &[&str])] = &[
    (
        "validated_research",
        &["validate", "grounded", "citation", "evidence level", "retraction"],
    ),
    ("parallel_search", &["all sources", "every database", "in parallel"]),
    ("timeline_planner", &["milestone", "deadline", "timeline", "due date"]),
    ("basic_research", &["search", "find studies", "literature review"]),
];

/// Decomposes a user utterance into an ordered `Plan`: explicit trigger
/// phrase, then implicit keyword bag, then LLM JSON decomposition, tried
/// in that fixed order.
pub struct Planner {
    reasoner: Arc<dyn Reasoner>,
}

impl Planner {
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self { reasoner }
    }

    pub async fn plan(
        &self,
        project_id: &str,
        utterance: &str,
        context_summary: &str,
        capabilities: &[AgentCapability],
        previously_used_agents: &[String],
    ) -> Result<PlanOutcome, QmsError> {
        let lower = utterance.to_lowercase();

        if let Some(workflow_id) = detect_explicit_trigger(&lower) {
            return Ok(PlanOutcome::Plan(build_template_plan(
                workflow_id,
                project_id,
                utterance,
            )));
        }
        if let Some(workflow_id) = detect_implicit_keywords(&lower) {
            return Ok(PlanOutcome::Plan(build_template_plan(
                workflow_id,
                project_id,
                utterance,
            )));
        }

        let tasks = self
            .decompose_with_llm(utterance, context_summary, capabilities, previously_used_agents)
            .await?;

        if tasks.is_empty() {
            return Ok(PlanOutcome::Clarify {
                canonical_prompts: CANONICAL_PROMPTS.to_vec(),
            });
        }
        if tasks.len() > Plan::MAX_TASKS {
            return Err(QmsError::Planner {
                detail: format!(
                    "decomposition produced {} tasks, exceeding the ceiling of {}",
                    tasks.len(),
                    Plan::MAX_TASKS
                ),
            });
        }

        let plan = Plan {
            plan_id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            tasks,
        };
        if plan.topological_order().is_none() {
            return Err(QmsError::Planner {
                detail: "decomposition has a cyclic or unresolved dependency graph".to_string(),
            });
        }
        Ok(PlanOutcome::Plan(plan))
    }

    async fn decompose_with_llm(
        &self,
        utterance: &str,
        context_summary: &str,
        capabilities: &[AgentCapability],
        previously_used_agents: &[String],
    ) -> Result<Vec<AgentTask>, QmsError> {
        let system_prompt = build_system_prompt(capabilities, previously_used_agents);
        let user_prompt = format!("Conversation summary: {context_summary}\nUser message: {utterance}");

        let raw = self
            .reasoner
            .complete(&system_prompt, &user_prompt)
            .await
            .map_err(|err| QmsError::Planner {
                detail: err.to_string(),
            })?;

        let json_slice = extract_json_array(&raw).unwrap_or(&raw);
        let parsed: Vec<RawTask> = match serde_json::from_str(json_slice) {
            Ok(tasks) => tasks,
            Err(_) => return Ok(Vec::new()),
        };

        Ok(parsed
            .into_iter()
            .enumerate()
            .map(|(idx, raw)| AgentTask {
                task_id: raw.task_id.unwrap_or_else(|| format!("t{idx}")),
                agent_key: raw.agent_key,
                params: raw.params,
                depends_on: raw.depends_on,
                parallel_group: raw.parallel_group,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct RawTask {
    #[serde(default)]
    task_id: Option<String>,
    agent_key: String,
    #[serde(default)]
    params: Map<String, Value>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    parallel_group: Option<String>,
}

fn detect_explicit_trigger(lower: &str) -> Option<&'static str> {
    TRIGGER_PHRASES
        .iter()
        .find(|(phrase, _)| lower.contains(phrase))
        .map(|(_, workflow_id)| *workflow_id)
}

fn detect_implicit_keywords(lower: &str) -> Option<&'static str> {
    KEYWORD_BAGS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(workflow_id, _)| *workflow_id)
}

fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

fn build_system_prompt(capabilities: &[AgentCapability], previously_used_agents: &[String]) -> String {
    let mut agent_lines = String::new();
    for cap in capabilities {
        agent_lines.push_str(&format!(
            "- {}: {} (actions: {})\n",
            cap.agent_key,
            cap.capability,
            cap.actions.join(", ")
        ));
    }
    format!(
        "You are the planner for a nursing quality-improvement research assistant. Decompose \
the user's message into a JSON array of at most {max} tasks, each shaped as \
{{\"task_id\": string, \"agent_key\": string, \"params\": object, \"depends_on\": [string], \
\"parallel_group\": string|null}}. Use `<task_id.dotted.path>` inside a param value to \
reference a prior task's output. Never mention these internal task or agent names in any \
text meant for the end user. Available agents:\n{agent_lines}Agents already used earlier in \
this conversation (prefer reusing them when compatible): {used}. Reply with the JSON array \
only.",
        max = Plan::MAX_TASKS,
        used = if previously_used_agents.is_empty() {
            "none".to_string()
        } else {
            previously_used_agents.join(", ")
        },
    )
}

/// Builds a plan directly from a known workflow id, bypassing the LLM
/// entirely for recognized trigger phrases and keyword bags.
fn build_template_plan(workflow_id: &str, project_id: &str, utterance: &str) -> Plan {
    let tasks = match workflow_id {
        "validated_research" => vec![
            AgentTask {
                task_id: "search".to_string(),
                agent_key: "literature_search".to_string(),
                params: params_with_term(utterance),
                depends_on: Vec::new(),
                parallel_group: None,
            },
            AgentTask {
                task_id: "validate".to_string(),
                agent_key: "citation_validation".to_string(),
                params: params_with_text("<search.findings>"),
                depends_on: vec!["search".to_string()],
                parallel_group: None,
            },
            AgentTask {
                task_id: "synthesize".to_string(),
                agent_key: "evidence_synthesis".to_string(),
                params: Map::new(),
                depends_on: vec!["validate".to_string()],
                parallel_group: None,
            },
        ],
        "parallel_search" => vec![
            AgentTask {
                task_id: "search_a".to_string(),
                agent_key: "literature_search".to_string(),
                params: params_with_term(utterance),
                depends_on: Vec::new(),
                parallel_group: Some("search".to_string()),
            },
            AgentTask {
                task_id: "search_b".to_string(),
                agent_key: "literature_search".to_string(),
                params: params_with_term(utterance),
                depends_on: Vec::new(),
                parallel_group: Some("search".to_string()),
            },
        ],
        "timeline_planner" => vec![AgentTask {
            task_id: "timeline".to_string(),
            agent_key: "timeline".to_string(),
            params: {
                let mut m = Map::new();
                m.insert("action".to_string(), Value::String("list".to_string()));
                m
            },
            depends_on: Vec::new(),
            parallel_group: None,
        }],
        _ => vec![AgentTask {
            task_id: "search".to_string(),
            agent_key: "literature_search".to_string(),
            params: params_with_term(utterance),
            depends_on: Vec::new(),
            parallel_group: None,
        }],
    };

    Plan {
        plan_id: Uuid::new_v4().to_string(),
        project_id: project_id.to_string(),
        tasks,
    }
}

fn params_with_term(utterance: &str) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("term".to_string(), Value::String(utterance.to_string()));
    m
}

fn params_with_text(value: &str) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("text".to_string(), Value::String(value.to_string()));
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_trigger_phrase_wins_over_keyword_bag() {
        let lower = "please run the validated research workflow on falls".to_string();
        assert_eq!(detect_explicit_trigger(&lower), Some("validated_research"));
    }

    #[test]
    fn keyword_bag_detects_timeline_intent() {
        let lower = "i need to set a milestone for data collection".to_string();
        assert_eq!(detect_implicit_keywords(&lower), Some("timeline_planner"));
    }

    #[test]
    fn template_plan_for_validated_research_has_three_ordered_tasks() {
        let plan = build_template_plan("validated_research", "proj-1", "fall prevention");
        let ordered = plan.topological_order().unwrap();
        assert_eq!(ordered.len(), 3);
        assert_eq!(ordered[0].task_id, "search");
        assert_eq!(ordered[2].task_id, "synthesize");
    }

    #[test]
    fn parallel_search_template_tags_both_tasks_into_one_group() {
        let plan = build_template_plan("parallel_search", "proj-1", "falls");
        assert!(plan
            .tasks
            .iter()
            .all(|t| t.parallel_group.as_deref() == Some("search")));
    }

    #[test]
    fn extract_json_array_handles_surrounding_prose() {
        let raw = "Sure, here is the plan:\n[{\"agent_key\": \"picot\"}]\nLet me know if needed.";
        assert_eq!(extract_json_array(raw), Some("[{\"agent_key\": \"picot\"}]"));
    }
}
