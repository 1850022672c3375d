use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use qms_store::ProjectStore;
use qms_types::{AgentOutput, AgentReply, Milestone, MilestoneStatus, QmsError};
use serde_json::json;
use uuid::Uuid;

use crate::core::{refuse, Agent, AgentContext};
use crate::grounding::extract_iso_dates;

pub struct TimelineAgent {
    store: Arc<ProjectStore>,
}

impl TimelineAgent {
    pub fn new(store: Arc<ProjectStore>) -> Self {
        Self { store }
    }
}

fn parse_status(value: Option<&str>) -> MilestoneStatus {
    match value {
        Some("in_progress") => MilestoneStatus::InProgress,
        Some("complete") => MilestoneStatus::Complete,
        Some("blocked") => MilestoneStatus::Blocked,
        _ => MilestoneStatus::NotStarted,
    }
}

/// Checks that every ISO date token in `reply_text` can be traced back to
/// a milestone the lookup this turn actually returned (C7.5's grounding
/// rule): a date the agent mentions that no milestone in `looked_up`
/// carries is treated as a hallucination and refused.
fn dates_are_grounded(reply_text: &str, looked_up: &[Milestone]) -> bool {
    let verified: std::collections::HashSet<String> = looked_up
        .iter()
        .filter_map(|m| m.due_date)
        .map(|d| d.to_string())
        .collect();
    extract_iso_dates(reply_text)
        .iter()
        .all(|d| verified.contains(d))
}

#[async_trait]
impl Agent for TimelineAgent {
    fn key(&self) -> &'static str {
        "timeline"
    }

    fn display_name(&self) -> &'static str {
        "Timeline Management"
    }

    fn allowed_tools(&self) -> &'static [&'static str] {
        &[]
    }

    async fn run(&self, ctx: &AgentContext) -> Result<AgentReply, QmsError> {
        let action = ctx
            .task
            .params
            .get("action")
            .and_then(|v| v.as_str())
            .unwrap_or("list");

        let narrative = ctx.task.params.get("narrative").and_then(|v| v.as_str());

        match action {
            "list" => {
                let milestones = self
                    .store
                    .list_milestones(&ctx.project_id)
                    .await
                    .map_err(|err| QmsError::Store {
                        detail: err.to_string(),
                    })?;
                if let Some(text) = narrative {
                    if !dates_are_grounded(text, &milestones) {
                        return Ok(ungrounded_date_refusal());
                    }
                }
                Ok(AgentReply::Ok(AgentOutput {
                    task_id: ctx.task.task_id.clone(),
                    agent_key: self.key().to_string(),
                    result: json!({ "milestones": milestones }),
                    artifacts: Vec::new(),
                }))
            }
            "list_next" | "get_next" | "next" => {
                let mut milestones = self
                    .store
                    .list_milestones(&ctx.project_id)
                    .await
                    .map_err(|err| QmsError::Store {
                        detail: err.to_string(),
                    })?;
                milestones.retain(|m| m.status != MilestoneStatus::Complete);
                let found = milestones.into_iter().next().into_iter().collect::<Vec<_>>();
                if let Some(text) = narrative {
                    if !dates_are_grounded(text, &found) {
                        return Ok(ungrounded_date_refusal());
                    }
                }
                Ok(AgentReply::Ok(AgentOutput {
                    task_id: ctx.task.task_id.clone(),
                    agent_key: self.key().to_string(),
                    result: json!({ "milestone": found.into_iter().next() }),
                    artifacts: Vec::new(),
                }))
            }
            "list_between" => {
                let from = ctx
                    .task
                    .params
                    .get("from")
                    .and_then(|v| v.as_str())
                    .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
                let to = ctx
                    .task
                    .params
                    .get("to")
                    .and_then(|v| v.as_str())
                    .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
                let (Some(from), Some(to)) = (from, to) else {
                    return Ok(refuse(
                        "missing_date_range",
                        "I need both a `from` and `to` date (YYYY-MM-DD) to list milestones in that window.",
                    ));
                };
                let milestones = self
                    .store
                    .list_milestones(&ctx.project_id)
                    .await
                    .map_err(|err| QmsError::Store {
                        detail: err.to_string(),
                    })?;
                let in_range: Vec<Milestone> = milestones
                    .into_iter()
                    .filter(|m| m.due_date.is_some_and(|d| d >= from && d <= to))
                    .collect();
                if let Some(text) = narrative {
                    if !dates_are_grounded(text, &in_range) {
                        return Ok(ungrounded_date_refusal());
                    }
                }
                Ok(AgentReply::Ok(AgentOutput {
                    task_id: ctx.task.task_id.clone(),
                    agent_key: self.key().to_string(),
                    result: json!({ "milestones": in_range }),
                    artifacts: Vec::new(),
                }))
            }
            "upsert" => {
                let name = ctx
                    .task
                    .params
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                if name.trim().is_empty() {
                    return Ok(refuse(
                        "missing_name",
                        "I need a milestone name before I can add it to the timeline.",
                    ));
                }
                let milestone_id = ctx
                    .task
                    .params
                    .get("milestone_id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                let due_date = ctx
                    .task
                    .params
                    .get("due_date")
                    .and_then(|v| v.as_str())
                    .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
                let depends_on = ctx
                    .task
                    .params
                    .get("depends_on")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                let deliverables = ctx
                    .task
                    .params
                    .get("deliverables")
                    .and_then(|v| v.as_array())
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                let notes = ctx
                    .task
                    .params
                    .get("notes")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);

                let milestone = Milestone {
                    milestone_id: milestone_id.clone(),
                    project_id: ctx.project_id.clone(),
                    name: name.to_string(),
                    due_date,
                    status: parse_status(ctx.task.params.get("status").and_then(|v| v.as_str())),
                    deliverables,
                    notes,
                    depends_on,
                };

                self.store
                    .upsert_milestone(&milestone)
                    .await
                    .map_err(|err| QmsError::Store {
                        detail: err.to_string(),
                    })?;

                Ok(AgentReply::Ok(AgentOutput {
                    task_id: ctx.task.task_id.clone(),
                    agent_key: self.key().to_string(),
                    result: json!({ "milestone_id": milestone_id }),
                    artifacts: Vec::new(),
                }))
            }
            other => Ok(refuse(
                "unknown_action",
                format!(
                    "`{other}` is not a timeline action I understand; use `list`, `list_next`, `list_between`, or `upsert`."
                ),
            )),
        }
    }
}

fn ungrounded_date_refusal() -> AgentReply {
    refuse(
        "ungrounded_date",
        "That mentions a date the milestone lookup this turn didn't return, so I can't confirm it.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_known_status_string() {
        assert_eq!(parse_status(Some("in_progress")), MilestoneStatus::InProgress);
        assert_eq!(parse_status(Some("complete")), MilestoneStatus::Complete);
        assert_eq!(parse_status(Some("blocked")), MilestoneStatus::Blocked);
        assert_eq!(parse_status(Some("bogus")), MilestoneStatus::NotStarted);
        assert_eq!(parse_status(None), MilestoneStatus::NotStarted);
    }

    #[test]
    fn dates_not_returned_by_the_lookup_are_not_grounded() {
        let looked_up = vec![Milestone {
            milestone_id: "m1".to_string(),
            project_id: "p1".to_string(),
            name: "Baseline data collection".to_string(),
            due_date: NaiveDate::parse_from_str("2026-09-15", "%Y-%m-%d").ok(),
            status: MilestoneStatus::NotStarted,
            deliverables: Vec::new(),
            notes: None,
            depends_on: None,
        }];
        assert!(dates_are_grounded("due 2026-09-15", &looked_up));
        assert!(!dates_are_grounded("due 2026-10-01", &looked_up));
    }
}
