use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use qms_store::ProjectStore;
use qms_types::{AgentOutput, AgentReply, QmsError};
use serde_json::json;

use crate::core::{refuse, Agent, AgentContext};
use crate::reasoner::Reasoner;

const SYSTEM_PROMPT: &str = "You synthesize nursing evidence for a quality improvement \
project. Group the findings by theme, note the evidence level and currency of each, and \
flag anything retracted. Never present a synthesis as a clinical recommendation; present \
it as a summary of the literature only.";

pub struct EvidenceSynthesisAgent {
    store: Arc<ProjectStore>,
    reasoner: Arc<dyn Reasoner>,
}

impl EvidenceSynthesisAgent {
    pub fn new(store: Arc<ProjectStore>, reasoner: Arc<dyn Reasoner>) -> Self {
        Self { store, reasoner }
    }
}

#[async_trait]
impl Agent for EvidenceSynthesisAgent {
    fn key(&self) -> &'static str {
        "evidence_synthesis"
    }

    fn display_name(&self) -> &'static str {
        "Evidence Synthesis"
    }

    fn allowed_tools(&self) -> &'static [&'static str] {
        &[]
    }

    async fn run(&self, ctx: &AgentContext) -> Result<AgentReply, QmsError> {
        let selected_only = ctx
            .task
            .params
            .get("selected_only")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let findings = self
            .store
            .get_saved_findings(&ctx.project_id)
            .await
            .map_err(|err| QmsError::Store {
                detail: err.to_string(),
            })?;

        let findings: Vec<_> = findings
            .into_iter()
            .filter(|f| !selected_only || f.selected)
            .collect();

        if findings.is_empty() {
            return Ok(refuse(
                "no_findings",
                "There are no saved findings for this project yet; run a literature search first.",
            ));
        }

        let now = Utc::now();
        let summary_input = findings
            .iter()
            .map(|f| {
                format!(
                    "- [{}] {} ({}, level {}, {})",
                    f.source,
                    f.title,
                    f.publication_year.map(|y| y.to_string()).unwrap_or_else(|| "n/a".to_string()),
                    f.evidence_level.map(|l| l.to_string()).unwrap_or_else(|| "unrated".to_string()),
                    f.currency(now).unwrap_or("unknown currency"),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let synthesis = self
            .reasoner
            .complete(SYSTEM_PROMPT, &summary_input)
            .await
            .map_err(|err| QmsError::Executor {
                task_id: ctx.task.task_id.clone(),
                detail: err.to_string(),
            })?;

        let retracted_count = findings.iter().filter(|f| f.retracted).count();

        Ok(AgentReply::Ok(AgentOutput {
            task_id: ctx.task.task_id.clone(),
            agent_key: self.key().to_string(),
            result: json!({
                "synthesis": synthesis,
                "findings_considered": findings.len(),
                "retracted_count": retracted_count,
            }),
            artifacts: Vec::new(),
        }))
    }
}
