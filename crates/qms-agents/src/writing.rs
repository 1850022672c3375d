use std::sync::Arc;

use async_trait::async_trait;
use qms_store::ProjectStore;
use qms_types::{AgentOutput, AgentReply, QmsError};
use serde_json::json;

use crate::core::{refuse, Agent, AgentContext};
use crate::reasoner::Reasoner;

const SYSTEM_PROMPT: &str = "You draft sections of a nursing quality improvement project \
report (background, methods, results, discussion) in a formal academic register. Write only \
the requested section and stay within the evidence already gathered for this project; do not \
invent citations.";

pub struct WritingAgent {
    store: Arc<ProjectStore>,
    reasoner: Arc<dyn Reasoner>,
}

impl WritingAgent {
    pub fn new(store: Arc<ProjectStore>, reasoner: Arc<dyn Reasoner>) -> Self {
        Self { store, reasoner }
    }
}

#[async_trait]
impl Agent for WritingAgent {
    fn key(&self) -> &'static str {
        "writing"
    }

    fn display_name(&self) -> &'static str {
        "Report Writing"
    }

    fn allowed_tools(&self) -> &'static [&'static str] {
        &[]
    }

    async fn run(&self, ctx: &AgentContext) -> Result<AgentReply, QmsError> {
        let section = ctx
            .task
            .params
            .get("section")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let instructions = ctx
            .task
            .params
            .get("instructions")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        if section.trim().is_empty() {
            return Ok(refuse(
                "missing_section",
                "I need to know which report section to draft (e.g. background, methods, results, discussion).",
            ));
        }

        let user_prompt = format!("Section: {section}\n\n{instructions}");
        let draft = self
            .reasoner
            .complete(SYSTEM_PROMPT, &user_prompt)
            .await
            .map_err(|err| QmsError::Executor {
                task_id: ctx.task.task_id.clone(),
                detail: err.to_string(),
            })?;

        self.store
            .save_writing_draft(&ctx.project_id, section, &draft)
            .await
            .map_err(|err| QmsError::Store {
                detail: err.to_string(),
            })?;

        Ok(AgentReply::Ok(AgentOutput {
            task_id: ctx.task.task_id.clone(),
            agent_key: self.key().to_string(),
            result: json!({ "section": section, "draft": draft }),
            artifacts: Vec::new(),
        }))
    }
}
