use std::sync::Arc;

use async_trait::async_trait;
use qms_types::{AgentOutput, AgentReply, QmsError};
use serde_json::json;

use crate::core::{refuse, Agent, AgentContext};
use crate::grounding::extract_identifiers;
use crate::reasoner::Reasoner;

const SYSTEM_PROMPT: &str = "You help a nurse formulate a PICOT question for a quality \
improvement project. PICOT: Population, Intervention, Comparison, Outcome, Time. Ask only \
for what is missing; never suggest a clinical treatment, only help structure the question. \
Every reply must include a disclaimer that this is not clinical guidance.";

pub struct PicotAgent {
    reasoner: Arc<dyn Reasoner>,
}

impl PicotAgent {
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self { reasoner }
    }
}

#[async_trait]
impl Agent for PicotAgent {
    fn key(&self) -> &'static str {
        "picot"
    }

    fn display_name(&self) -> &'static str {
        "PICOT Formulation"
    }

    fn allowed_tools(&self) -> &'static [&'static str] {
        &[]
    }

    async fn run(&self, ctx: &AgentContext) -> Result<AgentReply, QmsError> {
        let goal = ctx
            .task
            .params
            .get("goal")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        if goal.trim().is_empty() {
            return Ok(refuse(
                "missing_goal",
                "I need a description of the improvement goal before I can draft a PICOT question.",
            ));
        }

        let reply = self
            .reasoner
            .complete(SYSTEM_PROMPT, goal)
            .await
            .map_err(|err| QmsError::Executor {
                task_id: ctx.task.task_id.clone(),
                detail: err.to_string(),
            })?;

        // This agent makes no tool calls, so its verified set is empty by
        // default; the only identifiers it may cite are ones this
        // conversation's citation validation has already marked grounded.
        let cited = extract_identifiers(&reply);
        let unverified = cited
            .iter()
            .any(|id| !ctx.verified_identifiers.contains(id));
        if unverified {
            return Ok(refuse(
                "ungrounded_citation",
                "I can't cite specific sources while drafting a PICOT question; ask the literature search or citation validation agents for that.",
            ));
        }

        Ok(AgentReply::Ok(AgentOutput {
            task_id: ctx.task.task_id.clone(),
            agent_key: self.key().to_string(),
            result: json!({ "picot_draft": reply }),
            artifacts: Vec::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qms_types::AgentTask;
    use serde_json::Map;
    use std::collections::HashSet;

    struct MockReasoner(String);

    #[async_trait]
    impl Reasoner for MockReasoner {
        async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> anyhow::Result<String> {
            Ok(self.0.clone())
        }
    }

    fn ctx(goal: &str, verified: HashSet<(qms_types::IdentifierKind, String)>) -> AgentContext {
        let mut params = Map::new();
        params.insert("goal".to_string(), json!(goal));
        AgentContext {
            project_id: "proj-1".to_string(),
            task: AgentTask {
                task_id: "t1".to_string(),
                agent_key: "picot".to_string(),
                params,
                depends_on: Vec::new(),
                parallel_group: None,
            },
            verified_identifiers: verified,
        }
    }

    #[tokio::test]
    async fn refuses_when_draft_cites_an_unverified_identifier() {
        let agent = PicotAgent::new(Arc::new(MockReasoner(
            "See PMID: 12345678 for background.".to_string(),
        )));
        let reply = agent.run(&ctx("reduce falls", HashSet::new())).await.unwrap();
        assert!(matches!(reply, AgentReply::Refusal(_)));
    }

    #[tokio::test]
    async fn allows_a_citation_already_verified_this_conversation() {
        let mut verified = HashSet::new();
        verified.insert((qms_types::IdentifierKind::Pmid, "12345678".to_string()));
        let agent = PicotAgent::new(Arc::new(MockReasoner(
            "See PMID: 12345678 for background.".to_string(),
        )));
        let reply = agent.run(&ctx("reduce falls", verified)).await.unwrap();
        assert!(matches!(reply, AgentReply::Ok(_)));
    }

    #[tokio::test]
    async fn allows_a_draft_with_no_citations() {
        let agent = PicotAgent::new(Arc::new(MockReasoner(
            "Population: adults on a med-surg unit...".to_string(),
        )));
        let reply = agent.run(&ctx("reduce falls", HashSet::new())).await.unwrap();
        assert!(matches!(reply, AgentReply::Ok(_)));
    }
}
