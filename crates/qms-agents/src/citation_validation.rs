use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use qms_providers::AdapterRegistry;
use qms_store::ProjectStore;
use qms_types::{AgentOutput, AgentReply, QmsError, Verdict};
use serde_json::json;

use crate::core::{refuse, Agent, AgentContext};
use crate::grounding::{extract_identifiers, grounding_check};

/// Validates identifiers an upstream agent's text cites against the
/// project's saved findings (the "verified set", V_A): anything cited
/// that was never returned by a tool call for this project is flagged
/// hallucinated rather than passed through silently.
pub struct CitationValidationAgent {
    #[allow(dead_code)]
    adapters: Arc<AdapterRegistry>,
    store: Arc<ProjectStore>,
}

impl CitationValidationAgent {
    pub fn new(adapters: Arc<AdapterRegistry>, store: Arc<ProjectStore>) -> Self {
        Self { adapters, store }
    }
}

#[async_trait]
impl Agent for CitationValidationAgent {
    fn key(&self) -> &'static str {
        "citation_validation"
    }

    fn display_name(&self) -> &'static str {
        "Citation Validation"
    }

    fn allowed_tools(&self) -> &'static [&'static str] {
        &[]
    }

    async fn run(&self, ctx: &AgentContext) -> Result<AgentReply, QmsError> {
        let text = ctx
            .task
            .params
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Ok(refuse(
                "missing_text",
                "I need the drafted text that contains the citations to validate.",
            ));
        }

        let cited = extract_identifiers(text);
        if cited.is_empty() {
            return Ok(refuse(
                "no_citations_found",
                "I couldn't find any PMID, DOI, arXiv, or NCT identifiers in that text to validate.",
            ));
        }

        let saved = self
            .store
            .get_saved_findings(&ctx.project_id)
            .await
            .map_err(|err| QmsError::Store {
                detail: err.to_string(),
            })?;

        let verified: HashSet<(qms_types::IdentifierKind, String)> = saved
            .iter()
            .map(|f| (f.identifier_kind, f.identifier.clone()))
            .collect();

        let assertions = grounding_check(self.key(), &ctx.task.task_id, &cited, &verified);
        let hallucinated = assertions
            .iter()
            .filter(|a| a.verdict == Verdict::Hallucinated)
            .count();

        Ok(AgentReply::Ok(AgentOutput {
            task_id: ctx.task.task_id.clone(),
            agent_key: self.key().to_string(),
            result: json!({
                "total_cited": assertions.len(),
                "hallucinated": hallucinated,
                "assertions": assertions,
            }),
            artifacts: Vec::new(),
        }))
    }
}
