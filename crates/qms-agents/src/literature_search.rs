use std::sync::Arc;

use async_trait::async_trait;
use qms_providers::AdapterRegistry;
use qms_store::ProjectStore;
use qms_types::{AgentOutput, AgentReply, Finding, QmsError};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::core::{refuse, Agent, AgentContext};

/// Bibliographic sources queried on every search task. `web_search` is
/// deliberately excluded from the default fan-out since it is the
/// lowest evidence tier and only meant to be invoked explicitly.
const SOURCES: &[&str] = &[
    "pubmed",
    "arxiv",
    "clinicaltrials",
    "medrxiv",
    "semantic_scholar",
    "core",
    "doaj",
    "openfda",
];

pub struct LiteratureSearchAgent {
    adapters: Arc<AdapterRegistry>,
    store: Arc<ProjectStore>,
}

impl LiteratureSearchAgent {
    pub fn new(adapters: Arc<AdapterRegistry>, store: Arc<ProjectStore>) -> Self {
        Self { adapters, store }
    }
}

#[async_trait]
impl Agent for LiteratureSearchAgent {
    fn key(&self) -> &'static str {
        "literature_search"
    }

    fn display_name(&self) -> &'static str {
        "Literature Search"
    }

    fn allowed_tools(&self) -> &'static [&'static str] {
        SOURCES
    }

    async fn run(&self, ctx: &AgentContext) -> Result<AgentReply, QmsError> {
        let term = ctx
            .task
            .params
            .get("term")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        if term.trim().is_empty() {
            return Ok(refuse(
                "missing_term",
                "I need a search term before I can query the literature databases.",
            ));
        }

        let mut params = Map::new();
        params.insert("term".to_string(), Value::String(term.clone()));
        if let Some(max) = ctx.task.params.get("max_results") {
            params.insert("max_results".to_string(), max.clone());
        }

        let mut all_findings: Vec<Finding> = Vec::new();
        let mut failed_sources: Vec<String> = Vec::new();

        for source in SOURCES {
            match self.adapters.invoke(source, "search", params.clone()).await {
                Ok(result) => {
                    let findings: Vec<Finding> = serde_json::from_value(
                        result
                            .output
                            .get("findings")
                            .cloned()
                            .unwrap_or(Value::Array(Vec::new())),
                    )
                    .unwrap_or_default();
                    for finding in findings {
                        self.store
                            .save_finding(&finding)
                            .await
                            .map_err(|err| QmsError::Store {
                                detail: err.to_string(),
                            })?;
                        all_findings.push(finding);
                    }
                }
                Err(err) => {
                    warn!(source, error = %format!("{err:?}"), "literature source unavailable");
                    failed_sources.push(source.to_string());
                }
            }
        }

        if all_findings.is_empty() && failed_sources.len() == SOURCES.len() {
            return Ok(refuse(
                "all_sources_unavailable",
                "Every literature source failed or is temporarily unavailable; I couldn't complete this search.",
            ));
        }

        Ok(AgentReply::Ok(AgentOutput {
            task_id: ctx.task.task_id.clone(),
            agent_key: self.key().to_string(),
            result: json!({
                "term": term,
                "found": all_findings.len(),
                "failed_sources": failed_sources,
                "findings": all_findings,
            }),
            artifacts: Vec::new(),
        }))
    }
}
