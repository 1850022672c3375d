use async_trait::async_trait;
use chrono::Utc;
use qms_types::{Finding, IdentifierKind, ToolError, ToolResult, ToolSchema};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::adapter::{guarded_get, AdapterConfig, EndpointConfig, GuardedHttpGet, ToolAdapter};

const ENDPOINT: &str = "core";
const DEFAULT_BASE_URL: &str = "https://api.core.ac.uk/v3/search/works";

pub struct CoreAdapter {
    config: AdapterConfig,
    endpoint: EndpointConfig,
}

impl CoreAdapter {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            config: config.clone(),
            endpoint: config.endpoint(ENDPOINT),
        }
    }

    async fn search(&self, params: &Map<String, Value>) -> Result<ToolResult, ToolError> {
        let Some(api_key) = &self.endpoint.api_key else {
            return Err(ToolError::Unavailable {
                reason: "CORE_API_KEY not configured".to_string(),
            });
        };
        let query = params
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::UserError {
                detail: "missing required `query` parameter".to_string(),
            })?;
        let limit = params
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(20)
            .min(100);

        let (status, body, cache_hit) = guarded_get(GuardedHttpGet {
            config: &self.config,
            endpoint_name: ENDPOINT,
            url: self
                .endpoint
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            query: vec![
                ("q".to_string(), query.to_string()),
                ("limit".to_string(), limit.to_string()),
            ],
            headers: vec![("Authorization".to_string(), format!("Bearer {api_key}"))],
        })
        .await?;

        let parsed: CoreResponse = serde_json::from_slice(&body).map_err(|err| {
            ToolError::Transient {
                detail: format!("malformed CORE response (status {status}): {err}"),
            }
        })?;

        let findings: Vec<Finding> = parsed
            .results
            .into_iter()
            .filter_map(|work| {
                let doi = work.doi?;
                Some(Finding {
                    finding_id: uuid::Uuid::new_v4().to_string(),
                    project_id: String::new(),
                    source: "core".to_string(),
                    identifier_kind: IdentifierKind::Doi,
                    identifier: doi,
                    title: work.title,
                    authors: work.authors.into_iter().map(|a| a.name).collect(),
                    publication_year: work.year_published,
                    venue: work.publisher,
                    abstract_text: work.abstract_text,
                    evidence_level: None,
                    retracted: false,
                    selected: false,
                    retrieved_at: Utc::now(),
                })
            })
            .collect();

        Ok(ToolResult {
            output: json!({ "findings": findings }),
            metadata: Map::new(),
            cache_hit,
        })
    }
}

#[async_trait]
impl ToolAdapter for CoreAdapter {
    fn name(&self) -> &'static str {
        ENDPOINT
    }

    fn methods(&self) -> Vec<ToolSchema> {
        vec![ToolSchema {
            name: "search".to_string(),
            description: "Search the CORE open-access aggregator for works matching a query."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "max_results": { "type": "integer", "minimum": 1, "maximum": 100 }
                },
                "required": ["query"]
            }),
        }]
    }

    async fn invoke(&self, method: &str, params: Map<String, Value>) -> Result<ToolResult, ToolError> {
        match method {
            "search" => self.search(&params).await,
            other => Err(ToolError::UserError {
                detail: format!("unknown method `{other}` for core adapter"),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CoreResponse {
    #[serde(default)]
    results: Vec<CoreWork>,
}

#[derive(Debug, Deserialize)]
struct CoreWork {
    title: String,
    doi: Option<String>,
    #[serde(rename = "yearPublished")]
    year_published: Option<i32>,
    publisher: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(default)]
    authors: Vec<CoreAuthor>,
}

#[derive(Debug, Deserialize)]
struct CoreAuthor {
    name: String,
}
