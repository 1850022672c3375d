use async_trait::async_trait;
use chrono::Utc;
use qms_types::{Finding, IdentifierKind, ToolError, ToolResult, ToolSchema};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::adapter::{guarded_get, AdapterConfig, EndpointConfig, GuardedHttpGet, ToolAdapter};

const ENDPOINT: &str = "semantic_scholar";
const DEFAULT_BASE_URL: &str = "https://api.semanticscholar.org/graph/v1/paper/search";

pub struct SemanticScholarAdapter {
    config: AdapterConfig,
    endpoint: EndpointConfig,
}

impl SemanticScholarAdapter {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            config: config.clone(),
            endpoint: config.endpoint(ENDPOINT),
        }
    }

    async fn search(&self, params: &Map<String, Value>) -> Result<ToolResult, ToolError> {
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

        let mut headers = vec![];
        if let Some(key) = &self.endpoint.api_key {
            headers.push(("x-api-key".to_string(), key.clone()));
        }

        let (status, body, cache_hit) = guarded_get(GuardedHttpGet {
            config: &self.config,
            endpoint_name: ENDPOINT,
            url: self
                .endpoint
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            query: vec![
                ("query".to_string(), query.to_string()),
                ("limit".to_string(), limit.to_string()),
                (
                    "fields".to_string(),
                    "title,year,venue,abstract,externalIds,authors".to_string(),
                ),
            ],
            headers,
        })
        .await?;

        let parsed: SearchResponse = serde_json::from_slice(&body).map_err(|err| {
            ToolError::Transient {
                detail: format!("malformed semantic scholar response (status {status}): {err}"),
            }
        })?;

        let findings: Vec<Finding> = parsed
            .data
            .into_iter()
            .filter_map(|paper| {
                let doi = paper.external_ids.and_then(|e| e.doi)?;
                Some(Finding {
                    finding_id: uuid::Uuid::new_v4().to_string(),
                    project_id: String::new(),
                    source: "semantic_scholar".to_string(),
                    identifier_kind: IdentifierKind::Doi,
                    identifier: doi,
                    title: paper.title,
                    authors: paper.authors.into_iter().map(|a| a.name).collect(),
                    publication_year: paper.year,
                    venue: paper.venue,
                    abstract_text: paper.abstract_text,
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
impl ToolAdapter for SemanticScholarAdapter {
    fn name(&self) -> &'static str {
        ENDPOINT
    }

    fn methods(&self) -> Vec<ToolSchema> {
        vec![ToolSchema {
            name: "search".to_string(),
            description: "Search Semantic Scholar's graph API for papers matching a query."
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
                detail: format!("unknown method `{other}` for semantic_scholar adapter"),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Paper>,
}

#[derive(Debug, Deserialize)]
struct Paper {
    title: String,
    year: Option<i32>,
    venue: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(rename = "externalIds")]
    external_ids: Option<ExternalIds>,
    #[serde(default)]
    authors: Vec<Author>,
}

#[derive(Debug, Deserialize)]
struct ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: String,
}
