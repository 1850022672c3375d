use async_trait::async_trait;
use chrono::Utc;
use qms_types::{Finding, IdentifierKind, ToolError, ToolResult, ToolSchema};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::adapter::{guarded_get, AdapterConfig, EndpointConfig, GuardedHttpGet, ToolAdapter};

const ENDPOINT: &str = "web_search";
const DEFAULT_BASE_URL: &str = "https://serpapi.com/search";

/// Optional general web search (SerpAPI) used only as a last resort when
/// the bibliographic adapters return nothing; registers successfully
/// without a key and reports `ToolError::Unavailable` per call instead of
/// failing adapter construction.
pub struct WebSearchAdapter {
    config: AdapterConfig,
    endpoint: EndpointConfig,
}

impl WebSearchAdapter {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            config: config.clone(),
            endpoint: config.endpoint(ENDPOINT),
        }
    }

    async fn search(&self, params: &Map<String, Value>) -> Result<ToolResult, ToolError> {
        let Some(api_key) = &self.endpoint.api_key else {
            return Err(ToolError::Unavailable {
                reason: "no web search provider key configured (SERPAPI_API_KEY)".to_string(),
            });
        };
        let query = params
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::UserError {
                detail: "missing required `query` parameter".to_string(),
            })?;

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
                ("api_key".to_string(), api_key.clone()),
            ],
            headers: vec![],
        })
        .await?;

        let parsed: SerpResponse = serde_json::from_slice(&body).map_err(|err| {
            ToolError::Transient {
                detail: format!("malformed web search response (status {status}): {err}"),
            }
        })?;

        let findings: Vec<Finding> = parsed
            .organic_results
            .into_iter()
            .map(|hit| Finding {
                finding_id: uuid::Uuid::new_v4().to_string(),
                project_id: String::new(),
                source: "web_search".to_string(),
                identifier_kind: IdentifierKind::Url,
                identifier: hit.link,
                title: hit.title,
                authors: Vec::new(),
                publication_year: None,
                venue: None,
                abstract_text: hit.snippet,
                evidence_level: Some(7),
                retracted: false,
                selected: false,
                retrieved_at: Utc::now(),
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
impl ToolAdapter for WebSearchAdapter {
    fn name(&self) -> &'static str {
        ENDPOINT
    }

    fn methods(&self) -> Vec<ToolSchema> {
        vec![ToolSchema {
            name: "search".to_string(),
            description: "General web search, used only when bibliographic sources return nothing."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"]
            }),
        }]
    }

    async fn invoke(&self, method: &str, params: Map<String, Value>) -> Result<ToolResult, ToolError> {
        match method {
            "search" => self.search(&params).await,
            other => Err(ToolError::UserError {
                detail: format!("unknown method `{other}` for web_search adapter"),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    title: String,
    link: String,
    snippet: Option<String>,
}
