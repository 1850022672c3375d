use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use qms_types::{Finding, IdentifierKind, ToolError, ToolResult, ToolSchema};
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::adapter::{guarded_get, AdapterConfig, EndpointConfig, GuardedHttpGet, ToolAdapter};

const ENDPOINT: &str = "arxiv";
const DEFAULT_BASE_URL: &str = "http://export.arxiv.org/api/query";

static ENTRY_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<id>https?://arxiv\.org/abs/([^<]+)</id>").unwrap());
static ENTRY_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<title>([^<]*)</title>").unwrap());

pub struct ArxivAdapter {
    config: AdapterConfig,
    endpoint: EndpointConfig,
}

impl ArxivAdapter {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            config: config.clone(),
            endpoint: config.endpoint(ENDPOINT),
        }
    }

    fn base_url(&self) -> String {
        self.endpoint
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    async fn search(&self, params: &Map<String, Value>) -> Result<ToolResult, ToolError> {
        let query = params
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::UserError {
                detail: "missing required `query` parameter".to_string(),
            })?;
        let max_results = params
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(20)
            .min(100);

        let (status, body, cache_hit) = guarded_get(GuardedHttpGet {
            config: &self.config,
            endpoint_name: ENDPOINT,
            url: self.base_url(),
            query: vec![
                ("search_query".to_string(), format!("all:{query}")),
                ("max_results".to_string(), max_results.to_string()),
            ],
            headers: vec![],
        })
        .await?;

        let text = String::from_utf8(body).map_err(|err| ToolError::Transient {
            detail: format!("non-utf8 arxiv response (status {status}): {err}"),
        })?;

        let ids: Vec<&str> = ENTRY_ID.captures_iter(&text).map(|c| c.get(1).unwrap().as_str()).collect();
        let titles: Vec<&str> = ENTRY_TITLE
            .captures_iter(&text)
            .skip(1) // first <title> is the feed title, not an entry
            .map(|c| c.get(1).unwrap().as_str())
            .collect();

        let findings: Vec<Finding> = ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| Finding {
                finding_id: uuid::Uuid::new_v4().to_string(),
                project_id: String::new(),
                source: "arxiv".to_string(),
                identifier_kind: IdentifierKind::ArxivId,
                identifier: id.to_string(),
                title: titles.get(i).map(|t| t.trim().to_string()).unwrap_or_default(),
                authors: Vec::new(),
                publication_year: None,
                venue: Some("arXiv".to_string()),
                abstract_text: None,
                evidence_level: None,
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
impl ToolAdapter for ArxivAdapter {
    fn name(&self) -> &'static str {
        ENDPOINT
    }

    fn methods(&self) -> Vec<ToolSchema> {
        vec![ToolSchema {
            name: "search".to_string(),
            description: "Search arXiv's Atom feed API for preprints matching a query."
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
                detail: format!("unknown method `{other}` for arxiv adapter"),
            }),
        }
    }
}
