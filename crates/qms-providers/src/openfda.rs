use async_trait::async_trait;
use chrono::Utc;
use qms_types::{Finding, IdentifierKind, ToolError, ToolResult, ToolSchema};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::adapter::{guarded_get, AdapterConfig, EndpointConfig, GuardedHttpGet, ToolAdapter};

const ENDPOINT: &str = "openfda";
const DEFAULT_BASE_URL: &str = "https://api.fda.gov/drug/event.json";

/// OpenFDA is a registry lookup (adverse-event reports), not a literature
/// search; findings carry the report's `safetyreportid` as the
/// identifier, surfaced to the same `Finding` shape so the synthesis
/// agent can cite it alongside literature results.
pub struct OpenFdaAdapter {
    config: AdapterConfig,
    endpoint: EndpointConfig,
}

impl OpenFdaAdapter {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            config: config.clone(),
            endpoint: config.endpoint(ENDPOINT),
        }
    }

    async fn search(&self, params: &Map<String, Value>) -> Result<ToolResult, ToolError> {
        let search_expr = params
            .get("search")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::UserError {
                detail: "missing required `search` parameter (openFDA query syntax)".to_string(),
            })?;
        let limit = params
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(10)
            .min(100);

        let mut query = vec![
            ("search".to_string(), search_expr.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        if let Some(key) = &self.endpoint.api_key {
            query.push(("api_key".to_string(), key.clone()));
        }

        let (status, body, cache_hit) = guarded_get(GuardedHttpGet {
            config: &self.config,
            endpoint_name: ENDPOINT,
            url: self
                .endpoint
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            query,
            headers: vec![],
        })
        .await?;

        let parsed: OpenFdaResponse = serde_json::from_slice(&body).map_err(|err| {
            ToolError::Transient {
                detail: format!("malformed openFDA response (status {status}): {err}"),
            }
        })?;

        let findings: Vec<Finding> = parsed
            .results
            .into_iter()
            .map(|event| Finding {
                finding_id: uuid::Uuid::new_v4().to_string(),
                project_id: String::new(),
                source: "openfda".to_string(),
                identifier_kind: IdentifierKind::Url,
                identifier: event.safetyreportid,
                title: format!("FDA adverse event report {}", event.receivedate.as_deref().unwrap_or("unknown date")),
                authors: Vec::new(),
                publication_year: event.receivedate.as_deref().and_then(|d| d.get(0..4)).and_then(|y| y.parse().ok()),
                venue: Some("openFDA FAERS".to_string()),
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
impl ToolAdapter for OpenFdaAdapter {
    fn name(&self) -> &'static str {
        ENDPOINT
    }

    fn methods(&self) -> Vec<ToolSchema> {
        vec![ToolSchema {
            name: "search".to_string(),
            description: "Query openFDA's drug adverse-event registry with a search expression."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "search": { "type": "string" },
                    "max_results": { "type": "integer", "minimum": 1, "maximum": 100 }
                },
                "required": ["search"]
            }),
        }]
    }

    async fn invoke(&self, method: &str, params: Map<String, Value>) -> Result<ToolResult, ToolError> {
        match method {
            "search" => self.search(&params).await,
            other => Err(ToolError::UserError {
                detail: format!("unknown method `{other}` for openfda adapter"),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenFdaResponse {
    #[serde(default)]
    results: Vec<AdverseEvent>,
}

#[derive(Debug, Deserialize)]
struct AdverseEvent {
    safetyreportid: String,
    receivedate: Option<String>,
}
