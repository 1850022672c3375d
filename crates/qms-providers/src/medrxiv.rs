use async_trait::async_trait;
use chrono::Utc;
use qms_types::{Finding, IdentifierKind, ToolError, ToolResult, ToolSchema};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::adapter::{guarded_get, AdapterConfig, EndpointConfig, GuardedHttpGet, ToolAdapter};

const ENDPOINT: &str = "medrxiv";
const DEFAULT_BASE_URL: &str = "https://api.biorxiv.org/details/medrxiv";

/// medRxiv's API is date-range based rather than keyword search; callers
/// pass a `from`/`to` window (YYYY-MM-DD) and the adapter filters locally
/// by a title/abstract substring match, since the vendor offers no
/// server-side term search.
pub struct MedRxivAdapter {
    config: AdapterConfig,
    endpoint: EndpointConfig,
}

impl MedRxivAdapter {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            config: config.clone(),
            endpoint: config.endpoint(ENDPOINT),
        }
    }

    async fn search(&self, params: &Map<String, Value>) -> Result<ToolResult, ToolError> {
        let from = params
            .get("from")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::UserError {
                detail: "missing required `from` date parameter".to_string(),
            })?;
        let to = params
            .get("to")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::UserError {
                detail: "missing required `to` date parameter".to_string(),
            })?;
        let term = params.get("term").and_then(Value::as_str).map(str::to_lowercase);

        let base = self
            .endpoint
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let (status, body, cache_hit) = guarded_get(GuardedHttpGet {
            config: &self.config,
            endpoint_name: ENDPOINT,
            url: format!("{base}/{from}/{to}/0"),
            query: vec![],
            headers: vec![],
        })
        .await?;

        let parsed: DetailsResponse = serde_json::from_slice(&body).map_err(|err| {
            ToolError::Transient {
                detail: format!("malformed medrxiv response (status {status}): {err}"),
            }
        })?;

        let findings: Vec<Finding> = parsed
            .collection
            .into_iter()
            .filter(|entry| {
                term.as_ref().map_or(true, |t| {
                    entry.title.to_lowercase().contains(t.as_str())
                        || entry.abstract_text.to_lowercase().contains(t.as_str())
                })
            })
            .map(|entry| Finding {
                finding_id: uuid::Uuid::new_v4().to_string(),
                project_id: String::new(),
                source: "medrxiv".to_string(),
                identifier_kind: IdentifierKind::Doi,
                identifier: entry.doi,
                title: entry.title,
                authors: entry.authors.split(';').map(|s| s.trim().to_string()).collect(),
                publication_year: entry.date.get(0..4).and_then(|y| y.parse().ok()),
                venue: Some("medRxiv".to_string()),
                abstract_text: Some(entry.abstract_text),
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
impl ToolAdapter for MedRxivAdapter {
    fn name(&self) -> &'static str {
        ENDPOINT
    }

    fn methods(&self) -> Vec<ToolSchema> {
        vec![ToolSchema {
            name: "search".to_string(),
            description: "List medRxiv preprints posted within a date range, optionally filtered by a term."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "from": { "type": "string", "description": "YYYY-MM-DD" },
                    "to": { "type": "string", "description": "YYYY-MM-DD" },
                    "term": { "type": "string" }
                },
                "required": ["from", "to"]
            }),
        }]
    }

    async fn invoke(&self, method: &str, params: Map<String, Value>) -> Result<ToolResult, ToolError> {
        match method {
            "search" => self.search(&params).await,
            other => Err(ToolError::UserError {
                detail: format!("unknown method `{other}` for medrxiv adapter"),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    #[serde(default)]
    collection: Vec<MedrxivEntry>,
}

#[derive(Debug, Deserialize)]
struct MedrxivEntry {
    doi: String,
    title: String,
    #[serde(default)]
    authors: String,
    date: String,
    #[serde(rename = "abstract", default)]
    abstract_text: String,
}
