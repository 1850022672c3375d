use async_trait::async_trait;
use chrono::Utc;
use qms_types::{Finding, IdentifierKind, ToolError, ToolResult, ToolSchema};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::adapter::{guarded_get, AdapterConfig, EndpointConfig, GuardedHttpGet, ToolAdapter};

const ENDPOINT: &str = "doaj";
const DEFAULT_BASE_URL: &str = "https://doaj.org/api/search/articles";

pub struct DoajAdapter {
    config: AdapterConfig,
    endpoint: EndpointConfig,
}

impl DoajAdapter {
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
        let base = self
            .endpoint
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let (status, body, cache_hit) = guarded_get(GuardedHttpGet {
            config: &self.config,
            endpoint_name: ENDPOINT,
            url: format!("{base}/{}", urlencode(query)),
            query: vec![],
            headers: vec![],
        })
        .await?;

        let parsed: DoajResponse = serde_json::from_slice(&body).map_err(|err| {
            ToolError::Transient {
                detail: format!("malformed DOAJ response (status {status}): {err}"),
            }
        })?;

        let findings: Vec<Finding> = parsed
            .results
            .into_iter()
            .filter_map(|hit| {
                let doi = hit
                    .bibjson
                    .identifier
                    .iter()
                    .find(|id| id.id_type.eq_ignore_ascii_case("doi"))
                    .map(|id| id.id.clone())?;
                Some(Finding {
                    finding_id: uuid::Uuid::new_v4().to_string(),
                    project_id: String::new(),
                    source: "doaj".to_string(),
                    identifier_kind: IdentifierKind::Doi,
                    identifier: doi,
                    title: hit.bibjson.title,
                    authors: hit.bibjson.author.into_iter().map(|a| a.name).collect(),
                    publication_year: hit.bibjson.year.and_then(|y| y.parse().ok()),
                    venue: hit.bibjson.journal.and_then(|j| j.title),
                    abstract_text: hit.bibjson.abstract_text,
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

fn urlencode(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_string()
            } else {
                format!("%{:02X}", c as u32)
            }
        })
        .collect()
}

#[async_trait]
impl ToolAdapter for DoajAdapter {
    fn name(&self) -> &'static str {
        ENDPOINT
    }

    fn methods(&self) -> Vec<ToolSchema> {
        vec![ToolSchema {
            name: "search".to_string(),
            description: "Search the Directory of Open Access Journals for articles matching a query."
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
                detail: format!("unknown method `{other}` for doaj adapter"),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DoajResponse {
    #[serde(default)]
    results: Vec<DoajHit>,
}

#[derive(Debug, Deserialize)]
struct DoajHit {
    bibjson: BibJson,
}

#[derive(Debug, Deserialize)]
struct BibJson {
    title: String,
    #[serde(default)]
    author: Vec<DoajAuthor>,
    year: Option<String>,
    journal: Option<Journal>,
    #[serde(default)]
    identifier: Vec<Identifier>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DoajAuthor {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Journal {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Identifier {
    #[serde(rename = "type")]
    id_type: String,
    id: String,
}
