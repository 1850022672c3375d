use async_trait::async_trait;
use chrono::Utc;
use qms_types::{Finding, IdentifierKind, ToolError, ToolResult, ToolSchema};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::adapter::{guarded_get, AdapterConfig, EndpointConfig, GuardedHttpGet, ToolAdapter};

const ENDPOINT: &str = "pubmed";
const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

pub struct PubMedAdapter {
    config: AdapterConfig,
    endpoint: EndpointConfig,
    contact_email: Option<String>,
}

impl PubMedAdapter {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            config: config.clone(),
            endpoint: config.endpoint(ENDPOINT),
            contact_email: config.contact_email.clone(),
        }
    }

    fn base_url(&self) -> String {
        self.endpoint
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    async fn search(&self, params: &Map<String, Value>) -> Result<ToolResult, ToolError> {
        let Some(email) = &self.contact_email else {
            return Err(ToolError::Unavailable {
                reason: "PUBMED_CONTACT_EMAIL is required by NCBI E-utilities usage policy"
                    .to_string(),
            });
        };

        let term = params
            .get("term")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::UserError {
                detail: "missing required `term` parameter".to_string(),
            })?;
        let max_results = params
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(20)
            .min(200);

        let (status, body, cache_hit) = guarded_get(GuardedHttpGet {
            config: &self.config,
            endpoint_name: ENDPOINT,
            url: format!("{}/esearch.fcgi", self.base_url()),
            query: vec![
                ("db".to_string(), "pubmed".to_string()),
                ("term".to_string(), term.to_string()),
                ("retmode".to_string(), "json".to_string()),
                ("retmax".to_string(), max_results.to_string()),
                ("email".to_string(), email.clone()),
            ],
            headers: vec![],
        })
        .await?;

        let parsed: EsearchResponse = serde_json::from_slice(&body).map_err(|err| {
            ToolError::Transient {
                detail: format!("malformed esearch response (status {status}): {err}"),
            }
        })?;

        let pmids = parsed.esearchresult.idlist;
        let findings: Vec<Finding> = pmids
            .into_iter()
            .map(|pmid| Finding {
                finding_id: uuid::Uuid::new_v4().to_string(),
                project_id: String::new(),
                source: "pubmed".to_string(),
                identifier_kind: IdentifierKind::Pmid,
                identifier: pmid,
                title: String::new(),
                authors: Vec::new(),
                publication_year: None,
                venue: None,
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
impl ToolAdapter for PubMedAdapter {
    fn name(&self) -> &'static str {
        ENDPOINT
    }

    fn methods(&self) -> Vec<ToolSchema> {
        vec![ToolSchema {
            name: "search".to_string(),
            description: "Search PubMed via NCBI E-utilities esearch and return matching PMIDs."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "term": { "type": "string" },
                    "max_results": { "type": "integer", "minimum": 1, "maximum": 200 }
                },
                "required": ["term"]
            }),
        }]
    }

    async fn invoke(&self, method: &str, params: Map<String, Value>) -> Result<ToolResult, ToolError> {
        match method {
            "search" => self.search(&params).await,
            other => Err(ToolError::UserError {
                detail: format!("unknown method `{other}` for pubmed adapter"),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EsearchResponse {
    esearchresult: EsearchResult,
}

#[derive(Debug, Deserialize)]
struct EsearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}
