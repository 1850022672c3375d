use async_trait::async_trait;
use chrono::Utc;
use qms_types::{Finding, IdentifierKind, ToolError, ToolResult, ToolSchema};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::adapter::{guarded_get, AdapterConfig, EndpointConfig, GuardedHttpGet, ToolAdapter};

const ENDPOINT: &str = "clinicaltrials";
const DEFAULT_BASE_URL: &str = "https://clinicaltrials.gov/api/v2/studies";

pub struct ClinicalTrialsAdapter {
    config: AdapterConfig,
    endpoint: EndpointConfig,
}

impl ClinicalTrialsAdapter {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            config: config.clone(),
            endpoint: config.endpoint(ENDPOINT),
        }
    }

    async fn search(&self, params: &Map<String, Value>) -> Result<ToolResult, ToolError> {
        let term = params
            .get("term")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::UserError {
                detail: "missing required `term` parameter".to_string(),
            })?;
        let page_size = params
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
                ("query.term".to_string(), term.to_string()),
                ("pageSize".to_string(), page_size.to_string()),
                ("format".to_string(), "json".to_string()),
            ],
            headers: vec![],
        })
        .await?;

        let parsed: StudiesResponse = serde_json::from_slice(&body).map_err(|err| {
            ToolError::Transient {
                detail: format!("malformed clinicaltrials response (status {status}): {err}"),
            }
        })?;

        let findings: Vec<Finding> = parsed
            .studies
            .into_iter()
            .filter_map(|study| {
                let nct_id = study.protocol_section.identification_module.nct_id?;
                Some(Finding {
                    finding_id: uuid::Uuid::new_v4().to_string(),
                    project_id: String::new(),
                    source: "clinicaltrials".to_string(),
                    identifier_kind: IdentifierKind::NctId,
                    identifier: nct_id,
                    title: study
                        .protocol_section
                        .identification_module
                        .brief_title
                        .unwrap_or_default(),
                    authors: Vec::new(),
                    publication_year: None,
                    venue: Some("ClinicalTrials.gov".to_string()),
                    abstract_text: None,
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
impl ToolAdapter for ClinicalTrialsAdapter {
    fn name(&self) -> &'static str {
        ENDPOINT
    }

    fn methods(&self) -> Vec<ToolSchema> {
        vec![ToolSchema {
            name: "search".to_string(),
            description: "Search ClinicalTrials.gov study registry for trials matching a term."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "term": { "type": "string" },
                    "max_results": { "type": "integer", "minimum": 1, "maximum": 100 }
                },
                "required": ["term"]
            }),
        }]
    }

    async fn invoke(&self, method: &str, params: Map<String, Value>) -> Result<ToolResult, ToolError> {
        match method {
            "search" => self.search(&params).await,
            other => Err(ToolError::UserError {
                detail: format!("unknown method `{other}` for clinicaltrials adapter"),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StudiesResponse {
    #[serde(default)]
    studies: Vec<Study>,
}

#[derive(Debug, Deserialize)]
struct Study {
    #[serde(rename = "protocolSection")]
    protocol_section: ProtocolSection,
}

#[derive(Debug, Deserialize)]
struct ProtocolSection {
    #[serde(rename = "identificationModule")]
    identification_module: IdentificationModule,
}

#[derive(Debug, Deserialize)]
struct IdentificationModule {
    #[serde(rename = "nctId")]
    nct_id: Option<String>,
    #[serde(rename = "briefTitle")]
    brief_title: Option<String>,
}
