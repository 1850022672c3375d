use async_trait::async_trait;
use qms_types::{ToolError, ToolResult, ToolSchema};
use serde_json::{json, Map, Value};

use crate::adapter::{guarded_get, AdapterConfig, EndpointConfig, GuardedHttpGet, ToolAdapter};

const ENDPOINT: &str = "document_reader";

/// Fetches a plain-text/HTML document by URL for an agent to read, used
/// when a citation's abstract is insufficient and the full text is
/// needed. Backed by the same circuit-breaker+cache guard as every other
/// adapter, keyed per-host rather than per fixed endpoint name since the
/// URL varies per call.
pub struct DocumentReaderAdapter {
    config: AdapterConfig,
    #[allow(dead_code)]
    endpoint: EndpointConfig,
}

impl DocumentReaderAdapter {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            config: config.clone(),
            endpoint: config.endpoint(ENDPOINT),
        }
    }

    async fn fetch(&self, params: &Map<String, Value>) -> Result<ToolResult, ToolError> {
        let url = params
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::UserError {
                detail: "missing required `url` parameter".to_string(),
            })?;

        let host = reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "document_reader".to_string());

        let (status, body, cache_hit) = guarded_get(GuardedHttpGet {
            config: &self.config,
            endpoint_name: &host,
            url: url.to_string(),
            query: vec![],
            headers: vec![],
        })
        .await?;

        let text = String::from_utf8_lossy(&body).to_string();

        Ok(ToolResult {
            output: json!({ "status": status, "text": text }),
            metadata: Map::new(),
            cache_hit,
        })
    }
}

#[async_trait]
impl ToolAdapter for DocumentReaderAdapter {
    fn name(&self) -> &'static str {
        ENDPOINT
    }

    fn methods(&self) -> Vec<ToolSchema> {
        vec![ToolSchema {
            name: "fetch".to_string(),
            description: "Fetch a document by URL and return its body as text.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": { "url": { "type": "string" } },
                "required": ["url"]
            }),
        }]
    }

    async fn invoke(&self, method: &str, params: Map<String, Value>) -> Result<ToolResult, ToolError> {
        match method {
            "fetch" => self.fetch(&params).await,
            other => Err(ToolError::UserError {
                detail: format!("unknown method `{other}` for document_reader adapter"),
            }),
        }
    }
}
