use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use qms_resilience::{CircuitConfig, CircuitRegistry, CachedHttpClient, RateLimiter};
use qms_types::{ToolError, ToolResult, ToolSchema};
use reqwest::Client;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default)]
pub struct EndpointConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Clone)]
pub struct AdapterConfig {
    pub endpoints: HashMap<String, EndpointConfig>,
    pub contact_email: Option<String>,
    pub http: Client,
    pub circuits: Arc<CircuitRegistry>,
    pub cache: Arc<CachedHttpClient>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AdapterConfig {
    pub fn endpoint(&self, name: &str) -> EndpointConfig {
        self.endpoints.get(name).cloned().unwrap_or_default()
    }
}

/// A uniform tool-adapter interface wrapping a single vendor API: every
/// adapter is registered under `name()`, advertises its callable methods
/// as schemas, and is invoked through the same entry point so the
/// circuit-breaker and cache layer can sit underneath every call
/// identically regardless of vendor.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    fn name(&self) -> &'static str;
    fn methods(&self) -> Vec<ToolSchema>;
    async fn invoke(&self, method: &str, params: Map<String, Value>) -> Result<ToolResult, ToolError>;
}

#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn ToolAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ToolAdapter>) {
        self.adapters.push(adapter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolAdapter>> {
        self.adapters.iter().find(|a| a.name() == name).cloned()
    }

    pub fn list(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    pub async fn invoke(
        &self,
        tool: &str,
        method: &str,
        params: Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        let adapter = self.get(tool).ok_or_else(|| ToolError::Unavailable {
            reason: format!("no adapter registered for `{tool}`"),
        })?;
        adapter.invoke(method, params).await
    }
}

/// Shared "HTTP GET through circuit breaker + cache + rate limiter" path
/// used by every concrete adapter, so each adapter module only needs to
/// build the request and parse the response body.
pub struct GuardedHttpGet<'a> {
    pub config: &'a AdapterConfig,
    pub endpoint_name: &'a str,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

pub async fn guarded_get(req: GuardedHttpGet<'_>) -> Result<(u16, Vec<u8>, bool), ToolError> {
    let breaker = req
        .config
        .circuits
        .get_or_create(req.endpoint_name, CircuitConfig::default())
        .await;

    if let Err(retry_after_secs) = breaker.try_acquire().await {
        return Err(ToolError::CircuitOpen { retry_after_secs });
    }

    let query_refs: Vec<(&str, &str)> = req
        .query
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let header_refs: Vec<(&str, &str)> = req
        .headers
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let cache_key = CachedHttpClient::cache_key("GET", &req.url, &query_refs, &header_refs, b"");

    if let Ok(Some(hit)) = req.config.cache.get(&cache_key).await {
        breaker.record_success().await;
        return Ok((hit.status, hit.body, true));
    }

    req.config.rate_limiter.acquire().await;

    let mut builder = req.config.http.get(&req.url).query(&req.query);
    for (k, v) in &req.headers {
        builder = builder.header(k, v);
    }

    let result = builder.timeout(Duration::from_secs(30)).send().await;

    let response = match result {
        Ok(resp) => resp,
        Err(err) => {
            breaker.record_failure(true).await;
            return Err(ToolError::Transient {
                detail: err.to_string(),
            });
        }
    };

    let status = response.status().as_u16();
    let body = match response.bytes().await {
        Ok(bytes) => bytes.to_vec(),
        Err(err) => {
            breaker.record_failure(true).await;
            return Err(ToolError::Transient {
                detail: err.to_string(),
            });
        }
    };

    if (500..600).contains(&status) {
        breaker.record_failure(true).await;
        return Err(ToolError::Transient {
            detail: format!("upstream returned {status}"),
        });
    }

    if (400..500).contains(&status) {
        breaker.record_failure(false).await;
        return Err(ToolError::UserError {
            detail: format!("upstream returned {status}"),
        });
    }

    breaker.record_success().await;
    let _ = req.config.cache.put(&cache_key, status, &body).await;
    Ok((status, body, false))
}
