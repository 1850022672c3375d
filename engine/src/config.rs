use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use qms_providers::{AdapterConfig, EndpointConfig};
use qms_resilience::{CachedHttpClient, CircuitRegistry, RateLimiter};
use std::sync::Arc;

const DEFAULT_AUDIT_LOG_ROOT: &str = "./data/audit";
const DEFAULT_PROJECT_DATA_ROOT: &str = "./data/projects";
const DEFAULT_HTTP_CACHE_PATH: &str = "./data/http_cache.sqlite3";
const HTTP_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const RATE_LIMIT_CAPACITY: u32 = 5;
const RATE_LIMIT_REFILL_PER_SEC: f64 = 1.0;

/// Everything the LLM-backed reasoner needs, loaded from an environment
/// layer read once at startup before any runtime override.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// Where project data, the audit trail, and the shared HTTP cache live on
/// disk.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub project_data_root: PathBuf,
    pub audit_log_root: PathBuf,
    pub http_cache_path: PathBuf,
}

/// The engine's fully resolved startup configuration: the LLM config, the
/// storage config, and the adapter config handed to
/// `qms_providers::build_registry`.
pub struct EngineConfig {
    pub llm: LlmConfig,
    pub store: StoreConfig,
    pub adapters: AdapterConfig,
}

impl EngineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("LLM_API_KEY")
            .context("LLM_API_KEY must be set to the research assistant's LLM provider key")?;
        let base_url = std::env::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let contact_email = std::env::var("PUBMED_CONTACT_EMAIL")
            .context("PUBMED_CONTACT_EMAIL must be set; NCBI E-utilities requires a contact email")?;

        let mut endpoints = HashMap::new();
        endpoints.insert(
            "semantic_scholar".to_string(),
            EndpointConfig {
                api_key: optional_env("SEMANTIC_SCHOLAR_API_KEY"),
                base_url: None,
            },
        );
        endpoints.insert(
            "core".to_string(),
            EndpointConfig {
                api_key: optional_env("CORE_API_KEY"),
                base_url: None,
            },
        );
        endpoints.insert(
            "web_search".to_string(),
            EndpointConfig {
                api_key: optional_env("SERPAPI_API_KEY")
                    .or_else(|| optional_env("EXA_API_KEY"))
                    .or_else(|| optional_env("TAVILY_API_KEY")),
                base_url: None,
            },
        );

        let project_data_root = path_env("PROJECT_DATA_ROOT", DEFAULT_PROJECT_DATA_ROOT);
        let audit_log_root = path_env("AUDIT_LOG_ROOT", DEFAULT_AUDIT_LOG_ROOT);
        let http_cache_path = path_env("HTTP_CACHE_PATH", DEFAULT_HTTP_CACHE_PATH);

        if let Some(parent) = http_cache_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        std::fs::create_dir_all(&project_data_root)?;
        std::fs::create_dir_all(&audit_log_root)?;

        let cache = Arc::new(CachedHttpClient::open(&http_cache_path, HTTP_CACHE_TTL)?);
        let circuits = Arc::new(CircuitRegistry::new());
        let rate_limiter = Arc::new(RateLimiter::new(RATE_LIMIT_CAPACITY, RATE_LIMIT_REFILL_PER_SEC));

        let adapters = AdapterConfig {
            endpoints,
            contact_email: Some(contact_email),
            http: reqwest::Client::new(),
            circuits,
            cache,
            rate_limiter,
        };

        Ok(Self {
            llm: LlmConfig {
                api_key,
                base_url,
                model,
            },
            store: StoreConfig {
                project_data_root,
                audit_log_root,
                http_cache_path,
            },
            adapters,
        })
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn path_env(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}
