use async_trait::async_trait;
use qms_agents::Reasoner;
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::LlmConfig;

/// The engine's real `Reasoner`: an OpenAI-chat-completions-compatible
/// HTTP client.
pub struct HttpReasoner {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpReasoner {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl Reasoner for HttpReasoner {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": system_prompt},
                    {"role": "user", "content": user_prompt},
                ],
                "stream": false,
            }))
            .send()
            .await?;

        let status = response.status();
        let value: Value = response.json().await?;

        if let Some(detail) = extract_error(&value) {
            anyhow::bail!(detail);
        }
        if !status.is_success() {
            anyhow::bail!("LLM provider request failed with status {status}");
        }

        extract_text(&value)
            .ok_or_else(|| anyhow::anyhow!("LLM provider returned no completion content"))
    }
}

fn extract_error(value: &Value) -> Option<String> {
    value
        .get("error")
        .and_then(|e| e.get("message").and_then(Value::as_str).or(e.as_str()))
        .map(str::to_string)
}

fn extract_text(value: &Value) -> Option<String> {
    value
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_text_reads_first_choice_content() {
        let value = json!({
            "choices": [{"message": {"content": "hello"}}]
        });
        assert_eq!(extract_text(&value), Some("hello".to_string()));
    }

    #[test]
    fn extract_error_reads_nested_message() {
        let value = json!({"error": {"message": "bad request"}});
        assert_eq!(extract_error(&value), Some("bad request".to_string()));
    }
}
