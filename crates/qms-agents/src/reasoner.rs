use async_trait::async_trait;

/// The boundary between an agent and an LLM provider, deliberately thin
/// (one method) so agents don't depend on any concrete provider SDK —
/// the engine wires a real implementation backed by whichever provider
/// the project has configured.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String>;
}

/// A deterministic stand-in used in tests and as a safe default: echoes
/// a templated response rather than calling out to a real provider.
pub struct EchoReasoner;

#[async_trait]
impl Reasoner for EchoReasoner {
    async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> anyhow::Result<String> {
        Ok(format!("[no provider configured] {user_prompt}"))
    }
}
