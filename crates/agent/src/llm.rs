use anyhow::Result;
use async_trait::async_trait;

/// Single-shot text completion. Implementations hold no conversation state.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system_instructions: &str, user_prompt: &str) -> Result<String>;
}
