use crate::{error::PlannerError, types::ChatMessage};
use async_trait::async_trait;

/// Core trait for planner backends.
///
/// The caller hands over an ordered conversation and gets back the raw model
/// text. Anything that can go wrong is a [`PlannerError`]; callers are
/// expected to treat every variant as recoverable.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Complete a conversation and return the raw response text
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, PlannerError>;

    /// Get provider name (e.g., "openai")
    fn provider_name(&self) -> &str;

    /// Get model name (e.g., "gpt-4o-mini")
    fn model_name(&self) -> &str;
}
