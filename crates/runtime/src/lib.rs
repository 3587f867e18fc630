mod chat;
mod openai_adapter;
mod runtime;


pub use chat::{ChatOrchestrator, ChatOutcome};
pub use openai_adapter::OpenAiAdapter;
pub use runtime::{ProviderHandle, ProviderRuntime};

use async_trait::async_trait;
use twin_common::{Message, Result};

/// Trait for chat-completion providers
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Send the full turn sequence and return the top reply text.
    /// One blocking round trip; no retry, no streaming.
    async fn complete(&self, model: &str, messages: &[Message]) -> Result<String>;
}
