use crate::{CompletionProvider, OpenAiAdapter};
use std::sync::Arc;
use tracing::{info, warn};
use twin_common::Result;
use twin_config::ProviderConfig;

/// Shared handle to the configured provider
pub type ProviderHandle = Arc<dyn CompletionProvider>;

/// Factory for creating completion providers
pub struct ProviderRuntime;

impl ProviderRuntime {
    /// Create a provider based on configuration
    pub fn create(config: &ProviderConfig) -> Result<ProviderHandle> {
        // For now, every endpoint is spoken to as OpenAI-compatible
        let adapter = OpenAiAdapter::new(config)?;

        if config.api_key.is_none() {
            warn!("No provider API key configured; chat requests will fail until OPENAI_API_KEY is set");
        }
        info!(
            "Completion provider {} at {} (model {})",
            adapter.name(),
            config.api_base,
            config.model
        );

        Ok(Arc::new(adapter))
    }
}
