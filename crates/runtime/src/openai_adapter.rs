use crate::CompletionProvider;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use twin_common::{Error, Message, Result};
use twin_config::ProviderConfig;

const MAX_ERROR_BODY: usize = 2048;

/// OpenAI chat-completions request format
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

/// OpenAI chat-completions response format
#[derive(Debug, Deserialize)]
pub(crate) struct CompletionResponse {
    #[serde(default)]
    pub(crate) choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub(crate) message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseMessage {
    #[serde(default)]
    pub(crate) content: Option<String>,
}

/// Adapter for OpenAI-compatible chat-completion endpoints
pub struct OpenAiAdapter {
    client: Client,
    api_base: String,
    api_key: Option<String>,
}

impl OpenAiAdapter {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    /// Take the first choice's text
    pub(crate) fn parse_response(response: CompletionResponse) -> Result<String> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Provider("Response contained no choices".into()))?;

        choice
            .message
            .content
            .ok_or_else(|| Error::Provider("Response message had no content".into()))
    }
}

#[async_trait]
impl CompletionProvider for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, model: &str, messages: &[Message]) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(Error::ProviderNotConfigured)?;

        let url = self.completions_url();
        debug!("Sending {} messages to {} with model {}", messages.len(), url, model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&CompletionRequest { model, messages })
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let mut error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            if error_text.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !error_text.is_char_boundary(cut) {
                    cut -= 1;
                }
                error_text.truncate(cut);
            }
            return Err(Error::Provider(format!("HTTP {}: {}", status, error_text)));
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Invalid response body: {}", e)))?;

        Self::parse_response(body)
    }
}
