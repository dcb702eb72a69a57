mod anthropic;
mod openai;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::prompt::RenderedPrompt;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelInfo {
    pub provider: String,
    pub model: String,
    pub max_tokens: u32,
    pub capabilities: BTreeMap<String, bool>,
}

/// Provider settings shared by every client.
///
/// `timeout` is applied to each HTTP request by the client itself.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            model: model.into(),
            temperature: None,
            max_tokens: 1000,
            timeout: Duration::from_secs(30),
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &RenderedPrompt) -> Result<String, ProviderError>;

    fn validate_response(&self, response: &str) -> Result<(), ProviderError> {
        if response.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(())
    }

    fn model_info(&self) -> ModelInfo;
}
