use std::collections::BTreeMap;

use anthropic_ai_sdk::client::AnthropicClient as SdkClient;
use anthropic_ai_sdk::types::message::{
    ContentBlock, CreateMessageParams, CreateMessageResponse, Message, MessageClient, MessageError,
    RequiredMessageParams, Role,
};
use async_trait::async_trait;
use tokio::time::timeout;

use crate::error::ProviderError;
use crate::llm::{ClientConfig, LlmClient, ModelInfo};
use crate::prompt::RenderedPrompt;

/// Anthropic messages adapter implementing [`LlmClient`].
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: SdkClient,
    config: ClientConfig,
}

impl AnthropicClient {
    pub fn new(config: ClientConfig) -> Result<Self, ProviderError> {
        let mut builder = SdkClient::builder(
            config.api_key.clone(),
            SdkClient::DEFAULT_API_VERSION.to_string(),
        );
        if let Some(url) = &config.base_url {
            builder = builder.with_api_base_url(url.clone());
        }

        let client = builder
            .build::<MessageError>()
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        Ok(Self { client, config })
    }

    /// Reads `ANTHROPIC_API_KEY` from the environment.
    pub fn from_env(model: impl Into<String>) -> Result<Self, ProviderError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ProviderError::Request("ANTHROPIC_API_KEY is not set".to_string()))?;
        Self::new(ClientConfig::new(api_key, model))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn generate(&self, prompt: &RenderedPrompt) -> Result<String, ProviderError> {
        let request = build_request(prompt, &self.config);

        let response = timeout(
            self.config.timeout,
            self.client.create_message(Some(&request)),
        )
        .await
        .map_err(|_| {
            ProviderError::Request(format!(
                "anthropic request timed out after {}s",
                self.config.timeout.as_secs()
            ))
        })?
        .map_err(|err| ProviderError::Request(err.to_string()))?;

        Ok(response_text(&response))
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "anthropic".to_string(),
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            capabilities: BTreeMap::from([("functions".to_string(), true)]),
        }
    }
}

fn build_request(prompt: &RenderedPrompt, config: &ClientConfig) -> CreateMessageParams {
    let required = RequiredMessageParams {
        model: config.model.clone(),
        messages: vec![Message::new_text(Role::User, prompt.user.clone())],
        max_tokens: config.max_tokens,
    };

    let mut request = CreateMessageParams::new(required).with_stream(false);

    if !prompt.system.is_empty() {
        request = request.with_system(prompt.system.clone());
    }

    if let Some(temperature) = config.temperature {
        request = request.with_temperature(temperature);
    }

    request
}

fn response_text(response: &CreateMessageResponse) -> String {
    response
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use anthropic_ai_sdk::types::message::StopReason;
    use serde_json::json;

    use super::*;

    fn response(content: Vec<ContentBlock>) -> CreateMessageResponse {
        CreateMessageResponse {
            content,
            id: "msg_1".to_string(),
            model: "claude-test".to_string(),
            role: Role::Assistant,
            stop_reason: Some(StopReason::EndTurn),
            stop_sequence: None,
            type_: "message".to_string(),
            usage: anthropic_ai_sdk::types::message::Usage {
                input_tokens: 1,
                output_tokens: 1,
            },
        }
    }

    #[test]
    fn response_text_joins_text_blocks_and_skips_others() {
        let text = response_text(&response(vec![
            ContentBlock::Text {
                text: "{\"answer\":".to_string(),
            },
            ContentBlock::ToolUse {
                id: "call_1".to_string(),
                name: "search".to_string(),
                input: json!({"query": "rust"}),
            },
            ContentBlock::Text {
                text: "\"42\"}".to_string(),
            },
        ]));

        assert_eq!(text, "{\"answer\":\n\"42\"}");
    }

    #[test]
    fn response_text_is_empty_without_text_blocks() {
        let text = response_text(&response(vec![ContentBlock::Thinking {
            thinking: "hmm".to_string(),
            signature: "sig".to_string(),
        }]));

        assert!(text.is_empty());
    }

    #[test]
    fn model_info_reports_configured_model() {
        let client = AnthropicClient::new(ClientConfig::new("key", "claude-sonnet-4-5"))
            .expect("client builds");
        let info = client.model_info();

        assert_eq!(info.provider, "anthropic");
        assert_eq!(info.model, "claude-sonnet-4-5");
        assert_eq!(info.max_tokens, 1000);
    }
}
