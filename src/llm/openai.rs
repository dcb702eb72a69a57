use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::llm::{ClientConfig, LlmClient, ModelInfo};
use crate::prompt::RenderedPrompt;

const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

const SUPPORTED_MODELS: &[&str] = &[
    "gpt-4o",
    "gpt-4",
    "gpt-4-1106-preview",
    "gpt-4-vision-preview",
    "gpt-3.5-turbo",
];

/// OpenAI chat-completions adapter implementing [`LlmClient`].
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    config: ClientConfig,
    model_info: ModelInfo,
}

impl OpenAiClient {
    pub fn new(config: ClientConfig) -> Result<Self, ProviderError> {
        validate_model(&config.model)?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        let model_info = model_info_for(&config.model);
        Ok(Self {
            client,
            config,
            model_info,
        })
    }

    /// Reads `OPENAI_API_KEY` and, if set, `OPENAI_BASE_URL`.
    pub fn from_env(model: impl Into<String>) -> Result<Self, ProviderError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ProviderError::Request("OPENAI_API_KEY is not set".to_string()))?;

        let mut config = ClientConfig::new(api_key, model);
        config.base_url = std::env::var("OPENAI_BASE_URL").ok();
        Self::new(config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, prompt: &RenderedPrompt) -> Result<String, ProviderError> {
        let request = build_request(prompt, &self.config);

        tracing::debug!(
            model = %self.config.model,
            system_len = prompt.system.len(),
            user_len = prompt.user.len(),
            "sending chat completion request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Request(extract_api_error(response).await));
        }

        let payload = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|err| ProviderError::Response(err.to_string()))?;

        normalize_response(payload)
    }

    fn model_info(&self) -> ModelInfo {
        self.model_info.clone()
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<RequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum RequestMessage {
    System { content: String },
    User { content: String },
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<AssistantMessage>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<Value>,
}

fn validate_model(model: &str) -> Result<(), ProviderError> {
    if SUPPORTED_MODELS.contains(&model) {
        Ok(())
    } else {
        Err(ProviderError::UnsupportedModel(model.to_string()))
    }
}

fn model_info_for(model: &str) -> ModelInfo {
    let max_tokens = match model {
        "gpt-4o" | "gpt-4" => 8192,
        "gpt-4-1106-preview" | "gpt-4-vision-preview" => 128_000,
        _ => 4096,
    };

    let capabilities = BTreeMap::from([
        (
            "functions".to_string(),
            matches!(model, "gpt-4" | "gpt-4-1106-preview" | "gpt-3.5-turbo"),
        ),
        ("vision".to_string(), model == "gpt-4-vision-preview"),
    ]);

    ModelInfo {
        provider: "openai".to_string(),
        model: model.to_string(),
        max_tokens,
        capabilities,
    }
}

fn build_request(prompt: &RenderedPrompt, config: &ClientConfig) -> ChatCompletionRequest {
    let mut messages = Vec::with_capacity(2);
    if !prompt.system.is_empty() {
        messages.push(RequestMessage::System {
            content: prompt.system.clone(),
        });
    }
    messages.push(RequestMessage::User {
        content: prompt.user.clone(),
    });

    ChatCompletionRequest {
        model: config.model.clone(),
        messages,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}

fn normalize_response(response: ChatCompletionResponse) -> Result<String, ProviderError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Response("openai response missing choices".to_string()))?;

    let message = choice.message.ok_or_else(|| {
        ProviderError::Response("openai response missing choice message".to_string())
    })?;

    Ok(message.content.unwrap_or_default())
}

async fn extract_api_error(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(&body) {
        let code = parsed
            .error
            .code
            .map(|value| match value {
                Value::String(value) => value,
                other => other.to_string(),
            })
            .unwrap_or_else(|| status.as_u16().to_string());
        let error_type = parsed
            .error
            .type_
            .unwrap_or_else(|| status.to_string().to_uppercase());
        let message = parsed
            .error
            .message
            .unwrap_or_else(|| "unknown openai api error".to_string());

        return format!("openai api error {code} {error_type}: {message}");
    }

    if body.is_empty() {
        format!("openai api request failed ({status})")
    } else {
        format!("openai api request failed ({status}): {body}")
    }
}
