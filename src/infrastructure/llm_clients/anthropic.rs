use super::{endpoint, read_error_body, LLMClient};
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    data: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ModelInfo {
    id: String,
}

pub struct AnthropicClient {
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn api_key(config: &LLMConfig) -> Result<&str> {
        config.api_key.as_deref().ok_or_else(|| {
            AppError::ExternalCapability("Missing API key for Anthropic provider".to_string())
        })
    }
}

#[async_trait]
impl LLMClient for AnthropicClient {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<String> {
        let api_key = Self::api_key(config)?;
        let url = endpoint(&config.base_url, "messages");

        let body = MessagesRequest {
            model: &config.model,
            max_tokens: config.max_tokens.unwrap_or(4096),
            system: system.trim(),
            messages: vec![Message {
                role: "user",
                content: user,
            }],
            temperature: config.temperature,
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalCapability(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(read_error_body(response).await);
        }

        let json: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalCapability(format!("Failed to parse JSON: {}", e)))?;

        let text: String = json
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        if text.is_empty() {
            return Err(AppError::ExternalCapability(
                "Invalid response format".to_string(),
            ));
        }
        Ok(text)
    }

    async fn list_models(&self, config: &LLMConfig) -> Result<Vec<String>> {
        let api_key = Self::api_key(config)?;
        let url = endpoint(&config.base_url, "models");

        let response = self
            .client
            .get(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await
            .map_err(|e| AppError::ExternalCapability(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(read_error_body(response).await);
        }

        let json: ModelsResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalCapability(format!("Failed to parse JSON: {}", e)))?;

        Ok(json.data.into_iter().map(|model| model.id).collect())
    }
}
