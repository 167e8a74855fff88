use super::{endpoint, read_error_body, LLMClient};
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{LLMConfig, LLMProvider};
use async_trait::async_trait;
use serde_json::json;

/// Chat-completions client for OpenAI, OpenRouter and local OpenAI-style servers.
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
}

impl OpenAiCompatibleClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn request(
        &self,
        config: &LLMConfig,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder> {
        match (&config.api_key, config.provider) {
            (Some(key), _) => Ok(builder.bearer_auth(key)),
            // Local servers usually run without auth.
            (None, LLMProvider::Local) => Ok(builder),
            (None, provider) => Err(AppError::ExternalCapability(format!(
                "Missing API key for {:?}",
                provider
            ))),
        }
    }
}

#[async_trait]
impl LLMClient for OpenAiCompatibleClient {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<String> {
        let url = endpoint(&config.base_url, "chat/completions");

        let body = json!({
            "model": config.model,
            "messages": [
                {
                    "role": "system",
                    "content": system
                },
                {
                    "role": "user",
                    "content": user
                }
            ],
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
        });

        let response = self
            .request(config, self.client.post(&url))?
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalCapability(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(read_error_body(response).await);
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::ExternalCapability(format!("Failed to parse JSON: {}", e)))?;

        json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::ExternalCapability("Invalid response format".to_string()))
    }

    async fn list_models(&self, config: &LLMConfig) -> Result<Vec<String>> {
        let url = endpoint(&config.base_url, "models");

        let response = self
            .request(config, self.client.get(&url))?
            .send()
            .await
            .map_err(|e| AppError::ExternalCapability(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(read_error_body(response).await);
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::ExternalCapability(format!("Failed to parse JSON: {}", e)))?;

        let models = json["data"]
            .as_array()
            .ok_or_else(|| {
                AppError::ExternalCapability(
                    "Invalid response format: missing data array".to_string(),
                )
            })?
            .iter()
            .filter_map(|m| m["id"].as_str())
            .map(|id| id.to_string())
            .collect();

        Ok(models)
    }
}
