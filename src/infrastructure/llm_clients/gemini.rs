use super::{endpoint, read_error_body, LLMClient};
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct GeminiModelsResponse {
    models: Option<Vec<GeminiModelInfo>>,
}

#[derive(Deserialize)]
struct GeminiModelInfo {
    name: String,
}

pub struct GeminiClient {
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn normalize_model(model: &str) -> String {
        let trimmed = model.trim();
        if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{}", trimmed)
        }
    }

    fn api_key(config: &LLMConfig) -> Result<&str> {
        config.api_key.as_deref().ok_or_else(|| {
            AppError::ExternalCapability("Missing API key for Google provider".to_string())
        })
    }
}

#[async_trait]
impl LLMClient for GeminiClient {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<String> {
        let api_key = Self::api_key(config)?;
        let model_id = Self::normalize_model(&config.model);
        let url = endpoint(&config.base_url, &format!("{}:generateContent", model_id));

        let system_instruction = (!system.trim().is_empty()).then(|| GeminiContent {
            parts: vec![GeminiPart {
                text: system.to_string(),
            }],
            role: None,
        });

        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: user.to_string(),
                }],
                role: Some("user".to_string()),
            }],
            system_instruction,
            generation_config: Some(GenerationConfig {
                temperature: config.temperature.unwrap_or(0.0) as f64,
                max_output_tokens: config.max_tokens,
                response_mime_type: "application/json",
            }),
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalCapability(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(read_error_body(response).await);
        }

        let json: GeminiResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalCapability(format!("Failed to parse JSON: {}", e)))?;

        json.candidates
            .first()
            .and_then(|candidate| candidate.content.parts.first())
            .map(|part| part.text.clone())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| AppError::ExternalCapability("Invalid response format".to_string()))
    }

    async fn list_models(&self, config: &LLMConfig) -> Result<Vec<String>> {
        let api_key = Self::api_key(config)?;
        let url = endpoint(&config.base_url, "models");

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", api_key)
            .send()
            .await
            .map_err(|e| AppError::ExternalCapability(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(read_error_body(response).await);
        }

        let json: GeminiModelsResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalCapability(format!("Failed to parse JSON: {}", e)))?;

        let models = json
            .models
            .unwrap_or_default()
            .into_iter()
            .map(|model| {
                model
                    .name
                    .strip_prefix("models/")
                    .unwrap_or(model.name.as_str())
                    .to_string()
            })
            .collect();

        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_model_adds_prefix_once() {
        assert_eq!(
            GeminiClient::normalize_model("gemini-1.5-pro"),
            "models/gemini-1.5-pro"
        );
        assert_eq!(
            GeminiClient::normalize_model(" models/gemini-1.5-pro "),
            "models/gemini-1.5-pro"
        );
    }
}
