pub mod anthropic;
pub mod gemini;
pub mod openai;

use crate::domain::error::Result;
use crate::domain::llm_config::LLMConfig;
use crate::domain::llm_config::LLMProvider;
use anthropic::AnthropicClient;
use async_trait::async_trait;
use gemini::GeminiClient;
use openai::OpenAiCompatibleClient;

/// Text-generation capability shared by every stage.
///
/// Implementations report transport and provider failures as
/// `AppError::ExternalCapability` so callers can retry them.
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<String>;
    async fn list_models(&self, config: &LLMConfig) -> Result<Vec<String>>;
}

pub struct RouterClient {
    openai: OpenAiCompatibleClient,
    anthropic: AnthropicClient,
    gemini: GeminiClient,
}

impl RouterClient {
    pub fn new() -> Self {
        Self {
            openai: OpenAiCompatibleClient::new(),
            anthropic: AnthropicClient::new(),
            gemini: GeminiClient::new(),
        }
    }
}

impl Default for RouterClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMClient for RouterClient {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<String> {
        match config.provider {
            LLMProvider::Google => self.gemini.generate(config, system, user).await,
            LLMProvider::Anthropic => self.anthropic.generate(config, system, user).await,
            LLMProvider::Local | LLMProvider::OpenAI | LLMProvider::OpenRouter => {
                self.openai.generate(config, system, user).await
            }
        }
    }

    async fn list_models(&self, config: &LLMConfig) -> Result<Vec<String>> {
        match config.provider {
            LLMProvider::Google => self.gemini.list_models(config).await,
            LLMProvider::Anthropic => self.anthropic.list_models(config).await,
            LLMProvider::Local | LLMProvider::OpenAI | LLMProvider::OpenRouter => {
                self.openai.list_models(config).await
            }
        }
    }
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

pub(crate) async fn read_error_body(response: reqwest::Response) -> crate::domain::error::AppError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    crate::domain::error::AppError::ExternalCapability(format!("API error ({}): {}", status, text))
}
