use crate::application::use_cases::prompts::clarification_addendum;
use crate::application::use_cases::retry::RetryPolicy;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::infrastructure::llm_clients::LLMClient;
use std::sync::Arc;

/// Generation capability bound to one model configuration and retry policy.
#[derive(Clone)]
pub struct StageGenerator {
    llm: Arc<dyn LLMClient>,
    config: LLMConfig,
    retry: RetryPolicy,
}

impl StageGenerator {
    pub fn new(llm: Arc<dyn LLMClient>, config: LLMConfig, retry: RetryPolicy) -> Self {
        Self { llm, config, retry }
    }

    pub async fn generate(&self, label: &str, system: &str, user: &str) -> Result<String> {
        self.retry
            .run(label, || self.llm.generate(&self.config, system, user))
            .await
    }

    /// Generate and parse, re-asking once with the parse problem when the output is malformed.
    ///
    /// A second malformed response becomes `GenerationFailed`.
    pub async fn generate_validated<T, P>(
        &self,
        label: &str,
        system: &str,
        user: &str,
        parse: P,
    ) -> Result<T>
    where
        P: Fn(&str) -> Result<T>,
    {
        let raw = self.generate(label, system, user).await?;
        let problem = match parse(&raw) {
            Err(AppError::SchemaViolation(problem)) => problem,
            other => return other,
        };

        tracing::warn!(operation = label, problem = %problem, "Malformed output, asking once more");
        let clarified = format!("{}{}", user, clarification_addendum(&problem));
        let raw = self.generate(label, system, &clarified).await?;
        match parse(&raw) {
            Err(AppError::SchemaViolation(problem)) => Err(AppError::GenerationFailed(format!(
                "{} output still malformed after clarification: {}",
                label, problem
            ))),
            other => other,
        }
    }
}
