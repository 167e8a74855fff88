use crate::domain::code_bundle::TargetLanguage;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::domain::stage_profile::StageProfiles;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "casegen.toml";
pub const ENV_PREFIX: &str = "CASEGEN_";

const EMBEDDED_STAGE_PROFILES: &str = include_str!("../../../resources/stages.toml");

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    #[default]
    File,
    Sqlite,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct JiraConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
}

/// Bounds for retrying external capability calls.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            timeout_secs: 120,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub min_description_chars: usize,
    pub default_languages: Vec<TargetLanguage>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_description_chars: 40,
            default_languages: vec![TargetLanguage::Python],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3210,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub cache: CacheBackend,
    pub llm: LLMConfig,
    pub jira: JiraConfig,
    pub retry: RetryConfig,
    pub pipeline: PipelineConfig,
    pub http: HttpConfig,
    #[serde(default)]
    pub stage_profiles_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".casegen"),
            cache: CacheBackend::default(),
            llm: LLMConfig::default(),
            jira: JiraConfig::default(),
            retry: RetryConfig::default(),
            pipeline: PipelineConfig::default(),
            http: HttpConfig::default(),
            stage_profiles_path: None,
        }
    }
}

impl AppConfig {
    /// Defaults, then `casegen.toml` in the working directory, then `CASEGEN_*` env vars.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::figment(Path::new(CONFIG_FILE))
            .extract()
            .map_err(|e| AppError::InputError(format!("Invalid configuration: {}", e)))
    }

    pub fn figment(config_file: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn stage_profiles(&self) -> Result<StageProfiles> {
        load_stage_profiles(self.stage_profiles_path.as_deref())
    }
}

/// Built-in stage profiles, with any fields from `override_path` layered on top.
pub fn load_stage_profiles(override_path: Option<&Path>) -> Result<StageProfiles> {
    let mut figment = Figment::from(Toml::string(EMBEDDED_STAGE_PROFILES));
    if let Some(path) = override_path {
        if !path.exists() {
            return Err(AppError::NotFound(format!(
                "Stage profiles file {} does not exist",
                path.display()
            )));
        }
        figment = figment.merge(Toml::file(path));
    }
    figment
        .extract()
        .map_err(|e| AppError::InputError(format!("Invalid stage profiles: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm_config::LLMProvider;

    #[test]
    fn test_defaults_without_file_or_env() {
        figment::Jail::expect_with(|_jail| {
            let config: AppConfig = AppConfig::figment(Path::new(CONFIG_FILE)).extract()?;
            assert_eq!(config.cache, CacheBackend::File);
            assert_eq!(config.retry, RetryConfig::default());
            assert_eq!(config.pipeline.min_description_chars, 40);
            assert_eq!(config.llm.provider, LLMProvider::Local);
            Ok(())
        });
    }

    #[test]
    fn test_file_then_env_layering() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                cache = "sqlite"

                [retry]
                max_attempts = 5

                [llm]
                provider = "Anthropic"
                model = "claude-model"
                "#,
            )?;
            jail.set_env("CASEGEN_RETRY__MAX_ATTEMPTS", "2");
            jail.set_env("CASEGEN_PIPELINE__MIN_DESCRIPTION_CHARS", "10");

            let config: AppConfig = AppConfig::figment(Path::new(CONFIG_FILE)).extract()?;
            assert_eq!(config.cache, CacheBackend::Sqlite);
            assert_eq!(config.retry.max_attempts, 2);
            assert_eq!(config.retry.base_delay_ms, 500);
            assert_eq!(config.pipeline.min_description_chars, 10);
            assert_eq!(config.llm.provider, LLMProvider::Anthropic);
            assert_eq!(config.llm.model, "claude-model");
            Ok(())
        });
    }

    #[test]
    fn test_embedded_stage_profiles_parse() {
        let profiles = load_stage_profiles(None).unwrap();
        assert!(profiles.validator.expected_output.contains("needs_more_info"));
        assert!(profiles.test_case_generator.task.contains("TC-01"));
        assert!(!profiles.code_generator.role.is_empty());
    }

    #[test]
    fn test_stage_profile_override_merges_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stages.toml");
        std::fs::write(&path, "[validator]\nrole = \"Strict reviewer\"\n").unwrap();

        let profiles = load_stage_profiles(Some(&path)).unwrap();
        assert_eq!(profiles.validator.role, "Strict reviewer");
        assert!(!profiles.validator.goal.is_empty());
    }
}
