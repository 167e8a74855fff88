use std::sync::Arc;

use tracing::{error, info, warn};

use crate::application::{Pipeline, PipelineSettings};
use crate::application::use_cases::retry::RetryPolicy;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::infrastructure::artifact_store::{ArtifactCache, FileArtifactCache, MemoryArtifactCache};
use crate::infrastructure::config::{AppConfig, CacheBackend, JiraConfig};
use crate::infrastructure::db::artifact_cache::SqliteArtifactCache;
use crate::infrastructure::llm_clients::{LLMClient, RouterClient};
use crate::infrastructure::storage::{cache_db_path, cache_root, ensure_data_dir};
use crate::infrastructure::ticket_source::{
    InMemoryTicketSource, JiraCredentials, JiraTicketSource, TicketSource,
};

/// Long-lived services shared by every request.
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub llm_client: Arc<dyn LLMClient>,
    pub llm_config: LLMConfig,
    /// Present when no Jira site is configured; tickets are registered over HTTP.
    pub local_tickets: Option<Arc<InMemoryTicketSource>>,
}

pub async fn setup(config: &AppConfig) -> Result<AppState> {
    let data_dir = ensure_data_dir(&config.data_dir).map_err(|err| {
        error!(
            error = %err,
            data_dir = %config.data_dir.display(),
            "Failed to create data dir"
        );
        AppError::from(err)
    })?;

    let profiles = config.stage_profiles()?;
    let cache = build_cache(config.cache, &data_dir).await?;
    let (tickets, local_tickets) = build_ticket_source(&config.jira)?;
    let llm_client: Arc<dyn LLMClient> = Arc::new(RouterClient::new());

    let settings = PipelineSettings {
        min_description_chars: config.pipeline.min_description_chars,
        default_languages: config.pipeline.default_languages.clone(),
        retry: RetryPolicy::from(&config.retry),
    };
    let pipeline = Pipeline::new(
        tickets,
        cache,
        llm_client.clone(),
        config.llm.clone(),
        profiles,
        settings,
    );

    info!(
        provider = ?config.llm.provider,
        model = %config.llm.model,
        cache = ?config.cache,
        "Pipeline ready"
    );

    Ok(AppState {
        pipeline: Arc::new(pipeline),
        llm_client,
        llm_config: config.llm.clone(),
        local_tickets,
    })
}

async fn build_cache(
    backend: CacheBackend,
    data_dir: &std::path::Path,
) -> Result<Arc<dyn ArtifactCache>> {
    let cache: Arc<dyn ArtifactCache> = match backend {
        CacheBackend::Memory => {
            warn!("Using in-memory artifact cache; artifacts are lost on exit");
            Arc::new(MemoryArtifactCache::new())
        }
        CacheBackend::File => {
            let cache = FileArtifactCache::new(cache_root(data_dir));
            cache.ensure()?;
            info!(root = %cache.root().display(), "File artifact cache");
            Arc::new(cache)
        }
        CacheBackend::Sqlite => {
            let db_path = cache_db_path(data_dir);
            let cache = SqliteArtifactCache::connect(&db_path).await.map_err(|err| {
                error!(error = %err, db_path = %db_path.display(), "Failed to open cache DB");
                err
            })?;
            info!(db_path = %db_path.display(), "SQLite artifact cache");
            Arc::new(cache)
        }
    };
    Ok(cache)
}

fn build_ticket_source(
    jira: &JiraConfig,
) -> Result<(Arc<dyn TicketSource>, Option<Arc<InMemoryTicketSource>>)> {
    match (&jira.base_url, &jira.email, &jira.api_token) {
        (Some(base_url), Some(email), Some(api_token)) => {
            let source = JiraTicketSource::new(
                base_url,
                JiraCredentials {
                    email: email.clone(),
                    api_token: api_token.clone(),
                },
            )?;
            info!(base_url = %base_url, "Jira ticket source");
            Ok((Arc::new(source), None))
        }
        (None, None, None) => {
            info!("No Jira site configured; using local ticket store");
            let local = Arc::new(InMemoryTicketSource::new());
            Ok((local.clone(), Some(local)))
        }
        _ => Err(AppError::InputError(
            "Jira needs base_url, email and api_token together.".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_jira_config_is_rejected() {
        let jira = JiraConfig {
            base_url: Some("https://acme.atlassian.net".to_string()),
            email: None,
            api_token: None,
        };
        assert!(matches!(
            build_ticket_source(&jira),
            Err(AppError::InputError(_))
        ));
    }

    #[test]
    fn test_missing_jira_config_uses_local_store() {
        let (_, local) = build_ticket_source(&JiraConfig::default()).unwrap();
        assert!(local.is_some());
    }

    #[tokio::test]
    async fn test_setup_builds_file_cache_under_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            data_dir: dir.path().join("data"),
            ..AppConfig::default()
        };

        let state = setup(&config).await.unwrap();

        assert!(state.local_tickets.is_some());
        assert!(dir.path().join("data/cache/test-cases").is_dir());
    }

    #[tokio::test]
    async fn test_setup_opens_sqlite_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            data_dir: dir.path().to_path_buf(),
            cache: CacheBackend::Sqlite,
            ..AppConfig::default()
        };

        setup(&config).await.unwrap();
        assert!(dir.path().join("artifacts.db").exists());
    }
}
