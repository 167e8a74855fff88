use crate::domain::cache_key::{ArtifactCacheEntry, ArtifactNamespace, CacheKey};
use crate::domain::error::{AppError, Result};
use crate::infrastructure::artifact_store::{new_entry, verify_entry, ArtifactCache};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const CACHE_SCHEMA: &str = include_str!("../../../resources/cache/schema.sql");

#[derive(sqlx::FromRow)]
struct CacheRow {
    cache_key: String,
    namespace: String,
    payload: String,
    created_at: DateTime<Utc>,
}

pub struct SqliteArtifactCache {
    pool: SqlitePool,
}

impl SqliteArtifactCache {
    pub async fn connect(db_path: &Path) -> Result<Self> {
        let db_url = db_path_to_url(db_path)?;
        let options = SqliteConnectOptions::from_str(&db_url)
            .map_err(|e| AppError::DatabaseError(format!("Failed to parse cache DB URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect cache DB: {e}")))?;

        let cache = Self { pool };
        cache.apply_schema().await?;
        Ok(cache)
    }

    /// Private in-memory database; a single connection keeps one shared schema.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to open in-memory cache: {e}")))?;
        let cache = Self { pool };
        cache.apply_schema().await?;
        Ok(cache)
    }

    async fn apply_schema(&self) -> Result<()> {
        for statement in CACHE_SCHEMA.split(';') {
            let stmt = statement.trim();
            if stmt.is_empty() {
                continue;
            }
            sqlx::query(stmt).execute(&self.pool).await.map_err(|e| {
                AppError::DatabaseError(format!("Failed to apply cache schema statement: {e}"))
            })?;
        }
        Ok(())
    }
}

fn db_path_to_url(db_path: &Path) -> Result<String> {
    let db_path_str = db_path.to_str().ok_or_else(|| {
        AppError::InputError("Cache database path is not valid UTF-8".to_string())
    })?;
    Ok(format!("sqlite://{}", db_path_str.replace('\\', "/")))
}

fn parse_namespace(value: &str) -> Option<ArtifactNamespace> {
    ArtifactNamespace::ALL
        .into_iter()
        .find(|namespace| namespace.as_str() == value)
}

#[async_trait]
impl ArtifactCache for SqliteArtifactCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<ArtifactCacheEntry>> {
        let row = sqlx::query_as::<_, CacheRow>(
            "SELECT cache_key, namespace, payload, created_at FROM artifact_cache WHERE key_digest = ?",
        )
        .bind(key.digest())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to read cache entry: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let namespace = parse_namespace(&row.namespace).ok_or_else(|| {
            AppError::CacheCorruption(format!("unknown namespace '{}'", row.namespace))
        })?;
        let payload = serde_json::from_str(&row.payload).map_err(|e| {
            AppError::CacheCorruption(format!("unreadable payload for {}: {e}", row.cache_key))
        })?;
        let entry = ArtifactCacheEntry {
            key: row.cache_key,
            namespace,
            payload,
            created_at: row.created_at,
        };
        verify_entry(key, entry).map(Some)
    }

    async fn put(&self, key: &CacheKey, payload: serde_json::Value) -> Result<ArtifactCacheEntry> {
        let entry = new_entry(key, payload);
        let payload_text = serde_json::to_string(&entry.payload)
            .map_err(|e| AppError::Internal(format!("Failed to encode cache payload: {e}")))?;

        sqlx::query(
            "INSERT INTO artifact_cache (cache_key, key_digest, namespace, payload, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(cache_key) DO UPDATE SET
                payload = excluded.payload,
                created_at = excluded.created_at",
        )
        .bind(&entry.key)
        .bind(key.digest())
        .bind(entry.namespace.as_str())
        .bind(payload_text)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to write cache entry: {e}")))?;

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ticket::TicketId;
    use serde_json::json;

    #[tokio::test]
    async fn test_sqlite_cache_upserts() {
        let cache = SqliteArtifactCache::in_memory().await.unwrap();
        let key = CacheKey::code(&TicketId::parse("PROJ-2").unwrap(), "TC-03", None);

        assert!(cache.get(&key).await.unwrap().is_none());
        cache.put(&key, json!({"attempt": 1})).await.unwrap();
        cache.put(&key, json!({"attempt": 2})).await.unwrap();

        let entry = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(entry.payload, json!({"attempt": 2}));
        assert_eq!(entry.namespace, ArtifactNamespace::GeneratedCode);
        assert_eq!(entry.key, "generated-code:PROJ-2:TC-03");
    }

    #[tokio::test]
    async fn test_sqlite_cache_flags_unreadable_payload() {
        let cache = SqliteArtifactCache::in_memory().await.unwrap();
        let key = CacheKey::test_cases(&TicketId::parse("PROJ-4").unwrap());
        cache.put(&key, json!([])).await.unwrap();
        sqlx::query("UPDATE artifact_cache SET payload = '{broken'")
            .execute(&cache.pool)
            .await
            .unwrap();

        assert!(matches!(
            cache.get(&key).await,
            Err(AppError::CacheCorruption(_))
        ));
    }
}
