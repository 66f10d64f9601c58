use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use database::SqliteCoordStore;
use file_coordinator::{FileAccessManager, DEFAULT_SWEEP_AGE_HOURS};
use llm_gateway::{LlmClient, LlmConfig, OpenAiBackend};
use orchestrator::{ArtifactWriter, Auditor, WorkflowManager};
use rest_api::{ApiServer, ReadyTaskCache};

use crate::config::Config;

/// Interval between file-lock expiry sweeps
const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// The assembled application: HTTP server plus the shared stores the
/// background jobs run against.
pub struct App {
    pub server: ApiServer<SqliteCoordStore>,
    pub store: SqliteCoordStore,
    pub locks: Arc<FileAccessManager>,
}

/// Construct the dependency container: database pool, migrations, LLM
/// gateway, file coordinator, workflow manager, and HTTP server. Exits
/// with an error when the database is unreachable.
pub async fn initialize_app(config: &Config) -> Result<App> {
    let store = SqliteCoordStore::new(&config.database_url())
        .await
        .context("Database unreachable")?;
    store.migrate().await.context("Migration failed")?;

    let mut llm_config = LlmConfig::new(
        config.llm.api_key.clone().unwrap_or_default(),
        config.llm.model.clone(),
    );
    llm_config.max_tokens = config.llm.max_tokens;
    llm_config.temperature = config.llm.temperature;
    llm_config.timeout = Duration::from_secs(config.llm.timeout_seconds);

    // A missing API key degrades planning to the fallback workflow rather
    // than blocking startup
    let backend = OpenAiBackend::new(llm_config.clone()).unwrap_or_else(|error| {
        tracing::warn!(%error, "LLM gateway misconfigured; planning will use fallback workflows");
        OpenAiBackend::new(LlmConfig::new("unconfigured", config.llm.model.clone()))
            .expect("placeholder gateway config is valid")
    });
    let llm = Arc::new(LlmClient::new(
        Arc::new(backend),
        config.llm.max_retries,
        Duration::from_secs(config.llm.retry_delay_seconds),
    ));

    let locks = Arc::new(FileAccessManager::with_store(Arc::new(store.clone())));
    let artifacts = ArtifactWriter::new(&config.projects.root, Arc::clone(&locks));
    let manager = WorkflowManager::new(
        Arc::new(store.clone()),
        llm,
        Auditor::new(),
        artifacts,
    );

    let cache = ReadyTaskCache::new(config.cache.redis_url.as_deref());
    let server = ApiServer::new(manager, config.server.api_token.clone(), cache);

    Ok(App {
        server,
        store,
        locks,
    })
}

/// Periodic sweep recovering locks abandoned by crashed holders: expired
/// database records flip inactive and stale registry entries are pruned.
pub fn spawn_lock_sweeper(
    store: SqliteCoordStore,
    locks: Arc<FileAccessManager>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;

            use cortex_core::repository::FileLockStore;
            match store.cleanup_expired_file_locks().await {
                Ok(swept) if swept > 0 => {
                    tracing::info!(swept, "Swept expired file-lock records")
                }
                Ok(_) => {}
                Err(error) => tracing::warn!(%error, "File-lock sweep failed"),
            }

            locks.sweep_registry(chrono::Duration::hours(DEFAULT_SWEEP_AGE_HOURS));
        }
    })
}

/// Ensure the directory holding a file-backed database exists.
pub fn ensure_database_directory(config: &Config) -> Result<()> {
    let url = config.database_url();
    let path = url.trim_start_matches("sqlite://");
    if path.contains(":memory:") {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {parent:?}"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_app_with_temp_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.url = Some(format!(
            "sqlite://{}",
            dir.path().join("cortex.sqlite").display()
        ));
        config.server.api_token = "secret".to_string();
        config.projects.root = dir.path().join("projects").display().to_string();

        let app = initialize_app(&config).await.unwrap();
        use cortex_core::repository::CoordRepository;
        app.store.health_check().await.unwrap();
    }

    #[test]
    fn test_ensure_database_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.url = Some(format!(
            "sqlite://{}",
            dir.path().join("nested").join("cortex.sqlite").display()
        ));

        ensure_database_directory(&config).unwrap();
        assert!(dir.path().join("nested").is_dir());
    }
}
