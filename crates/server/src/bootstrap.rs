use std::sync::Arc;

use ordesk_agent::{llm::HttpLlmClient, runtime::AgentRuntime, tools::OrderToolbox, LlmError};
use ordesk_core::audit::TracingAuditSink;
use ordesk_core::config::{AppConfig, ConfigError, LoadOptions};
use ordesk_db::repositories::SqlOrderRepository;
use ordesk_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub agent_runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client construction failed: {0}")]
    Llm(#[source] LlmError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let llm = HttpLlmClient::from_config(&config.llm).map_err(BootstrapError::Llm)?;
    let toolbox = OrderToolbox::new(
        Arc::new(SqlOrderRepository::new(db_pool.clone())),
        Arc::new(TracingAuditSink),
    );
    let agent_runtime =
        Arc::new(AgentRuntime::new(Arc::new(llm), Arc::new(toolbox), &config.agent));

    Ok(Application { config, db_pool, agent_runtime })
}

#[cfg(test)]
mod tests {
    use ordesk_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn memory_overrides() -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_prepares_schema_and_runtime() {
        let app = bootstrap(memory_overrides()).await.expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'orders'",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("orders table should exist after bootstrap");
        assert_eq!(table_count, 1);

        // Deterministic shortcut works without any model backend.
        let reply = app.agent_runtime.chat("boot-check", "hello").await.expect("greeting");
        assert!(reply.starts_with("Hello!"));

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_rejects_invalid_database_urls() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("postgres://localhost/orders".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let error = result.err().expect("bootstrap should fail");
        assert!(error.to_string().contains("database.url"));
    }
}
