use std::sync::Arc;

use anyhow::{Context, Result};
use database::{
    Db, SqliteBranchContextRepository, SqliteBranchRepository, SqliteDelegationRepository,
    SqliteGlobalContextRepository, SqliteLabelRepository, SqliteProjectContextRepository,
    SqliteProjectRepository, SqliteSubtaskRepository, SqliteTaskContextRepository,
    SqliteTaskDependencyRepository, SqliteTaskRepository,
};
use mcp_protocol::auth::{IdentityGate, JwtVerifier, StaticKeyJwtVerifier};
use mcp_protocol::dispatcher::Dispatcher;
use mcp_protocol::fanout::FanoutRegistry;
use mcp_protocol::response::ResponseOptimizer;
use task_core::cache::CacheLayer;
use task_core::context_service::ContextService;
use task_core::enforcement::Enforcer;
use task_core::task_service::TaskService;
use tracing::info;

use crate::config::Config;
use crate::routes::{router, AppState};

/// Connects the pool and runs migrations. Mirrors the teacher's
/// `create_repository`/`migrate` split, generalized to the one `Db` that
/// every per-aggregate repository struct below shares.
pub async fn connect_database(config: &Config) -> Result<Db> {
    let database_url = config.database_url();
    info!(database_url = %database_url, "connecting to database");

    let db = Db::connect(&database_url)
        .await
        .context("failed to connect to database")?;

    info!("running database migrations");
    db.migrate().await.context("failed to run database migrations")?;

    Ok(db)
}

/// Wires every repository, the core services, the dispatcher, the identity
/// gate, and the fan-out registry into the axum router. Kept as one
/// function, as the teacher's `initialize_app` composes repository +
/// server in one place.
pub async fn initialize_app(config: &Config) -> Result<AppState> {
    let db = connect_database(config).await?;

    let projects: Arc<dyn task_core::repository::ProjectRepository> =
        Arc::new(SqliteProjectRepository::new(db.clone()));
    let branches: Arc<dyn task_core::repository::BranchRepository> =
        Arc::new(SqliteBranchRepository::new(db.clone()));
    let tasks_repo: Arc<dyn task_core::repository::TaskRepository> =
        Arc::new(SqliteTaskRepository::new(db.clone()));
    let subtasks: Arc<dyn task_core::repository::SubtaskRepository> =
        Arc::new(SqliteSubtaskRepository::new(db.clone()));
    let dependencies: Arc<dyn task_core::repository::TaskDependencyRepository> =
        Arc::new(SqliteTaskDependencyRepository::new(db.clone()));
    let global_contexts: Arc<dyn task_core::repository::GlobalContextRepository> =
        Arc::new(SqliteGlobalContextRepository::new(db.clone()));
    let project_contexts: Arc<dyn task_core::repository::ProjectContextRepository> =
        Arc::new(SqliteProjectContextRepository::new(db.clone()));
    let branch_contexts: Arc<dyn task_core::repository::BranchContextRepository> =
        Arc::new(SqliteBranchContextRepository::new(db.clone()));
    let task_contexts: Arc<dyn task_core::repository::TaskContextRepository> =
        Arc::new(SqliteTaskContextRepository::new(db.clone()));
    let delegations: Arc<dyn task_core::repository::DelegationRepository> =
        Arc::new(SqliteDelegationRepository::new(db.clone()));
    let labels: Arc<dyn task_core::repository::LabelRepository> =
        Arc::new(SqliteLabelRepository::new(db.clone()));

    let cache = Arc::new(CacheLayer::new(config.cache.context_ttl_seconds));

    let contexts = Arc::new(ContextService::new(
        global_contexts,
        project_contexts,
        branch_contexts,
        task_contexts,
        delegations,
        branches.clone(),
        tasks_repo.clone(),
        cache,
    ));

    let task_service = Arc::new(TaskService::new(
        tasks_repo,
        subtasks.clone(),
        dependencies,
        contexts.clone(),
        None,
    ));

    let enforcement_level = config.enforcement.parameter_enforcement_level;
    let enforcer = Arc::new(Enforcer::new(enforcement_level));
    let optimizer = Arc::new(ResponseOptimizer::new(config.response.enable_response_optimization));
    let fanout = Arc::new(FanoutRegistry::new());

    let dispatcher = Arc::new(Dispatcher::new(
        projects,
        branches,
        subtasks,
        task_service,
        contexts,
        enforcer,
        optimizer,
        fanout.clone(),
        labels,
    ));

    let verifier: Arc<dyn JwtVerifier> = Arc::new(StaticKeyJwtVerifier::new(&config.auth.jwt_secret));
    let identity = Arc::new(IdentityGate::new(verifier));

    info!("application initialized successfully");
    Ok(AppState { dispatcher, identity, fanout })
}

/// Ensure the database directory exists using config
pub fn ensure_database_directory_from_config(config: &Config) -> Result<()> {
    let database_url = config.database_url();
    ensure_database_directory(&database_url)
}

/// Ensure the database directory exists
pub fn ensure_database_directory(database_url: &str) -> Result<()> {
    if let Some(db_path) = database_url.strip_prefix("sqlite://") {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                info!("creating database directory: {}", parent.display());
                std::fs::create_dir_all(parent).context("failed to create database directory")?;
            }
        }
    }
    Ok(())
}

pub fn build_router(state: AppState) -> axum::Router {
    router(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn initialize_app_against_in_memory_database() {
        let mut config = Config::default();
        config.database.url = Some(":memory:".to_string());

        let state = initialize_app(&config).await.unwrap();
        let _ = build_router(state);
    }

    #[test]
    fn ensure_database_directory_creates_missing_parent() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");
        let database_url = format!("sqlite://{}", db_path.display());

        ensure_database_directory(&database_url).unwrap();
        assert!(db_path.parent().unwrap().exists());
    }
}
