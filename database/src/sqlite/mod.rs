//! SQLite-backed implementations of every repository trait in
//! [`task_core::repository`], one module per aggregate.

mod branch;
mod context;
mod delegation;
mod label;
mod project;
mod subtask;
mod task;
mod task_dependency;

pub use branch::SqliteBranchRepository;
pub use context::{SqliteBranchContextRepository, SqliteGlobalContextRepository, SqliteProjectContextRepository, SqliteTaskContextRepository};
pub use delegation::SqliteDelegationRepository;
pub use label::SqliteLabelRepository;
pub use project::SqliteProjectRepository;
pub use subtask::SqliteSubtaskRepository;
pub use task::SqliteTaskRepository;
pub use task_dependency::SqliteTaskDependencyRepository;

use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};
use task_core::error::{OrchestratorError, Result};

/// Shared connection pool, handed to every per-aggregate repository struct.
/// Mirrors the original single-repository crate's connect/migrate split,
/// generalized to fan out to many repository structs over one pool.
#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db_url = if database_url.starts_with(":memory:") {
            database_url.to_string()
        } else if database_url.starts_with("sqlite://") {
            database_url.to_string()
        } else {
            format!("sqlite://{database_url}")
        };

        if !db_url.contains(":memory:") && !Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            Sqlite::create_database(&db_url)
                .await
                .map_err(|e| OrchestratorError::Database(format!("failed to create database: {e}")))?;
        }

        let connect_options = if db_url.contains(":memory:") {
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(&db_url)
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Memory)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
        } else {
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(db_url.replace("sqlite://", ""))
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
        };

        let pool = SqlitePool::connect_with(connect_options)
            .await
            .map_err(|e| OrchestratorError::Database(e.to_string()))?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/sqlite")
            .run(&self.pool)
            .await
            .map_err(|e| OrchestratorError::Database(format!("migration failed: {e}")))?;
        tracing::info!("database migrations completed successfully");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| OrchestratorError::Database(e.to_string()))?;
        Ok(())
    }
}
