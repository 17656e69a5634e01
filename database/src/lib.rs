//! SQLite persistence for the context-and-task orchestration engine.
//!
//! One repository struct per aggregate, all sharing one [`sqlite::Db`]
//! connection pool. Every query is scoped by the caller's `owner_user_id`
//! except the Global Context table, which is keyed directly by `user_id`.
//!
//! # Usage
//!
//! ```rust,no_run
//! use database::{Db, SqliteTaskRepository};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Db::connect(":memory:").await?;
//! db.migrate().await?;
//! let tasks = SqliteTaskRepository::new(db.clone());
//! let _ = tasks;
//! # Ok(())
//! # }
//! ```

mod common;
mod sqlite;

pub use sqlite::{
    Db, SqliteBranchContextRepository, SqliteBranchRepository, SqliteDelegationRepository,
    SqliteGlobalContextRepository, SqliteLabelRepository, SqliteProjectContextRepository,
    SqliteProjectRepository, SqliteSubtaskRepository, SqliteTaskContextRepository,
    SqliteTaskDependencyRepository, SqliteTaskRepository,
};

pub use task_core::error::{OrchestratorError, Result};
pub use task_core::repository::*;
