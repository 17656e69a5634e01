//! HTTP entry point for the context-and-task orchestration engine.
//!
//! Wires [`config`]'s layered configuration, [`setup`]'s repository/service
//! construction, and [`routes`]'s axum router together into the binary in
//! `main.rs`.

pub mod config;
pub mod routes;
pub mod setup;
pub mod telemetry;

pub use config::Config;
pub use routes::AppState;
pub use setup::{build_router, ensure_database_directory, ensure_database_directory_from_config, initialize_app};
pub use telemetry::init_telemetry;
