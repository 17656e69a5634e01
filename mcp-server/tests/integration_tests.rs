use mcp_server::config::Config;
use mcp_server::setup::{ensure_database_directory, initialize_app};
use std::env;
use tempfile::TempDir;

fn config_with_url(database_url: &str) -> Config {
    let mut config = Config::default();
    config.database.url = Some(database_url.to_string());
    config
}

#[tokio::test]
async fn test_server_startup_with_sqlite() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let database_url = format!("sqlite://{}", db_path.display());

    let config = config_with_url(&database_url);
    let state = initialize_app(&config).await;
    assert!(state.is_ok(), "Failed to initialize app: {:?}", state.err());
}

#[test]
fn test_configuration_loading() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.server.listen_addr, "127.0.0.1");
    assert_eq!(config.server.port, 3000);
}

#[test]
fn test_environment_overrides() {
    env::set_var("DATABASE_URL", "sqlite://test_env.db");
    env::set_var("LISTEN_ADDR", "0.0.0.0");
    env::set_var("LOG_LEVEL", "debug");

    let config = Config::default().merge_with_env().unwrap();

    assert_eq!(config.database.url, Some("sqlite://test_env.db".to_string()));
    assert_eq!(config.server.listen_addr, "0.0.0.0");
    assert_eq!(config.logging.level, "debug");

    env::remove_var("DATABASE_URL");
    env::remove_var("LISTEN_ADDR");
    env::remove_var("LOG_LEVEL");
}

#[test]
fn test_default_database_path_creation() {
    let config = Config::default();
    let url = config.database_url();
    assert!(url.starts_with("sqlite://"));
    assert!(url.contains(".sqlite"));
}

#[test]
fn test_database_directory_creation() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("subdir").join("test.db");
    let database_url = format!("sqlite://{}", db_path.display());

    let result = ensure_database_directory(&database_url);
    assert!(result.is_ok());
    assert!(db_path.parent().unwrap().exists());
}

#[test]
fn test_config_validation_errors() {
    let mut config = Config::default();

    config.logging.level = "invalid".to_string();
    assert!(config.validate().is_err());

    config.logging.level = "info".to_string();
    config.database.url = Some("postgres://invalid".to_string());
    assert!(config.validate().is_err());

    config.database.url = None;
    config.server.port = 0;
    assert!(config.validate().is_err());

    config.server.port = 3000;
    config.server.workers = 0;
    assert!(config.validate().is_err());

    config.server.workers = 4;
    config.database.max_connections = 0;
    assert!(config.validate().is_err());

    config.database.max_connections = 5;
    config.auth.jwt_secret = String::new();
    assert!(config.validate().is_err());
}

#[test]
fn test_server_address_formatting() {
    let mut config = Config::default();
    config.server.listen_addr = "0.0.0.0".to_string();
    config.server.port = 8080;

    assert_eq!(config.server_address(), "0.0.0.0:8080");
}

#[tokio::test]
async fn test_repository_creation_with_migrations() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("migration_test.db");
    let database_url = format!("sqlite://{}", db_path.display());

    let config = config_with_url(&database_url);
    let state = initialize_app(&config).await;
    assert!(state.is_ok());
    assert!(db_path.exists());
}

#[tokio::test]
async fn test_multiple_app_instances_share_no_state() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("multi_test.db");
    let database_url = format!("sqlite://{}", db_path.display());

    let config = config_with_url(&database_url);

    let first = initialize_app(&config).await;
    let second = initialize_app(&config).await;

    assert!(first.is_ok());
    assert!(second.is_ok());
}
