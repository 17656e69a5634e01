//! End-to-end coverage of the `/mcp/manage_*` surface (§6): binds the real
//! router to an ephemeral port and drives it with `reqwest`, the way the
//! teacher's own MCP integration tests talked to a live server.

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use mcp_server::config::Config;
use mcp_server::setup::{build_router, initialize_app};
use reqwest::StatusCode;
use serde_json::{json, Value};

const JWT_SECRET: &str = "dev-secret-change-me";

fn bearer_for(user_id: &str) -> String {
    let claims = json!({
        "sub": user_id,
        "exp": (Utc::now() + Duration::hours(1)).timestamp(),
        "roles": ["agent"],
    });
    let token = encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap();
    format!("Bearer {token}")
}

/// Spawns the app on a loopback ephemeral port and returns its base URL.
/// The server task is detached; it dies with the test process.
async fn spawn_server() -> String {
    let mut config = Config::default();
    config.database.url = Some(":memory:".to_string());
    config.auth.jwt_secret = JWT_SECRET.to_string();

    let state = initialize_app(&config).await.expect("app initializes against in-memory db");
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{addr}")
}

async fn post_command(client: &reqwest::Client, base_url: &str, route: &str, token: &str, action: &str, params: Value) -> (StatusCode, Value) {
    let response = client
        .post(format!("{base_url}{route}"))
        .header("authorization", token)
        .json(&json!({ "action": action, "params": params }))
        .send()
        .await
        .unwrap();
    let status = response.status();
    let body: Value = response.json().await.unwrap();
    (status, body)
}

#[tokio::test]
async fn health_check_responds_ok() {
    let base_url = spawn_server().await;
    let response = reqwest::get(format!("{base_url}/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unauthenticated_request_is_rejected() {
    let base_url = spawn_server().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base_url}/mcp/manage_project"))
        .json(&json!({ "action": "list", "params": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn project_branch_task_lifecycle() {
    let base_url = spawn_server().await;
    let client = reqwest::Client::new();
    let token = bearer_for("user-1");

    let (status, project) = post_command(&client, &base_url, "/mcp/manage_project", &token, "create", json!({ "name": "Orchestrator" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(project["success"], json!(true));
    let project_id = project["data"]["id"].as_str().unwrap().to_string();

    let (status, branch) = post_command(
        &client,
        &base_url,
        "/mcp/manage_branch",
        &token,
        "create",
        json!({ "project_id": project_id, "name": "main" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let branch_id = branch["data"]["id"].as_str().unwrap().to_string();

    let (status, task) = post_command(
        &client,
        &base_url,
        "/mcp/manage_task",
        &token,
        "create",
        json!({ "branch_id": branch_id, "title": "Implement thing", "priority": "high" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let task_id = task["data"]["id"].as_str().unwrap().to_string();

    let (status, fetched) = post_command(&client, &base_url, "/mcp/manage_task", &token, "get", json!({ "id": task_id })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["data"]["title"], json!("Implement thing"));

    let (status, rejected) = post_command(&client, &base_url, "/mcp/manage_task", &token, "complete", json!({ "id": task_id })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["success"], json!(false));
    assert_eq!(rejected["error"]["code"], json!("INVALID_TRANSITION"));
}

#[tokio::test]
async fn task_not_found_reports_not_found_code() {
    let base_url = spawn_server().await;
    let client = reqwest::Client::new();
    let token = bearer_for("user-1");
    let missing_id = uuid::Uuid::new_v4().to_string();

    let (status, body) = post_command(&client, &base_url, "/mcp/manage_task", &token, "get", json!({ "id": missing_id })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["code"], json!("NOT_FOUND"));
}

#[tokio::test]
async fn cross_user_isolation_on_get() {
    let base_url = spawn_server().await;
    let client = reqwest::Client::new();
    let owner_token = bearer_for("owner");
    let other_token = bearer_for("intruder");

    let (_, project) = post_command(&client, &base_url, "/mcp/manage_project", &owner_token, "create", json!({ "name": "Private" })).await;
    let project_id = project["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = post_command(&client, &base_url, "/mcp/manage_project", &other_token, "get", json!({ "id": project_id })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["code"], json!("NOT_FOUND"));
}

#[tokio::test]
async fn unknown_action_is_rejected_as_validation_error() {
    let base_url = spawn_server().await;
    let client = reqwest::Client::new();
    let token = bearer_for("user-1");
    let (status, body) = post_command(&client, &base_url, "/mcp/manage_project", &token, "teleport", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));
}

#[tokio::test]
async fn missing_required_field_reports_validation_error() {
    let base_url = spawn_server().await;
    let client = reqwest::Client::new();
    let token = bearer_for("user-1");
    let (status, body) = post_command(&client, &base_url, "/mcp/manage_project", &token, "create", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));
}
