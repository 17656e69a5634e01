//! HTTP/WebSocket surface (§6): `POST /mcp/manage_*` plus `GET /ws`, wired
//! over the `Dispatcher`/`IdentityGate`/`FanoutRegistry` built in
//! [`crate::setup`]. Generalizes the teacher's single SSE/RPC router —
//! one `Router`, one `with_state` — to six umbrella routes plus the
//! websocket upgrade.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use mcp_protocol::dispatcher::Dispatcher;
use mcp_protocol::error::ApiError;
use mcp_protocol::fanout::{FanoutRegistry, SubscriptionFilter, BACKPRESSURE_DISCONNECT_CODE, UNAUTHENTICATED_CLOSE_CODE};
use mcp_protocol::response::ResponseProfile;
use mcp_protocol::serialization::{CommandRequest, RESPONSE_FORMAT_HEADER};
use mcp_protocol::{AuthContext, IdentityGate};
use serde::Deserialize;
use serde_json::Value;
use task_core::error::OrchestratorError;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub identity: Arc<IdentityGate>,
    pub fanout: Arc<FanoutRegistry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/mcp/manage_project", post(manage_project))
        .route("/mcp/manage_branch", post(manage_branch))
        .route("/mcp/manage_task", post(manage_task))
        .route("/mcp/manage_subtask", post(manage_subtask))
        .route("/mcp/manage_context", post(manage_context))
        .route("/mcp/manage_agent", post(manage_agent))
        .route("/ws", get(ws_upgrade))
        .route("/health", get(health))
        .layer(axum::middleware::from_fn(mcp_protocol::request_logger::mcp_request_logging_middleware))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

fn authenticate(identity: &IdentityGate, headers: &HeaderMap) -> Result<AuthContext, ApiError> {
    identity.authenticate(headers).map_err(|err| {
        warn!(kind = ?err.kind, detail = %err.detail, "request rejected at the identity gate");
        ApiError(OrchestratorError::AuthRequired)
    })
}

fn profile_for(headers: &HeaderMap, agent: Option<&str>) -> ResponseProfile {
    let header = headers.get(RESPONSE_FORMAT_HEADER).and_then(|v| v.to_str().ok());
    ResponseProfile::select(header, agent.is_some())
}

macro_rules! umbrella_route {
    ($name:ident, $method:ident) => {
        async fn $name(
            State(state): State<AppState>,
            headers: HeaderMap,
            Json(body): Json<CommandRequest>,
        ) -> Result<Json<Value>, ApiError> {
            let auth = authenticate(&state.identity, &headers)?;
            let profile = profile_for(&headers, body.agent.as_deref());
            let result = state
                .dispatcher
                .$method(&auth.user_id, &body.action, body.params, profile)
                .await;
            Ok(Json(result))
        }
    };
}

umbrella_route!(manage_project, manage_project);
umbrella_route!(manage_branch, manage_branch);
umbrella_route!(manage_context, manage_context);
umbrella_route!(manage_agent, manage_agent);

async fn manage_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CommandRequest>,
) -> Result<Json<Value>, ApiError> {
    let auth = authenticate(&state.identity, &headers)?;
    let profile = profile_for(&headers, body.agent.as_deref());
    let result = state
        .dispatcher
        .manage_task(&auth.user_id, body.agent.as_deref(), &body.action, body.params, profile)
        .await;
    Ok(Json(result))
}

async fn manage_subtask(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CommandRequest>,
) -> Result<Json<Value>, ApiError> {
    let auth = authenticate(&state.identity, &headers)?;
    let profile = profile_for(&headers, body.agent.as_deref());
    let result = state
        .dispatcher
        .manage_subtask(&auth.user_id, body.agent.as_deref(), &body.action, body.params, profile)
        .await;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsClientMessage {
    Subscribe {
        #[serde(default)]
        filter: SubscriptionFilter,
    },
}

/// §6 closes an unauthenticated WS at the protocol level (code 4001) rather
/// than rejecting the HTTP upgrade, so the bearer check happens after
/// `on_upgrade` using the same headers the handshake request carried.
async fn ws_upgrade(State(state): State<AppState>, headers: HeaderMap, ws: WebSocketUpgrade) -> Response {
    let auth = authenticate(&state.identity, &headers).map(|ctx| ctx.user_id);
    ws.on_upgrade(move |socket| handle_socket(socket, state, auth))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, auth: Result<String, ApiError>) {
    let user_id = match auth {
        Ok(user_id) => user_id,
        Err(_) => {
            let _ = socket
                .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                    code: UNAUTHENTICATED_CLOSE_CODE,
                    reason: "missing or invalid bearer token".into(),
                })))
                .await;
            return;
        }
    };

    let Some(Ok(Message::Text(text))) = socket.recv().await else {
        return;
    };

    let filter = match serde_json::from_str::<WsClientMessage>(&text) {
        Ok(WsClientMessage::Subscribe { filter }) => filter,
        Err(err) => {
            warn!(error = %err, "malformed ws subscribe message");
            let _ = socket.send(Message::Text(format!("{{\"type\":\"error\",\"detail\":\"{err}\"}}"))).await;
            return;
        }
    };

    let (subscription_id, mut receiver) = state.fanout.subscribe(user_id.clone(), filter);
    info!(user_id = %user_id, subscription_id, "ws subscription established");

    loop {
        tokio::select! {
            change = receiver.recv() => {
                match change {
                    Some(message) => {
                        let payload = serde_json::to_string(&message).unwrap_or_default();
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        let _ = socket
                            .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                                code: BACKPRESSURE_DISCONNECT_CODE,
                                reason: "subscriber fell too far behind".into(),
                            })))
                            .await;
                        break;
                    }
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    state.fanout.unsubscribe(subscription_id);
}
