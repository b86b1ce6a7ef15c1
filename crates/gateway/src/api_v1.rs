//! The `/v1` API.
//!
//! Endpoints:
//! - `POST /v1/chat/completions` — OpenAI-compatible completions, streamed or buffered
//! - `GET  /v1/tools` — local tools plus every active capability server's
//! - `GET  /v1/capability-servers-list` — the caller's servers, then the defaults
//! - `POST /v1/capability-servers-update` — replace the caller's servers
//!
//! Every route requires `Authorization: Bearer <token>`. Failures use the
//! `{error: {message, type, code}}` envelope.

use axum::{
    Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{error, info};

use chatgate_core::{AuthItem, CapabilityServer, ChatPost, ToolDefinition};
use chatgate_pipeline::{CompletionOutput, PipelineError};

use crate::SharedState;

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerItem {
    pub address: String,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

fn active_by_default() -> bool {
    true
}

impl From<CapabilityServer> for ServerItem {
    fn from(server: CapabilityServer) -> Self {
        Self {
            address: server.address,
            is_active: server.is_active,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServersListResponse {
    pub servers: Vec<ServerItem>,
}

#[derive(Debug, Deserialize)]
pub struct ServersUpdateRequest {
    pub servers: Vec<ServerItem>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServersUpdateResponse {
    pub status: String,
    pub message: String,
    pub servers: Vec<ServerItem>,
}

/// Build the v1 router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat/completions", post(chat_completions_handler))
        .route("/tools", get(tools_handler))
        .route("/capability-servers-list", get(servers_list_handler))
        .route("/capability-servers-update", post(servers_update_handler))
        .with_state(state)
}

// ── Errors ────────────────────────────────────────────────────────────────

fn error_response(status: StatusCode, message: impl Into<String>, kind: &str, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: ErrorDetail {
                message: message.into(),
                r#type: kind.to_string(),
                code: code.to_string(),
            },
        }),
    )
}

fn auth_error() -> ApiError {
    error_response(
        StatusCode::UNAUTHORIZED,
        "Invalid authentication",
        "invalid_request_error",
        "invalid_api_key",
    )
}

fn pipeline_error(err: PipelineError) -> ApiError {
    match err {
        PipelineError::Unauthenticated => auth_error(),
        PipelineError::InvalidRequest(message) => error_response(
            StatusCode::BAD_REQUEST,
            message,
            "invalid_request_error",
            "invalid_body",
        ),
        PipelineError::Upstream(e) => {
            error!(error = %e, "Upstream request failed");
            error_response(
                StatusCode::BAD_GATEWAY,
                format!("Upstream request failed: {e}"),
                "upstream_error",
                "upstream_unreachable",
            )
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

async fn authenticate(state: &SharedState, headers: &HeaderMap) -> Result<AuthItem, ApiError> {
    state
        .pipeline
        .authenticate(authorization(headers))
        .await
        .map_err(pipeline_error)
}

/// Parse a JSON body, answering with the envelope instead of axum's
/// plain-text rejection.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            format!("Invalid request body: {e}"),
            "invalid_request_error",
            "invalid_body",
        )
    })
}

fn completion_response(output: CompletionOutput) -> Response {
    match output {
        CompletionOutput::Buffered { body } => Json(body).into_response(),
        CompletionOutput::Stream { content_type, body } => (
            [(header::CONTENT_TYPE, content_type)],
            Body::from_stream(body),
        )
            .into_response(),
        CompletionOutput::Passthrough {
            status,
            content_type,
            body,
        } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            let mut response = (status, body).into_response();
            if let Some(value) = content_type.and_then(|ct| HeaderValue::from_str(&ct).ok()) {
                response.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            response
        }
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn chat_completions_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let post: ChatPost = parse_body(&body)?;

    info!(
        user_id = user.user_id,
        model = %post.model,
        stream = post.stream,
        messages = post.messages.len(),
        "v1/chat/completions request"
    );

    let output = state
        .pipeline
        .complete(&user, authorization(&headers), post)
        .await
        .map_err(pipeline_error)?;
    Ok(completion_response(output))
}

async fn tools_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<ToolsResponse>, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let tools = state.pipeline.available_tools(&user).await;
    Ok(Json(ToolsResponse { tools }))
}

async fn servers_list_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<ServersListResponse>, ApiError> {
    let user = authenticate(&state, &headers).await?;

    let servers = state
        .pipeline
        .directory()
        .listing(user.user_id)
        .await
        .map_err(|e| {
            error!(user_id = user.user_id, error = %e, "Error retrieving capability servers");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("An error occurred while retrieving servers: {e}"),
                "caps_error",
                "servers_retrieval_failed",
            )
        })?;

    Ok(Json(ServersListResponse {
        servers: servers.into_iter().map(ServerItem::from).collect(),
    }))
}

async fn servers_update_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ServersUpdateResponse>, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let request: ServersUpdateRequest = parse_body(&body)?;

    let entries: Vec<(String, bool)> = request
        .servers
        .into_iter()
        .map(|s| (s.address, s.is_active))
        .collect();

    let servers = state
        .pipeline
        .directory()
        .replace(user.user_id, &entries)
        .await
        .map_err(|e| {
            error!(user_id = user.user_id, error = %e, "Error updating capability servers");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to update servers: {e}"),
                "caps_error",
                "servers_update_failed",
            )
        })?;

    info!(user_id = user.user_id, servers = servers.len(), "Capability servers updated");
    Ok(Json(ServersUpdateResponse {
        status: "success".into(),
        message: "Servers updated successfully".into(),
        servers: servers.into_iter().map(ServerItem::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedUpstream, TOKEN, state_with, test_state};
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use tower::ServiceExt;

    fn chat_request(auth: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/chat/completions")
            .header("Content-Type", "application/json");
        if let Some(auth) = auth {
            builder = builder.header("Authorization", auth);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn ping_turn(stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": "gpt-4o",
            "stream": stream,
            "messages": [
                {"role": "user", "content": "ping please"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "call_1", "type": "function",
                     "function": {"name": "ping_pong", "arguments": "{\"message\": \"ping\"}"}}
                ]}
            ]
        })
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn missing_token_is_rejected_with_envelope() {
        let app = v1_router(test_state());
        let response = app.oneshot(chat_request(None, ping_turn(false))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "Invalid authentication");
        assert_eq!(json["error"]["type"], "invalid_request_error");
        assert_eq!(json["error"]["code"], "invalid_api_key");
    }

    #[tokio::test]
    async fn unknown_token_never_reaches_upstream() {
        let upstream = Arc::new(ScriptedUpstream::ok(vec!["{}"], "application/json"));
        let app = v1_router(state_with(upstream.clone()));

        let response = app
            .oneshot(chat_request(Some("Bearer stolen"), ping_turn(false)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(upstream.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let app = v1_router(test_state());
        let req = Request::builder()
            .method("POST")
            .uri("/chat/completions")
            .header("Authorization", TOKEN)
            .body(Body::from("{not json"))
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "invalid_body");
    }

    #[tokio::test]
    async fn out_of_range_temperature_is_bad_request() {
        let app = v1_router(test_state());
        let body = serde_json::json!({
            "model": "gpt-4o",
            "temperature": 9.0,
            "messages": [{"role": "user", "content": "hi"}]
        });

        let response = app.oneshot(chat_request(Some(TOKEN), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"]["message"].as_str().unwrap().contains("temperature"));
    }

    #[tokio::test]
    async fn buffered_completion_carries_tool_results() {
        let upstream = Arc::new(ScriptedUpstream::ok(
            vec![r#"{"id":"chatcmpl-9","object":"chat.completion","choices":[]}"#],
            "application/json",
        ));
        let app = v1_router(state_with(upstream.clone()));

        let response = app
            .oneshot(chat_request(Some(TOKEN), ping_turn(false)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["id"], "chatcmpl-9");
        assert_eq!(json["tool_res_messages"][0]["role"], "tool");
        assert_eq!(json["tool_res_messages"][0]["tool_call_id"], "call_1");
        assert_eq!(json["tool_res_messages"][0]["content"], "pong");

        let seen = upstream.seen.lock().unwrap();
        let forwarded = seen[0].messages.last().unwrap();
        assert_eq!(forwarded.tool_call_id(), Some("call_1"));
    }

    #[tokio::test]
    async fn streamed_completion_leads_with_tool_results_frame() {
        let upstream = Arc::new(ScriptedUpstream::ok(
            vec!["data: {\"choices\":[]}\n\n", "data: [DONE]\n\n"],
            "text/event-stream",
        ));
        let app = v1_router(state_with(upstream));

        let response = app
            .oneshot(chat_request(Some(TOKEN), ping_turn(true)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        let frames: Vec<&str> = text.split("\n\n").filter(|f| !f.is_empty()).collect();
        assert_eq!(frames.len(), 3);

        let first: serde_json::Value =
            serde_json::from_str(frames[0].strip_prefix("data: ").unwrap()).unwrap();
        assert_eq!(first["object"], "tool_res_messages");
        assert_eq!(first["model"], "gpt-4o");
        assert_eq!(first["tool_res_messages"][0]["content"], "pong");
        assert_eq!(frames[2], "data: [DONE]");
    }

    #[tokio::test]
    async fn null_stream_is_served_buffered() {
        let mut body = ping_turn(false);
        body["stream"] = serde_json::Value::Null;
        let response = v1_router(test_state())
            .oneshot(chat_request(Some(TOKEN), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["id"], "chatcmpl-1");
        assert_eq!(json["tool_res_messages"][0]["content"], "pong");
    }

    #[tokio::test]
    async fn client_disconnect_releases_upstream_stream() {
        let upstream = Arc::new(ScriptedUpstream {
            hold_open: true,
            ..ScriptedUpstream::ok(vec!["data: {\"choices\":[]}\n\n"], "text/event-stream")
        });
        let released = upstream.released.clone();
        let app = v1_router(state_with(upstream));

        let response = app
            .oneshot(chat_request(Some(TOKEN), ping_turn(true)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut body = response.into_body();
        let first = body.frame().await.unwrap().unwrap().into_data().unwrap();
        assert!(String::from_utf8_lossy(&first).contains("tool_res_messages"));
        assert!(!released.load(Ordering::SeqCst));

        drop(body);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn upstream_error_status_passes_through() {
        let upstream = Arc::new(ScriptedUpstream {
            status: 429,
            ..ScriptedUpstream::ok(
                vec![r#"{"error":{"message":"slow down"}}"#],
                "application/json",
            )
        });
        let app = v1_router(state_with(upstream));

        let response = app
            .oneshot(chat_request(Some(TOKEN), ping_turn(false)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "slow down");
        assert!(json.get("tool_res_messages").is_none());
    }

    #[tokio::test]
    async fn unreachable_upstream_is_bad_gateway() {
        let upstream = Arc::new(ScriptedUpstream {
            unreachable: true,
            ..ScriptedUpstream::ok(vec![], "application/json")
        });
        let app = v1_router(state_with(upstream));

        let response = app
            .oneshot(chat_request(Some(TOKEN), ping_turn(true)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "upstream_error");
        assert_eq!(json["error"]["code"], "upstream_unreachable");
    }

    #[tokio::test]
    async fn tools_lists_local_tools() {
        let app = v1_router(test_state());
        let req = Request::builder()
            .uri("/tools")
            .header("Authorization", TOKEN)
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: ToolsResponse = serde_json::from_value(body_json(response).await).unwrap();
        assert!(json.tools.iter().any(|t| t.function.name == "ping_pong"));
        assert!(json.tools.iter().all(|t| t.r#type == "function"));
    }

    #[tokio::test]
    async fn tools_requires_auth() {
        let app = v1_router(test_state());
        let req = Request::builder().uri("/tools").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn update_then_list_capability_servers() {
        let state = test_state();

        let req = Request::builder()
            .method("POST")
            .uri("/capability-servers-update")
            .header("Authorization", TOKEN)
            .body(Body::from(
                serde_json::json!({
                    "servers": [
                        {"address": "http://caps.local/", "is_active": true},
                        {"address": "http://other.local/v1", "is_active": false}
                    ]
                })
                .to_string(),
            ))
            .unwrap();
        let response = v1_router(state.clone()).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let updated: ServersUpdateResponse =
            serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(updated.status, "success");
        assert_eq!(
            updated.servers,
            vec![
                ServerItem {
                    address: "http://caps.local/v1".into(),
                    is_active: true
                },
                ServerItem {
                    address: "http://other.local/v1".into(),
                    is_active: false
                },
            ]
        );

        let req = Request::builder()
            .uri("/capability-servers-list")
            .header("Authorization", TOKEN)
            .body(Body::empty())
            .unwrap();
        let response = v1_router(state).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let listed: ServersListResponse =
            serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(listed.servers, updated.servers);
    }

    #[tokio::test]
    async fn update_without_is_active_defaults_to_active() {
        let req = Request::builder()
            .method("POST")
            .uri("/capability-servers-update")
            .header("Authorization", TOKEN)
            .body(Body::from(r#"{"servers": [{"address": "http://caps"}]}"#))
            .unwrap();
        let response = v1_router(test_state()).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let updated: ServersUpdateResponse =
            serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(
            updated.servers,
            vec![ServerItem {
                address: "http://caps/v1".into(),
                is_active: true
            }]
        );
    }

    #[tokio::test]
    async fn update_with_bad_body_is_bad_request() {
        let req = Request::builder()
            .method("POST")
            .uri("/capability-servers-update")
            .header("Authorization", TOKEN)
            .body(Body::from(r#"{"servers": "nope"}"#))
            .unwrap();
        let response = v1_router(test_state()).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
