//! Scout HTTP 接口
//!
//! 启动: cargo run --bin scout-web --features web
//! POST /api/chat 以纯文本流返回回复片段，会话 ID 在响应头 X-Session-Id 中。

#![cfg(feature = "web")]

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures_util::stream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use scout::config::load_config;
use scout::core::{AgentBuilder, AgentError, ChatRequest, Orchestrator};
use scout::prompt::RuntimeFlags;
use scout::session::{Message, ReplayMessage, SessionSummary};

const OWNER_HEADER: &str = "x-user-id";
const SESSION_HEADER: &str = "x-session-id";
const ANONYMOUS: &str = "anonymous";

struct AppState {
    orchestrator: Arc<Orchestrator>,
}

/// 聊天请求体；`message` 为单条用户消息的简写
#[derive(Debug, Deserialize)]
struct ChatBody {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    message: Option<String>,
    #[serde(flatten)]
    flags: RuntimeFlags,
}

#[derive(Serialize)]
struct SessionsResponse {
    sessions: Vec<SessionSummary>,
}

#[derive(Serialize)]
struct HistoryResponse {
    session_id: String,
    messages: Vec<ReplayMessage>,
}

type ApiError = (StatusCode, String);

fn owner_of(headers: &HeaderMap) -> String {
    headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(ANONYMOUS)
        .to_string()
}

fn status_of(err: &AgentError) -> StatusCode {
    match err {
        AgentError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        e if e.is_caller_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(err: AgentError) -> ApiError {
    let status = status_of(&err);
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }
    (status, err.to_string())
}

/// 流式聊天：按片段写出纯文本，回合在客户端断开后仍会完成并落盘
async fn api_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ChatBody>,
) -> Result<Response, ApiError> {
    let mut messages = body.messages;
    if let Some(text) = body.message.filter(|t| !t.trim().is_empty()) {
        messages.push(Message::user(text));
    }
    let request = ChatRequest {
        session_id: body.session_id.filter(|s| !s.is_empty()),
        owner_id: owner_of(&headers),
        messages,
        flags: body.flags,
    };

    let handle = state.orchestrator.start_turn(request).map_err(api_error)?;
    let session_id = handle.session_id.clone();
    let done = handle.done;
    tokio::spawn(async move {
        match done.await {
            Ok(Ok(outcome)) => tracing::debug!(
                session = %outcome.session_id,
                rounds = outcome.tool_rounds,
                "turn finished"
            ),
            Ok(Err(e)) => tracing::warn!(error = %e, "turn failed"),
            Err(e) => tracing::error!(error = %e, "turn task panicked"),
        }
    });

    type BoxErr = Box<dyn std::error::Error + Send + Sync>;
    let stream = stream::unfold(handle.fragments, |mut rx| async move {
        rx.recv()
            .await
            .map(|fragment| (Ok::<Bytes, BoxErr>(Bytes::from(fragment)), rx))
    });
    let mut res = Response::new(Body::from_stream(stream));
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    if let Ok(v) = HeaderValue::from_str(&session_id) {
        res.headers_mut().insert(SESSION_HEADER, v);
    }
    Ok(res)
}

/// 当前用户的会话列表（最近更新在前）
async fn api_sessions_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SessionsResponse>, ApiError> {
    let sessions = state
        .orchestrator
        .store()
        .list(&owner_of(&headers))
        .await
        .map_err(api_error)?;
    Ok(Json(SessionsResponse { sessions }))
}

/// 会话回放：只含用户可见的 user / assistant 消息
async fn api_session_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let store = state.orchestrator.store();
    let lock = store.lock(&session_id).await;
    let messages = store
        .replay(&lock, &owner_of(&headers))
        .await
        .map_err(api_error)?;
    Ok(Json(HistoryResponse {
        session_id,
        messages,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    scout::observability::init();

    let config_path = std::env::var("SCOUT_CONFIG").ok().map(PathBuf::from);
    let cfg = load_config(config_path)?;
    let bind = std::env::var("SCOUT_BIND").unwrap_or_else(|_| cfg.server.bind.clone());
    let orchestrator = AgentBuilder::new(cfg).build().await?;

    let state = Arc::new(AppState { orchestrator });
    let app = Router::new()
        .route("/api/chat", post(api_chat))
        .route("/api/sessions", get(api_sessions_list))
        .route("/api/sessions/:id", get(api_session_history))
        .route("/api/health", get(|| async { "OK" }))
        .with_state(state);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            tracing::info!("Received Ctrl+C, shutting down");
            signal.cancel();
        }
    });

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("Scout API: http://{}", bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}
