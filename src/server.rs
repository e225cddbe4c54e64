use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::bilibili::StreamerInfo;
use crate::commands::{CommandReply, CommandRouter};
use crate::monitor::Monitor;
use crate::tracker::StreamerTracker;

#[derive(Clone)]
struct AppState {
    tracker: Arc<StreamerTracker>,
    commands: Arc<CommandRouter>,
    monitor: Arc<Monitor>,
}

/// Inbound WeChat Work callback payload. Extra wire fields (createtime,
/// agentid, ...) are ignored.
#[derive(Debug, Deserialize)]
pub struct CallbackMessage {
    pub msgtype: String,
    pub msgid: String,
    pub from: CallbackSender,
    #[serde(default)]
    pub text: Option<TextContent>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackSender {
    pub userid: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct TextContent {
    pub content: String,
}

fn router(
    tracker: Arc<StreamerTracker>,
    commands: Arc<CommandRouter>,
    monitor: Arc<Monitor>,
) -> Router {
    let state = AppState {
        tracker,
        commands,
        monitor,
    };
    Router::new()
        .route("/health", get(health))
        .route("/wechat/callback", post(callback))
        .route("/wechat/intro", post(intro))
        .route("/streamers", post(add_streamer))
        .route("/streamers/{uid}", delete(remove_streamer))
        .with_state(state)
}

/// Serves the callback endpoints until a shutdown signal arrives.
pub async fn serve(
    port: u16,
    tracker: Arc<StreamerTracker>,
    commands: Arc<CommandRouter>,
    monitor: Arc<Monitor>,
) -> Result<()> {
    let app = router(tracker, commands, monitor);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("Callback server listening on port {}", port);
    info!("  Health check: http://localhost:{}/health", port);
    info!(
        "  WeChat callback: http://localhost:{}/wechat/callback",
        port
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("Shutdown signal received, stopping server");
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "tracked": state.tracker.total().await,
        "live": state.tracker.live_count().await,
    }))
}

async fn callback(
    State(state): State<AppState>,
    Json(message): Json<CallbackMessage>,
) -> Json<CommandReply> {
    debug!("Callback message {} from {}", message.msgid, message.from.userid);

    // Only text messages carry a command
    let text = if message.msgtype == "text" {
        message
            .text
            .as_ref()
            .map(|text| text.content.as_str())
            .unwrap_or("")
    } else {
        ""
    };
    Json(state.commands.handle(&message.from.name, text).await)
}

async fn intro(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.monitor.send_live_digest().await {
        Ok(true) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "介绍消息已发送" })),
        ),
        Ok(false) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "🌙 当前没有主播在直播" })),
        ),
        Err(e) => {
            error!("Failed to send intro message: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "发送失败" })),
            )
        }
    }
}

async fn add_streamer(
    State(state): State<AppState>,
    Json(streamer): Json<StreamerInfo>,
) -> (StatusCode, Json<Value>) {
    if streamer.uid == 0 || streamer.name.trim().is_empty() || streamer.room_id == 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "无效的主播信息" })),
        );
    }
    let added = state.tracker.register(streamer).await;
    let message = if added { "已添加订阅" } else { "已在订阅列表中" };
    (
        StatusCode::OK,
        Json(json!({ "success": true, "message": message })),
    )
}

async fn remove_streamer(
    State(state): State<AppState>,
    Path(uid): Path<u64>,
) -> (StatusCode, Json<Value>) {
    if state.tracker.unregister(uid).await {
        (StatusCode::OK, Json(json!({ "success": true })))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "未找到该主播" })),
        )
    }
}
