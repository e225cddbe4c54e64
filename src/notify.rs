use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::bilibili::{LiveState, StreamerStatus};
use crate::tracker::Transitions;

/// WeChat Work webhook payload: `msgtype` plus the matching nested part.
#[derive(Debug, Clone, Serialize)]
pub struct WeChatMessage {
    pub msgtype: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<MarkdownPayload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextPayload {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mentioned_list: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkdownPayload {
    pub content: String,
}

impl WeChatMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            msgtype: "text",
            text: Some(TextPayload {
                content: content.into(),
                mentioned_list: None,
            }),
            markdown: None,
        }
    }

    pub fn markdown(content: impl Into<String>) -> Self {
        Self {
            msgtype: "markdown",
            text: None,
            markdown: Some(MarkdownPayload {
                content: content.into(),
            }),
        }
    }

    /// The human-readable content regardless of message type.
    pub fn content(&self) -> &str {
        match (&self.text, &self.markdown) {
            (Some(text), _) => &text.content,
            (_, Some(markdown)) => &markdown.content,
            _ => "",
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("WeChat API error ({code}): {message}")]
    Api { code: i64, message: String },
}

/// Transport-only seam for delivering a rendered message.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, message: &WeChatMessage) -> Result<(), SinkError>;
}

#[derive(Debug, Deserialize)]
struct WebhookResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// Real sink backed by a WeChat Work group webhook.
pub struct WeChatWebhook {
    client: Client,
    url: String,
}

impl WeChatWebhook {
    pub fn new(url: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl MessageSink for WeChatWebhook {
    async fn send(&self, message: &WeChatMessage) -> Result<(), SinkError> {
        let response: WebhookResponse = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await?
            .json()
            .await?;

        // The webhook answers 200 even on failure; errcode carries the result
        if response.errcode != 0 {
            return Err(SinkError::Api {
                code: response.errcode,
                message: response.errmsg,
            });
        }
        Ok(())
    }
}

pub fn render_live_started(status: &StreamerStatus) -> WeChatMessage {
    let mut content = format!("## 🔴 直播开始通知\n\n**主播**: {}", status.name);
    if let LiveState::Live {
        title,
        area,
        cover_url,
        room_url,
        started_at,
    } = &status.state
    {
        if !title.is_empty() {
            content.push_str(&format!("\n**标题**: {title}"));
        }
        if let Some(area) = area {
            content.push_str(&format!("\n**分区**: {area}"));
        }
        content.push_str(&format!(
            "\n**直播间**: [点击观看]({room_url})\n**开播时间**: {}",
            started_at.format("%Y-%m-%d %H:%M:%S")
        ));
        if let Some(cover) = cover_url {
            content.push_str(&format!("\n\n![直播封面]({cover})"));
        }
    }
    content.push_str("\n\n快来围观吧！ 🎉");
    WeChatMessage::markdown(content)
}

pub fn render_live_ended(status: &StreamerStatus) -> WeChatMessage {
    WeChatMessage::text(format!("📴 {} 已结束直播", status.name))
}

/// One markdown message listing everyone currently live, or None when the
/// list is empty (nothing worth pushing).
pub fn render_live_digest(live: &[StreamerStatus]) -> Option<WeChatMessage> {
    if live.is_empty() {
        return None;
    }

    let lines: Vec<String> = live
        .iter()
        .map(|status| match &status.state {
            LiveState::Live {
                title, room_url, ..
            } => {
                let title = if title.is_empty() { "直播中" } else { title.as_str() };
                format!("**{}**: [{}]({})", status.name, title, room_url)
            }
            LiveState::Offline => format!("**{}**", status.name),
        })
        .collect();

    Some(WeChatMessage::markdown(format!(
        "## 📺 当前直播中 ({}人)\n\n{}\n\n快来围观吧！ 🎉",
        live.len(),
        lines.join("\n")
    )))
}

/// Sends one notification per transition: every "went live" message first,
/// then the "went offline" ones, each group in detector output order.
///
/// Sends are independent — a delivery failure is logged and the rest of the
/// batch still goes out. No retries; a lost one-shot notification stays lost.
pub async fn dispatch(
    transitions: &Transitions,
    sink: &dyn MessageSink,
) -> Vec<Result<(), SinkError>> {
    let total = transitions.became_live.len() + transitions.became_offline.len();
    let mut outcomes = Vec::with_capacity(total);

    for status in &transitions.became_live {
        let outcome = sink.send(&render_live_started(status)).await;
        if let Err(e) = &outcome {
            error!("Failed to deliver live notification for {}: {}", status.name, e);
        }
        outcomes.push(outcome);
    }
    for status in &transitions.became_offline {
        let outcome = sink.send(&render_live_ended(status)).await;
        if let Err(e) = &outcome {
            error!(
                "Failed to deliver offline notification for {}: {}",
                status.name, e
            );
        }
        outcomes.push(outcome);
    }

    outcomes
}
