use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{error, info};

use crate::bilibili::{LiveState, StatusFetcher, StreamerStatus};
use crate::tracker::StreamerTracker;

const HELP_TEXT: &str = "## 🤖 可用命令

**查询命令**:
- `状态` 或 `status` - 查看所有订阅主播状态
- `直播中` 或 `live` - 查看当前正在直播的主播
- `查询 主播名` - 查询指定主播的详细状态

**其他命令**:
- `帮助` 或 `help` - 显示此帮助信息

**使用示例**:
- 输入 `状态` 查看总体情况
- 输入 `直播中` 查看正在直播的主播
- 输入 `查询 某某主播` 查看具体主播状态";

/// Reply to one inbound command, formatted for the WeChat channel.
#[derive(Debug, Serialize)]
pub struct CommandReply {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ReplyData>,
}

impl CommandReply {
    fn ok(message: impl Into<String>, data: Option<ReplyData>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Machine-readable payload, tagged per command kind.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyData {
    StatusReport {
        total: usize,
        live_count: usize,
        streamers: Vec<StreamerOverview>,
    },
    LiveList {
        streamers: Vec<StreamerStatus>,
    },
    SingleStatus {
        status: StreamerStatus,
    },
}

#[derive(Debug, Serialize)]
pub struct StreamerOverview {
    pub name: String,
    pub is_live: bool,
}

/// Stateless dispatch over the fixed command keywords.
pub struct CommandRouter {
    tracker: Arc<StreamerTracker>,
    fetcher: Arc<dyn StatusFetcher>,
}

impl CommandRouter {
    pub fn new(tracker: Arc<StreamerTracker>, fetcher: Arc<dyn StatusFetcher>) -> Self {
        Self { tracker, fetcher }
    }

    pub async fn handle(&self, sender_name: &str, text: &str) -> CommandReply {
        let content = text.trim();
        if content.is_empty() {
            return CommandReply::failure("请输入有效的命令");
        }

        info!("Command from {}: {}", sender_name, content);

        let keyword = content.to_lowercase();
        match keyword.as_str() {
            "状态" | "status" => self.status_report().await,
            "直播中" | "live" => self.live_streamers().await,
            "帮助" | "help" => CommandReply::ok(HELP_TEXT, None),
            _ => match query_target(content, &keyword) {
                Some(name) => self.query_streamer(name).await,
                None => CommandReply::failure("未知命令，请输入 \"帮助\" 查看可用命令"),
            },
        }
    }

    /// Aggregate report from tracked state only — works even when the
    /// Bilibili API is unreachable.
    async fn status_report(&self) -> CommandReply {
        let overview = self.tracker.overview().await;
        let total = overview.len();
        let live_count = overview.iter().filter(|(_, live)| *live).count();

        let mut message = format!(
            "## 📊 订阅状态\n\n**总订阅数**: {total}\n**当前直播**: {live_count}人\n\n### 主播状态"
        );
        let mut streamers = Vec::with_capacity(total);
        for (info, is_live) in overview {
            let state = if is_live { "🔴 直播中" } else { "⚫ 未直播" };
            message.push_str(&format!("\n- {}: {}", info.name, state));
            streamers.push(StreamerOverview {
                name: info.name,
                is_live,
            });
        }

        CommandReply::ok(
            message,
            Some(ReplyData::StatusReport {
                total,
                live_count,
                streamers,
            }),
        )
    }

    /// Freshly fetched list of everyone currently live.
    async fn live_streamers(&self) -> CommandReply {
        let streamers = self.tracker.streamers().await;
        let results = join_all(streamers.iter().map(|s| self.fetcher.fetch(s))).await;

        let mut statuses = Vec::with_capacity(results.len());
        for (streamer, result) in streamers.iter().zip(results) {
            match result {
                Ok(status) => statuses.push(status),
                Err(e) => {
                    error!("Failed to fetch status for {}: {}", streamer.name, e);
                    return CommandReply::failure("查询直播状态失败，请稍后重试");
                }
            }
        }

        let live: Vec<StreamerStatus> =
            statuses.into_iter().filter(|s| s.state.is_live()).collect();
        if live.is_empty() {
            return CommandReply::ok("🌙 当前没有主播在直播", None);
        }

        let mut message = format!("## 🔴 当前直播中 ({}人)\n", live.len());
        for status in &live {
            message.push('\n');
            message.push_str(&render_details(status));
            message.push('\n');
        }

        CommandReply::ok(message, Some(ReplyData::LiveList { streamers: live }))
    }

    /// Live lookup for one streamer by fuzzy name match.
    async fn query_streamer(&self, name: &str) -> CommandReply {
        let streamers = self.tracker.streamers().await;
        let Some(streamer) = streamers
            .iter()
            .find(|s| s.name.contains(name) || name.contains(s.name.as_str()))
        else {
            return CommandReply::failure(format!("未找到主播 \"{name}\"，请检查名称是否正确"));
        };

        match self.fetcher.fetch(streamer).await {
            Ok(status) => {
                let mut message = format!("## 👤 {}\n\n**状态**: ", status.name);
                if status.state.is_live() {
                    message.push_str("🔴 直播中\n");
                    message.push_str(&render_live_fields(&status.state));
                } else {
                    message.push_str("⚫ 未直播");
                }
                CommandReply::ok(message, Some(ReplyData::SingleStatus { status }))
            }
            Err(e) => {
                error!("Failed to query {}: {}", streamer.name, e);
                CommandReply::failure(format!("查询主播 \"{name}\" 状态失败，请稍后重试"))
            }
        }
    }
}

/// Extracts the name from a `查询 <名字>` / `query <name>` command. The
/// keyword is matched case-insensitively; the name keeps its original case.
fn query_target<'a>(content: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = if let Some(rest) = content.strip_prefix("查询 ") {
        rest
    } else if keyword.starts_with("query ") {
        &content["query ".len()..]
    } else {
        return None;
    };
    let rest = rest.trim();
    (!rest.is_empty()).then_some(rest)
}

fn render_details(status: &StreamerStatus) -> String {
    format!(
        "### {}\n{}",
        status.name,
        render_live_fields(&status.state)
    )
}

fn render_live_fields(state: &LiveState) -> String {
    match state {
        LiveState::Live {
            title,
            area,
            room_url,
            started_at,
            ..
        } => {
            let title = if title.is_empty() { "无标题" } else { title.as_str() };
            let area = area.as_deref().unwrap_or("未知");
            format!(
                "**标题**: {title}\n**分区**: {area}\n**直播间**: [点击观看]({room_url})\n**开播时间**: {}",
                started_at.format("%Y-%m-%d %H:%M:%S")
            )
        }
        LiveState::Offline => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{streamer, MockFetcher};

    fn router_with(
        streamers: &[crate::bilibili::StreamerInfo],
        fetcher: MockFetcher,
    ) -> CommandRouter {
        CommandRouter::new(
            Arc::new(StreamerTracker::new(streamers)),
            Arc::new(fetcher),
        )
    }

    #[tokio::test]
    async fn test_status_works_with_fetcher_down() {
        let fetcher = MockFetcher::new();
        fetcher.set_failing(1);
        fetcher.set_failing(2);
        let router = router_with(&[streamer(1, "小明直播间"), streamer(2, "阿梓")], fetcher);

        let reply = router.handle("tester", "状态").await;

        assert!(reply.success);
        assert!(reply.message.contains("**总订阅数**: 2"));
        assert!(reply.message.contains("**当前直播**: 0人"));
        assert!(reply.message.contains("小明直播间: ⚫ 未直播"));
        assert!(matches!(
            reply.data,
            Some(ReplyData::StatusReport { total: 2, live_count: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_status_keyword_is_case_insensitive() {
        let router = router_with(&[streamer(1, "a")], MockFetcher::new());
        let reply = router.handle("tester", "  STATUS ").await;
        assert!(reply.success);
        assert!(reply.message.contains("订阅状态"));
    }

    #[tokio::test]
    async fn test_live_lists_only_live_streamers() {
        let fetcher = MockFetcher::new();
        fetcher.set_live(1, "歌回");
        let router = router_with(&[streamer(1, "小明直播间"), streamer(2, "阿梓")], fetcher);

        let reply = router.handle("tester", "直播中").await;

        assert!(reply.success);
        assert!(reply.message.contains("当前直播中 (1人)"));
        assert!(reply.message.contains("### 小明直播间"));
        assert!(!reply.message.contains("阿梓"));
        match reply.data {
            Some(ReplyData::LiveList { streamers }) => assert_eq!(streamers.len(), 1),
            other => panic!("unexpected data: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_live_with_nobody_streaming() {
        let router = router_with(&[streamer(1, "a")], MockFetcher::new());
        let reply = router.handle("tester", "live").await;
        assert!(reply.success);
        assert_eq!(reply.message, "🌙 当前没有主播在直播");
        assert!(reply.data.is_none());
    }

    #[tokio::test]
    async fn test_live_fetch_error_returns_retry_message() {
        let fetcher = MockFetcher::new();
        fetcher.set_failing(2);
        let router = router_with(&[streamer(1, "a"), streamer(2, "b")], fetcher);

        let reply = router.handle("tester", "直播中").await;

        assert!(!reply.success);
        assert!(reply.message.contains("稍后重试"));
    }

    #[tokio::test]
    async fn test_query_matches_substring_of_registered_name() {
        let fetcher = MockFetcher::new();
        fetcher.set_live(1, "歌回");
        let router = router_with(&[streamer(1, "小明直播间")], fetcher);

        let reply = router.handle("tester", "查询 小明").await;

        assert!(reply.success);
        assert!(reply.message.contains("## 👤 小明直播间"));
        assert!(reply.message.contains("🔴 直播中"));
    }

    #[tokio::test]
    async fn test_query_matches_when_query_contains_name() {
        let router = router_with(&[streamer(1, "小明")], MockFetcher::new());

        let reply = router.handle("tester", "查询 小明直播间").await;

        assert!(reply.success);
        assert!(reply.message.contains("## 👤 小明"));
        assert!(reply.message.contains("⚫ 未直播"));
    }

    #[tokio::test]
    async fn test_query_first_match_in_registration_order() {
        let fetcher = MockFetcher::new();
        let router = router_with(&[streamer(1, "小明甲"), streamer(2, "小明乙")], fetcher);

        let reply = router.handle("tester", "查询 小明").await;

        assert!(reply.message.contains("小明甲"));
    }

    #[tokio::test]
    async fn test_query_no_match() {
        let router = router_with(&[streamer(1, "小明")], MockFetcher::new());

        let reply = router.handle("tester", "查询 不存在的人").await;

        assert!(!reply.success);
        assert!(reply.message.contains("未找到主播 \"不存在的人\""));
    }

    #[tokio::test]
    async fn test_query_fetch_error_returns_retry_message() {
        let fetcher = MockFetcher::new();
        fetcher.set_failing(1);
        let router = router_with(&[streamer(1, "小明")], fetcher);

        let reply = router.handle("tester", "query 小明").await;

        assert!(!reply.success);
        assert!(reply.message.contains("稍后重试"));
    }

    #[tokio::test]
    async fn test_unknown_command_points_to_help() {
        let router = router_with(&[streamer(1, "a")], MockFetcher::new());
        let reply = router.handle("tester", "随便说点什么").await;
        assert!(!reply.success);
        assert!(reply.message.contains("帮助"));
    }

    #[tokio::test]
    async fn test_help_text() {
        let router = router_with(&[streamer(1, "a")], MockFetcher::new());
        let reply = router.handle("tester", "帮助").await;
        assert!(reply.success);
        assert!(reply.message.contains("可用命令"));
    }

    #[tokio::test]
    async fn test_blank_input() {
        let router = router_with(&[streamer(1, "a")], MockFetcher::new());
        let reply = router.handle("tester", "   ").await;
        assert!(!reply.success);
        assert_eq!(reply.message, "请输入有效的命令");
    }
}
