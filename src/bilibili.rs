use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

const ROOM_INFO_API: &str = "https://api.live.bilibili.com/room/v1/Room/get_info";

// The live API rejects requests without a browser User-Agent
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// A streamer to watch, as configured at startup.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct StreamerInfo {
    pub uid: u64,
    pub name: String,
    pub room_id: u64,
}

/// Room details exist only while the room is live; an offline room carries
/// nothing, so stale titles can never leak into notifications.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LiveState {
    Offline,
    Live {
        title: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        area: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        cover_url: Option<String>,
        room_url: String,
        started_at: DateTime<Utc>,
    },
}

impl LiveState {
    pub fn is_live(&self) -> bool {
        matches!(self, LiveState::Live { .. })
    }
}

/// Result of one status fetch for one streamer.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StreamerStatus {
    pub uid: u64,
    pub name: String,
    pub state: LiveState,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Bilibili API error ({code}): {message}")]
    Api { code: i64, message: String },
}

/// Seam between the status source and everything that consumes statuses.
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    async fn fetch(&self, streamer: &StreamerInfo) -> Result<StreamerStatus, FetchError>;
}

#[derive(Debug, Deserialize)]
struct RoomInfoResponse {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<RoomInfoData>,
}

#[derive(Debug, Deserialize)]
struct RoomInfoData {
    live_status: i64,
    #[serde(default)]
    title: String,
    room_id: u64,
    area_name: Option<String>,
    parent_area_name: Option<String>,
    user_cover: Option<String>,
}

/// Real fetcher backed by the Bilibili room-info endpoint.
pub struct BilibiliClient {
    client: Client,
}

impl BilibiliClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StatusFetcher for BilibiliClient {
    async fn fetch(&self, streamer: &StreamerInfo) -> Result<StreamerStatus, FetchError> {
        let response: RoomInfoResponse = self
            .client
            .get(ROOM_INFO_API)
            .query(&[("room_id", streamer.room_id)])
            .send()
            .await?
            .json()
            .await?;

        // A non-zero application code is a failed fetch, never "not live"
        if response.code != 0 {
            return Err(FetchError::Api {
                code: response.code,
                message: response.message,
            });
        }
        let data = response.data.ok_or(FetchError::Api {
            code: 0,
            message: "response missing data field".to_string(),
        })?;

        let state = if data.live_status == 1 {
            let area = match (data.parent_area_name, data.area_name) {
                (Some(parent), Some(area)) => Some(format!("{parent} - {area}")),
                (parent, area) => area.or(parent),
            };
            LiveState::Live {
                title: data.title,
                area,
                cover_url: data.user_cover.filter(|cover| !cover.is_empty()),
                room_url: format!("https://live.bilibili.com/{}", data.room_id),
                started_at: Utc::now(),
            }
        } else {
            LiveState::Offline
        };

        Ok(StreamerStatus {
            uid: streamer.uid,
            name: streamer.name.clone(),
            state,
        })
    }
}

/// Fetches every streamer concurrently and waits for the whole batch.
///
/// A failed fetch is logged and excluded from the result — the streamer
/// simply has no observation this cycle. Callers that need all-or-nothing
/// semantics call `fetch` per streamer instead.
pub async fn fetch_available(
    fetcher: &dyn StatusFetcher,
    streamers: &[StreamerInfo],
) -> Vec<StreamerStatus> {
    let results = join_all(streamers.iter().map(|streamer| fetcher.fetch(streamer))).await;

    let mut statuses = Vec::with_capacity(results.len());
    for (streamer, result) in streamers.iter().zip(results) {
        match result {
            Ok(status) => statuses.push(status),
            Err(e) => warn!("Failed to fetch status for {}: {}", streamer.name, e),
        }
    }
    statuses
}
