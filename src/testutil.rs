//! Shared fakes for the collaborator seams, used across module tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::bilibili::{FetchError, LiveState, StatusFetcher, StreamerInfo, StreamerStatus};
use crate::notify::{MessageSink, SinkError, WeChatMessage};

pub fn streamer(uid: u64, name: &str) -> StreamerInfo {
    StreamerInfo {
        uid,
        name: name.to_string(),
        room_id: uid * 10,
    }
}

pub fn live(uid: u64, name: &str) -> StreamerStatus {
    live_with(uid, name, "直播中", None, None)
}

pub fn live_with(
    uid: u64,
    name: &str,
    title: &str,
    area: Option<&str>,
    cover_url: Option<&str>,
) -> StreamerStatus {
    StreamerStatus {
        uid,
        name: name.to_string(),
        state: LiveState::Live {
            title: title.to_string(),
            area: area.map(str::to_string),
            cover_url: cover_url.map(str::to_string),
            room_url: format!("https://live.bilibili.com/{}", uid * 10),
            started_at: Utc::now(),
        },
    }
}

pub fn offline(uid: u64, name: &str) -> StreamerStatus {
    StreamerStatus {
        uid,
        name: name.to_string(),
        state: LiveState::Offline,
    }
}

/// Scriptable fetcher: per-uid canned state, `None` meaning the fetch fails.
/// Uids never scripted resolve to offline.
#[derive(Default)]
pub struct MockFetcher {
    states: Mutex<HashMap<u64, Option<LiveState>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_live(&self, uid: u64, title: &str) {
        self.states.lock().unwrap().insert(
            uid,
            Some(LiveState::Live {
                title: title.to_string(),
                area: None,
                cover_url: None,
                room_url: format!("https://live.bilibili.com/{}", uid * 10),
                started_at: Utc::now(),
            }),
        );
    }

    pub fn set_offline(&self, uid: u64) {
        self.states
            .lock()
            .unwrap()
            .insert(uid, Some(LiveState::Offline));
    }

    pub fn set_failing(&self, uid: u64) {
        self.states.lock().unwrap().insert(uid, None);
    }
}

#[async_trait]
impl StatusFetcher for MockFetcher {
    async fn fetch(&self, streamer: &StreamerInfo) -> Result<StreamerStatus, FetchError> {
        let states = self.states.lock().unwrap();
        match states.get(&streamer.uid) {
            Some(None) => Err(FetchError::Api {
                code: -400,
                message: "mock fetch failure".to_string(),
            }),
            Some(Some(state)) => Ok(StreamerStatus {
                uid: streamer.uid,
                name: streamer.name.clone(),
                state: state.clone(),
            }),
            None => Ok(StreamerStatus {
                uid: streamer.uid,
                name: streamer.name.clone(),
                state: LiveState::Offline,
            }),
        }
    }
}

/// Sink that records every send attempt and can fail the first N of them.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<WeChatMessage>>,
    failures_remaining: Mutex<usize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(n: usize) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failures_remaining: Mutex::new(n),
        }
    }

    /// Content text of every recorded message, in send order.
    pub fn contents(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|message| message.content().to_string())
            .collect()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send(&self, message: &WeChatMessage) -> Result<(), SinkError> {
        self.sent.lock().unwrap().push(message.clone());
        let mut remaining = self.failures_remaining.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(SinkError::Api {
                code: 93000,
                message: "mock delivery failure".to_string(),
            });
        }
        Ok(())
    }
}
