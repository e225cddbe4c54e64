use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bilibili::{StreamerInfo, StreamerStatus};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("unknown streamer uid {0}")]
    UnknownStreamer(u64),
}

/// Streamers that changed state within one check cycle, in fetch order.
#[derive(Debug, Default)]
pub struct Transitions {
    pub became_live: Vec<StreamerStatus>,
    pub became_offline: Vec<StreamerStatus>,
}

#[derive(Default)]
struct Inner {
    /// Registration order, used for reports and name lookup
    streamers: Vec<StreamerInfo>,
    /// Last known liveness; key set always equals the tracked uid set
    live: HashMap<u64, bool>,
}

/// Last-known liveness per tracked streamer.
///
/// One mutex guards the whole working set. `detect` holds it across an
/// entire batch, so a concurrent reader sees either the full pre-cycle or
/// the full post-cycle state, never a mix.
pub struct StreamerTracker {
    inner: Mutex<Inner>,
}

impl StreamerTracker {
    pub fn new(streamers: &[StreamerInfo]) -> Self {
        let mut inner = Inner::default();
        for streamer in streamers {
            if inner.live.insert(streamer.uid, false).is_none() {
                inner.streamers.push(streamer.clone());
            }
        }
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Starts tracking a streamer as offline. Re-registering an already
    /// tracked uid keeps its current liveness; returns false in that case.
    pub async fn register(&self, streamer: StreamerInfo) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.live.contains_key(&streamer.uid) {
            return false;
        }
        info!("Tracking streamer {} (uid {})", streamer.name, streamer.uid);
        inner.live.insert(streamer.uid, false);
        inner.streamers.push(streamer);
        true
    }

    /// Stops tracking a streamer. Returns false if the uid was not tracked.
    pub async fn unregister(&self, uid: u64) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.live.remove(&uid).is_none() {
            return false;
        }
        inner.streamers.retain(|streamer| streamer.uid != uid);
        info!("Stopped tracking uid {}", uid);
        true
    }

    /// Point-in-time copy of uid → liveness.
    #[allow(dead_code)]
    pub async fn snapshot(&self) -> HashMap<u64, bool> {
        self.inner.lock().await.live.clone()
    }

    /// Streamers with their liveness, in registration order.
    pub async fn overview(&self) -> Vec<(StreamerInfo, bool)> {
        let inner = self.inner.lock().await;
        inner
            .streamers
            .iter()
            .map(|streamer| {
                let live = inner.live.get(&streamer.uid).copied().unwrap_or(false);
                (streamer.clone(), live)
            })
            .collect()
    }

    pub async fn streamers(&self) -> Vec<StreamerInfo> {
        self.inner.lock().await.streamers.clone()
    }

    pub async fn live_count(&self) -> usize {
        self.inner.lock().await.live.values().filter(|v| **v).count()
    }

    pub async fn total(&self) -> usize {
        self.inner.lock().await.streamers.len()
    }

    /// Writes a single streamer's liveness.
    #[allow(dead_code)]
    pub async fn commit(&self, uid: u64, is_live: bool) -> Result<(), TrackerError> {
        let mut inner = self.inner.lock().await;
        match inner.live.get_mut(&uid) {
            Some(slot) => {
                *slot = is_live;
                Ok(())
            }
            None => Err(TrackerError::UnknownStreamer(uid)),
        }
    }

    /// Diffs a fresh batch against the last known state and commits it.
    ///
    /// Statuses for uids no longer tracked are dropped without a commit, so
    /// a streamer unregistered between fetch and diff is not resurrected.
    /// Every surviving observation is committed even when nothing changed.
    pub async fn detect(&self, statuses: &[StreamerStatus]) -> Transitions {
        let mut inner = self.inner.lock().await;
        let mut transitions = Transitions::default();

        for status in statuses {
            let is_live = status.state.is_live();
            let Some(slot) = inner.live.get_mut(&status.uid) else {
                debug!("Dropping observation for untracked uid {}", status.uid);
                continue;
            };
            match (*slot, is_live) {
                (false, true) => {
                    info!("{} went live", status.name);
                    transitions.became_live.push(status.clone());
                }
                (true, false) => {
                    info!("{} went offline", status.name);
                    transitions.became_offline.push(status.clone());
                }
                _ => {}
            }
            *slot = is_live;
        }

        transitions
    }
}
