use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::bilibili::{fetch_available, StatusFetcher};
use crate::notify::{dispatch, render_live_digest, MessageSink, SinkError};
use crate::tracker::StreamerTracker;

/// Runs one fetch-all → diff → notify cycle on demand. The trigger (cron
/// job, signal, test) lives outside; this type only knows how to run a
/// single cycle.
pub struct Monitor {
    tracker: Arc<StreamerTracker>,
    fetcher: Arc<dyn StatusFetcher>,
    sink: Arc<dyn MessageSink>,
    cycle_guard: Mutex<()>,
}

impl Monitor {
    pub fn new(
        tracker: Arc<StreamerTracker>,
        fetcher: Arc<dyn StatusFetcher>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            tracker,
            fetcher,
            sink,
            cycle_guard: Mutex::new(()),
        }
    }

    /// One complete check cycle. A trigger that arrives while a previous
    /// cycle is still in flight is skipped, not queued — overlapping cycles
    /// would interleave commits and corrupt the diff.
    pub async fn run_cycle(&self) {
        let Ok(_guard) = self.cycle_guard.try_lock() else {
            warn!("Previous check cycle still running, skipping this trigger");
            return;
        };

        debug!("Checking streamer status...");
        let streamers = self.tracker.streamers().await;
        let statuses = fetch_available(self.fetcher.as_ref(), &streamers).await;
        let transitions = self.tracker.detect(&statuses).await;
        let outcomes = dispatch(&transitions, self.sink.as_ref()).await;

        let failed = outcomes.iter().filter(|outcome| outcome.is_err()).count();
        if failed > 0 {
            warn!("{} notification(s) failed to deliver", failed);
        }
        info!(
            "Check cycle complete - live: {}, newly live: {}, newly offline: {}",
            self.tracker.live_count().await,
            transitions.became_live.len(),
            transitions.became_offline.len(),
        );
    }

    /// Pushes a digest of everyone currently live through the webhook.
    /// Returns false (and sends nothing) when nobody is live.
    pub async fn send_live_digest(&self) -> Result<bool, SinkError> {
        let streamers = self.tracker.streamers().await;
        let statuses = fetch_available(self.fetcher.as_ref(), &streamers).await;
        let live: Vec<_> = statuses
            .into_iter()
            .filter(|status| status.state.is_live())
            .collect();

        match render_live_digest(&live) {
            Some(message) => {
                self.sink.send(&message).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
