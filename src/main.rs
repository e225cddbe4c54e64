mod bilibili;
mod commands;
mod config;
mod monitor;
mod notify;
mod server;
#[cfg(test)]
mod testutil;
mod tracker;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bilibili::BilibiliClient;
use crate::commands::CommandRouter;
use crate::config::Config;
use crate::monitor::Monitor;
use crate::notify::WeChatWebhook;
use crate::tracker::StreamerTracker;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bililive_bot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Streamers: {}", config.streamers.len());
    info!("  Check interval: {}", config.monitor.check_interval);
    info!("  Callback port: {}", config.server.port);

    let timeout = Duration::from_secs(config.monitor.fetch_timeout_secs);
    let fetcher =
        Arc::new(BilibiliClient::new(timeout).context("Failed to build Bilibili client")?);
    let sink = Arc::new(
        WeChatWebhook::new(config.webhook.url.clone(), timeout)
            .context("Failed to build webhook client")?,
    );
    let tracker = Arc::new(StreamerTracker::new(&config.streamers));

    let monitor = Arc::new(Monitor::new(tracker.clone(), fetcher.clone(), sink));
    let commands = Arc::new(CommandRouter::new(tracker.clone(), fetcher));

    // Prime the state before the first scheduled tick
    monitor.run_cycle().await;

    let mut scheduler = JobScheduler::new()
        .await
        .context("Failed to create job scheduler")?;
    let cycle_monitor = monitor.clone();
    let job = Job::new_async(
        config.monitor.check_interval.as_str(),
        move |_uuid, _lock| {
            let monitor = cycle_monitor.clone();
            Box::pin(async move {
                monitor.run_cycle().await;
            })
        },
    )
    .with_context(|| format!("Invalid check interval: {}", config.monitor.check_interval))?;
    scheduler
        .add(job)
        .await
        .context("Failed to schedule check cycle")?;
    scheduler
        .start()
        .await
        .context("Failed to start scheduler")?;
    info!("Scheduled status checks: {}", config.monitor.check_interval);

    // Serves until ctrl-c
    server::serve(config.server.port, tracker, commands, monitor).await?;

    scheduler
        .shutdown()
        .await
        .context("Failed to shut down scheduler")?;
    info!("Bot stopped");
    Ok(())
}
