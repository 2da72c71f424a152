/// Tweet Stats Updater
///
/// Keeps the tweet-analytics artifacts in sync with the newest archive upload.
///
/// The service:
/// - Exposes `POST /api/cron` for an external scheduler (bearer protected)
/// - Compares the newest archive upload with the processed export record
/// - Runs the processing pipeline once when newer data exists
/// - Optionally runs the check itself on a fixed interval
/// - Serves summary statistics computed from the published artifacts

use anyhow::Result;
use std::sync::Arc;
use tweet_stats_updater::{artifacts::ArtifactStore, config, http_server, scheduler, update_trigger::UpdateTrigger};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    pretty_env_logger::init();

    log::info!("Starting Tweet Stats Updater...");

    // Load configuration from environment
    let cfg = config::Config::from_env()?;

    // Validate configuration and connections
    cfg.validate().await?;

    let trigger = Arc::new(UpdateTrigger::from_config(&cfg).await?);

    if let Some(period) = cfg.check_interval {
        tokio::spawn(scheduler::start_scheduler(trigger.clone(), period));
    } else {
        log::info!("CHECK_INTERVAL_MINUTES not set - relying on external scheduler");
    }

    let state = http_server::AppState {
        cron_secret: cfg.cron_secret.clone(),
        trigger,
        artifacts: ArtifactStore::new(cfg.artifacts_dir.clone()),
        account_handle: cfg.account_handle.clone(),
    };

    http_server::start_server(state, cfg.http_port).await
}
