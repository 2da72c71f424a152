/// Scheduler Module
///
/// Optional in-process replacement for the external cron: runs the update
/// check at a fixed interval.

use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use crate::error::UpdateError;
use crate::update_trigger::{TriggerOutcome, UpdateTrigger};

/// Start the automatic update scheduler. Never returns.
pub async fn start_scheduler(trigger: Arc<UpdateTrigger>, period: Duration) {
    let mut interval = time::interval(period);
    // A run longer than the period should not cause a burst of catch-up checks
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    log::info!(
        "Starting update scheduler (interval: {} minutes)",
        period.as_secs() / 60
    );

    // Skip the first tick (immediate execution)
    interval.tick().await;

    loop {
        interval.tick().await;

        log::info!("Automatic update check triggered");
        run_scheduled_check(&trigger).await;
    }
}

/// One scheduled check; errors are logged and never stop the scheduler
pub async fn run_scheduled_check(trigger: &UpdateTrigger) {
    match trigger.check_and_maybe_process().await {
        Ok(TriggerOutcome::Completed {
            old_end_date,
            new_end_date,
        }) => {
            log::info!(
                "Automatic update complete: {} -> {}",
                old_end_date,
                new_end_date
            );
        }
        Ok(outcome) => log::info!("Automatic check: {}", outcome.message()),
        Err(UpdateError::RemoteQuery(e)) => {
            log::warn!(
                "Archive store unavailable ({}). Will retry at next scheduled interval.",
                e
            );
        }
        Err(e) => log::error!("Automatic update check failed: {}", e),
    }
}
