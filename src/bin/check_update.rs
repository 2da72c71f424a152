/// Dry run of the update check
///
/// Compares the newest archive upload with the local export record and
/// reports whether an update would run. Never starts processing.
///
/// Run with: cargo run --bin check_update [-- --notify]
///
/// `--notify` also sends the "detected" notification when an update is due.

use anyhow::Result;
use tweet_stats_updater::config::Config;
use tweet_stats_updater::notifier::{notifier_from_config, NotificationKind, UpdateNotification};
use tweet_stats_updater::update_trigger::UpdateTrigger;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    pretty_env_logger::init();

    let notify = std::env::args().skip(1).any(|arg| arg == "--notify");

    let config = Config::from_env()?;
    let trigger = UpdateTrigger::from_config(&config).await?;

    let check = trigger.check().await?;

    println!("Current end date:    {}", check.current_end_date);
    println!("Latest archive date: {}", check.latest_archive.archive_at);
    println!("Would update?        {}", check.update_available());

    if check.update_available() && notify {
        let notifier = notifier_from_config(&config, reqwest::Client::new());

        let notification = UpdateNotification {
            kind: NotificationKind::Detected,
            old_end_date: check.current_end_date,
            new_end_date: check.latest_archive.archive_at,
        };

        match notifier.notify(&notification).await {
            Ok(()) => println!("Notification sent"),
            Err(e) => log::error!("Error sending notification: {}", e),
        }
    }

    Ok(())
}
