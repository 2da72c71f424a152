/// Update Trigger Module
///
/// Decides whether a newer raw export exists and, if so, runs the processing
/// command exactly once, guarded by the lock marker, with notifications on
/// detection and completion.
///
/// Flow per invocation:
/// 1. newest archive event from the remote store
/// 2. local export record
/// 3. compare instants; equal or older means no update
/// 4. bail out with `InProgress` if a lock marker is present (stale markers
///    older than the process timeout plus a margin are removed first)
/// 5. "detected" notification, acquire marker, run command, release marker
/// 6. "completed" notification on success only

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::archive_store::{ArchiveEvent, ArchiveStore, PgArchiveStore, RestArchiveStore};
use crate::config::{ArchiveSource, Config};
use crate::error::{ProcessingError, UpdateError};
use crate::export_record::ExportRecord;
use crate::lock::LockMarker;
use crate::notifier::{notifier_from_config, NotificationKind, Notifier, UpdateNotification};
use crate::processor::{CommandRunner, ProcessRunner};

/// Slack on top of the process timeout before a marker counts as stale
pub const STALE_LOCK_MARGIN: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct TriggerSettings {
    pub account_id: String,
    pub export_record_path: PathBuf,
    pub lock_path: PathBuf,
    /// Markers older than this are left over from a killed run
    pub stale_lock_after: Option<Duration>,
}

/// Result of a read-only comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCheck {
    pub current_end_date: DateTime<Utc>,
    pub latest_archive: ArchiveEvent,
}

impl UpdateCheck {
    /// Only a strictly newer archive counts as an update
    pub fn update_available(&self) -> bool {
        self.latest_archive.archive_at > self.current_end_date
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    NoUpdate {
        current_end_date: DateTime<Utc>,
    },
    InProgress {
        current_end_date: DateTime<Utc>,
        latest_archive_at: DateTime<Utc>,
    },
    Completed {
        old_end_date: DateTime<Utc>,
        new_end_date: DateTime<Utc>,
    },
}

impl TriggerOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            TriggerOutcome::NoUpdate { .. } => "No updates needed",
            TriggerOutcome::InProgress { .. } => "Processing already in progress",
            TriggerOutcome::Completed { .. } => "Data updated and processing completed",
        }
    }
}

/// Counters and last result across invocations
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerStatus {
    pub last_check: Option<DateTime<Utc>>,
    pub last_outcome: Option<String>,
    pub last_error: Option<String>,
    pub last_completed: Option<DateTime<Utc>>,
    pub total_checks: u32,
    pub total_runs: u32,
}

pub struct UpdateTrigger {
    settings: TriggerSettings,
    archive_store: Arc<dyn ArchiveStore>,
    notifier: Arc<dyn Notifier>,
    runner: Arc<dyn ProcessRunner>,
    status: RwLock<TriggerStatus>,
}

impl UpdateTrigger {
    pub fn new(
        settings: TriggerSettings,
        archive_store: Arc<dyn ArchiveStore>,
        notifier: Arc<dyn Notifier>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            settings,
            archive_store,
            notifier,
            runner,
            status: RwLock::new(TriggerStatus::default()),
        }
    }

    /// Wire the production collaborators described by `config`
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        let archive_store: Arc<dyn ArchiveStore> = match &config.archive_source {
            ArchiveSource::Postgres { database_url } => {
                Arc::new(PgArchiveStore::connect(database_url, &config.archive_table).await?)
            }
            ArchiveSource::Rest { base_url, api_key } => Arc::new(RestArchiveStore::new(
                http_client.clone(),
                base_url,
                api_key,
                &config.archive_table,
            )),
        };

        let notifier = notifier_from_config(config, http_client);

        let runner = CommandRunner::from_command_line(&config.process_command, config.process_timeout)
            .context("PROCESS_COMMAND is empty")?
            .with_workdir(config.process_workdir.clone());

        let settings = TriggerSettings {
            account_id: config.account_id.clone(),
            export_record_path: config.export_record_path.clone(),
            lock_path: config.lock_path.clone(),
            stale_lock_after: Some(config.process_timeout + STALE_LOCK_MARGIN),
        };

        Ok(Self::new(settings, archive_store, notifier, Arc::new(runner)))
    }

    pub fn settings(&self) -> &TriggerSettings {
        &self.settings
    }

    pub async fn status(&self) -> TriggerStatus {
        self.status.read().await.clone()
    }

    /// Compare the newest remote archive with the local export record. No side effects.
    pub async fn check(&self) -> Result<UpdateCheck, UpdateError> {
        let latest_archive = self
            .archive_store
            .latest_archive(&self.settings.account_id)
            .await?;

        let record = ExportRecord::load(&self.settings.export_record_path).await?;

        log::info!(
            "Current end date: {}, latest archive: {}",
            record.end_date,
            latest_archive.archive_at
        );

        Ok(UpdateCheck {
            current_end_date: record.end_date,
            latest_archive,
        })
    }

    /// Run one full invocation and record its result in the status
    pub async fn check_and_maybe_process(&self) -> Result<TriggerOutcome, UpdateError> {
        let result = self.run_once().await;

        let mut status = self.status.write().await;
        status.last_check = Some(Utc::now());
        status.total_checks += 1;
        match &result {
            Ok(outcome) => {
                status.last_outcome = Some(outcome.message().to_string());
                status.last_error = None;
                if matches!(outcome, TriggerOutcome::Completed { .. }) {
                    status.last_completed = status.last_check;
                }
            }
            Err(e) => {
                status.last_outcome = None;
                status.last_error = Some(e.to_string());
            }
        }
        result
    }

    async fn run_once(&self) -> Result<TriggerOutcome, UpdateError> {
        let check = self.check().await?;
        let old_end_date = check.current_end_date;
        let new_end_date = check.latest_archive.archive_at;

        if !check.update_available() {
            log::info!("No updates needed (current end date {})", old_end_date);
            return Ok(TriggerOutcome::NoUpdate {
                current_end_date: old_end_date,
            });
        }

        let in_progress = TriggerOutcome::InProgress {
            current_end_date: old_end_date,
            latest_archive_at: new_end_date,
        };

        if let Some(max_age) = self.settings.stale_lock_after {
            LockMarker::clear_if_stale(&self.settings.lock_path, max_age)
                .map_err(ProcessingError::from)?;
        }

        if LockMarker::is_held(&self.settings.lock_path) {
            log::warn!(
                "New data available but {} exists, skipping this run",
                self.settings.lock_path.display()
            );
            return Ok(in_progress);
        }

        log::info!("New data detected: {} -> {}", old_end_date, new_end_date);
        self.send(NotificationKind::Detected, old_end_date, new_end_date)
            .await;

        let marker = match LockMarker::acquire(&self.settings.lock_path)
            .map_err(ProcessingError::from)?
        {
            Some(marker) => marker,
            None => {
                log::warn!("Another run took the lock marker first, skipping this run");
                return Ok(in_progress);
            }
        };

        log::info!("Running `{}`", self.runner.describe());
        self.status.write().await.total_runs += 1;
        let run_result = self.runner.run().await;

        if let Err(e) = marker.release() {
            log::error!(
                "Failed to remove lock marker {}: {}",
                self.settings.lock_path.display(),
                e
            );
        }

        let output = run_result.map_err(|e| {
            log::error!("Processing failed: {}", e);
            UpdateError::from(e)
        })?;

        log::info!(
            "Processing completed in {:.1}s ({} lines of output)",
            output.duration.as_secs_f64(),
            output.stdout_lines
        );

        self.send(NotificationKind::Completed, old_end_date, new_end_date)
            .await;

        Ok(TriggerOutcome::Completed {
            old_end_date,
            new_end_date,
        })
    }

    async fn send(&self, kind: NotificationKind, old_end_date: DateTime<Utc>, new_end_date: DateTime<Utc>) {
        let notification = UpdateNotification {
            kind,
            old_end_date,
            new_end_date,
        };

        if let Err(e) = self.notifier.notify(&notification).await {
            log::error!("Error sending {:?} notification: {}", kind, e);
        }
    }
}
