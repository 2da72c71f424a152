//! Shared fakes for trigger and HTTP tests
//!
//! In-memory archive store, recording notifier and a scripted process runner
//! that can rewrite the export record the way the real pipeline does.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use tweet_stats_updater::archive_store::{ArchiveEvent, ArchiveStore};
use tweet_stats_updater::error::{NotificationError, ProcessingError, UpdateError};
use tweet_stats_updater::notifier::{NotificationKind, Notifier, UpdateNotification};
use tweet_stats_updater::processor::{ProcessOutput, ProcessRunner};
use tweet_stats_updater::update_trigger::{TriggerSettings, UpdateTrigger};

pub const ACCOUNT_ID: &str = "16884623";

pub fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

pub fn export_record_json(end_date: DateTime<Utc>) -> String {
    format!(
        r#"[{{"startDate": "2009-01-01T00:00:00.000Z", "endDate": "{}"}}]"#,
        tweet_stats_updater::dates::to_iso(&end_date)
    )
}

pub struct FakeArchiveStore {
    latest: Mutex<Result<DateTime<Utc>, String>>,
    pub calls: AtomicUsize,
}

impl FakeArchiveStore {
    pub fn returning(archive_at: DateTime<Utc>) -> Self {
        Self {
            latest: Mutex::new(Ok(archive_at)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            latest: Mutex::new(Err(message.to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArchiveStore for FakeArchiveStore {
    async fn latest_archive(&self, account_id: &str) -> Result<ArchiveEvent, UpdateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latest = self.latest.lock().unwrap().clone();
        latest
            .map(|archive_at| ArchiveEvent {
                account_id: account_id.to_string(),
                archive_at,
            })
            .map_err(UpdateError::RemoteQuery)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<UpdateNotification>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.sent.lock().unwrap().iter().map(|n| n.kind).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &UpdateNotification) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.fail {
            return Err(NotificationError::Rejected {
                status: 503,
                body: "mail service down".to_string(),
            });
        }
        Ok(())
    }
}

pub struct ScriptedRunner {
    pub calls: AtomicUsize,
    pub saw_lock: AtomicBool,
    lock_path: PathBuf,
    fail: bool,
    delay: Duration,
    /// Export record contents to write, as the real pipeline would
    rewrite: Option<(PathBuf, String)>,
}

impl ScriptedRunner {
    pub fn new(lock_path: &Path) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            saw_lock: AtomicBool::new(false),
            lock_path: lock_path.to_path_buf(),
            fail: false,
            delay: Duration::ZERO,
            rewrite: None,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn rewriting(mut self, path: &Path, contents: String) -> Self {
        self.rewrite = Some((path.to_path_buf(), contents));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self) -> Result<ProcessOutput, ProcessingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.saw_lock.store(self.lock_path.exists(), Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.fail {
            return Err(ProcessingError::Failed {
                command: self.describe(),
                status: "exit status: 1".to_string(),
                stderr: "Error running download.py after both attempts".to_string(),
            });
        }

        if let Some((path, contents)) = &self.rewrite {
            std::fs::write(path, contents).expect("rewrite export record");
        }

        Ok(ProcessOutput {
            duration: self.delay,
            stdout_lines: 0,
        })
    }

    fn describe(&self) -> String {
        "python3 process_all.py".to_string()
    }
}

/// A trigger over fakes, with its export record and lock marker in a temp dir
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<FakeArchiveStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub runner: Arc<ScriptedRunner>,
    pub trigger: Arc<UpdateTrigger>,
}

impl Harness {
    pub fn export_record_path(&self) -> PathBuf {
        self.dir.path().join("upload.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.path().join("processing.lock")
    }
}

pub struct HarnessBuilder {
    dir: TempDir,
    store: FakeArchiveStore,
    notifier: RecordingNotifier,
    runner: Option<Box<dyn FnOnce(ScriptedRunner, &Path) -> ScriptedRunner>>,
    export_record: Option<String>,
}

impl HarnessBuilder {
    pub fn new(store: FakeArchiveStore) -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
            store,
            notifier: RecordingNotifier::default(),
            runner: None,
            export_record: None,
        }
    }

    pub fn export_record(mut self, contents: impl Into<String>) -> Self {
        self.export_record = Some(contents.into());
        self
    }

    pub fn local_end_date(self, end_date: DateTime<Utc>) -> Self {
        self.export_record(export_record_json(end_date))
    }

    pub fn notifier(mut self, notifier: RecordingNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Configure the runner; the closure also receives the export record path
    pub fn runner(mut self, configure: impl FnOnce(ScriptedRunner, &Path) -> ScriptedRunner + 'static) -> Self {
        self.runner = Some(Box::new(configure));
        self
    }

    pub fn build(self) -> Harness {
        let export_record_path = self.dir.path().join("upload.json");
        let lock_path = self.dir.path().join("processing.lock");

        if let Some(contents) = &self.export_record {
            std::fs::write(&export_record_path, contents).expect("write export record");
        }

        let mut runner = ScriptedRunner::new(&lock_path);
        if let Some(configure) = self.runner {
            runner = configure(runner, &export_record_path);
        }

        let store = Arc::new(self.store);
        let notifier = Arc::new(self.notifier);
        let runner = Arc::new(runner);

        let trigger = Arc::new(UpdateTrigger::new(
            TriggerSettings {
                account_id: ACCOUNT_ID.to_string(),
                export_record_path,
                lock_path,
                stale_lock_after: Some(Duration::from_secs(3600)),
            },
            store.clone(),
            notifier.clone(),
            runner.clone(),
        ));

        Harness {
            dir: self.dir,
            store,
            notifier,
            runner,
            trigger,
        }
    }
}
