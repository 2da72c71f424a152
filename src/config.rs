/// Configuration module for managing environment variables and secrets
///
/// This module loads and validates all configuration values from environment
/// variables (typically from a .env file).

use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Where the archive-upload events are read from
#[derive(Debug, Clone)]
pub enum ArchiveSource {
    /// Direct Postgres connection
    Postgres { database_url: String },
    /// Supabase REST (PostgREST) endpoint
    Rest { base_url: String, api_key: String },
}

/// HTTP email API settings
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
    pub sender: String,
    pub recipient: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Shared secret the scheduler sends as `Authorization: Bearer <secret>`
    pub cron_secret: String,

    /// Account whose archive uploads are tracked
    pub account_id: String,

    /// Table holding archive-upload events
    pub archive_table: String,

    pub archive_source: ArchiveSource,

    /// Local export-record file (`upload.json`)
    pub export_record_path: PathBuf,

    /// Lock marker file present while processing runs
    pub lock_path: PathBuf,

    /// Processing command line, split on whitespace
    pub process_command: String,

    pub process_workdir: Option<PathBuf>,

    pub process_timeout: Duration,

    /// Mail API settings; notifications are only logged when unset
    pub mail: Option<MailConfig>,

    pub mail_subject_prefix: String,

    /// Directory with the JSON artifacts served by the stats endpoints
    pub artifacts_dir: PathBuf,

    /// Account handle used to recognise self-quote links
    pub account_handle: String,

    /// In-process check interval; `None` leaves scheduling to an external cron
    pub check_interval: Option<Duration>,

    /// Port for the HTTP server
    pub http_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a required variable is missing or a value is invalid
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let archive_table = env::var("ARCHIVE_TABLE").unwrap_or_else(|_| "archive_upload".to_string());
        if !is_identifier(&archive_table) {
            bail!("ARCHIVE_TABLE must be a plain table name, got {:?}", archive_table);
        }

        Ok(Config {
            cron_secret: env::var("CRON_SECRET")
                .ok()
                .filter(|s| !s.is_empty())
                .context("CRON_SECRET must be set")?,

            account_id: env::var("ARCHIVE_ACCOUNT_ID").unwrap_or_else(|_| "16884623".to_string()),

            archive_table,

            archive_source: Self::detect_archive_source()?,

            export_record_path: env::var("EXPORT_RECORD_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("upload.json")),

            lock_path: env::var("LOCK_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("processing.lock")),

            process_command: env::var("PROCESS_COMMAND")
                .unwrap_or_else(|_| "python3 process_all.py".to_string()),

            process_workdir: env::var("PROCESS_WORKDIR").ok().map(PathBuf::from),

            process_timeout: Duration::from_secs(
                env::var("PROCESS_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3600),
            ),

            mail: Self::mail_from_env(),

            mail_subject_prefix: env::var("MAIL_SUBJECT_PREFIX")
                .unwrap_or_else(|_| "Tweet analyser".to_string()),

            artifacts_dir: env::var("ARTIFACTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("public")),

            account_handle: env::var("ACCOUNT_HANDLE").unwrap_or_else(|_| "visakanv".to_string()),

            check_interval: env::var("CHECK_INTERVAL_MINUTES")
                .ok()
                .and_then(|v| parse_interval_minutes(&v)),

            http_port: env::var("HTTP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| {
                    // Fall back to the platform-provided PORT, then 3000
                    env::var("PORT")
                        .ok()
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(3000)
                }),
        })
    }

    /// Postgres wins when both are configured
    fn detect_archive_source() -> Result<ArchiveSource> {
        if let Ok(database_url) = env::var("DATABASE_URL") {
            if !database_url.is_empty() {
                return Ok(ArchiveSource::Postgres { database_url });
            }
        }

        match (env::var("SUPABASE_URL"), env::var("SUPABASE_KEY")) {
            (Ok(base_url), Ok(api_key)) if !base_url.is_empty() && !api_key.is_empty() => {
                let base_url = if base_url.starts_with("http://") || base_url.starts_with("https://") {
                    base_url
                } else {
                    format!("https://{}", base_url)
                };
                Ok(ArchiveSource::Rest { base_url, api_key })
            }
            _ => bail!("Either DATABASE_URL or SUPABASE_URL and SUPABASE_KEY must be set"),
        }
    }

    fn mail_from_env() -> Option<MailConfig> {
        let config = MailConfig {
            api_url: env::var("MAIL_API_URL").ok()?,
            api_key: env::var("MAIL_API_KEY").ok()?,
            sender: env::var("MAIL_SENDER").ok()?,
            recipient: env::var("MAIL_RECIPIENT").ok()?,
        };
        Some(config)
    }

    /// Validate that the archive store is reachable
    pub async fn validate(&self) -> Result<()> {
        log::info!("Validating configuration...");

        match &self.archive_source {
            ArchiveSource::Postgres { database_url } => {
                let pool = crate::archive_store::connect_pool(database_url, 1).await?;

                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("Database connection test query failed")?;

                pool.close().await;
            }
            ArchiveSource::Rest { base_url, .. } => {
                log::info!("Using Supabase REST archive store at {}", base_url);
            }
        }

        if self.mail.is_none() {
            log::warn!("MAIL_* variables not set - notifications will only be logged");
        }

        if !self.export_record_path.exists() {
            log::warn!(
                "Export record {} does not exist yet - checks will fail until it is created",
                self.export_record_path.display()
            );
        }

        log::info!("Configuration validated successfully");
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Minutes to a scheduler interval; zero, garbage and overflowing values disable it
fn parse_interval_minutes(raw: &str) -> Option<Duration> {
    match raw.trim().parse::<u64>().ok()? {
        0 => None,
        minutes => match minutes.checked_mul(60) {
            Some(secs) => Some(Duration::from_secs(secs)),
            None => {
                log::warn!("CHECK_INTERVAL_MINUTES={} is too large, scheduler disabled", minutes);
                None
            }
        },
    }
}
