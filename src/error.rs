/// Error types for the update trigger
///
/// Every failure of a trigger invocation maps to one `UpdateError` variant.
/// Notification failures have their own type because they are only ever
/// logged and never abort an update.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpdateError {
    /// The archive store query failed or returned no rows
    #[error("Remote query failed: {0}")]
    RemoteQuery(String),

    /// The export-record file is missing or malformed
    #[error("Local state error: {0}")]
    LocalState(String),

    /// The external processing command failed
    #[error("Processing failed: {0}")]
    Processing(#[from] ProcessingError),
}

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("`{command}` timed out after {seconds}s")]
    TimedOut { command: String, seconds: u64 },

    #[error("lock marker error: {0}")]
    Lock(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("mail request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("mail API returned {status}: {body}")]
    Rejected { status: u16, body: String },
}
