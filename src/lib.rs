/// Tweet Stats Updater Library
///
/// This library provides the update trigger that keeps the tweet-analytics
/// artifacts current, its collaborators (archive store, mailer, process
/// runner, lock marker), configuration, the HTTP surface and the dashboard
/// statistics transforms.

pub mod archive_store;
pub mod artifacts;
pub mod config;
pub mod dates;
pub mod error;
pub mod export_record;
pub mod http_server;
pub mod lock;
pub mod notifier;
pub mod processor;
pub mod scheduler;
pub mod stats;
pub mod update_trigger;
