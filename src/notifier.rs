/// Notification Module
///
/// Operational emails for the update flow: one when new data is detected and
/// one when processing completes. Failures here are never fatal to the flow.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;
use crate::dates::to_iso;
use crate::error::NotificationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Detected,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateNotification {
    pub kind: NotificationKind,
    pub old_end_date: DateTime<Utc>,
    pub new_end_date: DateTime<Utc>,
}

/// Rendered email content
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl UpdateNotification {
    pub fn render(&self, subject_prefix: &str) -> EmailMessage {
        let title = format!("{} - Data Update Notification", subject_prefix);
        let old = to_iso(&self.old_end_date);
        let new = to_iso(&self.new_end_date);

        let (headline, summary) = match self.kind {
            NotificationKind::Detected => (
                "New tweet data detected. Processing has been started.",
                "New data detected!",
            ),
            NotificationKind::Completed => (
                "Tweet data has been updated. Check it worked correctly.",
                "Data has been updated!",
            ),
        };

        EmailMessage {
            subject: title.clone(),
            html: format!(
                "<h2>{}</h2>\n<p>{}</p>\n<p><strong>Old End Date:</strong> {}</p>\n<p><strong>New End Date:</strong> {}</p>",
                title, headline, old, new
            ),
            text: format!("{}\nOld End Date: {}\nNew End Date: {}", summary, old, new),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &UpdateNotification) -> Result<(), NotificationError>;
}

/// Mailer when mail is configured, otherwise a notifier that only logs
pub fn notifier_from_config(config: &Config, http_client: reqwest::Client) -> Arc<dyn Notifier> {
    match &config.mail {
        Some(mail) => Arc::new(HttpMailer::new(
            http_client,
            mail.api_url.clone(),
            mail.api_key.clone(),
            mail.sender.clone(),
            mail.recipient.clone(),
            config.mail_subject_prefix.clone(),
        )),
        None => Arc::new(LogNotifier::new(config.mail_subject_prefix.clone())),
    }
}

#[derive(Debug, Serialize)]
struct MailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

/// Sends mail through an HTTP email API (`POST` JSON with bearer auth)
pub struct HttpMailer {
    http_client: reqwest::Client,
    api_url: String,
    api_key: String,
    sender: String,
    recipient: String,
    subject_prefix: String,
}

impl HttpMailer {
    pub fn new(
        http_client: reqwest::Client,
        api_url: String,
        api_key: String,
        sender: String,
        recipient: String,
        subject_prefix: String,
    ) -> Self {
        Self {
            http_client,
            api_url,
            api_key,
            sender,
            recipient,
            subject_prefix,
        }
    }
}

#[async_trait]
impl Notifier for HttpMailer {
    async fn notify(&self, notification: &UpdateNotification) -> Result<(), NotificationError> {
        let message = notification.render(&self.subject_prefix);

        let request = MailRequest {
            from: &self.sender,
            to: vec![self.recipient.as_str()],
            subject: &message.subject,
            html: &message.html,
            text: &message.text,
        };

        let response = self
            .http_client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        log::info!("Email notification sent to {}", self.recipient);
        Ok(())
    }
}

/// Writes notifications to the log; used when no mail API is configured
pub struct LogNotifier {
    subject_prefix: String,
}

impl LogNotifier {
    pub fn new(subject_prefix: String) -> Self {
        Self { subject_prefix }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &UpdateNotification) -> Result<(), NotificationError> {
        let message = notification.render(&self.subject_prefix);
        log::info!("{}: {}", message.subject, message.text.replace('\n', " | "));
        Ok(())
    }
}
