/// Archive Store Module
///
/// Queries the remote table of archive-upload events for the newest event of
/// one account. Two backends: a direct Postgres connection (sqlx) and the
/// Supabase REST interface (PostgREST over reqwest).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;

use crate::dates::parse_timestamp;
use crate::error::UpdateError;

/// A remote record saying a new raw export became available
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEvent {
    pub account_id: String,
    pub archive_at: DateTime<Utc>,
}

#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Newest archive event for `account_id`, or `RemoteQuery` if there is none
    async fn latest_archive(&self, account_id: &str) -> Result<ArchiveEvent, UpdateError>;
}

/// Direct Postgres access to the archive table
pub struct PgArchiveStore {
    db_pool: PgPool,
    table: String,
}

impl PgArchiveStore {
    pub async fn connect(database_url: &str, table: &str) -> Result<Self> {
        let db_pool = connect_pool(database_url, 5).await?;
        Ok(Self::with_pool(db_pool, table))
    }

    pub fn with_pool(db_pool: PgPool, table: &str) -> Self {
        Self {
            db_pool,
            table: table.to_string(),
        }
    }
}

/// Open a Postgres pool, disabling statement timeouts behind a pgBouncer pooler
pub async fn connect_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let use_pooler = database_url.contains(":6543") || database_url.contains("pgbouncer=true");

    let mut pool_options = sqlx::postgres::PgPoolOptions::new().max_connections(max_connections);

    if use_pooler {
        log::info!("Using connection pooler - disabling statement timeout");
        pool_options = pool_options.after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("SET statement_timeout = 0").execute(conn).await?;
                Ok(())
            })
        });
    }

    pool_options
        .connect(database_url)
        .await
        .context("Failed to connect to PostgreSQL")
}

#[async_trait]
impl ArchiveStore for PgArchiveStore {
    async fn latest_archive(&self, account_id: &str) -> Result<ArchiveEvent, UpdateError> {
        // Table name is validated as an identifier when the config is loaded
        let query = format!(
            "SELECT account_id::text, archive_at::timestamptz FROM {} \
             WHERE account_id::text = $1 ORDER BY archive_at DESC LIMIT 1",
            self.table
        );

        let row: Option<(String, DateTime<Utc>)> = sqlx::query_as(&query)
            .bind(account_id)
            .fetch_optional(&self.db_pool)
            .await
            .map_err(|e| UpdateError::RemoteQuery(e.to_string()))?;

        let (account_id, archive_at) = row.ok_or_else(|| {
            UpdateError::RemoteQuery(format!("no archive events for account {}", account_id))
        })?;

        Ok(ArchiveEvent {
            account_id,
            archive_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ArchiveRow {
    archive_at: String,
}

/// Supabase REST (PostgREST) access to the archive table
pub struct RestArchiveStore {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    table: String,
}

impl RestArchiveStore {
    pub fn new(http_client: reqwest::Client, base_url: &str, api_key: &str, table: &str) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            table: table.to_string(),
        }
    }
}

#[async_trait]
impl ArchiveStore for RestArchiveStore {
    async fn latest_archive(&self, account_id: &str) -> Result<ArchiveEvent, UpdateError> {
        let url = format!("{}/rest/v1/{}", self.base_url, self.table);
        let account_filter = format!("eq.{}", account_id);

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .query(&[
                ("select", "archive_at"),
                ("account_id", account_filter.as_str()),
                ("order", "archive_at.desc"),
                ("limit", "1"),
            ])
            .send()
            .await
            .map_err(|e| UpdateError::RemoteQuery(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpdateError::RemoteQuery(format!(
                "archive store returned {}: {}",
                status, body
            )));
        }

        let rows: Vec<ArchiveRow> = response
            .json()
            .await
            .map_err(|e| UpdateError::RemoteQuery(format!("invalid response: {}", e)))?;

        let row = rows.into_iter().next().ok_or_else(|| {
            UpdateError::RemoteQuery(format!("no archive events for account {}", account_id))
        })?;

        let archive_at = parse_timestamp(&row.archive_at).ok_or_else(|| {
            UpdateError::RemoteQuery(format!("unparseable archive_at: {:?}", row.archive_at))
        })?;

        Ok(ArchiveEvent {
            account_id: account_id.to_string(),
            archive_at,
        })
    }
}
