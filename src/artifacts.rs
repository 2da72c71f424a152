/// Artifacts Module
///
/// Typed views of the JSON files produced by the processing pipeline and read
/// by the dashboard. The shapes are owned by the pipeline; this module only
/// deserialises them.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const UPLOAD_FILE: &str = "upload.json";
pub const TWEET_RESULTS_FILE: &str = "tweet_results.json";
pub const SELF_QUOTES_FILE: &str = "selfQuotedTweets.json";
pub const TOTAL_TWEETS_FILE: &str = "totalTweetLength.json";
pub const THREADS_FILE: &str = "twitter_threads.json";
pub const THREAD_STATISTICS_FILE: &str = "thread_statistics.json";

/// Placeholder text the pipeline writes for quoted tweets missing from the export
pub const TWEET_NOT_FOUND: &str = "Tweet not found";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRange {
    #[serde(default)]
    pub start_date: Option<String>,
    pub end_date: String,
}

/// A tweet together with how often it was self-quoted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TweetResult {
    pub tweet_id: String,
    pub tweet_text: String,
    #[serde(default)]
    pub created_at: Option<String>,
    pub count: u64,
    #[serde(default, deserialize_with = "lenient_optional_count")]
    pub favorite_count: Option<u64>,
    #[serde(default, deserialize_with = "lenient_optional_count")]
    pub retweet_count: Option<u64>,
    #[serde(default)]
    pub in_reply_to_screen_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TweetUrl {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub expanded_url: Option<String>,
    #[serde(default)]
    pub display_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TweetEntities {
    #[serde(default)]
    pub urls: Vec<TweetUrl>,
}

/// A raw archive tweet that quotes an earlier tweet by the same author
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfQuoteTweet {
    pub id_str: String,
    #[serde(default)]
    pub full_text: String,
    pub created_at: String,
    #[serde(default)]
    pub entities: TweetEntities,
    #[serde(default)]
    pub in_reply_to_screen_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub favorite_count: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub retweet_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMetadata {
    pub length: u64,
    pub total_likes: u64,
    pub total_retweets: u64,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadTweet {
    pub tweet_id: String,
    pub text: String,
    pub created_at: String,
    pub order: u64,
    #[serde(default)]
    pub favorite_count: u64,
    #[serde(default)]
    pub retweet_count: u64,
    #[serde(default)]
    pub urls: Vec<TweetUrl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub metadata: ThreadMetadata,
    pub tweets: Vec<ThreadTweet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongestThread {
    pub length: u64,
    pub thread_id: String,
    pub first_tweet_text: String,
    pub total_likes: u64,
    pub total_retweets: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadStatistics {
    pub total_threads: u64,
    pub longest_thread: Option<LongestThread>,
    pub average_thread_length: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Count {
    Number(u64),
    Text(String),
}

impl Count {
    fn value(self) -> Option<u64> {
        match self {
            Count::Number(n) => Some(n),
            Count::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// The archive stores counts as strings ("12"); the pipeline as numbers
fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Count::deserialize(deserializer)?.value().unwrap_or(0))
}

/// Like [`lenient_count`], but `null` (a quoted tweet missing from the export) stays `None`
fn lenient_optional_count<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Count>::deserialize(deserializer)?.and_then(Count::value))
}

/// Reads artifacts from the directory the pipeline publishes into
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn load<T: DeserializeOwned>(&self, file: &str) -> Result<T> {
        let path = self.dir.join(file);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub async fn export_ranges(&self) -> Result<Vec<ExportRange>> {
        self.load(UPLOAD_FILE).await
    }

    pub async fn tweet_results(&self) -> Result<Vec<TweetResult>> {
        self.load(TWEET_RESULTS_FILE).await
    }

    pub async fn self_quotes(&self) -> Result<Vec<SelfQuoteTweet>> {
        self.load(SELF_QUOTES_FILE).await
    }

    pub async fn total_tweets(&self) -> Result<u64> {
        self.load(TOTAL_TWEETS_FILE).await
    }

    pub async fn threads(&self) -> Result<HashMap<String, Thread>> {
        self.load(THREADS_FILE).await
    }

    pub async fn thread_statistics(&self) -> Result<ThreadStatistics> {
        self.load(THREAD_STATISTICS_FILE).await
    }
}
