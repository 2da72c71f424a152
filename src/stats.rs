/// Dashboard transforms over the precomputed artifacts
///
/// Pure functions: rankings of self-quoted tweets (raw and age-normalised),
/// per-month quote counts, thread rankings and the home-page summary.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use crate::artifacts::{ExportRange, SelfQuoteTweet, Thread, ThreadStatistics, TweetResult, TWEET_NOT_FOUND};
use crate::dates::parse_timestamp;

/// Tweets younger than this are left out of the normalised ranking
pub const MIN_MONTHS_FOR_NORMALIZED: i64 = 3;

/// Calendar months between two instants, ignoring the day of month
pub fn months_since(reference: DateTime<Utc>, created: DateTime<Utc>) -> i64 {
    (reference.year() as i64 - created.year() as i64) * 12
        + (reference.month() as i64 - created.month() as i64)
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedTweet {
    #[serde(flatten)]
    pub tweet: TweetResult,
    pub months_since: i64,
    pub quotes_per_month: f64,
}

/// Rank self-quoted tweets by total quotes or, when `normalized`, by quotes
/// per month of age. Placeholder records for missing tweets are dropped, and
/// so are tweets without a parseable creation date.
pub fn rank_tweets(
    tweets: &[TweetResult],
    reference: DateTime<Utc>,
    normalized: bool,
    limit: usize,
) -> Vec<RankedTweet> {
    let mut ranked: Vec<RankedTweet> = tweets
        .iter()
        .filter(|tweet| tweet.tweet_text != TWEET_NOT_FOUND)
        .filter_map(|tweet| {
            let created = tweet.created_at.as_deref().and_then(parse_timestamp)?;
            let months = months_since(reference, created);
            let quotes_per_month = if months >= MIN_MONTHS_FOR_NORMALIZED {
                tweet.count as f64 / months as f64
            } else {
                0.0
            };
            Some(RankedTweet {
                tweet: tweet.clone(),
                months_since: months,
                quotes_per_month,
            })
        })
        .collect();

    if normalized {
        ranked.retain(|t| t.months_since >= MIN_MONTHS_FOR_NORMALIZED);
        ranked.sort_by(|a, b| b.quotes_per_month.total_cmp(&a.quotes_per_month));
    } else {
        ranked.sort_by(|a, b| b.tweet.count.cmp(&a.tweet.count));
    }

    ranked.truncate(limit);
    ranked
}

/// Quoted tweet id -> `YYYY-MM` -> number of self-quotes made that month
pub fn quotes_by_month(
    self_quotes: &[SelfQuoteTweet],
    handle: &str,
) -> HashMap<String, BTreeMap<String, u64>> {
    let needle = format!("twitter.com/{}/status/", handle);
    let mut by_tweet: HashMap<String, BTreeMap<String, u64>> = HashMap::new();

    for quote in self_quotes {
        let Some(quoted_id) = quote
            .entities
            .urls
            .iter()
            .filter_map(|url| url.expanded_url.as_deref())
            .find(|url| url.contains(&needle))
            .and_then(|url| url.rsplit('/').next())
            .filter(|id| !id.is_empty())
        else {
            continue;
        };

        let Some(created) = parse_timestamp(&quote.created_at) else {
            log::debug!("Skipping self-quote {} with bad created_at", quote.id_str);
            continue;
        };

        *by_tweet
            .entry(quoted_id.to_string())
            .or_default()
            .entry(created.format("%Y-%m").to_string())
            .or_default() += 1;
    }

    by_tweet
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadMetric {
    Length,
    Likes,
    Retweets,
    Duration,
}

impl FromStr for ThreadMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "length" | "bylength" => Ok(ThreadMetric::Length),
            "likes" | "bylikes" => Ok(ThreadMetric::Likes),
            "retweets" | "byretweets" => Ok(ThreadMetric::Retweets),
            "duration" | "byduration" => Ok(ThreadMetric::Duration),
            other => Err(format!("unknown thread metric: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedThread {
    pub id: String,
    pub length: u64,
    pub total_likes: u64,
    pub total_retweets: u64,
    pub duration_minutes: f64,
    pub start_date: String,
    pub end_date: String,
    pub first_tweet_text: Option<String>,
}

pub fn rank_threads(threads: &HashMap<String, Thread>, metric: ThreadMetric, limit: usize) -> Vec<RankedThread> {
    let mut ranked: Vec<RankedThread> = threads
        .iter()
        .map(|(id, thread)| {
            let meta = &thread.metadata;
            let duration_minutes = match (parse_timestamp(&meta.start_date), parse_timestamp(&meta.end_date)) {
                (Some(start), Some(end)) => (end - start).num_seconds() as f64 / 60.0,
                _ => 0.0,
            };
            RankedThread {
                id: id.clone(),
                length: meta.length,
                total_likes: meta.total_likes,
                total_retweets: meta.total_retweets,
                duration_minutes,
                start_date: meta.start_date.clone(),
                end_date: meta.end_date.clone(),
                first_tweet_text: thread.tweets.first().map(|t| t.text.clone()),
            }
        })
        .collect();

    // Ties broken by id so the order is stable across HashMap iteration
    ranked.sort_by(|a, b| {
        let primary = match metric {
            ThreadMetric::Length => b.length.cmp(&a.length),
            ThreadMetric::Likes => b.total_likes.cmp(&a.total_likes),
            ThreadMetric::Retweets => b.total_retweets.cmp(&a.total_retweets),
            ThreadMetric::Duration => b.duration_minutes.total_cmp(&a.duration_minutes),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    });

    ranked.truncate(limit);
    ranked
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_quotes: usize,
    pub unique_quoted_tweets: usize,
    pub total_tweets: u64,
    pub average_quotes_per_tweet: f64,
    pub upload: Option<ExportRange>,
    pub thread_stats: ThreadStatistics,
}

pub fn summary(
    tweet_results: &[TweetResult],
    self_quotes: &[SelfQuoteTweet],
    total_tweets: u64,
    upload: &[ExportRange],
    thread_stats: ThreadStatistics,
) -> Summary {
    let unique_quoted_tweets = tweet_results
        .iter()
        .filter(|tweet| tweet.tweet_text != TWEET_NOT_FOUND)
        .count();

    let average_quotes_per_tweet = if unique_quoted_tweets == 0 {
        0.0
    } else {
        self_quotes.len() as f64 / unique_quoted_tweets as f64
    };

    Summary {
        total_quotes: self_quotes.len(),
        unique_quoted_tweets,
        total_tweets,
        average_quotes_per_tweet,
        upload: upload.first().cloned(),
        thread_stats,
    }
}
