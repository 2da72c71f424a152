/// HTTP Server Module
///
/// Provides the scheduler-facing update endpoint, its status, and read-only
/// statistics computed from the published artifacts.

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::artifacts::ArtifactStore;
use crate::dates::{parse_timestamp, to_iso};
use crate::stats::{self, ThreadMetric};
use crate::update_trigger::{TriggerOutcome, UpdateTrigger};

const DEFAULT_TOP_TWEETS: usize = 200;
const DEFAULT_TOP_THREADS: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub cron_secret: String,
    pub trigger: Arc<UpdateTrigger>,
    pub artifacts: ArtifactStore,
    pub account_handle: String,
}

type ApiResponse = (StatusCode, Json<Value>);

/// Create and configure the HTTP server router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/cron", post(cron_endpoint))
        .route("/api/cron/status", get(cron_status_endpoint))
        .route("/api/stats/summary", get(summary_endpoint))
        .route("/api/stats/top-tweets", get(top_tweets_endpoint))
        .route("/api/stats/threads", get(threads_endpoint))
        .route("/api/stats/quotes-by-month", get(quotes_by_month_endpoint))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "tweet_stats_updater",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

/// Check the `Authorization: Bearer <secret>` header
fn is_authorized(headers: &HeaderMap, secret: &str) -> bool {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|token| constant_time_eq(token.as_bytes(), secret.as_bytes()))
        .unwrap_or(false)
}

/// Byte-wise comparison whose running time does not depend on where the inputs differ
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn unauthorized() -> ApiResponse {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" })))
}

fn server_error(message: impl std::fmt::Display) -> ApiResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message.to_string() })),
    )
}

/// Scheduler-triggered update check
async fn cron_endpoint(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    if !is_authorized(&headers, &state.cron_secret) {
        log::warn!("Rejected unauthorized update trigger request");
        return unauthorized();
    }

    log::info!("Update check triggered via HTTP endpoint");

    match state.trigger.check_and_maybe_process().await {
        Ok(outcome) => (StatusCode::OK, Json(outcome_body(&outcome))),
        Err(e) => {
            log::error!("Update check failed: {}", e);
            server_error(e)
        }
    }
}

fn outcome_body(outcome: &TriggerOutcome) -> Value {
    match outcome {
        TriggerOutcome::NoUpdate { current_end_date } => json!({
            "message": outcome.message(),
            "currentEndDate": to_iso(current_end_date),
        }),
        TriggerOutcome::InProgress {
            current_end_date,
            latest_archive_at,
        } => json!({
            "message": outcome.message(),
            "currentEndDate": to_iso(current_end_date),
            "latestArchiveAt": to_iso(latest_archive_at),
        }),
        TriggerOutcome::Completed {
            old_end_date,
            new_end_date,
        } => json!({
            "message": outcome.message(),
            "oldEndDate": to_iso(old_end_date),
            "newEndDate": to_iso(new_end_date),
        }),
    }
}

/// Get trigger status endpoint
async fn cron_status_endpoint(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    if !is_authorized(&headers, &state.cron_secret) {
        return unauthorized();
    }

    let status = state.trigger.status().await;
    let lock_held = crate::lock::LockMarker::is_held(&state.trigger.settings().lock_path);

    (
        StatusCode::OK,
        Json(json!({
            "lastCheck": status.last_check.as_ref().map(to_iso),
            "lastOutcome": status.last_outcome,
            "lastError": status.last_error,
            "lastCompleted": status.last_completed.as_ref().map(to_iso),
            "totalChecks": status.total_checks,
            "totalRuns": status.total_runs,
            "processing": lock_held,
        })),
    )
}

async fn summary_endpoint(State(state): State<AppState>) -> ApiResponse {
    let artifacts = &state.artifacts;
    let loaded = tokio::try_join!(
        artifacts.tweet_results(),
        artifacts.self_quotes(),
        artifacts.total_tweets(),
        artifacts.export_ranges(),
        artifacts.thread_statistics(),
    );

    match loaded {
        Ok((tweet_results, self_quotes, total_tweets, upload, thread_stats)) => {
            let summary = stats::summary(&tweet_results, &self_quotes, total_tweets, &upload, thread_stats);
            (StatusCode::OK, Json(json!(summary)))
        }
        Err(e) => {
            log::error!("Failed to load artifacts for summary: {:#}", e);
            server_error(format!("{:#}", e))
        }
    }
}

#[derive(Debug, Deserialize)]
struct TopTweetsQuery {
    #[serde(default)]
    normalized: bool,
    limit: Option<usize>,
}

async fn top_tweets_endpoint(State(state): State<AppState>, Query(query): Query<TopTweetsQuery>) -> ApiResponse {
    let loaded = tokio::try_join!(state.artifacts.tweet_results(), state.artifacts.export_ranges());

    let (tweets, upload) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => return server_error(format!("{:#}", e)),
    };

    let Some(reference) = upload.first().and_then(|range| parse_timestamp(&range.end_date)) else {
        return server_error("upload.json has no usable endDate");
    };

    let limit = query.limit.unwrap_or(DEFAULT_TOP_TWEETS);
    let ranked = stats::rank_tweets(&tweets, reference, query.normalized, limit);

    (
        StatusCode::OK,
        Json(json!({
            "normalized": query.normalized,
            "uploadDate": to_iso(&reference),
            "tweets": ranked,
        })),
    )
}

#[derive(Debug, Deserialize)]
struct ThreadsQuery {
    metric: Option<String>,
    limit: Option<usize>,
}

async fn threads_endpoint(State(state): State<AppState>, Query(query): Query<ThreadsQuery>) -> ApiResponse {
    let metric = match query.metric.as_deref().unwrap_or("length").parse::<ThreadMetric>() {
        Ok(metric) => metric,
        Err(message) => return (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))),
    };

    let threads = match state.artifacts.threads().await {
        Ok(threads) => threads,
        Err(e) => return server_error(format!("{:#}", e)),
    };

    let ranked = stats::rank_threads(&threads, metric, query.limit.unwrap_or(DEFAULT_TOP_THREADS));

    (
        StatusCode::OK,
        Json(json!({
            "metric": metric,
            "totalThreads": threads.len(),
            "threads": ranked,
        })),
    )
}

async fn quotes_by_month_endpoint(State(state): State<AppState>) -> ApiResponse {
    match state.artifacts.self_quotes().await {
        Ok(quotes) => (
            StatusCode::OK,
            Json(json!(stats::quotes_by_month(&quotes, &state.account_handle))),
        ),
        Err(e) => server_error(format!("{:#}", e)),
    }
}

/// Start the HTTP server
pub async fn start_server(state: AppState, port: u16) -> Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .context("Failed to bind HTTP server")?;

    log::info!("HTTP server listening on port {}", port);

    axum::serve(listener, app)
        .await
        .context("HTTP server error")?;

    Ok(())
}
