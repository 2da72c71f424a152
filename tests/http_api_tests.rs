//! HTTP API tests
//!
//! Exercises the router with `tower::ServiceExt::oneshot`, backed by the
//! in-memory trigger collaborators and artifacts written to a temp dir.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{utc, FakeArchiveStore, Harness, HarnessBuilder};
use tweet_stats_updater::artifacts::ArtifactStore;
use tweet_stats_updater::http_server::{create_router, AppState};

const SECRET: &str = "test-cron-secret";

fn app(h: &Harness) -> axum::Router {
    create_router(AppState {
        cron_secret: SECRET.to_string(),
        trigger: h.trigger.clone(),
        artifacts: ArtifactStore::new(h.dir.path()),
        account_handle: "visakanv".to_string(),
    })
}

async fn send(app: &axum::Router, method: Method, path: &str, token: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        request = request.header("authorization", format!("Bearer {}", token));
    }
    let request = request.body(Body::empty()).unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn health_check() {
    let h = HarnessBuilder::new(FakeArchiveStore::returning(utc(2024, 1, 1))).build();
    let (status, body) = send(&app(&h), Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_or_wrong_token_is_rejected_without_side_effects() {
    let h = HarnessBuilder::new(FakeArchiveStore::returning(utc(2024, 2, 15)))
        .local_end_date(utc(2024, 1, 1))
        .build();
    let app = app(&h);

    for token in [None, Some("wrong-secret"), Some("")] {
        let (status, body) = send(&app, Method::POST, "/api/cron", token).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "Unauthorized" }));
    }

    assert_eq!(h.store.calls(), 0);
    assert_eq!(h.runner.calls(), 0);
    assert!(h.notifier.kinds().is_empty());
}

#[tokio::test]
async fn equal_dates_report_no_update() {
    let h = HarnessBuilder::new(FakeArchiveStore::returning(utc(2024, 1, 1)))
        .local_end_date(utc(2024, 1, 1))
        .build();

    let (status, body) = send(&app(&h), Method::POST, "/api/cron", Some(SECRET)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "message": "No updates needed",
            "currentEndDate": "2024-01-01T00:00:00.000Z"
        })
    );
    assert_eq!(h.runner.calls(), 0);
}

#[tokio::test]
async fn newer_archive_reports_completed_update() {
    let h = HarnessBuilder::new(FakeArchiveStore::returning(utc(2024, 2, 15)))
        .local_end_date(utc(2024, 1, 1))
        .build();

    let (status, body) = send(&app(&h), Method::POST, "/api/cron", Some(SECRET)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "message": "Data updated and processing completed",
            "oldEndDate": "2024-01-01T00:00:00.000Z",
            "newEndDate": "2024-02-15T00:00:00.000Z"
        })
    );
    assert_eq!(h.runner.calls(), 1);
    assert_eq!(h.notifier.kinds().len(), 2);
}

#[tokio::test]
async fn held_lock_reports_in_progress() {
    let h = HarnessBuilder::new(FakeArchiveStore::returning(utc(2024, 2, 15)))
        .local_end_date(utc(2024, 1, 1))
        .build();
    std::fs::write(h.lock_path(), "2024-02-15T00:00:00Z").unwrap();

    let (status, body) = send(&app(&h), Method::POST, "/api/cron", Some(SECRET)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Processing already in progress");
    assert_eq!(body["latestArchiveAt"], "2024-02-15T00:00:00.000Z");
    assert_eq!(h.runner.calls(), 0);
}

#[tokio::test]
async fn remote_failure_is_500_with_message() {
    let h = HarnessBuilder::new(FakeArchiveStore::failing("relation \"archive_upload\" does not exist"))
        .local_end_date(utc(2024, 1, 1))
        .build();

    let (status, body) = send(&app(&h), Method::POST, "/api/cron", Some(SECRET)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("archive_upload"));
    assert!(!h.lock_path().exists());
}

#[tokio::test]
async fn malformed_export_record_is_500() {
    let h = HarnessBuilder::new(FakeArchiveStore::returning(utc(2024, 2, 15)))
        .export_record("[{\"endDate\": ")
        .build();

    let (status, body) = send(&app(&h), Method::POST, "/api/cron", Some(SECRET)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
    assert_eq!(h.runner.calls(), 0);
}

#[tokio::test]
async fn failed_processing_is_500() {
    let h = HarnessBuilder::new(FakeArchiveStore::returning(utc(2024, 2, 15)))
        .local_end_date(utc(2024, 1, 1))
        .runner(|runner, _| runner.failing())
        .build();

    let (status, body) = send(&app(&h), Method::POST, "/api/cron", Some(SECRET)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().starts_with("Processing failed"));
    assert!(!h.lock_path().exists());
}

#[tokio::test]
async fn cron_only_accepts_post() {
    let h = HarnessBuilder::new(FakeArchiveStore::returning(utc(2024, 1, 1))).build();
    let (status, _) = send(&app(&h), Method::GET, "/api/cron", Some(SECRET)).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn status_requires_auth_and_reports_counters() {
    let h = HarnessBuilder::new(FakeArchiveStore::returning(utc(2024, 1, 1)))
        .local_end_date(utc(2024, 1, 1))
        .build();
    let app = app(&h);

    let (status, _) = send(&app, Method::GET, "/api/cron/status", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    send(&app, Method::POST, "/api/cron", Some(SECRET)).await;
    let (status, body) = send(&app, Method::GET, "/api/cron/status", Some(SECRET)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalChecks"], 1);
    assert_eq!(body["totalRuns"], 0);
    assert_eq!(body["lastOutcome"], "No updates needed");
    assert_eq!(body["processing"], false);
}

fn write_artifacts(h: &Harness) {
    let dir = h.dir.path();
    std::fs::write(
        dir.join("upload.json"),
        r#"[{"startDate": "2009-01-01T00:00:00.000Z", "endDate": "2024-06-15T00:00:00.000Z"}]"#,
    )
    .unwrap();
    std::fs::write(
        dir.join("tweet_results.json"),
        json!([
            {"tweet_id": "1", "tweet_text": "old favourite", "created_at": "Mon Jan 01 00:00:00 +0000 2018",
             "count": 60, "favorite_count": "12", "retweet_count": "3", "retweeted": false,
             "user_mentions": [], "urls": [], "in_reply_to_screen_name": null},
            {"tweet_id": "2", "tweet_text": "recent hit", "created_at": "Sat Jun 01 00:00:00 +0000 2024",
             "count": 90, "favorite_count": "40", "retweet_count": "9", "retweeted": false,
             "user_mentions": [{"screen_name": "someone"}], "urls": [], "in_reply_to_screen_name": null},
            {"tweet_id": "3", "tweet_text": "Tweet not found", "created_at": null, "count": 500,
             "favorite_count": null, "retweet_count": null, "retweeted": null,
             "user_mentions": [], "urls": [], "in_reply_to_screen_name": null}
        ])
        .to_string(),
    )
    .unwrap();
    std::fs::write(
        dir.join("selfQuotedTweets.json"),
        json!([
            {"id_str": "10", "full_text": "see", "created_at": "Mon Jan 01 00:00:00 +0000 2018",
             "entities": {"urls": [{"expanded_url": "https://twitter.com/visakanv/status/1"}]}},
            {"id_str": "11", "full_text": "again", "created_at": "Thu Feb 01 00:00:00 +0000 2018",
             "entities": {"urls": [{"expanded_url": "https://twitter.com/visakanv/status/1"}]}}
        ])
        .to_string(),
    )
    .unwrap();
    std::fs::write(dir.join("totalTweetLength.json"), "4211").unwrap();
    std::fs::write(
        dir.join("thread_statistics.json"),
        json!({
            "total_threads": 1,
            "longest_thread": {"length": 3, "thread_id": "100", "first_tweet_text": "a thread",
                               "total_likes": 7, "total_retweets": 1},
            "average_thread_length": 3.0
        })
        .to_string(),
    )
    .unwrap();
    std::fs::write(
        dir.join("twitter_threads.json"),
        json!({
            "100": {
                "metadata": {"length": 3, "total_likes": 7, "total_retweets": 1,
                             "start_date": "Mon Jan 01 00:00:00 +0000 2018",
                             "end_date": "Mon Jan 01 01:00:00 +0000 2018"},
                "tweets": [{"tweet_id": "100", "text": "a thread", "created_at": "Mon Jan 01 00:00:00 +0000 2018",
                            "order": 1, "favorite_count": 7, "retweet_count": 1, "urls": []}]
            }
        })
        .to_string(),
    )
    .unwrap();
}

#[tokio::test]
async fn summary_from_artifacts() {
    let h = HarnessBuilder::new(FakeArchiveStore::returning(utc(2024, 1, 1))).build();
    write_artifacts(&h);

    let (status, body) = send(&app(&h), Method::GET, "/api/stats/summary", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalQuotes"], 2);
    assert_eq!(body["uniqueQuotedTweets"], 2);
    assert_eq!(body["totalTweets"], 4211);
    assert_eq!(body["upload"]["endDate"], "2024-06-15T00:00:00.000Z");
    assert_eq!(body["threadStats"]["longest_thread"]["length"], 3);
}

#[tokio::test]
async fn top_tweets_raw_and_normalized() {
    let h = HarnessBuilder::new(FakeArchiveStore::returning(utc(2024, 1, 1))).build();
    write_artifacts(&h);
    let app = app(&h);

    let (status, body) = send(&app, Method::GET, "/api/stats/top-tweets", None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<_> = body["tweets"].as_array().unwrap().iter().map(|t| t["tweet_id"].clone()).collect();
    assert_eq!(ids, vec![json!("2"), json!("1")]);
    assert_eq!(body["tweets"][0]["favorite_count"], 40);
    assert_eq!(body["tweets"][0]["retweet_count"], 9);

    let (status, body) = send(&app, Method::GET, "/api/stats/top-tweets?normalized=true&limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    let tweets = body["tweets"].as_array().unwrap();
    assert_eq!(tweets.len(), 1);
    assert_eq!(tweets[0]["tweet_id"], "1");
    assert_eq!(tweets[0]["months_since"], 77);
}

#[tokio::test]
async fn threads_ranking_and_bad_metric() {
    let h = HarnessBuilder::new(FakeArchiveStore::returning(utc(2024, 1, 1))).build();
    write_artifacts(&h);
    let app = app(&h);

    let (status, body) = send(&app, Method::GET, "/api/stats/threads?metric=duration", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metric"], "duration");
    assert_eq!(body["threads"][0]["id"], "100");
    assert_eq!(body["threads"][0]["duration_minutes"], 60.0);

    let (status, body) = send(&app, Method::GET, "/api/stats/threads?metric=size", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("size"));
}

#[tokio::test]
async fn quotes_by_month_groups_by_quoted_tweet() {
    let h = HarnessBuilder::new(FakeArchiveStore::returning(utc(2024, 1, 1))).build();
    write_artifacts(&h);

    let (status, body) = send(&app(&h), Method::GET, "/api/stats/quotes-by-month", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "1": { "2018-01": 1, "2018-02": 1 } }));
}

#[tokio::test]
async fn missing_artifacts_are_500() {
    let h = HarnessBuilder::new(FakeArchiveStore::returning(utc(2024, 1, 1))).build();

    let (status, body) = send(&app(&h), Method::GET, "/api/stats/summary", None).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("Failed to read"));
}
