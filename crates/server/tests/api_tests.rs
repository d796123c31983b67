//! In-process API tests.
//!
//! Run with: cargo test -p ingest-server --test api_tests

mod common;

use axum::http::StatusCode;
use common::{fixtures, TestFixture};

#[tokio::test]
async fn test_health_reports_version() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert_eq!(response.body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_config_returns_effective_values() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/config").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["color"]["target_colorspace"], "Rec709");
    assert_eq!(response.body["transcode"]["container"], "mxf");
    assert_eq!(response.body["processing"]["poll_interval_secs"], 15);
}

#[tokio::test]
async fn test_status_starts_idle() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/status").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["state"], "idle");
    assert_eq!(response.body["paused"], false);
    assert!(response.body["active_job"].is_null());
    assert_eq!(response.body["counters"]["processed"], 0);
}

#[tokio::test]
async fn test_status_and_history_after_jobs() {
    let fixture = TestFixture::new();
    fixture.transcoder.fail_for_stem("B002").await;

    fixture.ingest("A001.mov").await;
    fixture.ingest("B002.mov").await;

    let status = fixture.get("/api/status").await;
    assert_eq!(status.body["counters"]["processed"], 1);
    assert_eq!(status.body["counters"]["failed"], 1);
    assert!(!status.body["log_tail"].as_array().unwrap().is_empty());

    let history = fixture.get("/api/history").await;
    assert_eq!(history.status, StatusCode::OK);
    assert_eq!(history.body["total"], 2);
    let records = history.body["records"].as_array().unwrap();
    assert_eq!(records[0]["file_name"], "B002.mov");
    assert_eq!(records[0]["result"], "failure");
    assert_eq!(records[0]["reason"], "TRANSCODE_FAILED");
    assert_eq!(records[1]["file_name"], "A001.mov");
    assert_eq!(records[1]["result"], "success");
}

#[tokio::test]
async fn test_folder_listing() {
    let fixture = TestFixture::new();
    fixtures::write_file(&fixture.config.paths.watch, "C003.mov", 1_234);
    fixtures::write_file(&fixture.config.paths.watch, ".hidden", 10);

    let response = fixture.get("/api/folders/watch").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["folder"], "watch");
    let files = response.body["files"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["name"], "C003.mov");
    assert_eq!(files[0]["size_bytes"], 1_234);
}

#[tokio::test]
async fn test_unknown_folder_is_404() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/folders/secrets").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("secrets"));
}

#[tokio::test]
async fn test_logs_tail_is_bounded() {
    let fixture = TestFixture::new();
    let lines: Vec<String> = (1..=1500).map(|i| format!("line {}", i)).collect();
    std::fs::write(fixture.config.paths.log_file(), lines.join("\n")).unwrap();

    let default = fixture.get("/api/logs").await;
    assert_eq!(default.status, StatusCode::OK);
    let tail = default.body["lines"].as_array().unwrap();
    assert_eq!(tail.len(), 100);
    assert_eq!(tail[99], "line 1500");

    let capped = fixture.get("/api/logs?lines=5000").await;
    assert_eq!(capped.body["lines"].as_array().unwrap().len(), 1000);

    let few = fixture.get("/api/logs?lines=3").await;
    assert_eq!(few.body["lines"][0], "line 1498");
}

#[tokio::test]
async fn test_logs_without_file_is_empty() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/logs").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["lines"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_pause_and_resume() {
    let fixture = TestFixture::new();

    let paused = fixture.post("/api/control/pause").await;
    assert_eq!(paused.status, StatusCode::OK);
    assert_eq!(paused.body["paused"], true);
    assert!(fixture.orchestrator.control().is_paused());

    fixture.orchestrator.refresh_status().await;
    let status = fixture.get("/api/status").await;
    assert_eq!(status.body["state"], "paused");

    let resumed = fixture.post("/api/control/resume").await;
    assert_eq!(resumed.body["paused"], false);
    assert!(!fixture.orchestrator.control().is_paused());
}

#[tokio::test]
async fn test_read_endpoints_reject_post() {
    let fixture = TestFixture::new();

    let response = fixture.post("/api/status").await;

    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_metrics_exposition() {
    let fixture = TestFixture::new();
    fixture.get("/api/health").await;

    let response = fixture.get("/metrics").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.text.contains("ingest_http_requests_total"));
    assert!(response.text.contains("ingest_engine_paused"));
}
