//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that builds the router in-process
//! around a real status store and an orchestrator driven by mock tools.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use ingest_core::{
    testing::{MockColorProcessor, MockTranscoder},
    Config, IngestOrchestrator, OrchestratorConfig, PipelineConfig, PipelineRunner,
    StatusSnapshot, StatusStore,
};
use ingest_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use ingest_core::testing::fixtures;

pub type MockOrchestrator = IngestOrchestrator<MockColorProcessor, MockTranscoder>;

/// Test fixture for API testing.
///
/// The orchestrator is never started; tests drive it with explicit
/// `poll_watch_folder` / `process_next` calls.
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub config: Config,
    pub store: Arc<StatusStore>,
    pub orchestrator: Arc<MockOrchestrator>,
    pub transcoder: MockTranscoder,
    /// Temporary directory holding every managed folder
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = fixtures::config_in(temp_dir.path());
        fixtures::create_folders(&config);

        let store = Arc::new(StatusStore::open(
            &config.paths.status_file,
            &config.paths.history_file,
        ));
        store
            .publish(StatusSnapshot::idle(Utc::now()))
            .expect("Failed to publish initial status");

        let transcoder = MockTranscoder::new();
        let runner = PipelineRunner::new(
            PipelineConfig::from_config(&config),
            MockColorProcessor::new(),
            transcoder.clone(),
        );
        let orchestrator = Arc::new(IngestOrchestrator::new(
            OrchestratorConfig::from_config(&config),
            runner,
            Arc::clone(&store),
        ));

        let state = Arc::new(AppState::new(
            config.clone(),
            Arc::clone(&store),
            orchestrator.control(),
        ));
        let router = create_router(state);

        Self {
            router,
            config,
            store,
            orchestrator,
            transcoder,
            temp_dir,
        }
    }

    /// Drop a file in the watch folder and run it through the engine.
    pub async fn ingest(&self, name: &str) {
        fixtures::write_file(&self.config.paths.watch, name, 2_000);
        let t0 = Utc::now();
        self.orchestrator.poll_watch_folder(t0).await;
        self.orchestrator
            .poll_watch_folder(t0 + chrono::Duration::seconds(15))
            .await;
        self.orchestrator
            .process_next()
            .await
            .expect("processing error")
            .expect("no job ran");
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path).await
    }

    pub async fn post(&self, path: &str) -> TestResponse {
        self.request("POST", path).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}
