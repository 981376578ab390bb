// tests/common/mod.rs

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exam_proctor::{
    clients::{ContentProvider, SubmissionApi, TelemetrySink},
    config::Config,
    error::ClientError,
    models::{
        exam::{ExamDefinition, ExamInfo, ProctoringPolicy, QuestionSpec, SectionSpec},
        submission::{Submission, SubmissionReceipt},
        telemetry::TelemetryEvent,
    },
    routes,
    state::AppState,
    utils::jwt::sign_jwt,
};
use url::Url;

pub const JWT_SECRET: &str = "test_secret_for_integration_tests";

#[derive(Default)]
pub struct FakeContent {
    exams: Mutex<HashMap<String, ExamDefinition>>,
}

impl FakeContent {
    pub fn insert(&self, definition: ExamDefinition) {
        self.exams
            .lock()
            .unwrap()
            .insert(definition.exam.id.clone(), definition);
    }
}

#[async_trait]
impl ContentProvider for FakeContent {
    async fn fetch_exam(&self, exam_id: &str) -> Result<ExamDefinition, ClientError> {
        self.exams
            .lock()
            .unwrap()
            .get(exam_id)
            .cloned()
            .ok_or(ClientError::Status(404))
    }
}

#[derive(Default)]
pub struct FakeSubmissions {
    received: Mutex<Vec<Submission>>,
    failures: AtomicUsize,
}

impl FakeSubmissions {
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<Submission> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubmissionApi for FakeSubmissions {
    async fn submit(&self, submission: &Submission) -> Result<SubmissionReceipt, ClientError> {
        let pending = self.failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.failures.store(pending - 1, Ordering::SeqCst);
            return Err(ClientError::Status(503));
        }
        self.received.lock().unwrap().push(submission.clone());
        Ok(SubmissionReceipt::default())
    }
}

#[derive(Default)]
pub struct FakeTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl FakeTelemetry {
    pub fn all(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl TelemetrySink for FakeTelemetry {
    fn emit(&self, event: TelemetryEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub content: Arc<FakeContent>,
    pub submissions: Arc<FakeSubmissions>,
    pub telemetry: Arc<FakeTelemetry>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub fn token(&self, student_id: &str) -> String {
        sign_jwt(student_id, JWT_SECRET, 600).expect("Failed to sign token")
    }

    /// Creates a session for `student_id` and returns its id.
    pub async fn create_session(&self, student_id: &str, exam_id: &str) -> String {
        let response = self
            .client
            .post(self.url("/api/sessions"))
            .bearer_auth(self.token(student_id))
            .json(&serde_json::json!({ "exam_id": exam_id }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201);

        let body: serde_json::Value = response.json().await.unwrap();
        body["id"].as_str().unwrap().to_string()
    }
}

pub fn test_config() -> Config {
    let local = Url::parse("http://127.0.0.1:9").unwrap();
    Config {
        jwt_secret: JWT_SECRET.to_string(),
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        submission_api_url: local.clone(),
        event_log_api_url: local.clone(),
        content_api_url: local,
        allowed_origins: Vec::new(),
        signal_rate_limit: None,
        http_timeout: Duration::from_secs(2),
    }
}

/// Spawns the app on a random port with in-memory collaborators.
pub async fn spawn_app() -> TestApp {
    let content = Arc::new(FakeContent::default());
    let submissions = Arc::new(FakeSubmissions::default());
    let telemetry = Arc::new(FakeTelemetry::default());

    let state = AppState::new(
        test_config(),
        content.clone(),
        submissions.clone(),
        telemetry.clone(),
    );
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address,
        client: reqwest::Client::new(),
        content,
        submissions,
        telemetry,
    }
}

/// Two sections (s1, s2) of three questions each, window opening at `start_time`.
pub fn exam(id: &str, start_time: DateTime<Utc>, policy: ProctoringPolicy) -> ExamDefinition {
    ExamDefinition {
        exam: ExamInfo {
            id: id.to_string(),
            title: "Operating Systems Final".to_string(),
            start_time,
            end_time: start_time + chrono::Duration::hours(3),
            duration_minutes: 90,
        },
        policy,
        sections: ["s1", "s2"]
            .iter()
            .map(|sid| SectionSpec {
                id: sid.to_string(),
                title: format!("Section {}", sid),
                questions: (1..=3)
                    .map(|n| QuestionSpec {
                        id: format!("{}-q{}", sid, n),
                        title: format!("Question {}", n),
                        kind: "single".to_string(),
                        points: 10.0,
                    })
                    .collect(),
            })
            .collect(),
    }
}
