// tests/client_tests.rs

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use chrono::Utc;
use exam_proctor::{
    clients::{
        ContentProvider, HttpContentProvider, HttpSubmissionApi, HttpTelemetrySink, SubmissionApi,
        TelemetrySink,
    },
    error::ClientError,
    models::{
        submission::{Submission, SubmissionTrigger, Target},
        telemetry::{ClientContext, LifecycleEvent, TelemetryScope},
    },
};
use serde_json::{Value, json};
use url::Url;
use uuid::Uuid;

/// What the stub upstream has seen.
#[derive(Clone, Default)]
struct Upstream {
    submissions: Arc<Mutex<Vec<(Option<String>, Value)>>>,
    events: Arc<Mutex<Vec<Value>>>,
    submission_status: Arc<Mutex<StatusCode>>,
}

async fn receive_submission(
    State(upstream): State<Upstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    upstream.submissions.lock().unwrap().push((key, body));
    let status = *upstream.submission_status.lock().unwrap();
    (status, Json(json!({ "id": "rcpt-1" })))
}

async fn receive_event(State(upstream): State<Upstream>, Json(body): Json<Value>) -> StatusCode {
    upstream.events.lock().unwrap().push(body);
    StatusCode::ACCEPTED
}

async fn serve_exam(Path(id): Path<String>) -> Result<Json<Value>, StatusCode> {
    if id != "exam-1" {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(json!({
        "exam": {
            "id": "exam-1",
            "title": "Compilers",
            "start_time": "2026-06-01T09:00:00Z",
            "end_time": "2026-06-01T12:00:00Z",
            "duration_minutes": 120
        },
        "policy": { "auto_terminate_on_violations": true, "max_tab_switches": 3 },
        "sections": [
            {
                "id": "s1",
                "title": "Parsing",
                "questions": [{ "id": "q1", "title": "LL(1)", "type": "single" }]
            }
        ]
    })))
}

/// Spawns the stub upstream and returns its base URL (with a path prefix).
async fn spawn_upstream(upstream: Upstream) -> Url {
    *upstream.submission_status.lock().unwrap() = StatusCode::CREATED;

    let app = Router::new()
        .route("/v1/submissions", post(receive_submission))
        .route("/v1/events", post(receive_event))
        .route("/v1/exams/{id}", get(serve_exam))
        .with_state(upstream);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Url::parse(&format!("http://127.0.0.1:{}/v1/", port)).unwrap()
}

fn submission(target: Target) -> Submission {
    Submission {
        session_id: Uuid::new_v4(),
        exam_id: "exam-1".to_string(),
        student_id: "alice".to_string(),
        target,
        verified: true,
        trigger: SubmissionTrigger::Learner,
        answers: BTreeMap::new(),
        submitted_at: Utc::now(),
    }
}

#[tokio::test]
async fn submission_carries_idempotency_key() {
    let upstream = Upstream::default();
    let base = spawn_upstream(upstream.clone()).await;
    let api = HttpSubmissionApi::new(reqwest::Client::new(), &base).unwrap();

    let sent = submission(Target::Section("s1".to_string()));
    let receipt = api.submit(&sent).await.unwrap();
    assert_eq!(receipt.id.as_deref(), Some("rcpt-1"));

    let seen = upstream.submissions.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0.as_deref(), Some(sent.idempotency_key().as_str()));
    assert_eq!(seen[0].1["targetId"], "s1");
    assert_eq!(seen[0].1["sessionId"], sent.session_id.to_string());
}

#[tokio::test]
async fn conflict_counts_as_already_acknowledged() {
    let upstream = Upstream::default();
    let base = spawn_upstream(upstream.clone()).await;
    *upstream.submission_status.lock().unwrap() = StatusCode::CONFLICT;
    let api = HttpSubmissionApi::new(reqwest::Client::new(), &base).unwrap();

    assert!(api.submit(&submission(Target::Final)).await.is_ok());
}

#[tokio::test]
async fn server_error_is_reported_as_status() {
    let upstream = Upstream::default();
    let base = spawn_upstream(upstream.clone()).await;
    *upstream.submission_status.lock().unwrap() = StatusCode::SERVICE_UNAVAILABLE;
    let api = HttpSubmissionApi::new(reqwest::Client::new(), &base).unwrap();

    let err = api.submit(&submission(Target::Final)).await.unwrap_err();
    assert!(matches!(err, ClientError::Status(503)));
}

#[tokio::test]
async fn unreachable_upstream_is_transport_error() {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    let base = Url::parse("http://127.0.0.1:9/").unwrap();
    let api = HttpSubmissionApi::new(client, &base).unwrap();

    let err = api.submit(&submission(Target::Final)).await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
}

#[tokio::test]
async fn content_provider_decodes_exam_with_policy_defaults() {
    let base = spawn_upstream(Upstream::default()).await;
    let content = HttpContentProvider::new(reqwest::Client::new(), base);

    let definition = content.fetch_exam("exam-1").await.unwrap();
    assert_eq!(definition.exam.duration_minutes, 120);
    assert!(definition.policy.auto_terminate_on_violations);
    assert_eq!(definition.policy.max_tab_switches, Some(3));
    assert_eq!(definition.policy.dedup_window_secs, 10);
    assert_eq!(definition.sections[0].questions[0].kind, "single");

    let missing = content.fetch_exam("exam-2").await.unwrap_err();
    assert!(matches!(missing, ClientError::Status(404)));
}

#[tokio::test]
async fn telemetry_sink_forwards_in_background() {
    let upstream = Upstream::default();
    let base = spawn_upstream(upstream.clone()).await;
    let sink = HttpTelemetrySink::spawn(reqwest::Client::new(), &base).unwrap();

    let scope = TelemetryScope {
        session_id: Uuid::new_v4(),
        exam_id: "exam-1".to_string(),
        student_id: "alice".to_string(),
    };
    sink.emit(scope.lifecycle(
        LifecycleEvent::ExamStarted,
        json!({}),
        ClientContext::default(),
        Utc::now(),
    ));

    // delivery is asynchronous
    for _ in 0..50 {
        if !upstream.events.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let events = upstream.events.lock().unwrap().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["eventType"], "exam_started");
    assert_eq!(events[0]["studentId"], "alice");
}

#[tokio::test]
async fn stalled_event_log_keeps_queue_bounded() {
    async fn stall() -> StatusCode {
        std::future::pending::<()>().await;
        StatusCode::ACCEPTED
    }

    let app = Router::new().route("/v1/events", post(stall));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let base = Url::parse(&format!("http://127.0.0.1:{}/v1/", port)).unwrap();

    let sink = HttpTelemetrySink::with_capacity(reqwest::Client::new(), &base, 4).unwrap();
    let scope = TelemetryScope {
        session_id: Uuid::new_v4(),
        exam_id: "exam-1".to_string(),
        student_id: "alice".to_string(),
    };

    for _ in 0..200 {
        sink.emit(scope.lifecycle(
            LifecycleEvent::ExamStarted,
            json!({}),
            ClientContext::default(),
            Utc::now(),
        ));
        assert!(sink.pending() <= 4);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sink.pending() <= 4);
}
