// src/test_utils.rs

use std::collections::HashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::{
    clients::{ContentProvider, SubmissionApi, TelemetrySink},
    error::ClientError,
    models::{
        exam::{ExamDefinition, ExamInfo, ProctoringPolicy, QuestionSpec, SectionSpec},
        submission::{Submission, SubmissionReceipt},
        telemetry::TelemetryEvent,
    },
};

pub mod fixtures {
    use super::*;

    /// Two sections with three questions each: s1-q1..s1-q3, s2-q1..s2-q3.
    pub fn two_section_exam(start_time: DateTime<Utc>) -> ExamDefinition {
        ExamDefinition {
            exam: ExamInfo {
                id: "exam-1".to_string(),
                title: "Operating Systems Final".to_string(),
                start_time,
                end_time: start_time + Duration::hours(3),
                duration_minutes: 120,
            },
            policy: ProctoringPolicy::default(),
            sections: ["s1", "s2"]
                .iter()
                .map(|sid| SectionSpec {
                    id: sid.to_string(),
                    title: format!("Section {}", sid),
                    questions: (1..=3)
                        .map(|n| QuestionSpec {
                            id: format!("{}-q{}", sid, n),
                            title: format!("Question {}", n),
                            kind: "text".to_string(),
                            points: 5.0,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Records every submission; can be told to fail the next N calls.
#[derive(Default)]
pub struct RecordingSubmissions {
    pub received: Mutex<Vec<Submission>>,
    failures: AtomicUsize,
}

impl RecordingSubmissions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubmissionApi for RecordingSubmissions {
    async fn submit(&self, submission: &Submission) -> Result<SubmissionReceipt, ClientError> {
        let pending = self.failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.failures.store(pending - 1, Ordering::SeqCst);
            return Err(ClientError::Status(503));
        }
        self.received.lock().unwrap().push(submission.clone());
        Ok(SubmissionReceipt {
            id: Some(submission.idempotency_key()),
        })
    }
}

#[derive(Default)]
pub struct RecordingTelemetry {
    pub events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingTelemetry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn emit(&self, event: TelemetryEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Default)]
pub struct StaticContent {
    pub exams: HashMap<String, ExamDefinition>,
}

impl StaticContent {
    pub fn with(definition: ExamDefinition) -> Arc<Self> {
        let mut exams = HashMap::new();
        exams.insert(definition.exam.id.clone(), definition);
        Arc::new(Self { exams })
    }
}

#[async_trait]
impl ContentProvider for StaticContent {
    async fn fetch_exam(&self, exam_id: &str) -> Result<ExamDefinition, ClientError> {
        self.exams
            .get(exam_id)
            .cloned()
            .ok_or(ClientError::Status(404))
    }
}
