// src/clients/mod.rs

//! Narrow contracts to the collaborators outside this service:
//! exam content, durable submissions and the event/violation log.

pub mod content;
pub mod submission;
pub mod telemetry;

use async_trait::async_trait;
use url::Url;

use crate::{
    error::ClientError,
    models::{
        exam::ExamDefinition,
        submission::{Submission, SubmissionReceipt},
        telemetry::TelemetryEvent,
    },
};

pub use content::HttpContentProvider;
pub use submission::HttpSubmissionApi;
pub use telemetry::HttpTelemetrySink;

/// Read-only source of exam metadata, policy and sections.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn fetch_exam(&self, exam_id: &str) -> Result<ExamDefinition, ClientError>;
}

/// Durable store for section and final submissions.
/// Implementations must tolerate retries of the same submission.
#[async_trait]
pub trait SubmissionApi: Send + Sync {
    async fn submit(&self, submission: &Submission) -> Result<SubmissionReceipt, ClientError>;
}

/// Best-effort event log. Never blocks and never fails from the caller's view.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// Appends path segments to `base`, keeping any path the base already has.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ClientError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ClientError::Unavailable(format!("'{}' cannot be used as a base URL", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
