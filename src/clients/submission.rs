// src/clients/submission.rs

use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

use super::{SubmissionApi, endpoint};
use crate::{
    error::ClientError,
    models::submission::{Submission, SubmissionReceipt},
};

/// Header carrying the per-target deduplication key.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Posts submissions to `{base}/submissions`.
pub struct HttpSubmissionApi {
    client: reqwest::Client,
    url: Url,
}

impl HttpSubmissionApi {
    pub fn new(client: reqwest::Client, base: &Url) -> Result<Self, ClientError> {
        Ok(Self {
            client,
            url: endpoint(base, &["submissions"])?,
        })
    }
}

#[async_trait]
impl SubmissionApi for HttpSubmissionApi {
    async fn submit(&self, submission: &Submission) -> Result<SubmissionReceipt, ClientError> {
        let response = self
            .client
            .post(self.url.clone())
            .header(IDEMPOTENCY_HEADER, submission.idempotency_key())
            .json(submission)
            .send()
            .await?;

        let status = response.status();

        // The server already holds this target: an earlier attempt got through.
        if status == StatusCode::CONFLICT {
            tracing::info!(
                "Submission {} already acknowledged upstream",
                submission.idempotency_key()
            );
            return Ok(SubmissionReceipt::default());
        }

        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(SubmissionReceipt::default());
        }
        Ok(serde_json::from_slice(&body).unwrap_or_default())
    }
}
