// src/clients/content.rs

use async_trait::async_trait;
use url::Url;

use super::{ContentProvider, endpoint};
use crate::{error::ClientError, models::exam::ExamDefinition};

/// Fetches exam definitions with `GET {base}/exams/{exam_id}`.
pub struct HttpContentProvider {
    client: reqwest::Client,
    base: Url,
}

impl HttpContentProvider {
    pub fn new(client: reqwest::Client, base: Url) -> Self {
        Self { client, base }
    }
}

#[async_trait]
impl ContentProvider for HttpContentProvider {
    async fn fetch_exam(&self, exam_id: &str) -> Result<ExamDefinition, ClientError> {
        let url = endpoint(&self.base, &["exams", exam_id])?;
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Content provider returned {} for exam {}", status, exam_id);
            return Err(ClientError::Status(status.as_u16()));
        }

        Ok(response.json::<ExamDefinition>().await?)
    }
}
