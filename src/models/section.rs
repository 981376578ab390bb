// src/models/section.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Question progress. Only ever advances: unanswered -> answered -> submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStatus {
    Unanswered,
    Answered,
    Submitted,
}

/// A learner's response to one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: String,

    /// Free-form payload (selected options, source code, text, ...).
    pub payload: serde_json::Value,

    pub modified_at: DateTime<Utc>,
}

/// answered / total for one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub answered: usize,
    pub total: usize,
}

impl Progress {
    pub fn is_complete(&self) -> bool {
        self.answered == self.total
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub id: String,
    pub title: String,
    pub status: QuestionStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionView {
    pub id: String,
    pub title: String,
    pub locked: bool,
    pub progress: Progress,
    pub questions: Vec<QuestionView>,
}

/// DTO for recording an answer.
#[derive(Debug, Deserialize, Validate)]
pub struct RecordAnswerRequest {
    #[validate(custom(function = validate_payload_size))]
    pub payload: serde_json::Value,
}

/// Upper bound on the serialized size of one answer payload.
pub const MAX_ANSWER_BYTES: usize = 256 * 1024;

fn validate_payload_size(payload: &serde_json::Value) -> Result<(), validator::ValidationError> {
    let size = serde_json::to_vec(payload).map(|v| v.len()).unwrap_or(usize::MAX);
    if size > MAX_ANSWER_BYTES {
        return Err(validator::ValidationError::new("answer_too_large"));
    }
    Ok(())
}

/// Result of `recordAnswer`. A rejected write is not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerOutcome {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AnswerOutcome {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_status_advances_in_order() {
        assert!(QuestionStatus::Unanswered < QuestionStatus::Answered);
        assert!(QuestionStatus::Answered < QuestionStatus::Submitted);
    }

    #[test]
    fn oversized_payload_fails_validation() {
        let req = RecordAnswerRequest {
            payload: serde_json::Value::String("x".repeat(MAX_ANSWER_BYTES + 1)),
        };
        assert!(req.validate().is_err());

        let req = RecordAnswerRequest {
            payload: serde_json::json!({"selected": ["A"]}),
        };
        assert!(req.validate().is_ok());
    }
}
