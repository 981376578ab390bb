// src/models/submission.rs

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::models::section::Answer;

/// Target of an irreversible action: one section, or the whole exam.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    Section(String),
    Final,
}

impl Target {
    pub const FINAL: &'static str = "final";

    /// Parses a path segment: the literal `final`, otherwise a section id.
    pub fn parse(raw: &str) -> Self {
        if raw == Self::FINAL {
            Target::Final
        } else {
            Target::Section(raw.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Target::Section(id) => id,
            Target::Final => Self::FINAL,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Target::parse(&raw))
    }
}

/// What caused a submission to be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionTrigger {
    /// The learner passed the verification gate.
    Learner,
    /// Best-effort flush on forced termination.
    Termination,
    /// Exam deadline reached.
    TimeExpired,
}

/// Durable record sent to the submission API.
/// At most one is created per target and session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub session_id: Uuid,
    pub exam_id: String,
    pub student_id: String,
    #[serde(rename = "targetId")]
    pub target: Target,
    pub verified: bool,
    pub trigger: SubmissionTrigger,

    /// Snapshot of the answers covered by this submission, keyed by question id.
    pub answers: BTreeMap<String, Answer>,

    pub submitted_at: DateTime<Utc>,
}

impl Submission {
    /// Key that lets the submission API deduplicate client retries.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.session_id, self.target)
    }
}

/// Acknowledgement returned by the submission API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    #[serde(default)]
    pub id: Option<String>,
}
