// src/models/session.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    section::{Progress, SectionView},
    submission::Target,
    violation::{Severity, Violation, ViolationType},
};

/// Lifecycle of one exam attempt.
///
/// `NotStarted -> Waiting -> InProgress -> SectionLocked* -> Finalizing -> Completed`,
/// with `Terminated` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    Waiting,
    InProgress,
    SectionLocked,
    Finalizing,
    Completed,
    Terminated,
}

impl SessionState {
    /// States in which the learner may answer and lock sections.
    pub fn is_answering(self) -> bool {
        matches!(self, SessionState::InProgress | SessionState::SectionLocked)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Terminated)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::NotStarted => "not_started",
            SessionState::Waiting => "waiting",
            SessionState::InProgress => "in_progress",
            SessionState::SectionLocked => "section_locked",
            SessionState::Finalizing => "finalizing",
            SessionState::Completed => "completed",
            SessionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Waiting-room presentation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CountdownMode {
    /// More than the near threshold remaining: show only the scheduled time.
    Far,
    /// Live countdown.
    Near,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountdownView {
    pub seconds_remaining: i64,
    pub mode: CountdownMode,
}

/// Instruction for the monitored native shell hosting the exam, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostDirective {
    BeginMonitoring,
    EndMonitoring,
}

/// Why a session was forcibly ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminationReason {
    CriticalViolation { violation_type: ViolationType },
    LimitExceeded { violation_type: ViolationType, limit: i64, observed: i64 },
    RiskScoreExceeded { limit: u32, score: u32 },
}

/// Non-dismissible notice shown after forced termination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerminationNotice {
    pub reason: TerminationReason,
    pub terminated_at: DateTime<Utc>,
    pub message: String,
}

/// Running risk profile reported by the proctoring pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RiskProfile {
    pub score: u32,
    pub total_violations: usize,
    pub counts: BTreeMap<ViolationType, u32>,
    pub highest_severity: Option<Severity>,
}

/// What the learner sees of an open verification challenge.
/// The code is displayed so it can be read back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChallengeView {
    pub target: Target,
    pub code: String,
    pub entered: String,
    pub error: bool,

    /// answered/total for section targets, summed over open sections for `final`.
    pub progress: Progress,
}

/// Response to a lock request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LockRequestOutcome {
    ChallengeIssued { challenge: ChallengeView },
    AlreadyLocked { section_id: String },
}

/// Response to confirming a challenge.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConfirmOutcome {
    Mismatch { challenge: ChallengeView },
    SectionLocked { section_id: String, progress: Progress },
    Completed,
}

/// Full read model of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub exam_id: String,
    pub title: String,
    pub student_id: String,
    pub state: SessionState,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub countdown: Option<CountdownView>,
    pub sections: Vec<SectionView>,
    pub challenges: Vec<ChallengeView>,
    pub risk: RiskProfile,
    pub monitored_shell: bool,
    pub host_directives: Vec<HostDirective>,
    pub termination: Option<TerminationNotice>,
}

/// Violation log plus the profile derived from it.
#[derive(Debug, Clone, Serialize)]
pub struct ViolationReport {
    pub violations: Vec<Violation>,
    pub risk: RiskProfile,
}

/// DTO for opening a session.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSessionRequest {
    #[validate(length(min = 1, max = 100))]
    pub exam_id: String,

    /// Whether the client runs inside a monitored native shell.
    #[serde(default)]
    pub native_shell: bool,
}

static CODE_INPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{0,4}$").expect("CODE_INPUT is a valid regex pattern"));

/// DTO for typing into a verification challenge.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateChallengeRequest {
    #[validate(regex(path = *CODE_INPUT, message = "Code must be at most 4 digits."))]
    pub entered: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answering_states() {
        assert!(SessionState::InProgress.is_answering());
        assert!(SessionState::SectionLocked.is_answering());
        assert!(!SessionState::Waiting.is_answering());
        assert!(!SessionState::Finalizing.is_answering());
        assert!(SessionState::Terminated.is_terminal());
        assert!(SessionState::Completed.is_terminal());
    }

    #[test]
    fn entered_code_accepts_digits_only() {
        for ok in ["", "0", "0427", "12"] {
            let req = UpdateChallengeRequest {
                entered: ok.to_string(),
            };
            assert!(req.validate().is_ok(), "{ok:?} should be accepted");
        }
        for bad in ["12345", "12a4", " 123", "-1"] {
            let req = UpdateChallengeRequest {
                entered: bad.to_string(),
            };
            assert!(req.validate().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn lock_outcome_is_tagged_by_status() {
        let json = serde_json::to_value(LockRequestOutcome::AlreadyLocked {
            section_id: "s1".to_string(),
        })
        .unwrap();
        assert_eq!(json["status"], "already_locked");
        assert_eq!(json["section_id"], "s1");
    }
}
