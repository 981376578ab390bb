// src/models/exam.rs

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::violation::{Severity, ViolationType};

/// Exam metadata as declared by the content provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamInfo {
    pub id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
}

impl ExamInfo {
    /// `None` when `duration_minutes` does not fit a `Duration`.
    pub fn duration(&self) -> Option<Duration> {
        Duration::try_minutes(self.duration_minutes)
    }

    /// Whether the exam window is open at `now`.
    pub fn window_open(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_time && now < self.end_time
    }

    /// Deadline for a session started at `started_at`.
    /// The duration never extends past the end of the exam window.
    pub fn deadline_for(&self, started_at: DateTime<Utc>) -> DateTime<Utc> {
        self.duration()
            .and_then(|duration| started_at.checked_add_signed(duration))
            .map_or(self.end_time, |deadline| deadline.min(self.end_time))
    }
}

/// Per-exam integrity policy.
/// All thresholds are configuration inputs, defaults match the reference values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProctoringPolicy {
    pub auto_terminate_on_violations: bool,
    pub max_tab_switches: Option<u32>,
    pub max_screen_lock_duration_secs: Option<i64>,
    pub max_risk_score: Option<u32>,
    pub dedup_window_secs: i64,
    pub screen_lock_threshold_secs: i64,
    pub near_mode_threshold_secs: i64,
    pub severity_overrides: HashMap<ViolationType, Severity>,
}

impl Default for ProctoringPolicy {
    fn default() -> Self {
        Self {
            auto_terminate_on_violations: false,
            max_tab_switches: None,
            max_screen_lock_duration_secs: None,
            max_risk_score: None,
            dedup_window_secs: 10,
            screen_lock_threshold_secs: 30,
            near_mode_threshold_secs: 30 * 60,
            severity_overrides: HashMap::new(),
        }
    }
}

impl ProctoringPolicy {
    pub fn dedup_window(&self) -> Duration {
        seconds_or_max(self.dedup_window_secs)
    }

    pub fn near_mode_threshold(&self) -> Duration {
        seconds_or_max(self.near_mode_threshold_secs)
    }

    pub fn severity_for(&self, violation_type: ViolationType) -> Severity {
        self.severity_overrides
            .get(&violation_type)
            .copied()
            .unwrap_or_else(|| violation_type.base_severity())
    }
}

/// Out-of-range values saturate instead of panicking.
fn seconds_or_max(secs: i64) -> Duration {
    Duration::try_seconds(secs).unwrap_or(Duration::MAX)
}

/// Question as delivered by the content provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub id: String,
    pub title: String,

    /// Question type: e.g. 'single', 'multiple', 'code', 'text'.
    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub points: f64,
}

/// Section as delivered by the content provider, questions in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub id: String,
    pub title: String,
    pub questions: Vec<QuestionSpec>,
}

/// Everything needed to open a session for one exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamDefinition {
    pub exam: ExamInfo,
    #[serde(default)]
    pub policy: ProctoringPolicy,
    pub sections: Vec<SectionSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exam(start: DateTime<Utc>) -> ExamInfo {
        ExamInfo {
            id: "exam-1".to_string(),
            title: "Systems Programming".to_string(),
            start_time: start,
            end_time: start + Duration::hours(2),
            duration_minutes: 90,
        }
    }

    #[test]
    fn deadline_is_capped_by_window_end() {
        let start = Utc::now();
        let info = exam(start);

        assert_eq!(info.deadline_for(start), start + Duration::minutes(90));

        let late = start + Duration::minutes(60);
        assert_eq!(info.deadline_for(late), info.end_time);
    }

    #[test]
    fn oversized_duration_falls_back_to_window_end() {
        let start = Utc::now();
        let mut info = exam(start);
        info.duration_minutes = i64::MAX;

        assert!(info.duration().is_none());
        assert_eq!(info.deadline_for(start), info.end_time);
    }

    #[test]
    fn oversized_policy_windows_saturate() {
        let policy = ProctoringPolicy {
            dedup_window_secs: i64::MAX,
            near_mode_threshold_secs: i64::MAX,
            ..ProctoringPolicy::default()
        };
        assert_eq!(policy.dedup_window(), Duration::MAX);
        assert_eq!(policy.near_mode_threshold(), Duration::MAX);
    }

    #[test]
    fn window_open_is_half_open_interval() {
        let start = Utc::now();
        let info = exam(start);

        assert!(!info.window_open(start - Duration::seconds(1)));
        assert!(info.window_open(start));
        assert!(!info.window_open(info.end_time));
    }

    #[test]
    fn policy_defaults_fill_missing_fields() {
        let policy: ProctoringPolicy =
            serde_json::from_str(r#"{"auto_terminate_on_violations": true, "max_tab_switches": 3}"#)
                .unwrap();

        assert!(policy.auto_terminate_on_violations);
        assert_eq!(policy.max_tab_switches, Some(3));
        assert_eq!(policy.dedup_window_secs, 10);
        assert_eq!(policy.screen_lock_threshold_secs, 30);
        assert_eq!(policy.near_mode_threshold_secs, 1800);
    }

    #[test]
    fn severity_override_replaces_base() {
        let mut policy = ProctoringPolicy::default();
        assert_eq!(policy.severity_for(ViolationType::ClipboardCopy), Severity::Low);

        policy
            .severity_overrides
            .insert(ViolationType::ClipboardCopy, Severity::High);
        assert_eq!(policy.severity_for(ViolationType::ClipboardCopy), Severity::High);
    }
}
