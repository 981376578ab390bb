// src/models/telemetry.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::violation::{Severity, Violation, ViolationType};

/// Lifecycle events reported to the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    ExamStarted,
    SectionSubmitted,
    ExamSubmitted,
    ExamTimeExpired,
    ExamTerminated,
}

/// Either a lifecycle event or a violation; serialized as
/// `eventType` or `violationType` respectively.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TelemetryKind {
    #[serde(rename = "eventType")]
    Event(LifecycleEvent),
    #[serde(rename = "violationType")]
    Violation(ViolationType),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContext {
    pub monitored_shell: bool,
}

/// One entry for the external event/violation logging API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    pub session_id: Uuid,
    pub exam_id: String,
    pub student_id: String,
    #[serde(flatten)]
    pub kind: TelemetryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub client_context: ClientContext,
}

impl TelemetryEvent {
    pub fn is_violation(&self) -> bool {
        matches!(self.kind, TelemetryKind::Violation(_))
    }
}

/// Identity fields shared by every event of a session.
#[derive(Debug, Clone)]
pub struct TelemetryScope {
    pub session_id: Uuid,
    pub exam_id: String,
    pub student_id: String,
}

impl TelemetryScope {
    pub fn lifecycle(
        &self,
        event: LifecycleEvent,
        details: serde_json::Value,
        context: ClientContext,
        at: DateTime<Utc>,
    ) -> TelemetryEvent {
        TelemetryEvent {
            session_id: self.session_id,
            exam_id: self.exam_id.clone(),
            student_id: self.student_id.clone(),
            kind: TelemetryKind::Event(event),
            severity: None,
            details,
            timestamp: at,
            client_context: context,
        }
    }

    pub fn violation(&self, violation: &Violation, context: ClientContext) -> TelemetryEvent {
        TelemetryEvent {
            session_id: self.session_id,
            exam_id: self.exam_id.clone(),
            student_id: self.student_id.clone(),
            kind: TelemetryKind::Violation(violation.violation_type),
            severity: Some(violation.severity),
            details: serde_json::json!({
                "count": violation.count,
                "duration_secs": violation.duration_secs,
                "source": violation.source,
            }),
            timestamp: violation.occurred_at,
            client_context: context,
        }
    }
}
