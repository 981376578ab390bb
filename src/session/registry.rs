// src/session/registry.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{exam::ExamDefinition, submission::Target},
    session::{
        actor::SessionHandle,
        controller::{Collaborators, SessionController},
    },
};

/// Live sessions keyed by id.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and spawns a session for `student_id`.
    ///
    /// A student gets at most one session per exam.
    pub async fn create(
        &self,
        student_id: &str,
        definition: ExamDefinition,
        native_shell: bool,
        collaborators: Collaborators,
    ) -> Result<SessionHandle, AppError> {
        validate_definition(&definition)?;

        // write lock held across the check and the insert
        let mut sessions = self.sessions.write().await;
        sessions.retain(|id, h| {
            let crashed = h.is_crashed();
            if crashed {
                tracing::warn!(session = %id, student = %h.student_id, "Evicting crashed session");
            }
            !crashed
        });
        // completed and terminated sessions stay as records and still count
        if let Some(existing) = sessions
            .values()
            .find(|h| h.student_id == student_id && h.exam_id == definition.exam.id)
        {
            return Err(AppError::Conflict(format!(
                "A session for exam '{}' already exists: {}",
                existing.exam_id, existing.id
            )));
        }

        let id = Uuid::new_v4();
        let controller = SessionController::new(
            id,
            student_id.to_string(),
            definition,
            native_shell,
            collaborators,
        );
        let handle = SessionHandle::spawn(controller);
        sessions.insert(id, handle.clone());

        tracing::info!(session = %id, student = student_id, exam = %handle.exam_id, "Session created");
        Ok(handle)
    }

    /// Looks up a session owned by `student_id`. Sessions of other students
    /// are reported as missing.
    pub async fn get(&self, id: Uuid, student_id: &str) -> Result<SessionHandle, AppError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .filter(|h| h.student_id == student_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Session not found".to_string()))
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Rejects exam content the session model cannot represent.
fn validate_definition(definition: &ExamDefinition) -> Result<(), AppError> {
    let exam = &definition.exam;
    if exam.end_time <= exam.start_time {
        return Err(AppError::BadGateway(format!(
            "Exam '{}' has an empty window",
            exam.id
        )));
    }

    if exam.duration_minutes <= 0 || exam.duration().is_none() {
        return Err(AppError::BadGateway(format!(
            "Exam '{}' has an invalid duration of {} minutes",
            exam.id, exam.duration_minutes
        )));
    }

    let policy = &definition.policy;
    let windows = [
        ("dedup_window_secs", Some(policy.dedup_window_secs)),
        ("screen_lock_threshold_secs", Some(policy.screen_lock_threshold_secs)),
        ("near_mode_threshold_secs", Some(policy.near_mode_threshold_secs)),
        ("max_screen_lock_duration_secs", policy.max_screen_lock_duration_secs),
    ];
    for (name, secs) in windows {
        let Some(secs) = secs else { continue };
        if secs < 0 || Duration::try_seconds(secs).is_none() {
            return Err(AppError::BadGateway(format!(
                "Exam '{}' has an out-of-range {}: {}",
                exam.id, name, secs
            )));
        }
    }

    let mut sections = HashSet::new();
    let mut questions = HashSet::new();
    for section in &definition.sections {
        if section.id == Target::FINAL {
            return Err(AppError::BadGateway(format!(
                "Exam '{}' uses the reserved section id '{}'",
                exam.id,
                Target::FINAL
            )));
        }
        if !sections.insert(section.id.as_str()) {
            return Err(AppError::BadGateway(format!(
                "Exam '{}' repeats section id '{}'",
                exam.id, section.id
            )));
        }
        for question in &section.questions {
            if !questions.insert(question.id.as_str()) {
                return Err(AppError::BadGateway(format!(
                    "Exam '{}' repeats question id '{}'",
                    exam.id, question.id
                )));
            }
        }
    }
    Ok(())
}
