// src/session/controller.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::{
    clients::{SubmissionApi, TelemetrySink},
    error::{SessionError, StateError},
    models::{
        exam::{ExamDefinition, ExamInfo, ProctoringPolicy},
        section::{AnswerOutcome, Progress},
        session::{
            ChallengeView, ConfirmOutcome, HostDirective, LockRequestOutcome, SessionSnapshot,
            SessionState, TerminationNotice, TerminationReason, ViolationReport,
        },
        submission::{Submission, SubmissionTrigger, Target},
        telemetry::{ClientContext, LifecycleEvent, TelemetryScope},
        violation::{Severity, SignalEnvelope, SignalOutcome, Violation, ViolationType},
    },
    session::{
        locking::{LockOutcome, SectionLedger},
        proctoring::ProctoringPipeline,
        timer::Countdown,
        verification::{Confirmation, VerificationChallenge, VerificationGate},
    },
};

/// External collaborators a controller talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub submissions: Arc<dyn SubmissionApi>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

/// Top-level state machine of one exam attempt.
///
/// Composes the countdown, the section ledger, the verification gate and the
/// proctoring pipeline. It is the only component that changes session state
/// and the only one that calls the submission API. Every operation either
/// applies completely or leaves state unchanged.
pub struct SessionController {
    id: Uuid,
    student_id: String,
    exam: ExamInfo,
    policy: ProctoringPolicy,
    state: SessionState,
    started_at: Option<DateTime<Utc>>,
    ledger: SectionLedger,
    gate: VerificationGate,
    pipeline: ProctoringPipeline,
    countdown: Countdown,
    directives: Vec<HostDirective>,
    termination: Option<TerminationNotice>,
    scope: TelemetryScope,
    collaborators: Collaborators,
}

impl SessionController {
    pub fn new(
        id: Uuid,
        student_id: String,
        definition: ExamDefinition,
        native_shell: bool,
        collaborators: Collaborators,
    ) -> Self {
        let ExamDefinition {
            exam,
            policy,
            sections,
        } = definition;

        let scope = TelemetryScope {
            session_id: id,
            exam_id: exam.id.clone(),
            student_id: student_id.clone(),
        };

        Self {
            id,
            student_id,
            countdown: Countdown::new(exam.start_time, policy.near_mode_threshold()),
            pipeline: ProctoringPipeline::new(policy.clone(), native_shell),
            ledger: SectionLedger::from_specs(&sections),
            gate: VerificationGate::new(),
            exam,
            policy,
            state: SessionState::NotStarted,
            started_at: None,
            directives: Vec::new(),
            termination: None,
            scope,
            collaborators,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn student_id(&self) -> &str {
        &self.student_id
    }

    pub fn exam(&self) -> &ExamInfo {
        &self.exam
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.started_at.map(|at| self.exam.deadline_for(at))
    }

    fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    fn transition(&mut self, to: SessionState) {
        tracing::info!(session = %self.id, from = %self.state, to = %to, "Session transition");
        self.state = to;
    }

    fn context(&self) -> ClientContext {
        ClientContext {
            monitored_shell: self.pipeline.monitored_shell(),
        }
    }

    fn emit(&self, event: LifecycleEvent, details: serde_json::Value, at: DateTime<Utc>) {
        let event = self.scope.lifecycle(event, details, self.context(), at);
        self.collaborators.telemetry.emit(event);
    }

    fn require_answering(&self, action: &'static str, now: DateTime<Utc>) -> Result<(), StateError> {
        if !self.state.is_answering() {
            return Err(StateError::InvalidTransition {
                state: self.state,
                action,
            });
        }
        if self.deadline_passed(now) {
            return Err(StateError::WindowClosed);
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Waiting room and start
    // ---------------------------------------------------------------------

    /// Learner enters the exam: starts right away when the window is open,
    /// otherwise parks the session in the waiting room.
    pub fn join(&mut self, now: DateTime<Utc>) -> Result<SessionState, StateError> {
        match self.state {
            SessionState::NotStarted => {
                if self.exam.window_open(now) {
                    self.start(now)?;
                } else if now >= self.exam.end_time {
                    return Err(StateError::WindowClosed);
                } else {
                    self.transition(SessionState::Waiting);
                }
                Ok(self.state)
            }
            // rejoining (page reload) is harmless
            state @ (SessionState::Waiting | SessionState::InProgress | SessionState::SectionLocked) => {
                Ok(state)
            }
            state => Err(StateError::InvalidTransition {
                state,
                action: "join the exam",
            }),
        }
    }

    /// Valid from `Waiting` once the countdown has fired, or from
    /// `NotStarted` when the window is already open.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), StateError> {
        match self.state {
            SessionState::NotStarted | SessionState::Waiting => {}
            state => {
                return Err(StateError::InvalidTransition {
                    state,
                    action: "start the exam",
                });
            }
        }
        if now >= self.exam.end_time {
            return Err(StateError::WindowClosed);
        }
        let ready = match self.state {
            SessionState::Waiting => self.countdown.has_fired(),
            _ => self.exam.window_open(now),
        };
        if !ready {
            return Err(StateError::WindowNotOpen);
        }

        self.started_at = Some(now);
        self.transition(SessionState::InProgress);
        if self.pipeline.monitored_shell() {
            self.directives.push(HostDirective::BeginMonitoring);
        }
        self.emit(
            LifecycleEvent::ExamStarted,
            json!({ "deadline": self.deadline() }),
            now,
        );
        Ok(())
    }

    /// Driven once per second by the session actor.
    pub async fn tick(&mut self, now: DateTime<Utc>) {
        match self.state {
            SessionState::Waiting => {
                if self.countdown.tick(now).fire {
                    if let Err(e) = self.start(now) {
                        tracing::warn!(session = %self.id, "Countdown fired but start failed: {}", e);
                    }
                }
            }
            state if state.is_answering() && self.deadline_passed(now) => {
                self.expire(now).await;
            }
            _ => {}
        }
    }

    // ---------------------------------------------------------------------
    // Answers and locks
    // ---------------------------------------------------------------------

    /// Never fails: writes outside an answering state or into a locked
    /// section are dropped and reported as not accepted.
    pub fn record_answer(
        &mut self,
        question_id: &str,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> AnswerOutcome {
        if let Err(e) = self.require_answering("record an answer", now) {
            tracing::debug!(session = %self.id, question = question_id, "Answer rejected: {}", e);
            return AnswerOutcome::rejected(e.to_string());
        }

        match self.ledger.record(question_id, payload, now) {
            Ok(()) => AnswerOutcome::accepted(),
            Err(e) => {
                tracing::debug!(session = %self.id, question = question_id, "Answer rejected: {}", e);
                AnswerOutcome::rejected(e.to_string())
            }
        }
    }

    /// Opens a verification challenge for locking `section_id`.
    /// No-op on a section that is already locked.
    pub fn request_section_lock(
        &mut self,
        section_id: &str,
        now: DateTime<Utc>,
    ) -> Result<LockRequestOutcome, StateError> {
        self.require_answering("lock a section", now)?;

        if self.ledger.is_locked(section_id)? {
            return Ok(LockRequestOutcome::AlreadyLocked {
                section_id: section_id.to_string(),
            });
        }

        let challenge = self
            .gate
            .initiate(Target::Section(section_id.to_string()))
            .clone();
        Ok(LockRequestOutcome::ChallengeIssued {
            challenge: self.challenge_view(&challenge),
        })
    }

    /// Opens the verification challenge for the final submission.
    pub fn request_final_submit(&mut self, now: DateTime<Utc>) -> Result<ChallengeView, StateError> {
        self.require_answering("submit the exam", now)?;
        let challenge = self.gate.initiate(Target::Final).clone();
        Ok(self.challenge_view(&challenge))
    }

    // ---------------------------------------------------------------------
    // Verification gate
    // ---------------------------------------------------------------------

    pub fn update_challenge(&mut self, target: &Target, entered: &str) -> Result<ChallengeView, StateError> {
        let challenge = self.gate.update(target, entered)?.clone();
        Ok(self.challenge_view(&challenge))
    }

    pub fn cancel_challenge(&mut self, target: &Target) -> bool {
        self.gate.cancel(target)
    }

    /// Checks the entered code and, on a match, commits the gated action.
    pub async fn confirm_challenge(
        &mut self,
        target: &Target,
        now: DateTime<Utc>,
    ) -> Result<ConfirmOutcome, SessionError> {
        self.require_answering("confirm a verification code", now)?;

        let challenge = match self.gate.confirm(target)? {
            Confirmation::Mismatch(challenge) => {
                tracing::debug!(session = %self.id, target = %target, "Verification code mismatch");
                return Ok(ConfirmOutcome::Mismatch {
                    challenge: self.challenge_view(&challenge),
                });
            }
            Confirmation::Verified(challenge) => challenge,
        };

        match target {
            Target::Section(section_id) => self.commit_section(section_id, challenge, now).await,
            Target::Final => self.commit_final(challenge, now).await,
        }
    }

    async fn commit_section(
        &mut self,
        section_id: &str,
        challenge: VerificationChallenge,
        now: DateTime<Utc>,
    ) -> Result<ConfirmOutcome, SessionError> {
        if self.ledger.is_locked(section_id)? {
            return Ok(ConfirmOutcome::SectionLocked {
                section_id: section_id.to_string(),
                progress: self.ledger.progress(section_id)?,
            });
        }

        let submission = Submission {
            session_id: self.id,
            exam_id: self.exam.id.clone(),
            student_id: self.student_id.clone(),
            target: Target::Section(section_id.to_string()),
            verified: true,
            trigger: SubmissionTrigger::Learner,
            answers: self.ledger.section_answers(section_id)?,
            submitted_at: now,
        };

        if let Err(e) = self.collaborators.submissions.submit(&submission).await {
            tracing::warn!(session = %self.id, section = section_id, "Section submission failed: {}", e);
            self.gate.restore(challenge);
            return Err(SessionError::Network(e));
        }

        self.ledger.lock(section_id)?;
        self.transition(SessionState::SectionLocked);

        let progress = self.ledger.progress(section_id)?;
        self.emit(
            LifecycleEvent::SectionSubmitted,
            json!({
                "section_id": section_id,
                "answered": progress.answered,
                "total": progress.total,
            }),
            now,
        );

        Ok(ConfirmOutcome::SectionLocked {
            section_id: section_id.to_string(),
            progress,
        })
    }

    async fn commit_final(
        &mut self,
        challenge: VerificationChallenge,
        now: DateTime<Utc>,
    ) -> Result<ConfirmOutcome, SessionError> {
        let resume = self.state;
        self.transition(SessionState::Finalizing);

        let submission = self.final_submission(true, SubmissionTrigger::Learner, now);
        if let Err(e) = self.collaborators.submissions.submit(&submission).await {
            tracing::warn!(session = %self.id, "Final submission failed: {}", e);
            self.transition(resume);
            self.gate.restore(challenge);
            return Err(SessionError::Network(e));
        }

        let cascaded = self.seal();
        self.emit(
            LifecycleEvent::ExamSubmitted,
            json!({ "cascaded_sections": cascaded }),
            now,
        );
        Ok(ConfirmOutcome::Completed)
    }

    fn final_submission(&self, verified: bool, trigger: SubmissionTrigger, now: DateTime<Utc>) -> Submission {
        Submission {
            session_id: self.id,
            exam_id: self.exam.id.clone(),
            student_id: self.student_id.clone(),
            target: Target::Final,
            verified,
            trigger,
            answers: self.ledger.all_answers(),
            submitted_at: now,
        }
    }

    /// Locks every open section and completes the session.
    /// Returns the sections that were cascaded.
    fn seal(&mut self) -> Vec<String> {
        let cascaded: Vec<String> = self
            .ledger
            .open_sections()
            .into_iter()
            .filter(|section_id| matches!(self.ledger.lock(section_id), Ok(LockOutcome::Locked)))
            .collect();
        self.gate.clear();
        self.transition(SessionState::Completed);
        if self.pipeline.monitored_shell() {
            self.directives.push(HostDirective::EndMonitoring);
        }
        cascaded
    }

    /// Deadline reached: submit everything without the gate.
    /// On failure the session stays answerable-but-closed and the next tick retries.
    async fn expire(&mut self, now: DateTime<Utc>) {
        let resume = self.state;
        self.transition(SessionState::Finalizing);

        let submission = self.final_submission(false, SubmissionTrigger::TimeExpired, now);
        match self.collaborators.submissions.submit(&submission).await {
            Ok(_) => {
                let cascaded = self.seal();
                self.emit(
                    LifecycleEvent::ExamTimeExpired,
                    json!({ "cascaded_sections": cascaded }),
                    now,
                );
            }
            Err(e) => {
                tracing::warn!(session = %self.id, "Time-expiry submission failed, will retry: {}", e);
                self.transition(resume);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Proctoring
    // ---------------------------------------------------------------------

    /// Feeds one raw signal through the pipeline and applies the
    /// termination policy to the resulting violation.
    pub async fn ingest_signal(&mut self, envelope: SignalEnvelope, now: DateTime<Utc>) -> SignalOutcome {
        if self.state.is_terminal() {
            tracing::debug!(session = %self.id, state = %self.state, "Signal ignored after session end");
            return SignalOutcome {
                violation: None,
                surface: false,
                terminated: self.state == SessionState::Terminated,
            };
        }

        let Some(detection) = self.pipeline.ingest(&envelope, now) else {
            return SignalOutcome {
                violation: None,
                surface: false,
                terminated: false,
            };
        };

        self.collaborators
            .telemetry
            .emit(self.scope.violation(&detection.violation, self.context()));

        let terminated = self.on_critical_violation(&detection.violation, now).await;

        SignalOutcome {
            violation: Some(detection.violation),
            surface: detection.surface || terminated,
            terminated,
        }
    }

    /// Forces termination when the violation breaches the exam policy.
    /// Returns whether the session was terminated.
    pub async fn on_critical_violation(&mut self, violation: &Violation, now: DateTime<Utc>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        let Some(reason) = self.termination_reason(violation) else {
            return false;
        };
        self.terminate(reason, now).await;
        true
    }

    fn termination_reason(&self, violation: &Violation) -> Option<TerminationReason> {
        if !self.policy.auto_terminate_on_violations {
            return None;
        }

        if violation.severity == Severity::Critical {
            return Some(TerminationReason::CriticalViolation {
                violation_type: violation.violation_type,
            });
        }

        match violation.violation_type {
            ViolationType::TabSwitch => {
                if let Some(limit) = self.policy.max_tab_switches {
                    let observed = self.pipeline.counter(ViolationType::TabSwitch);
                    if observed > limit {
                        return Some(TerminationReason::LimitExceeded {
                            violation_type: ViolationType::TabSwitch,
                            limit: i64::from(limit),
                            observed: i64::from(observed),
                        });
                    }
                }
            }
            ViolationType::ScreenLock => {
                if let (Some(limit), Some(observed)) =
                    (self.policy.max_screen_lock_duration_secs, violation.duration_secs)
                {
                    if observed > limit {
                        return Some(TerminationReason::LimitExceeded {
                            violation_type: ViolationType::ScreenLock,
                            limit,
                            observed,
                        });
                    }
                }
            }
            _ => {}
        }

        if let Some(limit) = self.policy.max_risk_score {
            let score = self.pipeline.risk_profile().score;
            if score > limit {
                return Some(TerminationReason::RiskScoreExceeded { limit, score });
            }
        }

        None
    }

    /// One-way move to `Terminated`, bypassing the gate. The final
    /// submission is flushed best-effort after the transition is applied.
    async fn terminate(&mut self, reason: TerminationReason, now: DateTime<Utc>) {
        let from = self.state;
        self.gate.clear();
        self.transition(SessionState::Terminated);
        tracing::warn!(session = %self.id, ?reason, "Session terminated by proctoring policy");

        self.termination = Some(TerminationNotice {
            message: termination_message(&reason),
            reason: reason.clone(),
            terminated_at: now,
        });
        if self.pipeline.monitored_shell() {
            self.directives.push(HostDirective::EndMonitoring);
        }
        self.emit(
            LifecycleEvent::ExamTerminated,
            json!({ "reason": reason, "from": from }),
            now,
        );

        // Completed is terminal, so no final submission has been made yet
        let submission = self.final_submission(false, SubmissionTrigger::Termination, now);
        if let Err(e) = self.collaborators.submissions.submit(&submission).await {
            tracing::warn!(session = %self.id, "Best-effort submission on termination failed: {}", e);
        }
    }

    // ---------------------------------------------------------------------
    // Read models
    // ---------------------------------------------------------------------

    fn challenge_view(&self, challenge: &VerificationChallenge) -> ChallengeView {
        let progress = match &challenge.target {
            Target::Section(id) => self
                .ledger
                .progress(id)
                .unwrap_or(Progress { answered: 0, total: 0 }),
            Target::Final => self.ledger.open_progress(),
        };
        ChallengeView {
            target: challenge.target.clone(),
            code: challenge.code.clone(),
            entered: challenge.entered.clone(),
            error: challenge.error,
            progress,
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> SessionSnapshot {
        let countdown = match self.state {
            SessionState::NotStarted | SessionState::Waiting => Some(self.countdown.view(now)),
            _ => None,
        };

        SessionSnapshot {
            id: self.id,
            exam_id: self.exam.id.clone(),
            title: self.exam.title.clone(),
            student_id: self.student_id.clone(),
            state: self.state,
            start_time: self.exam.start_time,
            end_time: self.exam.end_time,
            started_at: self.started_at,
            deadline: self.deadline(),
            countdown,
            sections: self.ledger.views(),
            challenges: self.gate.open().map(|c| self.challenge_view(c)).collect(),
            risk: self.pipeline.risk_profile(),
            monitored_shell: self.pipeline.monitored_shell(),
            host_directives: self.directives.clone(),
            termination: self.termination.clone(),
        }
    }

    pub fn violation_report(&self) -> ViolationReport {
        ViolationReport {
            violations: self.pipeline.log().to_vec(),
            risk: self.pipeline.risk_profile(),
        }
    }
}

fn termination_message(reason: &TerminationReason) -> String {
    match reason {
        TerminationReason::CriticalViolation { violation_type } => format!(
            "Your exam has been terminated: a critical integrity violation ({}) was detected.",
            violation_type
        ),
        TerminationReason::LimitExceeded {
            violation_type,
            limit,
            ..
        } => format!(
            "Your exam has been terminated: the allowed limit for {} ({}) was exceeded.",
            violation_type, limit
        ),
        TerminationReason::RiskScoreExceeded { .. } => {
            "Your exam has been terminated: too many integrity violations were detected.".to_string()
        }
    }
}
