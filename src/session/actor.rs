// src/session/actor.rs

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::Utc;
use tokio::{
    sync::{mpsc, oneshot},
    time::MissedTickBehavior,
};
use uuid::Uuid;

use crate::{
    error::{AppError, SessionError, StateError},
    models::{
        section::AnswerOutcome,
        session::{
            ChallengeView, ConfirmOutcome, LockRequestOutcome, SessionSnapshot, SessionState,
            ViolationReport,
        },
        submission::Target,
        violation::{SignalEnvelope, SignalOutcome},
    },
    session::controller::SessionController,
};

/// Capacity of a session's command queue.
const MAILBOX_CAPACITY: usize = 64;
const TICK: Duration = Duration::from_secs(1);

type Reply<T> = oneshot::Sender<T>;

/// Messages accepted by a session actor, processed strictly in arrival order.
pub enum SessionCommand {
    Join {
        reply: Reply<Result<SessionState, StateError>>,
    },
    Snapshot {
        reply: Reply<SessionSnapshot>,
    },
    RecordAnswer {
        question_id: String,
        payload: serde_json::Value,
        reply: Reply<AnswerOutcome>,
    },
    RequestSectionLock {
        section_id: String,
        reply: Reply<Result<LockRequestOutcome, StateError>>,
    },
    RequestFinalSubmit {
        reply: Reply<Result<ChallengeView, StateError>>,
    },
    UpdateChallenge {
        target: Target,
        entered: String,
        reply: Reply<Result<ChallengeView, StateError>>,
    },
    ConfirmChallenge {
        target: Target,
        reply: Reply<Result<ConfirmOutcome, SessionError>>,
    },
    CancelChallenge {
        target: Target,
        reply: Reply<bool>,
    },
    IngestSignal {
        envelope: SignalEnvelope,
        reply: Reply<SignalOutcome>,
    },
    Violations {
        reply: Reply<ViolationReport>,
    },
}

/// What is left of a session once its actor has stopped.
///
/// Completed and terminated sessions never change again, so reads are
/// served from this record and every write is refused the way the
/// controller would refuse it.
#[derive(Debug)]
pub struct SessionRecord {
    state: SessionState,
    snapshot: SessionSnapshot,
    violations: ViolationReport,
}

impl SessionRecord {
    fn capture(controller: &SessionController) -> Self {
        Self {
            state: controller.state(),
            snapshot: controller.snapshot(Utc::now()),
            violations: controller.violation_report(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn refuse(&self, action: &'static str) -> StateError {
        StateError::InvalidTransition {
            state: self.state,
            action,
        }
    }

    fn answer(&self, command: SessionCommand) {
        match command {
            SessionCommand::Join { reply } => {
                let _ = reply.send(Err(self.refuse("join the exam")));
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot.clone());
            }
            SessionCommand::RecordAnswer { reply, .. } => {
                let _ = reply.send(AnswerOutcome::rejected(
                    self.refuse("record an answer").to_string(),
                ));
            }
            SessionCommand::RequestSectionLock { reply, .. } => {
                let _ = reply.send(Err(self.refuse("lock a section")));
            }
            SessionCommand::RequestFinalSubmit { reply } => {
                let _ = reply.send(Err(self.refuse("submit the exam")));
            }
            SessionCommand::UpdateChallenge { target, reply, .. } => {
                let _ = reply.send(Err(StateError::NoActiveChallenge(target)));
            }
            SessionCommand::ConfirmChallenge { reply, .. } => {
                let _ = reply.send(Err(self.refuse("confirm a verification code").into()));
            }
            SessionCommand::CancelChallenge { reply, .. } => {
                let _ = reply.send(false);
            }
            SessionCommand::IngestSignal { reply, .. } => {
                let _ = reply.send(SignalOutcome {
                    violation: None,
                    surface: false,
                    terminated: self.state == SessionState::Terminated,
                });
            }
            SessionCommand::Violations { reply } => {
                let _ = reply.send(self.violations.clone());
            }
        }
    }
}

/// Cloneable address of a session actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub student_id: String,
    pub exam_id: String,
    tx: mpsc::Sender<SessionCommand>,
    record: Arc<OnceLock<SessionRecord>>,
}

impl SessionHandle {
    /// Spawns the actor that owns `controller` and returns its handle.
    pub fn spawn(controller: SessionController) -> Self {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let handle = Self {
            id: controller.id(),
            student_id: controller.student_id().to_string(),
            exam_id: controller.exam().id.clone(),
            tx,
            record: Arc::new(OnceLock::new()),
        };
        tokio::spawn(run(controller, rx, handle.record.clone()));
        handle
    }

    /// Whether the actor task is still accepting commands.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Final record of a session whose actor stopped after completion or termination.
    pub fn record(&self) -> Option<&SessionRecord> {
        self.record.get()
    }

    /// The actor is gone but left no record behind: it died mid-session.
    pub fn is_crashed(&self) -> bool {
        !self.is_running() && self.record().is_none()
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> SessionCommand) -> Result<T, AppError> {
        let (reply, rx) = oneshot::channel();
        if let Err(mpsc::error::SendError(command)) = self.tx.send(build(reply)).await {
            let Some(record) = self.record() else {
                return Err(AppError::InternalServerError(format!(
                    "session {} is no longer running",
                    self.id
                )));
            };
            record.answer(command);
        }
        rx.await.map_err(|_| {
            AppError::InternalServerError(format!("session {} dropped the request", self.id))
        })
    }

    pub async fn join(&self) -> Result<SessionState, AppError> {
        Ok(self.request(|reply| SessionCommand::Join { reply }).await??)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, AppError> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    pub async fn record_answer(
        &self,
        question_id: String,
        payload: serde_json::Value,
    ) -> Result<AnswerOutcome, AppError> {
        self.request(|reply| SessionCommand::RecordAnswer {
            question_id,
            payload,
            reply,
        })
        .await
    }

    pub async fn request_section_lock(&self, section_id: String) -> Result<LockRequestOutcome, AppError> {
        Ok(self
            .request(|reply| SessionCommand::RequestSectionLock { section_id, reply })
            .await??)
    }

    pub async fn request_final_submit(&self) -> Result<ChallengeView, AppError> {
        Ok(self
            .request(|reply| SessionCommand::RequestFinalSubmit { reply })
            .await??)
    }

    pub async fn update_challenge(&self, target: Target, entered: String) -> Result<ChallengeView, AppError> {
        Ok(self
            .request(|reply| SessionCommand::UpdateChallenge {
                target,
                entered,
                reply,
            })
            .await??)
    }

    pub async fn confirm_challenge(&self, target: Target) -> Result<ConfirmOutcome, AppError> {
        Ok(self
            .request(|reply| SessionCommand::ConfirmChallenge { target, reply })
            .await??)
    }

    pub async fn cancel_challenge(&self, target: Target) -> Result<bool, AppError> {
        self.request(|reply| SessionCommand::CancelChallenge { target, reply })
            .await
    }

    pub async fn ingest_signal(&self, envelope: SignalEnvelope) -> Result<SignalOutcome, AppError> {
        self.request(|reply| SessionCommand::IngestSignal { envelope, reply })
            .await
    }

    pub async fn violations(&self) -> Result<ViolationReport, AppError> {
        self.request(|reply| SessionCommand::Violations { reply }).await
    }
}

/// Actor loop: commands and the one-second tick are serialized through the
/// same task, so the controller never sees concurrent mutation.
///
/// Stops once the session reaches a terminal state. The record is published
/// before the mailbox closes, then commands already queued are still answered.
async fn run(
    mut controller: SessionController,
    mut rx: mpsc::Receiver<SessionCommand>,
    record: Arc<OnceLock<SessionRecord>>,
) {
    let mut interval = tokio::time::interval(TICK);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(session = %controller.id(), "Session actor started");

    while !controller.state().is_terminal() {
        tokio::select! {
            command = rx.recv() => {
                let Some(command) = command else { break };
                handle(&mut controller, command).await;
            }
            _ = interval.tick() => {
                controller.tick(Utc::now()).await;
            }
        }
    }

    if controller.state().is_terminal() {
        let _ = record.set(SessionRecord::capture(&controller));
        rx.close();
        while let Some(command) = rx.recv().await {
            handle(&mut controller, command).await;
        }
    }

    tracing::info!(session = %controller.id(), state = %controller.state(), "Session actor stopped");
}

async fn handle(controller: &mut SessionController, command: SessionCommand) {
    let now = Utc::now();
    // a caller that went away no longer needs the reply
    match command {
        SessionCommand::Join { reply } => {
            let _ = reply.send(controller.join(now));
        }
        SessionCommand::Snapshot { reply } => {
            let _ = reply.send(controller.snapshot(now));
        }
        SessionCommand::RecordAnswer {
            question_id,
            payload,
            reply,
        } => {
            let _ = reply.send(controller.record_answer(&question_id, payload, now));
        }
        SessionCommand::RequestSectionLock { section_id, reply } => {
            let _ = reply.send(controller.request_section_lock(&section_id, now));
        }
        SessionCommand::RequestFinalSubmit { reply } => {
            let _ = reply.send(controller.request_final_submit(now));
        }
        SessionCommand::UpdateChallenge {
            target,
            entered,
            reply,
        } => {
            let _ = reply.send(controller.update_challenge(&target, &entered));
        }
        SessionCommand::ConfirmChallenge { target, reply } => {
            let _ = reply.send(controller.confirm_challenge(&target, now).await);
        }
        SessionCommand::CancelChallenge { target, reply } => {
            let _ = reply.send(controller.cancel_challenge(&target));
        }
        SessionCommand::IngestSignal { envelope, reply } => {
            let _ = reply.send(controller.ingest_signal(envelope, now).await);
        }
        SessionCommand::Violations { reply } => {
            let _ = reply.send(controller.violation_report());
        }
    }
}
