use std::sync::Arc;

use crate::{
    clients::{ContentProvider, SubmissionApi, TelemetrySink},
    config::Config,
    session::{Collaborators, SessionRegistry},
};
use axum::extract::FromRef;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub registry: SessionRegistry,
    pub content: Arc<dyn ContentProvider>,
    pub submissions: Arc<dyn SubmissionApi>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

impl AppState {
    pub fn new(
        config: Config,
        content: Arc<dyn ContentProvider>,
        submissions: Arc<dyn SubmissionApi>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            config,
            registry: SessionRegistry::new(),
            content,
            submissions,
            telemetry,
        }
    }

    /// Collaborators handed to each new session.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            submissions: self.submissions.clone(),
            telemetry: self.telemetry.clone(),
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for SessionRegistry {
    fn from_ref(state: &AppState) -> Self {
        state.registry.clone()
    }
}
