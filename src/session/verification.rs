// src/session/verification.rs

use std::collections::BTreeMap;

use rand::Rng;

use crate::{error::StateError, models::submission::Target};

/// Number of digits in a verification code.
pub const CODE_LENGTH: usize = 4;

/// One open "read back what you see" challenge.
///
/// The code is a confirmation step against accidental irreversible clicks,
/// not a credential; it is never persisted or sent upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationChallenge {
    pub target: Target,
    pub code: String,
    pub entered: String,
    pub error: bool,
}

/// Result of `confirm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// Codes matched; the record has been removed and is handed back to the caller.
    Verified(VerificationChallenge),
    /// Codes differ; the record stays open with `error` set and the same code.
    Mismatch(VerificationChallenge),
}

/// Uniformly random code in `0000..=9999`, leading zeros kept.
pub fn generate_code() -> String {
    let n: u32 = rand::rng().random_range(0..10_000);
    format!("{:0width$}", n, width = CODE_LENGTH)
}

/// At most one open challenge per target.
#[derive(Debug, Clone, Default)]
pub struct VerificationGate {
    challenges: BTreeMap<Target, VerificationChallenge>,
}

impl VerificationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a challenge for `target`, replacing any open one.
    pub fn initiate(&mut self, target: Target) -> &VerificationChallenge {
        self.initiate_with_code(target, generate_code())
    }

    pub(crate) fn initiate_with_code(&mut self, target: Target, code: String) -> &VerificationChallenge {
        let challenge = VerificationChallenge {
            target: target.clone(),
            code,
            entered: String::new(),
            error: false,
        };
        self.challenges.insert(target.clone(), challenge);
        &self.challenges[&target]
    }

    /// Stores the learner's input verbatim.
    pub fn update(&mut self, target: &Target, entered: &str) -> Result<&VerificationChallenge, StateError> {
        let challenge = self
            .challenges
            .get_mut(target)
            .ok_or_else(|| StateError::NoActiveChallenge(target.clone()))?;
        challenge.entered = entered.to_string();
        Ok(&*challenge)
    }

    pub fn confirm(&mut self, target: &Target) -> Result<Confirmation, StateError> {
        let challenge = self
            .challenges
            .get_mut(target)
            .ok_or_else(|| StateError::NoActiveChallenge(target.clone()))?;

        if challenge.entered == challenge.code {
            let mut verified = self
                .challenges
                .remove(target)
                .ok_or_else(|| StateError::NoActiveChallenge(target.clone()))?;
            verified.error = false;
            Ok(Confirmation::Verified(verified))
        } else {
            challenge.error = true;
            Ok(Confirmation::Mismatch(challenge.clone()))
        }
    }

    /// Puts a verified challenge back, e.g. when the action it authorized
    /// could not be delivered and the learner should be able to retry.
    pub fn restore(&mut self, challenge: VerificationChallenge) {
        self.challenges.insert(challenge.target.clone(), challenge);
    }

    /// Discards the challenge for `target`. Returns whether one was open.
    pub fn cancel(&mut self, target: &Target) -> bool {
        self.challenges.remove(target).is_some()
    }

    /// Discards every open challenge.
    pub fn clear(&mut self) {
        self.challenges.clear();
    }

    pub fn get(&self, target: &Target) -> Option<&VerificationChallenge> {
        self.challenges.get(target)
    }

    pub fn open(&self) -> impl Iterator<Item = &VerificationChallenge> {
        self.challenges.values()
    }

    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }
}
