// src/session/proctoring.rs

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::models::{
    exam::ProctoringPolicy,
    session::RiskProfile,
    violation::{RawSignal, Severity, SignalEnvelope, SignalSource, Violation, ViolationType},
};

/// A violation produced from one raw signal.
///
/// Every detection is logged and counted; `surface` only decides whether the
/// learner is notified, based on the dedup window.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub violation: Violation,
    pub surface: bool,
}

/// Turns raw environment signals into scored violations.
#[derive(Debug, Clone)]
pub struct ProctoringPipeline {
    policy: ProctoringPolicy,
    counters: BTreeMap<ViolationType, u32>,
    score: u32,
    highest: Option<Severity>,
    log: Vec<Violation>,
    last_surfaced: HashMap<String, DateTime<Utc>>,
    screen_locked_at: Option<DateTime<Utc>>,
    monitored_shell: bool,
}

impl ProctoringPipeline {
    pub fn new(policy: ProctoringPolicy, monitored_shell: bool) -> Self {
        Self {
            policy,
            counters: BTreeMap::new(),
            score: 0,
            highest: None,
            log: Vec::new(),
            last_surfaced: HashMap::new(),
            screen_locked_at: None,
            monitored_shell,
        }
    }

    pub fn monitored_shell(&self) -> bool {
        self.monitored_shell
    }

    pub fn counter(&self, violation_type: ViolationType) -> u32 {
        self.counters.get(&violation_type).copied().unwrap_or(0)
    }

    pub fn log(&self) -> &[Violation] {
        &self.log
    }

    pub fn risk_profile(&self) -> RiskProfile {
        RiskProfile {
            score: self.score,
            total_violations: self.log.len(),
            counts: self.counters.clone(),
            highest_severity: self.highest,
        }
    }

    /// Ingests one signal. `received_at` is used when the signal carries no timestamp.
    pub fn ingest(&mut self, envelope: &SignalEnvelope, received_at: DateTime<Utc>) -> Option<Detection> {
        let at = envelope.occurred_at.unwrap_or(received_at);

        if envelope.source == SignalSource::NativeHost && !self.monitored_shell {
            tracing::info!("Native host channel detected, session is running in a monitored shell");
            self.monitored_shell = true;
        }

        match &envelope.signal {
            RawSignal::LockScreenEvent => {
                // keep the earliest lock if the host repeats the event
                self.screen_locked_at.get_or_insert(at);
                None
            }
            RawSignal::UnlockScreenEvent => {
                let Some(locked_at) = self.screen_locked_at.take() else {
                    tracing::debug!("Unlock signal without a preceding lock, ignored");
                    return None;
                };
                let duration = (at - locked_at).num_seconds().max(0);
                let mut severity = self.policy.severity_for(ViolationType::ScreenLock);
                if duration > self.policy.screen_lock_threshold_secs {
                    severity = severity.max(Severity::High);
                }
                Some(self.record(
                    ViolationType::ScreenLock,
                    severity,
                    at,
                    Some(duration),
                    envelope.source,
                ))
            }
            signal => {
                let violation_type = signal.direct_violation()?;
                let severity = self.policy.severity_for(violation_type);
                Some(self.record(violation_type, severity, at, None, envelope.source))
            }
        }
    }

    fn record(
        &mut self,
        violation_type: ViolationType,
        severity: Severity,
        at: DateTime<Utc>,
        duration_secs: Option<i64>,
        source: SignalSource,
    ) -> Detection {
        let counter = self.counters.entry(violation_type).or_insert(0);
        *counter += 1;
        let count = *counter;

        self.score = self.score.saturating_add(severity.weight());
        self.highest = self.highest.max(Some(severity));

        let dedup_key = violation_type.as_str().to_string();
        let window = self.policy.dedup_window();
        let surface = self
            .last_surfaced
            .get(&dedup_key)
            .is_none_or(|last| at - *last >= window);
        if surface {
            self.last_surfaced.insert(dedup_key.clone(), at);
        }

        let violation = Violation {
            violation_type,
            severity,
            occurred_at: at,
            dedup_key,
            count,
            duration_secs,
            source,
        };

        tracing::info!(
            violation = %violation_type,
            severity = ?severity,
            count,
            surface,
            "Proctoring violation recorded"
        );

        self.log.push(violation.clone());
        Detection { violation, surface }
    }
}
