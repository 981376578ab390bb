// src/models/violation.rs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a detected integrity event.
/// Ordered so that `Critical` compares greatest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Contribution of one violation of this severity to the session risk score.
    pub fn weight(self) -> u32 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 3,
            Severity::High => 6,
            Severity::Critical => 10,
        }
    }
}

/// Kind of integrity breach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    TabSwitch,
    WindowBlur,
    ClipboardCopy,
    ClipboardPaste,
    ScreenLock,
    StrictModeBreach,
    MonitorFailure,
    MultipleMonitors,
    VirtualMachine,
}

impl ViolationType {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationType::TabSwitch => "tab_switch",
            ViolationType::WindowBlur => "window_blur",
            ViolationType::ClipboardCopy => "clipboard_copy",
            ViolationType::ClipboardPaste => "clipboard_paste",
            ViolationType::ScreenLock => "screen_lock",
            ViolationType::StrictModeBreach => "strict_mode_breach",
            ViolationType::MonitorFailure => "monitor_failure",
            ViolationType::MultipleMonitors => "multiple_monitors",
            ViolationType::VirtualMachine => "virtual_machine",
        }
    }

    /// Severity before per-exam overrides and duration escalation.
    pub fn base_severity(self) -> Severity {
        match self {
            ViolationType::WindowBlur | ViolationType::ClipboardCopy => Severity::Low,
            ViolationType::TabSwitch | ViolationType::ClipboardPaste | ViolationType::ScreenLock => {
                Severity::Medium
            }
            ViolationType::MonitorFailure => Severity::High,
            ViolationType::StrictModeBreach
            | ViolationType::MultipleMonitors
            | ViolationType::VirtualMachine => Severity::Critical,
        }
    }
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed, severity-scored record of a detected integrity event.
/// Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub violation_type: ViolationType,
    pub severity: Severity,
    pub occurred_at: DateTime<Utc>,

    /// Key used to throttle UI surfacing of repeated identical violations.
    pub dedup_key: String,

    /// Ordinal of this violation among all violations of the same type (1-based).
    pub count: u32,

    /// Screen-lock duration, when the violation came from an unlock signal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<i64>,

    pub source: SignalSource,
}

/// Where a raw signal originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    #[default]
    Browser,
    NativeHost,
}

/// Raw environment signal, as delivered by the browser or by a native host IPC channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "kebab-case")]
pub enum RawSignal {
    TabSwitchedOut,
    TabSwitchedIn,
    WindowBlur,
    WindowFocus,
    VisibilityHidden,
    VisibilityVisible,
    Copy,
    Paste,
    LockScreenEvent,
    UnlockScreenEvent,
    StrictModeLock,
    MonitorNotWorking,
    MultipleMonitors {
        #[serde(default)]
        displays: Option<u32>,
    },
    VmDetected {
        #[serde(default)]
        vendor: Option<String>,
    },
}

impl RawSignal {
    /// Violation type for signals that map one-to-one onto a violation.
    /// Focus-regained signals and screen-lock bookkeeping return `None`.
    pub fn direct_violation(&self) -> Option<ViolationType> {
        match self {
            RawSignal::TabSwitchedOut | RawSignal::VisibilityHidden => Some(ViolationType::TabSwitch),
            RawSignal::WindowBlur => Some(ViolationType::WindowBlur),
            RawSignal::Copy => Some(ViolationType::ClipboardCopy),
            RawSignal::Paste => Some(ViolationType::ClipboardPaste),
            RawSignal::StrictModeLock => Some(ViolationType::StrictModeBreach),
            RawSignal::MonitorNotWorking => Some(ViolationType::MonitorFailure),
            RawSignal::MultipleMonitors { .. } => Some(ViolationType::MultipleMonitors),
            RawSignal::VmDetected { .. } => Some(ViolationType::VirtualMachine),
            RawSignal::TabSwitchedIn
            | RawSignal::WindowFocus
            | RawSignal::VisibilityVisible
            | RawSignal::LockScreenEvent
            | RawSignal::UnlockScreenEvent => None,
        }
    }
}

/// DTO for one incoming proctoring signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEnvelope {
    #[serde(flatten)]
    pub signal: RawSignal,

    #[serde(default)]
    pub source: SignalSource,

    /// Client-side timestamp. Falls back to server receipt time.
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl SignalEnvelope {
    pub fn new(signal: RawSignal, source: SignalSource, occurred_at: DateTime<Utc>) -> Self {
        Self {
            signal,
            source,
            occurred_at: Some(occurred_at),
        }
    }
}

/// Result of ingesting one signal, split into the always-logged record and
/// the independent decision whether to show it to the learner.
#[derive(Debug, Clone, Serialize)]
pub struct SignalOutcome {
    pub violation: Option<Violation>,
    pub surface: bool,
    pub terminated: bool,
}
