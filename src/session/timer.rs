// src/session/timer.rs

use chrono::{DateTime, Duration, Utc};

use crate::models::session::{CountdownMode, CountdownView};

/// Waiting-room countdown to a server-declared start time.
///
/// Recomputed on every tick from `now`; fires exactly once when the start
/// time is reached.
#[derive(Debug, Clone)]
pub struct Countdown {
    start_time: DateTime<Utc>,
    near_threshold: Duration,
    fired: bool,
}

/// One reading of the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownTick {
    pub view: CountdownView,
    /// True on the single tick that reached zero.
    pub fire: bool,
}

impl Countdown {
    pub fn new(start_time: DateTime<Utc>, near_threshold: Duration) -> Self {
        Self {
            start_time,
            near_threshold,
            fired: false,
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Reads the countdown without advancing it.
    pub fn view(&self, now: DateTime<Utc>) -> CountdownView {
        let seconds_remaining = (self.start_time - now).num_seconds().max(0);
        let mode = if self.start_time - now > self.near_threshold {
            CountdownMode::Far
        } else {
            CountdownMode::Near
        };
        CountdownView {
            seconds_remaining,
            mode,
        }
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> CountdownTick {
        let view = self.view(now);
        let fire = !self.fired && now >= self.start_time;
        if fire {
            self.fired = true;
        }
        CountdownTick { view, fire }
    }
}
