//! Wall-clock collaborator and the voting window check.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Grace period added to every voting window
pub const VOTING_GRACE_MS: i64 = 300;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to (tests, replays)
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Whether a vote at `now` still falls inside `duration_secs` (+ grace) after `start`
pub fn voting_window_open(start: DateTime<Utc>, duration_secs: u32, now: DateTime<Utc>) -> bool {
    let elapsed = now - start;
    elapsed <= Duration::seconds(duration_secs as i64) + Duration::milliseconds(VOTING_GRACE_MS)
}

/// Seconds left in the window, clamped at zero (grace excluded)
pub fn seconds_remaining(start: DateTime<Utc>, duration_secs: u32, now: DateTime<Utc>) -> f64 {
    let elapsed_ms = (now - start).num_milliseconds() as f64;
    (duration_secs as f64 - elapsed_ms / 1000.0).max(0.0)
}
