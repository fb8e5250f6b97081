use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default trial length after account creation
pub const DEFAULT_TRIAL_HOURS: u32 = 48;

/// Fixed-length trial window starting at account creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialClock {
    duration: Duration,
}

/// Result of evaluating a trial window at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialStatus {
    pub is_active: bool,
    pub ends_at: DateTime<Utc>,

    /// The account creation time lies in the future relative to `now`
    pub clock_skew: bool,
}

impl TrialStatus {
    /// Time left in the trial, zero once it has ended
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        if self.is_active {
            (self.ends_at - now).max(Duration::zero())
        } else {
            Duration::zero()
        }
    }
}

impl TrialClock {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn from_hours(hours: u32) -> Self {
        Self::new(Duration::hours(i64::from(hours)))
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Evaluate the trial window for an account created at `created_at`.
    ///
    /// `ends_at` is exactly `created_at + duration`. A creation time in the
    /// future fails open: the trial counts as active and `clock_skew` is set.
    pub fn evaluate(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> TrialStatus {
        let ends_at = created_at + self.duration;
        let clock_skew = created_at > now;

        TrialStatus {
            is_active: clock_skew || now < ends_at,
            ends_at,
            clock_skew,
        }
    }
}

impl Default for TrialClock {
    fn default() -> Self {
        Self::from_hours(DEFAULT_TRIAL_HOURS)
    }
}
