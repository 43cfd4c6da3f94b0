use crate::serial::SerialFailureKind;
use serde::Serialize;
use std::fmt;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Nominal,
    Degraded,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthState::Nominal => f.write_str("nominal"),
            HealthState::Degraded => f.write_str("degraded"),
        }
    }
}

/// What made the most recent exchange count as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", content = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    /// The controller stayed silent until the read timeout.
    Timeout,
    Io(SerialFailureKind),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Timeout => f.write_str("no response"),
            FailureCause::Io(kind) => write!(f, "io failure ({kind})"),
        }
    }
}

/// Result of feeding one exchange into the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthChange {
    Unchanged,
    Degraded,
    Recovered,
    /// Another failure while already degraded.
    StillDegraded,
}

impl HealthChange {
    /// Subscribers hear about transitions and about every failure once degraded.
    pub fn should_publish(&self) -> bool {
        !matches!(self, HealthChange::Unchanged)
    }
}

/// Consecutive-failure counter for the controller link.
///
/// `consecutive_failures` saturates at `threshold`; the link is degraded
/// exactly while the counter sits at the threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkHealth {
    consecutive_failures: u32,
    threshold: u32,
    state: HealthState,
    last_failure: Option<FailureCause>,
}

impl Default for LinkHealth {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}

impl LinkHealth {
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive_failures: 0,
            threshold: threshold.max(1),
            state: HealthState::Nominal,
            last_failure: None,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn is_degraded(&self) -> bool {
        self.state == HealthState::Degraded
    }

    pub fn last_failure(&self) -> Option<FailureCause> {
        self.last_failure
    }

    pub fn record_failure(&mut self, cause: FailureCause) -> HealthChange {
        let was_degraded = self.is_degraded();
        self.consecutive_failures = (self.consecutive_failures + 1).min(self.threshold);
        self.last_failure = Some(cause);
        if self.consecutive_failures >= self.threshold {
            self.state = HealthState::Degraded;
        }
        match (was_degraded, self.is_degraded()) {
            (true, _) => HealthChange::StillDegraded,
            (false, true) => HealthChange::Degraded,
            (false, false) => HealthChange::Unchanged,
        }
    }

    pub fn record_success(&mut self) -> HealthChange {
        let was_degraded = self.is_degraded();
        self.consecutive_failures = 0;
        self.state = HealthState::Nominal;
        if was_degraded {
            HealthChange::Recovered
        } else {
            HealthChange::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_nominal_below_threshold() {
        let mut health = LinkHealth::default();
        for _ in 0..2 {
            assert_eq!(
                health.record_failure(FailureCause::Timeout),
                HealthChange::Unchanged
            );
        }
        assert_eq!(health.state(), HealthState::Nominal);
        assert_eq!(health.consecutive_failures(), 2);
    }

    #[test]
    fn degrades_at_threshold_and_clips() {
        let mut health = LinkHealth::default();
        health.record_failure(FailureCause::Timeout);
        health.record_failure(FailureCause::Timeout);
        assert_eq!(
            health.record_failure(FailureCause::Timeout),
            HealthChange::Degraded
        );
        assert_eq!(health.consecutive_failures(), 3);
        for _ in 0..5 {
            assert_eq!(
                health.record_failure(FailureCause::Io(SerialFailureKind::Disconnected)),
                HealthChange::StillDegraded
            );
        }
        assert_eq!(health.consecutive_failures(), 3);
        assert!(health.is_degraded());
        assert_eq!(
            health.last_failure(),
            Some(FailureCause::Io(SerialFailureKind::Disconnected))
        );
    }

    #[test]
    fn single_success_recovers() {
        let mut health = LinkHealth::default();
        for _ in 0..4 {
            health.record_failure(FailureCause::Timeout);
        }
        assert_eq!(health.record_success(), HealthChange::Recovered);
        assert_eq!(health.consecutive_failures(), 0);
        assert_eq!(health.state(), HealthState::Nominal);
    }

    #[test]
    fn success_while_nominal_is_silent() {
        let mut health = LinkHealth::default();
        health.record_failure(FailureCause::Timeout);
        let change = health.record_success();
        assert!(!change.should_publish());
        assert_eq!(health.consecutive_failures(), 0);
    }

    #[test]
    fn zero_threshold_is_raised_to_one() {
        let mut health = LinkHealth::new(0);
        assert_eq!(health.threshold(), 1);
        assert_eq!(
            health.record_failure(FailureCause::Timeout),
            HealthChange::Degraded
        );
    }
}
