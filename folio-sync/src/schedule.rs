//! One-shot deadlines with replace and cancel semantics.
//!
//! Nothing here sleeps. The owner reports [`ScheduledTask::deadline`] to its
//! host and checks [`ScheduledTask::take_if_due`] when the host ticks.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduledTask {
    deadline: Option<Instant>,
}

impl ScheduledTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `delay` after `now`, replacing any pending deadline.
    pub fn schedule(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
    }

    /// Schedule only when nothing is pending. Returns `true` if scheduled.
    pub fn schedule_if_idle(&mut self, now: Instant, delay: Duration) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.schedule(now, delay);
        true
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_scheduled(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }

    /// Clear the deadline if it has passed. Returns `true` when it fired.
    pub fn take_if_due(&mut self, now: Instant) -> bool {
        if self.is_due(now) {
            self.deadline = None;
            true
        } else {
            false
        }
    }
}

/// Earliest of several optional deadlines.
pub fn earliest(deadlines: impl IntoIterator<Item = Option<Instant>>) -> Option<Instant> {
    deadlines.into_iter().flatten().min()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reschedule_replaces_deadline() {
        let now = Instant::now();
        let mut task = ScheduledTask::new();
        task.schedule(now, Duration::from_millis(500));
        task.schedule(now + Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(task.deadline(), Some(now + Duration::from_millis(600)));
        assert!(!task.is_due(now + Duration::from_millis(599)));
        assert!(task.take_if_due(now + Duration::from_millis(600)));
        assert!(!task.is_scheduled());
    }

    #[test]
    fn test_schedule_if_idle_keeps_first() {
        let now = Instant::now();
        let mut task = ScheduledTask::new();
        assert!(task.schedule_if_idle(now, Duration::from_millis(20)));
        assert!(!task.schedule_if_idle(now + Duration::from_millis(10), Duration::from_millis(20)));
        assert_eq!(task.deadline(), Some(now + Duration::from_millis(20)));
    }

    #[test]
    fn test_cancel() {
        let now = Instant::now();
        let mut task = ScheduledTask::new();
        task.schedule(now, Duration::ZERO);
        task.cancel();
        assert!(!task.take_if_due(now + Duration::from_secs(1)));
    }

    #[test]
    fn test_earliest() {
        let now = Instant::now();
        let later = now + Duration::from_millis(5);
        assert_eq!(earliest([None, Some(later), Some(now)]), Some(now));
        assert_eq!(earliest([None, None]), None);
    }
}
